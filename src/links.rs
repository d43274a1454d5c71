/// Navigation targets for the gallery's "Add Post" and "Add Review" actions

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything outside the URL-unreserved set gets percent-encoded
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Link to the post creation page for a model
pub fn add_post_link(model_id: i64, model_version_id: Option<i64>, return_url: &str) -> String {
    let mut link = format!("/posts/create?modelId={}", model_id);
    if let Some(version_id) = model_version_id {
        link.push_str(&format!("&modelVersionId={}", version_id));
    }
    link.push_str("&returnUrl=");
    link.extend(utf8_percent_encode(return_url, COMPONENT));
    link
}

/// Same as `add_post_link`, flagged as a review
pub fn add_review_link(model_id: i64, model_version_id: Option<i64>, return_url: &str) -> String {
    add_post_link(model_id, model_version_id, return_url) + "&reviewing=true"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_post_link() {
        assert_eq!(
            add_post_link(12, Some(34), "/models/12?tab=gallery"),
            "/posts/create?modelId=12&modelVersionId=34&returnUrl=%2Fmodels%2F12%3Ftab%3Dgallery"
        );
        assert_eq!(add_post_link(12, None, "/m"), "/posts/create?modelId=12&returnUrl=%2Fm");
    }

    #[test]
    fn test_add_review_link() {
        assert!(add_review_link(1, None, "/").ends_with("&reviewing=true"));
    }

    #[test]
    fn test_return_url_keeps_unreserved_and_encodes_unicode() {
        assert_eq!(
            add_post_link(1, None, "/m/a-b_c.d~e?q=é &x"),
            "/posts/create?modelId=1&returnUrl=%2Fm%2Fa-b_c.d~e%3Fq%3D%C3%A9%20%26x"
        );
    }
}

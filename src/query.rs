/// Query interface between the feed and whatever serves pages
///
/// A `QuerySource` answers one page request at a time. The feed controller
/// never talks to a source directly: it hands out `FetchTicket`s and the
/// host (UI runtime or test) runs them against a source of its choice.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::error::FetchError;
use crate::state::data::{Cursor, ItemGroup};
use crate::state::filters::FilterSet;

/// One page request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedRequest {
    /// Non-empty filters only
    #[serde(flatten)]
    pub filters: FilterSet,
    pub cursor: Option<Cursor>,
    pub limit: usize,
}

/// One page response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub items: Vec<ItemGroup>,
    /// `None` ends pagination
    pub next_cursor: Option<Cursor>,
}

/// Per-call transport options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Send this request on its own instead of batching it with others
    pub skip_batch: bool,
}

/// Anything that can serve gallery pages
pub trait QuerySource: Clone + Send + Sync + 'static {
    fn fetch_page(
        &self,
        request: FeedRequest,
        options: QueryOptions,
    ) -> impl Future<Output = Result<FeedPage, FetchError>> + Send;
}

/// Cursor format used by the offset-paged sources in this crate
pub(crate) fn offset_cursor(offset: usize) -> Cursor {
    Cursor::new(format!("o:{}", offset))
}

/// Offset one page past `offset`, rejecting cursors that would overflow
pub(crate) fn page_end(offset: usize, limit: usize) -> Result<usize, FetchError> {
    offset
        .checked_add(limit)
        .ok_or_else(|| FetchError::InvalidCursor(offset_cursor(offset).as_str().to_string()))
}

pub(crate) fn parse_offset_cursor(cursor: Option<&Cursor>) -> Result<usize, FetchError> {
    match cursor {
        None => Ok(0),
        Some(cursor) => cursor
            .as_str()
            .strip_prefix("o:")
            .and_then(|offset| offset.parse().ok())
            .ok_or_else(|| FetchError::InvalidCursor(cursor.as_str().to_string())),
    }
}

/// In-process source that pages over a fixed list of groups.
///
/// Every request is recorded, which makes it handy for checking what the
/// feed actually asked for. Routes added with `with_route` serve a
/// different list to requests carrying matching filters.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    groups: Arc<Vec<ItemGroup>>,
    routes: Arc<Vec<(FilterSet, Vec<ItemGroup>)>>,
    failure: Option<FetchError>,
    requests: Arc<Mutex<Vec<(FeedRequest, QueryOptions)>>>,
}

impl MemorySource {
    pub fn new(groups: Vec<ItemGroup>) -> Self {
        Self {
            groups: Arc::new(groups),
            ..Self::default()
        }
    }

    /// A source whose every request fails with `error`
    pub fn failing(error: FetchError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Serve `groups` to requests whose filters include every entry of `when`.
    /// The first matching route wins.
    pub fn with_route(mut self, when: FilterSet, groups: Vec<ItemGroup>) -> Self {
        Arc::make_mut(&mut self.routes).push((when, groups));
        self
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<(FeedRequest, QueryOptions)> {
        self.requests.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn page(&self, request: &FeedRequest) -> Result<FeedPage, FetchError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let groups = self.groups_for(&request.filters);
        let offset = parse_offset_cursor(request.cursor.as_ref())?;
        let end = page_end(offset, request.limit)?.min(groups.len());
        let items = groups.get(offset..end).unwrap_or_default().to_vec();
        let next_cursor = (end < groups.len()).then(|| offset_cursor(end));
        Ok(FeedPage { items, next_cursor })
    }

    fn groups_for(&self, filters: &FilterSet) -> &[ItemGroup] {
        self.routes
            .iter()
            .find(|(when, _)| when.iter().all(|(key, value)| filters.get(key) == Some(value)))
            .map(|(_, groups)| groups.as_slice())
            .unwrap_or(&self.groups)
    }
}

impl QuerySource for MemorySource {
    fn fetch_page(
        &self,
        request: FeedRequest,
        options: QueryOptions,
    ) -> impl Future<Output = Result<FeedPage, FetchError>> + Send {
        let result = self.page(&request);
        if let Ok(mut log) = self.requests.lock() {
            log.push((request, options));
        }
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::Image;
    use crate::state::filters::keys;

    fn groups(count: i64) -> Vec<ItemGroup> {
        (1..=count)
            .map(|id| ItemGroup::new(vec![Image::sized(id, 300, 400)]).unwrap())
            .collect()
    }

    #[test]
    fn test_request_serializes_flat() {
        let request = FeedRequest {
            filters: FilterSet::new().with(keys::MODEL_ID, 7i64).with(keys::SORT, "Newest"),
            cursor: Some(Cursor::new("o:50")),
            limit: 50,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"modelId": 7, "sort": "Newest", "cursor": "o:50", "limit": 50})
        );
    }

    #[test]
    fn test_bad_cursor_is_reported() {
        let cursor = Cursor::new("page-two");
        assert_eq!(
            parse_offset_cursor(Some(&cursor)),
            Err(FetchError::InvalidCursor("page-two".to_string()))
        );
        assert_eq!(parse_offset_cursor(None), Ok(0));
    }

    #[tokio::test]
    async fn test_overflowing_cursor_is_rejected() {
        let source = MemorySource::new(groups(3));
        let request = FeedRequest {
            filters: FilterSet::new(),
            cursor: Some(offset_cursor(usize::MAX)),
            limit: 2,
        };
        let result = source.fetch_page(request, QueryOptions::default()).await;
        assert!(matches!(result, Err(FetchError::InvalidCursor(_))));
    }

    #[tokio::test]
    async fn test_routes_serve_matching_filters() {
        let source = MemorySource::new(groups(3))
            .with_route(FilterSet::new().with(keys::EXCLUDE_CROSS_POSTS, true), groups(5)[3..].to_vec());

        let request = |filters: FilterSet| FeedRequest { filters, cursor: None, limit: 10 };
        let all = source.fetch_page(request(FilterSet::new()), QueryOptions::default()).await.unwrap();
        assert_eq!(all.items.len(), 3);

        let routed = source
            .fetch_page(
                request(FilterSet::new().with(keys::EXCLUDE_CROSS_POSTS, true).with(keys::SORT, "Newest")),
                QueryOptions::default(),
            )
            .await
            .unwrap();
        let ids: Vec<&str> = routed.items.iter().map(|g| g.id().as_str()).collect();
        assert_eq!(ids, vec!["4", "5"]);
    }

    #[tokio::test]
    async fn test_memory_source_pages_until_exhausted() {
        let source = MemorySource::new(groups(3));
        let first = source
            .fetch_page(
                FeedRequest { filters: FilterSet::new(), cursor: None, limit: 2 },
                QueryOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_cursor, Some(Cursor::new("o:2")));

        let second = source
            .fetch_page(
                FeedRequest { filters: FilterSet::new(), cursor: first.next_cursor, limit: 2 },
                QueryOptions { skip_batch: true },
            )
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.next_cursor, None);
        assert_eq!(source.requests().len(), 2);
        assert!(source.requests()[1].1.skip_batch);
    }
}

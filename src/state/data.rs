/// Shared data structures for the gallery
///
/// These structs represent the data model that flows between
/// the query layer, the feed controller and the layout engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{GalleryError, Result};

/// Represents a single image inside a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Unique image ID
    pub id: i64,
    /// Pixel width, if the source knows it
    pub width: Option<u32>,
    /// Pixel height, if the source knows it
    pub height: Option<u32>,
    /// Where the renderer can fetch the image from
    #[serde(default)]
    pub url: Option<String>,
}

impl Image {
    pub fn new(id: i64, width: Option<u32>, height: Option<u32>) -> Self {
        Self { id, width, height, url: None }
    }

    /// Convenience constructor for an image with known dimensions
    pub fn sized(id: i64, width: u32, height: u32) -> Self {
        Self::new(id, Some(width), Some(height))
    }

    /// Width divided by height.
    ///
    /// Unknown or zero height yields 0.0, which sorts the image with
    /// the portrait-or-square bucket.
    pub fn aspect_ratio(&self) -> f32 {
        match (self.width, self.height) {
            (width, Some(height)) if height > 0 => width.unwrap_or(0) as f32 / height as f32,
            _ => 0.0,
        }
    }
}

/// Stable identity of an item group: member image ids joined by `_`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(String);

impl GroupId {
    fn from_images(images: &[Image]) -> Self {
        let joined = images
            .iter()
            .map(|image| image.id.to_string())
            .collect::<Vec<_>>()
            .join("_");
        GroupId(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque pagination token handed out by a query source.
///
/// The client only stores it and passes it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Cursor(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One contribution (post) and its images, laid out as a single unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawItemGroup", into = "RawItemGroup")]
pub struct ItemGroup {
    id: GroupId,
    images: Vec<Image>,
    /// Post this group was published in
    pub post_id: Option<i64>,
    /// Author of the post
    pub username: Option<String>,
    /// Publication time (unix seconds)
    pub created_at: Option<i64>,
}

impl ItemGroup {
    /// Build a group from its images.
    ///
    /// Fails with `GalleryError::EmptyGroup` when `images` is empty.
    pub fn new(images: Vec<Image>) -> Result<Self> {
        if images.is_empty() {
            return Err(GalleryError::EmptyGroup);
        }
        Ok(Self {
            id: GroupId::from_images(&images),
            images,
            post_id: None,
            username: None,
            created_at: None,
        })
    }

    pub fn with_post(mut self, post_id: i64, username: Option<String>, created_at: i64) -> Self {
        self.post_id = Some(post_id);
        self.username = username;
        self.created_at = Some(created_at);
        self
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    /// Member images in their original order (never empty)
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn is_stack(&self) -> bool {
        self.images.len() > 1
    }
}

// Identity is the image-id sequence, metadata does not take part.
impl PartialEq for ItemGroup {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ItemGroup {}

/// Wire shape of an item group, validated on the way in
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItemGroup {
    images: Vec<Image>,
    #[serde(default)]
    post_id: Option<i64>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    created_at: Option<i64>,
}

impl TryFrom<RawItemGroup> for ItemGroup {
    type Error = GalleryError;

    fn try_from(raw: RawItemGroup) -> Result<Self> {
        let mut group = ItemGroup::new(raw.images)?;
        group.post_id = raw.post_id;
        group.username = raw.username;
        group.created_at = raw.created_at;
        Ok(group)
    }
}

impl From<ItemGroup> for RawItemGroup {
    fn from(group: ItemGroup) -> Self {
        RawItemGroup {
            images: group.images,
            post_id: group.post_id,
            username: group.username,
            created_at: group.created_at,
        }
    }
}

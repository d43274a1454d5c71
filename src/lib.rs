//! Filterable, infinitely scrolling masonry gallery of image posts.
//!
//! The pieces, leaves first:
//! - [`state::filters`] holds filter selections per scope
//! - [`state::feed`] pages through a [`query::QuerySource`] with opaque cursors
//! - [`layout::masonry`] packs item groups into balanced columns
//! - [`ui::viewport`] turns sentinel visibility into load-more requests
//! - [`ui::gallery`] wires them together for a model's gallery page

pub mod config;
pub mod error;
pub mod layout;
pub mod links;
pub mod query;
pub mod state;
pub mod ui;

pub use error::{FetchError, GalleryError, Result};

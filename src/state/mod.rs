/// State management module
///
/// This module handles all gallery state, including:
/// - Shared data structures (data.rs)
/// - Filter selections per scope (filters.rs)
/// - The paginated feed state machine (feed.rs)
/// - The local SQLite post catalog (library.rs)

pub mod data;
pub mod feed;
pub mod filters;
pub mod library;

/// Error types for the gallery
///
/// Two layers:
/// - `FetchError` is what a query source reports for a single page request.
///   It is `Clone` so it can travel inside UI messages and be kept as the
///   feed's last error.
/// - `GalleryError` covers everything else (catalog, settings, bad input).

use thiserror::Error;

/// A page request failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The transport (network, executor, channel) failed before a response arrived
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backing store rejected the query
    #[error("database failure: {0}")]
    Database(String),

    /// The source could not make sense of a cursor it handed out earlier
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

impl From<rusqlite::Error> for FetchError {
    fn from(err: rusqlite::Error) -> Self {
        FetchError::Database(err.to_string())
    }
}

impl From<tokio::task::JoinError> for FetchError {
    fn from(err: tokio::task::JoinError) -> Self {
        FetchError::Transport(format!("task join error: {}", err))
    }
}

/// Top-level error for catalog, configuration and model construction
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings: {0}")]
    Config(#[from] serde_json::Error),

    /// An item group must hold at least one image
    #[error("an item group needs at least one image")]
    EmptyGroup,

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

pub type Result<T> = std::result::Result<T, GalleryError>;

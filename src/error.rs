use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by session loading, export and history storage
#[derive(Debug, Error)]
pub enum ReflexError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("history database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("guess limit {guess:?} must be below response limit {response:?}")]
    InvalidLimits { guess: Duration, response: Duration },

    #[error("trial timing invalid: display duration must be positive (got {0:?})")]
    InvalidTiming(Duration),

    #[error("session already holds a result for every trial")]
    SessionComplete,
}

pub type Result<T> = std::result::Result<T, ReflexError>;

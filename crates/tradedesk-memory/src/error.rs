use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Memory store not available: {0}")]
    Unavailable(String),
}

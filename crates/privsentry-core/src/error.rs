//! Error types for PrivSentry.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing required field: {0}")]
    MissingInput(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stage already applied: {0}")]
    StageOrder(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Launching the browser, creating the context, or opening the page failed.
    #[error("{0}")]
    Initialization(String),

    #[error("{0}")]
    Navigation(String),

    #[error("{0}")]
    Extraction(String),

    /// No inference engine is configured.
    #[error("{0}")]
    SummarizerUnavailable(String),

    #[error("{0}")]
    Summarization(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

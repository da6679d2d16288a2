use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sampler error: {0}")]
    Sampler(String),

    #[error("Storage measurement error: {0}")]
    Storage(String),

    #[error("Capability unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, ObserverError>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid session key: {key}")]
    InvalidKey { key: String },
}

pub type Result<T> = std::result::Result<T, Error>;

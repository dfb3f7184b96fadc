#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no agent configured for channel {channel}")]
    NoAgent { channel: String },
}

pub type Result<T> = std::result::Result<T, Error>;

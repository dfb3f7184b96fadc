#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid webhook config: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    #[error("webhook account {account_id} is misconfigured: {message}")]
    Misconfigured { account_id: String, message: String },

    #[error("webhook channel already runs account {existing}; only one account is supported")]
    AccountLimit { existing: String },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

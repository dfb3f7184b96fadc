use std::error::Error as StdError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("media exceeds {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("fetching {url} failed with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unsupported media reference: {reference}")]
    UnsupportedReference { reference: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn external<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TooLarge { .. } => "too_large",
            Self::Status { .. } => "http_status",
            Self::UnsupportedReference { .. } => "unsupported",
            Self::External { .. } => "io",
            Self::Message { .. } => "other",
        }
    }
}

impl hookrelay_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

hookrelay_common::impl_context!(Error);

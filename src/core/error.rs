use std::error::Error as StdError;
use thiserror::Error;

pub type ReaderResult<T> = Result<T, ReaderError>;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("transfer buffer allocation of {size} bytes failed")]
    Allocation { size: usize },
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
    #[error("{context}: {source}")]
    Connection {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("unsupported media format for '{url}'")]
    UnsupportedFormat { url: String },
    #[error("stream i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ReaderError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn connection(
        context: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::Connection {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn unsupported_format(url: impl Into<String>) -> Self {
        Self::UnsupportedFormat { url: url.into() }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{message}")]
    Message { message: String },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ConfigError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Context {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

//! Error type shared by the read and write paths.

use std::path::PathBuf;

use thiserror::Error;

pub type SparserResult<T> = Result<T, SparserError>;

#[derive(Debug, Error)]
pub enum SparserError {
    #[error("missing option: {0}")]
    MissingOption(String),
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("unknown compression codec '{name}', available codecs: {available}")]
    UnknownCodec { name: String, available: String },
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("malformed record in {} at byte {offset}: {message}", path.display())]
    Parse {
        path: PathBuf,
        offset: u64,
        message: String,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SparserError {
    pub fn missing(message: impl Into<String>) -> Self {
        SparserError::MissingOption(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        SparserError::InvalidOption(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        SparserError::NotSupported(message.into())
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        SparserError::CorruptPayload(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SparserError::Internal(message.into())
    }

    /// Configuration errors are fatal to the task and never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SparserError::MissingOption(_)
                | SparserError::InvalidOption(_)
                | SparserError::UnknownCodec { .. }
                | SparserError::NotSupported(_)
        )
    }
}

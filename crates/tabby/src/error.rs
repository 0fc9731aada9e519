use tabby_schema::SchemaError;
use thiserror::Error;

use crate::ExecutorError;

#[derive(Debug, Error)]
pub enum Error {
    /// The configuration is missing, unreadable or names something unknown.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Stored data contradicts an invariant (row counts, hash collisions).
    #[error("integrity error: {0}")]
    Integrity(String),

    /// A payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A stored row does not have the expected shape.
    #[error("structural error: {0}")]
    Structural(String),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl Error {
    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub(crate) fn integrity(msg: impl Into<String>) -> Self {
        Error::Integrity(msg.into())
    }

    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Error::Structural(msg.into())
    }
}

//! Errors in the library.
use thiserror::Error;

/// Errors raised by records, segment trees and replay buffers.
#[derive(Error, Debug)]
pub enum BufferError {
    /// Out-of-range access to a record, buffer or tree.
    #[error("Index error: {0}")]
    Index(String),

    /// An operation got a field type it does not support.
    #[error("Type error: {0}")]
    Type(String),

    /// A value does not fit the shape or dtype it is written to.
    #[error("Value error: {0}")]
    Value(String),

    /// Bad arguments.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// The buffer does not support the requested operation.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A value can neither be stored natively nor serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization error.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Tensor backend error.
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}

/// Result type of this crate.
pub type Result<T> = std::result::Result<T, BufferError>;

pub(crate) fn index_err<T>(msg: impl Into<String>) -> Result<T> {
    Err(BufferError::Index(msg.into()))
}

pub(crate) fn type_err<T>(msg: impl Into<String>) -> Result<T> {
    Err(BufferError::Type(msg.into()))
}

pub(crate) fn value_err<T>(msg: impl Into<String>) -> Result<T> {
    Err(BufferError::Value(msg.into()))
}

//! Errors in the library.
use thiserror::Error;

/// Errors raised by environments, collectors and records.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Bad arguments, or a buffer that does not fit the environments.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// An environment was used in a mode it does not support.
    #[error("Async environment error: {0}")]
    AsyncEnv(String),

    /// The worker of an environment stopped.
    #[error("Environment {0} is closed")]
    EnvClosed(usize),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKey(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueType(String),
}

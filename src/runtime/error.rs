//! Saga errors

use thiserror::Error;

use crate::runtime::value::Value;

/// Saga result
pub type SagaResult<T> = Result<T, SagaError>;

/// Errors thrown into and out of coroutines.
///
/// The same error value travels to the parent fork queue, to every joiner
/// and finally to the root reporter, so it is cheap to clone.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SagaError {
    #[error("{0}")]
    Message(String),

    #[error("uncaught value: {0:?}")]
    Thrown(Value),

    #[error("no executor registered for effect kind `{0}`")]
    UnhandledEffect(String),

    #[error("invalid effect: {0}")]
    InvalidEffect(String),

    #[error("channel buffer overflow (limit {0})")]
    BufferOverflow(usize),
}

impl SagaError {
    /// Build a plain message error.
    pub fn msg(message: impl Into<String>) -> Self {
        SagaError::Message(message.into())
    }
}

impl From<&str> for SagaError {
    fn from(message: &str) -> Self {
        SagaError::Message(message.to_string())
    }
}

impl From<String> for SagaError {
    fn from(message: String) -> Self {
        SagaError::Message(message)
    }
}

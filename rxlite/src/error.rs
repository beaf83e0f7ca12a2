//! Error types for rxlite

use std::any::Any;
use thiserror::Error;

/// Result type alias for rxlite operations
pub type Result<T> = std::result::Result<T, RxError>;

/// Errors delivered through `on_error` or returned by scheduler constructors.
///
/// `Clone` so a signal can be queued and marshaled across schedulers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RxError {
    /// A user predicate failed
    #[error("Predicate failed: {0}")]
    Predicate(String),

    /// A producer (`create` callback) failed
    #[error("Producer failed: {0}")]
    Producer(String),

    /// User code panicked while a stage was running it
    #[error("Panicked in {context}: {message}")]
    Panicked { context: String, message: String },

    /// Operator argument out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The target scheduler no longer accepts work
    #[error("Scheduler shut down: {0}")]
    SchedulerShutdown(String),

    /// Failed to build an execution context
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl RxError {
    /// Build a `Panicked` error from a `catch_unwind` payload.
    pub fn from_panic(context: impl Into<String>, payload: &(dyn Any + Send)) -> Self {
        Self::Panicked {
            context: context.into(),
            message: panic_message(payload),
        }
    }
}

impl From<std::io::Error> for RxError {
    fn from(err: std::io::Error) -> Self {
        Self::Runtime(err.to_string())
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

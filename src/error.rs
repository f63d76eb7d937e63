//! Error types for the eventual runtime

use crate::runtime::Value;
use std::fmt;
use thiserror::Error;

/// Where a failure was raised before it became a rejection reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The executor passed to `Promise::new` returned an error
    Executor,
    /// A `then`/`catch`/`finally` handler returned an error
    Handler,
    /// Invoking a foreign thenable's `then` returned an error
    ThenableAccess,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Executor => write!(f, "ExecutorFailure"),
            FailureKind::Handler => write!(f, "HandlerFailure"),
            FailureKind::ThenableAccess => write!(f, "ThenableAccessFailure"),
        }
    }
}

/// Main error type for eventual
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// An arbitrary value raised by user code
    #[error("Uncaught {0}")]
    Thrown(Value),

    /// Wrong kind of value for an operation
    #[error("TypeError: {0}")]
    TypeError(String),

    /// One `run_microtasks` call hit the configured microtask limit
    #[error("MicrotaskLimitExceeded: more than {limit} microtasks ran in one drain")]
    MicrotaskLimitExceeded { limit: usize },
}

impl Error {
    /// Raise an arbitrary value, the way a script `throw` does
    pub fn throw(value: impl Into<Value>) -> Self {
        Error::Thrown(value.into())
    }

    /// Create a TypeError
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::TypeError(message.into())
    }

    /// Convert the error into the reason a promise is rejected with.
    ///
    /// Thrown values are passed through untouched; every other error
    /// becomes its display string.
    pub fn into_reason(self) -> Value {
        match self {
            Error::Thrown(value) => value,
            other => Value::String(other.to_string()),
        }
    }
}

impl From<Value> for Error {
    fn from(value: Value) -> Self {
        Error::Thrown(value)
    }
}

/// Result type alias for eventual
pub type Result<T> = std::result::Result<T, Error>;

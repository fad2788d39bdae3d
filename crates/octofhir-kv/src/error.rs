//! Error types for key-value store operations.
//!
//! Transport failures (`Unavailable`, `Timeout`) are kept apart from
//! protocol-level failures so callers can apply their own fail-open or
//! fail-closed policy instead of inheriting one from this layer.

use std::fmt;
use std::time::Duration;

/// Errors that can occur while talking to the key-value store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KvError {
    /// The store could not be reached (pool exhausted, connection refused or
    /// dropped, I/O failure).
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of the transport failure.
        message: String,
    },

    /// A command did not complete within the configured deadline.
    #[error("Store command timed out after {timeout:?}: {command}")]
    Timeout {
        /// The command that timed out.
        command: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The key holds a value of a different type than the command expects.
    #[error("Wrong type for key: {key}")]
    WrongType {
        /// The offending key.
        key: String,
    },

    /// The store rejected the command or a script failed.
    #[error("Store command failed: {message}")]
    Command {
        /// Error reported by the store.
        message: String,
    },

    /// A reply could not be decoded into the expected shape.
    #[error("Unexpected store reply: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },
}

impl KvError {
    /// Creates a new `Unavailable` error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(command: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            command: command.into(),
            timeout,
        }
    }

    /// Creates a new `WrongType` error.
    #[must_use]
    pub fn wrong_type(key: impl Into<String>) -> Self {
        Self::WrongType { key: key.into() }
    }

    /// Creates a new `Command` error.
    #[must_use]
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Creates a new `Decode` error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns `true` if the store could not be reached or did not answer in time.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unavailable { .. } | Self::Timeout { .. } => ErrorCategory::Transport,
            Self::WrongType { .. } | Self::Command { .. } => ErrorCategory::Command,
            Self::Decode { .. } => ErrorCategory::Decode,
        }
    }
}

impl From<redis::RedisError> for KvError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            return Self::unavailable(err.to_string());
        }
        match err.kind() {
            redis::ErrorKind::TypeError => Self::decode(err.to_string()),
            _ => Self::command(err.to_string()),
        }
    }
}

impl From<deadpool_redis::PoolError> for KvError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::unavailable(format!("failed to get Redis connection: {err}"))
    }
}

/// Categories of store errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network, pool or deadline failure.
    Transport,
    /// The store rejected the command.
    Command,
    /// The reply had an unexpected shape.
    Decode,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Command => write!(f, "command"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

/// Result type for key-value operations.
pub type KvResult<T> = Result<T, KvError>;

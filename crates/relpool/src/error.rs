//! Pool error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while creating or using a connection pool.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Invalid or missing pool parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// The target is unreachable, the liveness check failed, or the
    /// connection was dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// A deadline elapsed while waiting for a connection.
    #[error("timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    /// The pool has been closed.
    #[error("connection pool is closed")]
    Closed,

    /// The server rejected a statement. The connection remains usable.
    #[error("query error: {0}")]
    Query(String),
}

/// Coarse classification of a [`PoolError`].
///
/// Callers match on the kind to decide whether to abort, retry or degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`PoolError::Config`].
    Config,
    /// See [`PoolError::Connection`].
    Connection,
    /// See [`PoolError::Timeout`].
    Timeout,
    /// See [`PoolError::Closed`].
    Closed,
    /// See [`PoolError::Query`].
    Query,
}

impl PoolError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Closed => ErrorKind::Closed,
            Self::Query(_) => ErrorKind::Query,
        }
    }

    /// Whether retrying the same operation later may succeed.
    ///
    /// The pool itself never retries.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

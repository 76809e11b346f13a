//! Error types shared by the load balancer and the circuit breaker.

use thiserror::Error;

/// Errors returned by backend pool operations.
///
/// Every variant is a plain value handed back to the immediate caller.
/// `NotFound` in particular is an expected outcome when two requests race
/// on the same backend and should be logged, not escalated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The identifier is already registered where uniqueness is required.
    #[error("backend {0} is already registered")]
    AlreadyExists(String),

    /// The identifier is referenced but not registered.
    #[error("backend {0} is not registered")]
    NotFound(String),

    /// No backend is available for selection.
    #[error("no backends available")]
    EmptyPool,

    /// A backend address could not be turned into a proxy handle.
    #[error("invalid backend target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },
}

impl PoolError {
    /// True for errors that only reflect a concurrent removal.
    pub fn is_race(&self) -> bool {
        matches!(self, PoolError::NotFound(_))
    }
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

// ABOUTME: Store error types.
// ABOUTME: Timeouts are a distinct kind so callers never match on messages.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store operation '{operation}' timed out after {after:?}")]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("failed to encode record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    NotFound,
    TimedOut,
    Backend,
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::NotFound(_) => StoreErrorKind::NotFound,
            StoreError::TimedOut { .. } => StoreErrorKind::TimedOut,
            StoreError::Backend(_) | StoreError::Serialization(_) | StoreError::Io(_) => {
                StoreErrorKind::Backend
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == StoreErrorKind::TimedOut
    }
}

//! # Error Types
//!
//! One error enum for the whole core.
//!
//! Unmet stage preconditions are reported as [`AcceptanceError::Blocked`]
//! carrying every blocker at once, so callers can show all of them together
//! instead of failing on the first.

use crate::types::{AcceptanceStage, Revision};
use thiserror::Error;

/// Result alias used throughout the core.
pub type AcceptanceResult<T> = Result<T, AcceptanceError>;

/// Errors produced by the acceptance engine and its stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcceptanceError {
    /// Input rejected before any state was touched.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// One or more preconditions are unmet.
    #[error("blocked by {} unmet precondition(s): {}", blockers.len(), blockers.join("; "))]
    Blocked { blockers: Vec<String> },

    /// A mutation would break a record invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Navigation or completion targeted a stage that is not yet reachable.
    #[error("stage '{stage}' is locked until the preceding stages are complete")]
    StageLocked { stage: AcceptanceStage },

    /// A referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A write presented a stale revision.
    #[error("revision conflict on {kind} {id}: presented {presented}, stored {stored}")]
    Conflict {
        kind: &'static str,
        id: String,
        presented: Revision,
        stored: Revision,
    },

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A stored record could not be encoded or decoded.
    #[error("format error: {0}")]
    Format(String),
}

impl AcceptanceError {
    /// Build a `Blocked` error, or `None` when there is nothing blocking.
    #[must_use]
    pub fn blocked(blockers: Vec<String>) -> Option<Self> {
        if blockers.is_empty() {
            None
        } else {
            Some(Self::Blocked { blockers })
        }
    }

    /// Blocker messages carried by this error (empty for other variants).
    #[must_use]
    pub fn blockers(&self) -> &[String] {
        match self {
            Self::Blocked { blockers } => blockers,
            _ => &[],
        }
    }

    /// Whether the error came from the persistence layer.
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Format(_))
    }
}

// =============================================================================
// STORAGE CONVERSIONS
// =============================================================================

macro_rules! storage_error_from {
    ($($source:ty),+ $(,)?) => {
        $(
            impl From<$source> for AcceptanceError {
                fn from(err: $source) -> Self {
                    Self::Storage(err.to_string())
                }
            }
        )+
    };
}

storage_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl From<postcard::Error> for AcceptanceError {
    fn from(err: postcard::Error) -> Self {
        Self::Format(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_is_none_without_blockers() {
        assert!(AcceptanceError::blocked(Vec::new()).is_none());
    }

    #[test]
    fn blocked_lists_every_blocker() {
        let err = AcceptanceError::blocked(vec!["a".into(), "b".into()]);
        let err = err.as_ref().map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("blocked by 2 unmet precondition(s): a; b")
        );
    }
}

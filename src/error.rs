//! Engine error types.
//!
//! Errors are classified by how the caller should react:
//! - Validation: a precondition failed; never retried automatically
//! - Concurrency: the record moved under us; the caller may retry with fresh state
//! - Integrity: upstream data corruption; fatal for the operation, reported verbatim

use thiserror::Error;

use crate::store::DbError;
use crate::types::MeetingStatus;

/// Maximum escalation-chain links walked in either direction before the
/// reconstruction gives up. Legitimate chains are bounded by the three
/// organizational levels; anything near this cap is cyclic corruption.
pub const MAX_CHAIN_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum EngineError {
    // Validation errors
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Node {0} is not an issue")]
    NotAnIssue(String),

    #[error("Issue {0} has already been escalated")]
    AlreadyEscalated(String),

    #[error("Company-level issues cannot escalate further")]
    NoParentLevel,

    #[error("Organizational unit {0} has no parent unit")]
    NoParentUnit(String),

    #[error("Invalid meeting transition: cannot {op} a {from} meeting")]
    InvalidTransition { from: MeetingStatus, op: &'static str },

    #[error("Already at the last agenda section; end the meeting instead")]
    NoNextSection,

    #[error("Already at the first agenda section")]
    NoPreviousSection,

    #[error("Meeting is {0}; snapshots may only be built while it is scheduled")]
    InvalidMeetingState(MeetingStatus),

    #[error("Parent of a {child} node must be one level up, got {parent}")]
    InvalidParentLevel { child: String, parent: String },

    // Concurrency errors
    #[error("Record {0} was modified concurrently; reload and retry")]
    ConcurrentModification(String),

    // Integrity violations (upstream corruption)
    #[error("Escalation chain exceeds {MAX_CHAIN_LEN} links at node {0}; walk aborted")]
    ChainTooLong(String),

    #[error("Asymmetric escalation link: {0} points to {1} but {1} does not point back")]
    AsymmetricLink(String, String),

    // Failures at the storage boundary
    #[error("Escalation failed: {0}")]
    EscalationFailed(String),

    #[error("Storage error: {0}")]
    Store(#[source] DbError),
}

impl EngineError {
    /// Precondition failures — rejected immediately, never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::NotFound(_)
                | EngineError::NotAnIssue(_)
                | EngineError::AlreadyEscalated(_)
                | EngineError::NoParentLevel
                | EngineError::NoParentUnit(_)
                | EngineError::InvalidTransition { .. }
                | EngineError::NoNextSection
                | EngineError::NoPreviousSection
                | EngineError::InvalidMeetingState(_)
                | EngineError::InvalidParentLevel { .. }
        )
    }

    /// The record moved under us. The caller decides whether to retry with
    /// fresh state; the engine itself never retries a state transition.
    pub fn is_concurrency(&self) -> bool {
        matches!(self, EngineError::ConcurrentModification(_))
    }

    /// Data corruption detected on the read path. Surfaced verbatim, never
    /// silently repaired.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            EngineError::ChainTooLong(_) | EngineError::AsymmetricLink(_, _)
        )
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::VersionConflict(id) => EngineError::ConcurrentModification(id),
            DbError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_maps_to_concurrent_modification() {
        let err: EngineError = DbError::VersionConflict("m-1".to_string()).into();
        assert!(err.is_concurrency());
        assert!(!err.is_validation());
    }

    #[test]
    fn chain_too_long_is_integrity() {
        let err = EngineError::ChainTooLong("i-1".to_string());
        assert!(err.is_integrity());
        assert!(!err.is_concurrency());
    }
}

//! Storage boundary.
//!
//! The engine treats the record store as a black box: CRUD plus a
//! conditional-update primitive and one multi-write atomic-transaction
//! primitive (`escalate_atomic` — the only place true transactional
//! semantics are required). `crate::db::SqliteStore` is the bundled
//! implementation; callers may supply their own.

use thiserror::Error;

use crate::types::{Meeting, MeetingStatus, ObjectiveNode};

/// Errors surfaced by a record store implementation.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    /// A conditional write found the record in an unexpected state.
    #[error("Version conflict on {0}")]
    VersionConflict(String),

    /// Deletion refused: the node still has children or an escalation link.
    #[error("Node {0} is still referenced by children or an escalation link")]
    NodeInUse(String),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Record store for objective nodes and meetings.
///
/// Conditional writes are compare-and-swap on the record's version (and, for
/// meetings, the expected pre-state status); a mismatch surfaces as
/// `VersionConflict` rather than a silent overwrite. Serialization of
/// concurrent writers is the caller's storage-layer concern.
pub trait RecordStore: Send + Sync {
    // Objective nodes
    fn get_node(&self, id: &str) -> Result<Option<ObjectiveNode>, DbError>;
    fn insert_node(&self, node: &ObjectiveNode) -> Result<(), DbError>;
    /// Conditional update. Writes `node` with `version = expected_version + 1`
    /// only if the stored version still equals `expected_version`.
    fn update_node(&self, node: &ObjectiveNode, expected_version: i64) -> Result<(), DbError>;
    /// Deletes a leaf node. Refuses with `NodeInUse` while the node has
    /// children or a non-null escalation link in either direction.
    fn delete_node(&self, id: &str) -> Result<(), DbError>;
    fn children_of(&self, parent_id: &str) -> Result<Vec<ObjectiveNode>, DbError>;
    /// Full descendant set of a node, walked breadth-first over parent ids.
    fn descendants_of(&self, root_id: &str) -> Result<Vec<ObjectiveNode>, DbError>;
    fn nodes_for_unit(&self, org_unit_id: &str) -> Result<Vec<ObjectiveNode>, DbError>;

    /// The one multi-write atomic primitive: persist the updated source node
    /// (CAS on `expected_version`) and insert its successor in a single
    /// transaction. Either both writes land or neither does.
    fn escalate_atomic(
        &self,
        source: &ObjectiveNode,
        expected_version: i64,
        successor: &ObjectiveNode,
    ) -> Result<(), DbError>;

    // Meetings
    fn get_meeting(&self, id: &str) -> Result<Option<Meeting>, DbError>;
    fn insert_meeting(&self, meeting: &Meeting) -> Result<(), DbError>;
    /// Conditional update: the write lands only if the stored status still
    /// equals `expected_status` and the stored version equals
    /// `expected_version`.
    fn update_meeting(
        &self,
        meeting: &Meeting,
        expected_status: MeetingStatus,
        expected_version: i64,
    ) -> Result<(), DbError>;
}

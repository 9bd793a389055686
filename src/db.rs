//! SQLite implementation of the record store.
//!
//! The database is the host application's working store for cascade data.
//! This module owns schema application (numbered embedded migrations), row
//! mapping, and the conditional-write discipline; everything above it talks
//! through the `RecordStore` trait.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::store::{DbError, RecordStore};
use crate::types::{
    Meeting, MeetingStatus, NodeStatus, ObjectiveKind, ObjectiveNode, OrgLevel,
};

/// SQLite connection wrapper.
///
/// Not `Clone`. The connection is held behind a non-poisoning `Mutex` so the
/// store is `Send + Sync` (as the `RecordStore` trait requires), matching the
/// request-driven, one-operation-at-a-time-per-entity model: the lock is
/// uncontended in normal use and serializes the rare concurrent caller.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at `path` and apply the schema.
    pub fn open_at(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }
        let conn = Connection::open(path)?;
        // WAL for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// In-memory database. Used by tests and ephemeral embeddings.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        crate::migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(&conn) {
            Ok(val) => {
                conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Conventional database file name for hosts that want one.
    pub fn default_db_name() -> PathBuf {
        PathBuf::from("teamos.db")
    }
}

// =============================================================================
// Row mapping
// =============================================================================

const NODE_COLUMNS: &str = "id, kind, level, parent_id, org_unit_id, title, description,
    status, owner_id, priority, escalated_from_id, escalated_to_id,
    original_level_id, created_at, updated_at, version";

fn parse_ts(id: &str, raw: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp '{raw}': {e}"),
        })
}

fn parse_opt_ts(id: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>, DbError> {
    raw.map(|s| parse_ts(id, &s)).transpose()
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<RawNode> {
    Ok(RawNode {
        id: row.get(0)?,
        kind: row.get(1)?,
        level: row.get(2)?,
        parent_id: row.get(3)?,
        org_unit_id: row.get(4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        status: row.get(7)?,
        owner_id: row.get(8)?,
        priority: row.get(9)?,
        escalated_from_id: row.get(10)?,
        escalated_to_id: row.get(11)?,
        original_level_id: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        version: row.get(15)?,
    })
}

struct RawNode {
    id: String,
    kind: String,
    level: String,
    parent_id: Option<String>,
    org_unit_id: Option<String>,
    title: String,
    description: Option<String>,
    status: String,
    owner_id: Option<String>,
    priority: Option<i32>,
    escalated_from_id: Option<String>,
    escalated_to_id: Option<String>,
    original_level_id: Option<String>,
    created_at: String,
    updated_at: String,
    version: i64,
}

impl RawNode {
    fn into_node(self) -> Result<ObjectiveNode, DbError> {
        let node_id = self.id.clone();
        let corrupt = move |reason: String| DbError::Corrupt {
            id: node_id.clone(),
            reason,
        };
        Ok(ObjectiveNode {
            kind: ObjectiveKind::parse(&self.kind)
                .ok_or_else(|| corrupt(format!("unknown kind '{}'", self.kind)))?,
            level: OrgLevel::parse(&self.level)
                .ok_or_else(|| corrupt(format!("unknown level '{}'", self.level)))?,
            status: NodeStatus::parse(&self.status)
                .ok_or_else(|| corrupt(format!("unknown status '{}'", self.status)))?,
            created_at: parse_ts(&self.id, &self.created_at)?,
            updated_at: parse_ts(&self.id, &self.updated_at)?,
            id: self.id,
            parent_id: self.parent_id,
            org_unit_id: self.org_unit_id,
            title: self.title,
            description: self.description,
            owner_id: self.owner_id,
            priority: self.priority,
            escalated_from_id: self.escalated_from_id,
            escalated_to_id: self.escalated_to_id,
            original_level_id: self.original_level_id,
            version: self.version,
        })
    }
}

fn insert_node_on(conn: &Connection, node: &ObjectiveNode) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO objective_nodes (
            id, kind, level, parent_id, org_unit_id, title, description,
            status, owner_id, priority, escalated_from_id, escalated_to_id,
            original_level_id, created_at, updated_at, version
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            node.id,
            node.kind.as_str(),
            node.level.as_str(),
            node.parent_id,
            node.org_unit_id,
            node.title,
            node.description,
            node.status.as_str(),
            node.owner_id,
            node.priority,
            node.escalated_from_id,
            node.escalated_to_id,
            node.original_level_id,
            node.created_at.to_rfc3339(),
            node.updated_at.to_rfc3339(),
            node.version,
        ],
    )?;
    Ok(())
}

fn update_node_on(
    conn: &Connection,
    node: &ObjectiveNode,
    expected_version: i64,
) -> Result<(), DbError> {
    let changed = conn.execute(
        "UPDATE objective_nodes SET
            kind = ?2, level = ?3, parent_id = ?4, org_unit_id = ?5, title = ?6,
            description = ?7, status = ?8, owner_id = ?9, priority = ?10,
            escalated_from_id = ?11, escalated_to_id = ?12, original_level_id = ?13,
            updated_at = ?14, version = ?15
         WHERE id = ?1 AND version = ?16",
        params![
            node.id,
            node.kind.as_str(),
            node.level.as_str(),
            node.parent_id,
            node.org_unit_id,
            node.title,
            node.description,
            node.status.as_str(),
            node.owner_id,
            node.priority,
            node.escalated_from_id,
            node.escalated_to_id,
            node.original_level_id,
            node.updated_at.to_rfc3339(),
            expected_version + 1,
            expected_version,
        ],
    )?;
    if changed == 0 {
        return Err(DbError::VersionConflict(node.id.clone()));
    }
    Ok(())
}

fn json_column<T: serde::de::DeserializeOwned>(id: &str, raw: &str) -> Result<T, DbError> {
    serde_json::from_str(raw).map_err(|e| DbError::Corrupt {
        id: id.to_string(),
        reason: format!("bad JSON column: {e}"),
    })
}

struct RawMeeting {
    id: String,
    org_unit_id: String,
    title: String,
    status: String,
    scheduled_at: String,
    started_at: Option<String>,
    ended_at: Option<String>,
    current_section_index: Option<i64>,
    current_section_started_at: Option<String>,
    agenda_sections: String,
    scorecard_snapshot: String,
    objectives_snapshot: String,
    queued_issue_ids: String,
    created_at: String,
    version: i64,
}

impl RawMeeting {
    fn into_meeting(self) -> Result<Meeting, DbError> {
        let status = MeetingStatus::parse(&self.status).ok_or_else(|| DbError::Corrupt {
            id: self.id.clone(),
            reason: format!("unknown meeting status '{}'", self.status),
        })?;
        Ok(Meeting {
            status,
            scheduled_at: parse_ts(&self.id, &self.scheduled_at)?,
            started_at: parse_opt_ts(&self.id, self.started_at)?,
            ended_at: parse_opt_ts(&self.id, self.ended_at)?,
            current_section_index: self.current_section_index.map(|i| i as usize),
            current_section_started_at: parse_opt_ts(&self.id, self.current_section_started_at)?,
            agenda_sections: json_column(&self.id, &self.agenda_sections)?,
            scorecard_snapshot: json_column(&self.id, &self.scorecard_snapshot)?,
            objectives_snapshot: json_column(&self.id, &self.objectives_snapshot)?,
            queued_issue_ids: json_column(&self.id, &self.queued_issue_ids)?,
            created_at: parse_ts(&self.id, &self.created_at)?,
            id: self.id,
            org_unit_id: self.org_unit_id,
            title: self.title,
            version: self.version,
        })
    }
}

// =============================================================================
// RecordStore implementation
// =============================================================================

impl RecordStore for SqliteStore {
    fn get_node(&self, id: &str) -> Result<Option<ObjectiveNode>, DbError> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM objective_nodes WHERE id = ?1"),
                params![id],
                row_to_node,
            )
            .optional()?;
        raw.map(RawNode::into_node).transpose()
    }

    fn insert_node(&self, node: &ObjectiveNode) -> Result<(), DbError> {
        insert_node_on(&self.conn.lock(), node)
    }

    fn update_node(&self, node: &ObjectiveNode, expected_version: i64) -> Result<(), DbError> {
        update_node_on(&self.conn.lock(), node, expected_version)
    }

    fn delete_node(&self, id: &str) -> Result<(), DbError> {
        let node = self
            .get_node(id)?
            .ok_or_else(|| DbError::NotFound(id.to_string()))?;
        if node.escalated_from_id.is_some() || node.escalated_to_id.is_some() {
            return Err(DbError::NodeInUse(id.to_string()));
        }
        let conn = self.conn.lock();
        let child_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM objective_nodes WHERE parent_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if child_count > 0 {
            return Err(DbError::NodeInUse(id.to_string()));
        }
        conn.execute("DELETE FROM objective_nodes WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn children_of(&self, parent_id: &str) -> Result<Vec<ObjectiveNode>, DbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM objective_nodes WHERE parent_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![parent_id], row_to_node)?;
        let mut nodes = Vec::new();
        for raw in rows {
            nodes.push(raw?.into_node()?);
        }
        Ok(nodes)
    }

    fn descendants_of(&self, root_id: &str) -> Result<Vec<ObjectiveNode>, DbError> {
        // Iterative id-set walk over parent pointers. The forest is shallow
        // (three levels), so per-node child queries are fine.
        let mut all = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut frontier = vec![root_id.to_string()];
        seen.insert(root_id.to_string());

        while let Some(current) = frontier.pop() {
            for child in self.children_of(&current)? {
                if seen.insert(child.id.clone()) {
                    frontier.push(child.id.clone());
                    all.push(child);
                }
            }
        }
        Ok(all)
    }

    fn nodes_for_unit(&self, org_unit_id: &str) -> Result<Vec<ObjectiveNode>, DbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM objective_nodes WHERE org_unit_id = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params![org_unit_id], row_to_node)?;
        let mut nodes = Vec::new();
        for raw in rows {
            nodes.push(raw?.into_node()?);
        }
        Ok(nodes)
    }

    fn escalate_atomic(
        &self,
        source: &ObjectiveNode,
        expected_version: i64,
        successor: &ObjectiveNode,
    ) -> Result<(), DbError> {
        self.with_transaction(|conn| {
            update_node_on(conn, source, expected_version)?;
            insert_node_on(conn, successor)?;
            Ok(())
        })
    }

    fn get_meeting(&self, id: &str) -> Result<Option<Meeting>, DbError> {
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                "SELECT id, org_unit_id, title, status, scheduled_at, started_at, ended_at,
                        current_section_index, current_section_started_at, agenda_sections,
                        scorecard_snapshot, objectives_snapshot, queued_issue_ids,
                        created_at, version
                 FROM meetings WHERE id = ?1",
                params![id],
                |row| {
                    Ok(RawMeeting {
                        id: row.get(0)?,
                        org_unit_id: row.get(1)?,
                        title: row.get(2)?,
                        status: row.get(3)?,
                        scheduled_at: row.get(4)?,
                        started_at: row.get(5)?,
                        ended_at: row.get(6)?,
                        current_section_index: row.get(7)?,
                        current_section_started_at: row.get(8)?,
                        agenda_sections: row.get(9)?,
                        scorecard_snapshot: row.get(10)?,
                        objectives_snapshot: row.get(11)?,
                        queued_issue_ids: row.get(12)?,
                        created_at: row.get(13)?,
                        version: row.get(14)?,
                    })
                },
            )
            .optional()?;
        raw.map(RawMeeting::into_meeting).transpose()
    }

    fn insert_meeting(&self, meeting: &Meeting) -> Result<(), DbError> {
        let sections = serde_json::to_string(&meeting.agenda_sections).unwrap_or_default();
        let scorecard = serde_json::to_string(&meeting.scorecard_snapshot).unwrap_or_default();
        let objectives = serde_json::to_string(&meeting.objectives_snapshot).unwrap_or_default();
        let queued = serde_json::to_string(&meeting.queued_issue_ids).unwrap_or_default();
        self.conn.lock().execute(
            "INSERT INTO meetings (
                id, org_unit_id, title, status, scheduled_at, started_at, ended_at,
                current_section_index, current_section_started_at, agenda_sections,
                scorecard_snapshot, objectives_snapshot, queued_issue_ids,
                created_at, version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                meeting.id,
                meeting.org_unit_id,
                meeting.title,
                meeting.status.as_str(),
                meeting.scheduled_at.to_rfc3339(),
                meeting.started_at.map(|t| t.to_rfc3339()),
                meeting.ended_at.map(|t| t.to_rfc3339()),
                meeting.current_section_index.map(|i| i as i64),
                meeting.current_section_started_at.map(|t| t.to_rfc3339()),
                sections,
                scorecard,
                objectives,
                queued,
                meeting.created_at.to_rfc3339(),
                meeting.version,
            ],
        )?;
        Ok(())
    }

    fn update_meeting(
        &self,
        meeting: &Meeting,
        expected_status: MeetingStatus,
        expected_version: i64,
    ) -> Result<(), DbError> {
        let sections = serde_json::to_string(&meeting.agenda_sections).unwrap_or_default();
        let scorecard = serde_json::to_string(&meeting.scorecard_snapshot).unwrap_or_default();
        let objectives = serde_json::to_string(&meeting.objectives_snapshot).unwrap_or_default();
        let queued = serde_json::to_string(&meeting.queued_issue_ids).unwrap_or_default();
        let changed = self.conn.lock().execute(
            "UPDATE meetings SET
                org_unit_id = ?2, title = ?3, status = ?4, scheduled_at = ?5,
                started_at = ?6, ended_at = ?7, current_section_index = ?8,
                current_section_started_at = ?9, agenda_sections = ?10,
                scorecard_snapshot = ?11, objectives_snapshot = ?12,
                queued_issue_ids = ?13, version = ?14
             WHERE id = ?1 AND status = ?15 AND version = ?16",
            params![
                meeting.id,
                meeting.org_unit_id,
                meeting.title,
                meeting.status.as_str(),
                meeting.scheduled_at.to_rfc3339(),
                meeting.started_at.map(|t| t.to_rfc3339()),
                meeting.ended_at.map(|t| t.to_rfc3339()),
                meeting.current_section_index.map(|i| i as i64),
                meeting.current_section_started_at.map(|t| t.to_rfc3339()),
                sections,
                scorecard,
                objectives,
                queued,
                expected_version + 1,
                expected_status.as_str(),
                expected_version,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::VersionConflict(meeting.id.clone()));
        }
        Ok(())
    }
}

//! Objective cascade and meeting cadence engine.
//!
//! The structured core behind the TeamOS dashboard: a three-level objective
//! forest with roll-up aggregation and cross-level issue escalation, plus a
//! fixed-agenda meeting state machine that freezes organizational state onto
//! each occurrence at generation time.
//!
//! This is a library, not a service boundary. The surrounding product owns
//! authentication, request routing, record validation, and rendering; it
//! reaches this engine through synchronous function calls (and one async
//! entry point, the snapshot builder) that return a typed result or a typed
//! failure. Storage, identity, metric values, and outbound notifications are
//! black boxes behind the traits in [`store`], [`agenda_snapshot`], and
//! [`events`].

pub mod agenda_snapshot;
pub mod config;
pub mod db;
pub mod error;
pub mod escalation;
pub mod events;
pub mod meeting_lifecycle;
mod migrations;
pub mod ranking;
pub mod rollup;
pub mod store;
pub mod types;

pub use agenda_snapshot::{build_snapshot, SnapshotSources};
pub use config::{standard_agenda, EngineConfig};
pub use db::SqliteStore;
pub use error::{EngineError, MAX_CHAIN_LEN};
pub use escalation::{escalate, escalation_chain, ChainDirection, ChainEntry, EscalationContext};
pub use events::{DomainEvent, EventSink, LogSink, MemorySink};
pub use meeting_lifecycle::{
    advance_section, cancel, end, retreat_section, section_elapsed_minutes, start,
};
pub use ranking::rank;
pub use rollup::{rollup, RollupSummary, SubtreeStats};
pub use store::{DbError, RecordStore};
pub use types::{
    AgendaSection, IssueStatus, Meeting, MeetingStatus, MeetingSummary, NodeStatus, ObjectiveKind,
    ObjectiveNode, ObjectiveStatus, ObjectiveSummary, OrgLevel, OrgUnit, ScorecardEntry,
};

//! Domain records shared across the engine.
//!
//! A single node type backs both quarterly objectives ("rocks") and issues;
//! `kind` discriminates which status vocabulary and which issue-only fields
//! apply. All externally visible types serialize camelCase for the dashboard
//! layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

// =============================================================================
// Organizational hierarchy
// =============================================================================

/// Position in the three-level organizational hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgLevel {
    Individual,
    Pillar,
    Company,
}

impl OrgLevel {
    /// The next level up, or `None` at the top.
    pub fn promote(self) -> Option<OrgLevel> {
        match self {
            OrgLevel::Individual => Some(OrgLevel::Pillar),
            OrgLevel::Pillar => Some(OrgLevel::Company),
            OrgLevel::Company => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrgLevel::Individual => "individual",
            OrgLevel::Pillar => "pillar",
            OrgLevel::Company => "company",
        }
    }

    pub fn parse(s: &str) -> Option<OrgLevel> {
        match s {
            "individual" => Some(OrgLevel::Individual),
            "pillar" => Some(OrgLevel::Pillar),
            "company" => Some(OrgLevel::Company),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrgLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An organizational unit, resolved by the identity collaborator and passed
/// into operations explicitly. The engine never looks units up ambiently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgUnit {
    pub id: String,
    pub name: String,
    /// `None` for a root unit — escalation out of a root unit is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

// =============================================================================
// Objective nodes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveKind {
    Rock,
    Issue,
}

impl ObjectiveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectiveKind::Rock => "rock",
            ObjectiveKind::Issue => "issue",
        }
    }

    pub fn parse(s: &str) -> Option<ObjectiveKind> {
        match s {
            "rock" => Some(ObjectiveKind::Rock),
            "issue" => Some(ObjectiveKind::Issue),
            _ => None,
        }
    }
}

/// Status vocabulary for quarterly objectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    NotStarted,
    OnTrack,
    AtRisk,
    OffTrack,
    Complete,
}

/// Status vocabulary for issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    Prioritized,
    Escalated,
    Resolved,
}

/// The shared status slot. Serializes as the bare status string; the two
/// vocabularies do not overlap, so untagged deserialization is unambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeStatus {
    Objective(ObjectiveStatus),
    Issue(IssueStatus),
}

impl NodeStatus {
    pub fn as_objective(self) -> Option<ObjectiveStatus> {
        match self {
            NodeStatus::Objective(s) => Some(s),
            NodeStatus::Issue(_) => None,
        }
    }

    pub fn as_issue(self) -> Option<IssueStatus> {
        match self {
            NodeStatus::Issue(s) => Some(s),
            NodeStatus::Objective(_) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::Objective(ObjectiveStatus::NotStarted) => "not_started",
            NodeStatus::Objective(ObjectiveStatus::OnTrack) => "on_track",
            NodeStatus::Objective(ObjectiveStatus::AtRisk) => "at_risk",
            NodeStatus::Objective(ObjectiveStatus::OffTrack) => "off_track",
            NodeStatus::Objective(ObjectiveStatus::Complete) => "complete",
            NodeStatus::Issue(IssueStatus::Open) => "open",
            NodeStatus::Issue(IssueStatus::Prioritized) => "prioritized",
            NodeStatus::Issue(IssueStatus::Escalated) => "escalated",
            NodeStatus::Issue(IssueStatus::Resolved) => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<NodeStatus> {
        match s {
            "not_started" => Some(NodeStatus::Objective(ObjectiveStatus::NotStarted)),
            "on_track" => Some(NodeStatus::Objective(ObjectiveStatus::OnTrack)),
            "at_risk" => Some(NodeStatus::Objective(ObjectiveStatus::AtRisk)),
            "off_track" => Some(NodeStatus::Objective(ObjectiveStatus::OffTrack)),
            "complete" => Some(NodeStatus::Objective(ObjectiveStatus::Complete)),
            "open" => Some(NodeStatus::Issue(IssueStatus::Open)),
            "prioritized" => Some(NodeStatus::Issue(IssueStatus::Prioritized)),
            "escalated" => Some(NodeStatus::Issue(IssueStatus::Escalated)),
            "resolved" => Some(NodeStatus::Issue(IssueStatus::Resolved)),
            _ => None,
        }
    }
}

/// The atomic record shared by objectives and issues.
///
/// Rollup statistics are never stored here — they are derived on read from
/// the live child set, so they cannot go stale independently of the data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveNode {
    pub id: String,
    pub kind: ObjectiveKind,
    pub level: OrgLevel,
    /// Reference to a node exactly one level up. The forest may hold multiple
    /// company-level roots concurrently.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_unit_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: NodeStatus,
    /// Required for individual-level nodes, optional above.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency token; bumped by every conditional write.
    pub version: i64,

    // Issue-only fields. Escalation links are mutated exclusively by the
    // escalation coordinator, as a single atomic transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_from_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_to_id: Option<String>,
    /// The node id at which the issue was first raised, preserved through the
    /// whole chain for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_level_id: Option<String>,
}

impl ObjectiveNode {
    pub fn is_issue(&self) -> bool {
        self.kind == ObjectiveKind::Issue
    }
}

/// A parent link must reference a node exactly one step higher. Cross-level
/// skips are invalid.
pub fn validate_parent_link(child: &ObjectiveNode, parent: &ObjectiveNode) -> Result<(), EngineError> {
    if child.level.promote() == Some(parent.level) {
        Ok(())
    } else {
        Err(EngineError::InvalidParentLevel {
            child: child.level.to_string(),
            parent: parent.level.to_string(),
        })
    }
}

// =============================================================================
// Meetings
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl MeetingStatus {
    /// Completed and cancelled meetings are frozen history.
    pub fn is_terminal(self) -> bool {
        matches!(self, MeetingStatus::Completed | MeetingStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MeetingStatus::Scheduled => "scheduled",
            MeetingStatus::InProgress => "in_progress",
            MeetingStatus::Completed => "completed",
            MeetingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<MeetingStatus> {
        match s {
            "scheduled" => Some(MeetingStatus::Scheduled),
            "in_progress" => Some(MeetingStatus::InProgress),
            "completed" => Some(MeetingStatus::Completed),
            "cancelled" => Some(MeetingStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named agenda section with its planned duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaSection {
    pub name: String,
    pub planned_duration_minutes: u32,
}

impl AgendaSection {
    pub fn new(name: &str, planned_duration_minutes: u32) -> Self {
        Self {
            name: name.to_string(),
            planned_duration_minutes,
        }
    }
}

/// One scorecard line: an objective plus its latest recorded metric value.
/// A missing value is a valid, non-error state — the metric source is
/// best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorecardEntry {
    pub objective_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Frozen view of one objective at snapshot time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveSummary {
    pub id: String,
    pub title: String,
    pub level: OrgLevel,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl From<&ObjectiveNode> for ObjectiveSummary {
    fn from(node: &ObjectiveNode) -> Self {
        Self {
            id: node.id.clone(),
            title: node.title.clone(),
            level: node.level,
            status: node.status,
            owner_id: node.owner_id.clone(),
        }
    }
}

/// One occurrence of a recurring structured meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: String,
    pub org_unit_id: String,
    pub title: String,
    pub status: MeetingStatus,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_section_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_section_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub agenda_sections: Vec<AgendaSection>,
    #[serde(default)]
    pub scorecard_snapshot: Vec<ScorecardEntry>,
    #[serde(default)]
    pub objectives_snapshot: Vec<ObjectiveSummary>,
    /// Problem-solving queue, in rank order.
    #[serde(default)]
    pub queued_issue_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub version: i64,
}

/// Closing summary computed when a meeting ends. Generated as a non-blocking
/// side effect; failures are logged, never surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSummary {
    pub meeting_id: String,
    /// Queued issues plus snapshot entries the meeting had in front of it.
    pub items_touched: usize,
    pub total_duration_minutes: i64,
    pub sections_visited: usize,
}

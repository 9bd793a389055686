//! Agenda snapshot builder.
//!
//! At meeting-generation time (and on demand, any time before the meeting
//! starts) the builder freezes current organizational state onto the meeting
//! record: scorecard lines, open objectives, and the ranked issue queue.
//!
//! The three source fetches are read-only and mutually independent, so they
//! run concurrently and settle independently. A source that fails or times
//! out degrades to an empty collection — a meeting with an incomplete agenda
//! is strictly better than a meeting that cannot start.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{DomainEvent, EventSink};
use crate::ranking;
use crate::store::RecordStore;
use crate::types::{Meeting, MeetingStatus, ObjectiveNode, ObjectiveSummary, ScorecardEntry};

/// Read-only fetches against the external store and metric source.
///
/// Implementations may hit the network; the builder bounds each call with the
/// configured timeout. Errors are strings — the builder only ever logs them.
#[async_trait]
pub trait SnapshotSources: Send + Sync {
    /// Active objectives joined with their latest recorded metric values.
    /// A missing metric value is a valid, non-error response.
    async fn scorecard(&self, org_unit_id: &str) -> Result<Vec<ScorecardEntry>, String>;

    /// Currently open or at-risk objectives, regardless of level.
    async fn open_objectives(&self, org_unit_id: &str) -> Result<Vec<ObjectiveNode>, String>;

    /// Open and prioritized issues eligible for the problem-solving queue.
    async fn open_issues(&self, org_unit_id: &str) -> Result<Vec<ObjectiveNode>, String>;
}

/// Build (or rebuild) the frozen snapshot for a scheduled meeting.
///
/// Rejects with `InvalidMeetingState` once the meeting has started — the
/// snapshot is history after that point and must not be rewritten. Section
/// generation is idempotent: an existing agenda is never duplicated or
/// replaced, so org-side edits made before the meeting survive a re-run.
pub async fn build_snapshot(
    store: &dyn RecordStore,
    sources: &dyn SnapshotSources,
    events: &dyn EventSink,
    meeting_id: &str,
    config: &EngineConfig,
    now: DateTime<Utc>,
) -> Result<Meeting, EngineError> {
    let mut meeting = store
        .get_meeting(meeting_id)?
        .ok_or_else(|| EngineError::NotFound(meeting_id.to_string()))?;
    if meeting.status != MeetingStatus::Scheduled {
        return Err(EngineError::InvalidMeetingState(meeting.status));
    }

    let unit = meeting.org_unit_id.clone();
    let timeout = Duration::from_secs(config.snapshot_fetch_timeout_secs);

    let (scorecard, objectives, issues) = tokio::join!(
        tokio::time::timeout(timeout, sources.scorecard(&unit)),
        tokio::time::timeout(timeout, sources.open_objectives(&unit)),
        tokio::time::timeout(timeout, sources.open_issues(&unit)),
    );

    meeting.scorecard_snapshot = settle(scorecard, meeting_id, "scorecard");
    meeting.objectives_snapshot = settle(objectives, meeting_id, "objectives")
        .iter()
        .map(ObjectiveSummary::from)
        .collect();

    let ranked = ranking::rank(settle(issues, meeting_id, "issues"), now);
    meeting.queued_issue_ids = ranked.into_iter().map(|issue| issue.id).collect();

    if meeting.agenda_sections.is_empty() {
        meeting.agenda_sections = config.agenda_sections();
    }

    let expected_version = meeting.version;
    store.update_meeting(&meeting, MeetingStatus::Scheduled, expected_version)?;
    meeting.version += 1;

    events.emit(DomainEvent::SnapshotBuilt {
        meeting_id: meeting.id.clone(),
        queued_issues: meeting.queued_issue_ids.len(),
    });
    Ok(meeting)
}

/// Collapse one source result to its collection, logging the degraded cases.
fn settle<T>(
    outcome: Result<Result<Vec<T>, String>, tokio::time::error::Elapsed>,
    meeting_id: &str,
    source: &str,
) -> Vec<T> {
    match outcome {
        Ok(Ok(items)) => items,
        Ok(Err(reason)) => {
            log::warn!("snapshot source {source} failed for meeting {meeting_id}: {reason}");
            Vec::new()
        }
        Err(_) => {
            log::warn!("snapshot source {source} timed out for meeting {meeting_id}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::db::SqliteStore;
    use crate::events::MemorySink;
    use crate::meeting_lifecycle;
    use crate::types::{
        AgendaSection, IssueStatus, NodeStatus, ObjectiveKind, ObjectiveStatus, OrgLevel,
    };

    struct FakeSources {
        fail_scorecard: bool,
        issues: Vec<ObjectiveNode>,
    }

    #[async_trait]
    impl SnapshotSources for FakeSources {
        async fn scorecard(&self, _org_unit_id: &str) -> Result<Vec<ScorecardEntry>, String> {
            if self.fail_scorecard {
                return Err("metric source unavailable".to_string());
            }
            Ok(vec![ScorecardEntry {
                objective_id: "o-1".to_string(),
                title: "weekly revenue".to_string(),
                metric_id: Some("metric-rev".to_string()),
                latest_value: Some(42_000.0),
                recorded_at: Some(Utc::now()),
            }])
        }

        async fn open_objectives(&self, _org_unit_id: &str) -> Result<Vec<ObjectiveNode>, String> {
            Ok(vec![objective("o-1", ObjectiveStatus::AtRisk)])
        }

        async fn open_issues(&self, _org_unit_id: &str) -> Result<Vec<ObjectiveNode>, String> {
            Ok(self.issues.clone())
        }
    }

    fn objective(id: &str, status: ObjectiveStatus) -> ObjectiveNode {
        ObjectiveNode {
            id: id.to_string(),
            kind: ObjectiveKind::Rock,
            level: OrgLevel::Pillar,
            parent_id: None,
            org_unit_id: Some("team-a".to_string()),
            title: format!("objective {id}"),
            description: None,
            status: NodeStatus::Objective(status),
            owner_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
            priority: None,
            escalated_from_id: None,
            escalated_to_id: None,
            original_level_id: None,
        }
    }

    fn issue(id: &str, priority: i32, age_days: i64, now: DateTime<Utc>) -> ObjectiveNode {
        let mut node = objective(id, ObjectiveStatus::NotStarted);
        node.kind = ObjectiveKind::Issue;
        node.status = NodeStatus::Issue(IssueStatus::Open);
        node.priority = Some(priority);
        node.created_at = now - ChronoDuration::days(age_days);
        node
    }

    fn seed_meeting(store: &SqliteStore, id: &str, now: DateTime<Utc>) {
        let meeting = Meeting {
            id: id.to_string(),
            org_unit_id: "team-a".to_string(),
            title: "weekly leadership".to_string(),
            status: MeetingStatus::Scheduled,
            scheduled_at: now,
            started_at: None,
            ended_at: None,
            current_section_index: None,
            current_section_started_at: None,
            agenda_sections: Vec::new(),
            scorecard_snapshot: Vec::new(),
            objectives_snapshot: Vec::new(),
            queued_issue_ids: Vec::new(),
            created_at: now,
            version: 1,
        };
        store.insert_meeting(&meeting).unwrap();
    }

    #[tokio::test]
    async fn snapshot_freezes_state_in_rank_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = MemorySink::new();
        let now = Utc::now();
        seed_meeting(&store, "m-1", now);

        let sources = FakeSources {
            fail_scorecard: false,
            issues: vec![
                issue("low", 2, 0, now),
                issue("urgent", 9, 1, now),
                issue("aging", 5, 10, now),
            ],
        };
        let config = EngineConfig::default();

        let meeting = build_snapshot(&store, &sources, &events, "m-1", &config, now)
            .await
            .unwrap();

        assert_eq!(meeting.scorecard_snapshot.len(), 1);
        assert_eq!(meeting.objectives_snapshot.len(), 1);
        assert_eq!(meeting.queued_issue_ids, vec!["urgent", "aging", "low"]);
        assert_eq!(meeting.agenda_sections.len(), 7);

        // The write landed.
        let stored = store.get_meeting("m-1").unwrap().unwrap();
        assert_eq!(stored.queued_issue_ids, meeting.queued_issue_ids);

        let emitted = events.take();
        assert!(matches!(
            emitted.last().unwrap(),
            DomainEvent::SnapshotBuilt { queued_issues: 3, .. }
        ));
    }

    #[tokio::test]
    async fn one_failing_source_degrades_not_blocks() {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = SqliteStore::open_in_memory().unwrap();
        let events = MemorySink::new();
        let now = Utc::now();
        seed_meeting(&store, "m-1", now);

        let sources = FakeSources {
            fail_scorecard: true,
            issues: vec![issue("only", 5, 0, now)],
        };
        let config = EngineConfig::default();

        let meeting = build_snapshot(&store, &sources, &events, "m-1", &config, now)
            .await
            .unwrap();

        assert!(meeting.scorecard_snapshot.is_empty());
        assert_eq!(meeting.objectives_snapshot.len(), 1);
        assert_eq!(meeting.queued_issue_ids, vec!["only"]);
    }

    #[tokio::test]
    async fn regeneration_never_duplicates_sections() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = MemorySink::new();
        let now = Utc::now();
        seed_meeting(&store, "m-1", now);

        let sources = FakeSources {
            fail_scorecard: false,
            issues: Vec::new(),
        };
        let config = EngineConfig::default();

        let first = build_snapshot(&store, &sources, &events, "m-1", &config, now)
            .await
            .unwrap();
        assert_eq!(first.agenda_sections.len(), 7);

        let second = build_snapshot(&store, &sources, &events, "m-1", &config, now)
            .await
            .unwrap();
        assert_eq!(second.agenda_sections.len(), 7);
    }

    #[tokio::test]
    async fn org_edited_sections_survive_regeneration() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = MemorySink::new();
        let now = Utc::now();
        seed_meeting(&store, "m-1", now);

        // Org trims the agenda before the meeting starts.
        let mut meeting = store.get_meeting("m-1").unwrap().unwrap();
        meeting.agenda_sections = vec![AgendaSection::new("standup", 15)];
        store
            .update_meeting(&meeting, MeetingStatus::Scheduled, meeting.version)
            .unwrap();

        let sources = FakeSources {
            fail_scorecard: false,
            issues: Vec::new(),
        };
        let rebuilt = build_snapshot(&store, &sources, &events, "m-1", &EngineConfig::default(), now)
            .await
            .unwrap();
        assert_eq!(rebuilt.agenda_sections.len(), 1);
        assert_eq!(rebuilt.agenda_sections[0].name, "standup");
    }

    #[tokio::test]
    async fn started_meeting_rejects_snapshot() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = MemorySink::new();
        let now = Utc::now();
        seed_meeting(&store, "m-1", now);

        // Give it sections so start() has an agenda to walk.
        let sources = FakeSources {
            fail_scorecard: false,
            issues: Vec::new(),
        };
        build_snapshot(&store, &sources, &events, "m-1", &EngineConfig::default(), now)
            .await
            .unwrap();
        meeting_lifecycle::start(&store, &events, "m-1", now).unwrap();

        let err = build_snapshot(&store, &sources, &events, "m-1", &EngineConfig::default(), now)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidMeetingState(MeetingStatus::InProgress)
        ));
    }
}

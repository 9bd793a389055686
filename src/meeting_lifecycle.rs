//! Meeting lifecycle state machine.
//!
//! `scheduled → in_progress → completed`, with cancellation allowed from
//! either non-terminal state. Every transition is a conditional write keyed
//! on the expected pre-state, so two facilitators racing on the same meeting
//! surface as `ConcurrentModification` instead of silently overwriting each
//! other. The engine never retries a transition itself.

use chrono::{DateTime, Utc};

use crate::error::EngineError;
use crate::events::{DomainEvent, EventSink};
use crate::store::RecordStore;
use crate::types::{Meeting, MeetingStatus, MeetingSummary};

fn load(store: &dyn RecordStore, meeting_id: &str) -> Result<Meeting, EngineError> {
    store
        .get_meeting(meeting_id)?
        .ok_or_else(|| EngineError::NotFound(meeting_id.to_string()))
}

fn write(
    store: &dyn RecordStore,
    meeting: &mut Meeting,
    expected_status: MeetingStatus,
) -> Result<(), EngineError> {
    let expected_version = meeting.version;
    store.update_meeting(meeting, expected_status, expected_version)?;
    meeting.version += 1;
    Ok(())
}

/// Open the meeting: first section, clocks started.
pub fn start(
    store: &dyn RecordStore,
    events: &dyn EventSink,
    meeting_id: &str,
    now: DateTime<Utc>,
) -> Result<Meeting, EngineError> {
    let mut meeting = load(store, meeting_id)?;
    if meeting.status != MeetingStatus::Scheduled {
        return Err(EngineError::InvalidTransition {
            from: meeting.status,
            op: "start",
        });
    }

    meeting.status = MeetingStatus::InProgress;
    meeting.started_at = Some(now);
    meeting.current_section_index = Some(0);
    meeting.current_section_started_at = Some(now);
    write(store, &mut meeting, MeetingStatus::Scheduled)?;

    events.emit(DomainEvent::MeetingStarted {
        meeting_id: meeting.id.clone(),
    });
    Ok(meeting)
}

/// Move to the next agenda section. At the last section the meeting must be
/// ended instead.
pub fn advance_section(
    store: &dyn RecordStore,
    meeting_id: &str,
    now: DateTime<Utc>,
) -> Result<Meeting, EngineError> {
    let mut meeting = load(store, meeting_id)?;
    if meeting.status != MeetingStatus::InProgress {
        return Err(EngineError::InvalidTransition {
            from: meeting.status,
            op: "advance",
        });
    }

    let index = meeting.current_section_index.unwrap_or(0);
    if index + 1 >= meeting.agenda_sections.len() {
        return Err(EngineError::NoNextSection);
    }

    meeting.current_section_index = Some(index + 1);
    meeting.current_section_started_at = Some(now);
    write(store, &mut meeting, MeetingStatus::InProgress)?;
    Ok(meeting)
}

/// Move back to the previous agenda section.
pub fn retreat_section(
    store: &dyn RecordStore,
    meeting_id: &str,
    now: DateTime<Utc>,
) -> Result<Meeting, EngineError> {
    let mut meeting = load(store, meeting_id)?;
    if meeting.status != MeetingStatus::InProgress {
        return Err(EngineError::InvalidTransition {
            from: meeting.status,
            op: "retreat",
        });
    }

    let index = meeting.current_section_index.unwrap_or(0);
    if index == 0 {
        return Err(EngineError::NoPreviousSection);
    }

    meeting.current_section_index = Some(index - 1);
    meeting.current_section_started_at = Some(now);
    write(store, &mut meeting, MeetingStatus::InProgress)?;
    Ok(meeting)
}

/// Close the meeting, from any section — meetings may end early.
///
/// The closing summary is a side effect: its failure is logged and never
/// blocks the state transition.
pub fn end(
    store: &dyn RecordStore,
    events: &dyn EventSink,
    meeting_id: &str,
    now: DateTime<Utc>,
) -> Result<Meeting, EngineError> {
    let mut meeting = load(store, meeting_id)?;
    if meeting.status != MeetingStatus::InProgress {
        return Err(EngineError::InvalidTransition {
            from: meeting.status,
            op: "end",
        });
    }

    meeting.status = MeetingStatus::Completed;
    meeting.ended_at = Some(now);
    write(store, &mut meeting, MeetingStatus::InProgress)?;

    let summary = match build_summary(&meeting, now) {
        Ok(summary) => Some(summary),
        Err(reason) => {
            log::warn!("summary generation failed for meeting {}: {}", meeting.id, reason);
            None
        }
    };

    events.emit(DomainEvent::MeetingEnded {
        meeting_id: meeting.id.clone(),
        summary,
    });
    Ok(meeting)
}

/// Cancel a meeting that has not completed.
pub fn cancel(
    store: &dyn RecordStore,
    events: &dyn EventSink,
    meeting_id: &str,
) -> Result<Meeting, EngineError> {
    let mut meeting = load(store, meeting_id)?;
    if meeting.status.is_terminal() {
        return Err(EngineError::InvalidTransition {
            from: meeting.status,
            op: "cancel",
        });
    }

    let expected = meeting.status;
    meeting.status = MeetingStatus::Cancelled;
    write(store, &mut meeting, expected)?;

    events.emit(DomainEvent::MeetingCancelled {
        meeting_id: meeting.id.clone(),
    });
    Ok(meeting)
}

/// Elapsed whole minutes in the current section, or `None` when the meeting
/// is not mid-section.
pub fn section_elapsed_minutes(meeting: &Meeting, now: DateTime<Utc>) -> Option<i64> {
    if meeting.status != MeetingStatus::InProgress {
        return None;
    }
    meeting
        .current_section_started_at
        .map(|started| (now - started).num_minutes().max(0))
}

fn build_summary(meeting: &Meeting, now: DateTime<Utc>) -> Result<MeetingSummary, String> {
    let started = meeting
        .started_at
        .ok_or_else(|| "meeting has no start timestamp".to_string())?;
    let total_duration_minutes = (now - started).num_minutes();
    if total_duration_minutes < 0 {
        return Err(format!("negative duration ({total_duration_minutes}m)"));
    }

    Ok(MeetingSummary {
        meeting_id: meeting.id.clone(),
        items_touched: meeting.queued_issue_ids.len()
            + meeting.scorecard_snapshot.len()
            + meeting.objectives_snapshot.len(),
        total_duration_minutes,
        sections_visited: meeting
            .current_section_index
            .map(|i| i + 1)
            .unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::config::standard_agenda;
    use crate::db::SqliteStore;
    use crate::events::MemorySink;

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
            agenda_sections: standard_agenda(),
            scorecard_snapshot: Vec::new(),
            objectives_snapshot: Vec::new(),
            queued_issue_ids: Vec::new(),
            created_at: now,
            version: 1,
        };
        store.insert_meeting(&meeting).unwrap();
    }

    #[test]
    fn start_opens_first_section() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = MemorySink::new();
        let now = Utc::now();
        seed_meeting(&store, "m-1", now);

        let meeting = start(&store, &events, "m-1", now).unwrap();
        assert_eq!(meeting.status, MeetingStatus::InProgress);
        assert_eq!(meeting.current_section_index, Some(0));
        assert_eq!(meeting.started_at, Some(now));
        assert_eq!(events.len(), 1);

        // Starting twice is invalid.
        let err = start(&store, &events, "m-1", now).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { op: "start", .. }));
    }

    #[test]
    fn standard_template_walk_stops_at_last_section() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = MemorySink::new();
        let now = Utc::now();
        seed_meeting(&store, "m-1", now);
        start(&store, &events, "m-1", now).unwrap();

        // Seven sections: six advances land on the last index.
        let mut meeting = None;
        for _ in 0..6 {
            meeting = Some(advance_section(&store, "m-1", now).unwrap());
        }
        assert_eq!(meeting.unwrap().current_section_index, Some(6));

        let err = advance_section(&store, "m-1", now).unwrap_err();
        assert!(matches!(err, EngineError::NoNextSection));

        // End still succeeds from the last section.
        let ended = end(&store, &events, "m-1", now + Duration::minutes(90)).unwrap();
        assert_eq!(ended.status, MeetingStatus::Completed);
    }

    #[test]
    fn retreat_stops_at_first_section() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = MemorySink::new();
        let now = Utc::now();
        seed_meeting(&store, "m-1", now);
        start(&store, &events, "m-1", now).unwrap();

        let err = retreat_section(&store, "m-1", now).unwrap_err();
        assert!(matches!(err, EngineError::NoPreviousSection));

        advance_section(&store, "m-1", now).unwrap();
        let meeting = retreat_section(&store, "m-1", now).unwrap();
        assert_eq!(meeting.current_section_index, Some(0));
    }

    #[test]
    fn end_early_from_any_section() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = MemorySink::new();
        let now = Utc::now();
        seed_meeting(&store, "m-1", now);
        start(&store, &events, "m-1", now).unwrap();
        advance_section(&store, "m-1", now).unwrap();

        let ended = end(&store, &events, "m-1", now + Duration::minutes(25)).unwrap();
        assert_eq!(ended.status, MeetingStatus::Completed);
        assert_eq!(ended.ended_at, Some(now + Duration::minutes(25)));

        let emitted = events.take();
        let end_event = emitted.last().unwrap();
        match end_event {
            DomainEvent::MeetingEnded { summary, .. } => {
                let summary = summary.as_ref().unwrap();
                assert_eq!(summary.total_duration_minutes, 25);
                assert_eq!(summary.sections_visited, 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn terminal_states_are_frozen() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = MemorySink::new();
        let now = Utc::now();
        seed_meeting(&store, "m-1", now);
        start(&store, &events, "m-1", now).unwrap();
        end(&store, &events, "m-1", now).unwrap();

        assert!(matches!(
            start(&store, &events, "m-1", now).unwrap_err(),
            EngineError::InvalidTransition { .. }
        ));
        assert!(matches!(
            advance_section(&store, "m-1", now).unwrap_err(),
            EngineError::InvalidTransition { .. }
        ));
        assert!(matches!(
            cancel(&store, &events, "m-1").unwrap_err(),
            EngineError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn cancel_from_scheduled_and_in_progress() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = MemorySink::new();
        let now = Utc::now();

        seed_meeting(&store, "m-1", now);
        let cancelled = cancel(&store, &events, "m-1").unwrap();
        assert_eq!(cancelled.status, MeetingStatus::Cancelled);

        seed_meeting(&store, "m-2", now);
        start(&store, &events, "m-2", now).unwrap();
        let cancelled = cancel(&store, &events, "m-2").unwrap();
        assert_eq!(cancelled.status, MeetingStatus::Cancelled);
    }

    #[test]
    fn section_elapsed_tracks_the_running_section() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = MemorySink::new();
        let now = Utc::now();
        seed_meeting(&store, "m-1", now);

        let meeting = start(&store, &events, "m-1", now).unwrap();
        assert_eq!(
            section_elapsed_minutes(&meeting, now + Duration::minutes(7)),
            Some(7)
        );

        let ended = end(&store, &events, "m-1", now + Duration::minutes(10)).unwrap();
        assert_eq!(section_elapsed_minutes(&ended, now + Duration::minutes(12)), None);
    }

    #[test]
    fn stale_writer_surfaces_concurrent_modification() {
        let store = SqliteStore::open_in_memory().unwrap();
        let events = MemorySink::new();
        let now = Utc::now();
        seed_meeting(&store, "m-1", now);

        // A second facilitator starts the meeting first.
        start(&store, &events, "m-1", now).unwrap();

        // A stale copy still believes the meeting is scheduled.
        let stale = Meeting {
            id: "m-1".to_string(),
            org_unit_id: "team-a".to_string(),
            title: "weekly leadership".to_string(),
            status: MeetingStatus::InProgress,
            scheduled_at: now,
            started_at: Some(now),
            ended_at: None,
            current_section_index: Some(0),
            current_section_started_at: Some(now),
            agenda_sections: standard_agenda(),
            scorecard_snapshot: Vec::new(),
            objectives_snapshot: Vec::new(),
            queued_issue_ids: Vec::new(),
            created_at: now,
            version: 1,
        };
        let err = store
            .update_meeting(&stale, MeetingStatus::Scheduled, stale.version)
            .unwrap_err();
        let err: EngineError = err.into();
        assert!(err.is_concurrency());
    }
}

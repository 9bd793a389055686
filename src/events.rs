//! Domain events.
//!
//! The engine emits events as fire-and-forget facts; delivery, retry, and
//! formatting belong to the receiving collaborator (chat, calendar, CRM
//! sync). A sink must never fail the operation that emitted the event.

use serde::{Deserialize, Serialize};

use crate::types::{MeetingSummary, OrgLevel};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    #[serde(rename_all = "camelCase")]
    IssueEscalated {
        source_id: String,
        successor_id: String,
        to_level: OrgLevel,
    },
    #[serde(rename_all = "camelCase")]
    MeetingStarted { meeting_id: String },
    #[serde(rename_all = "camelCase")]
    MeetingEnded {
        meeting_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<MeetingSummary>,
    },
    #[serde(rename_all = "camelCase")]
    MeetingCancelled { meeting_id: String },
    #[serde(rename_all = "camelCase")]
    SnapshotBuilt {
        meeting_id: String,
        queued_issues: usize,
    },
}

/// Outbound event sink. Implementations must be infallible from the engine's
/// point of view — swallow and log, never propagate.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

/// Sink that logs each event and otherwise drops it. The default for hosts
/// that have no outbound wiring yet.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: DomainEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => log::info!("domain event: {}", json),
            Err(e) => log::warn!("domain event serialization failed: {}", e),
        }
    }
}

/// Sink that buffers events in memory. Used by hosts that drain events on
/// their own cadence, and by tests.
#[derive(Default)]
pub struct MemorySink {
    events: parking_lot::Mutex<Vec<DomainEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain all buffered events, oldest first.
    pub fn take(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: DomainEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_buffers_in_order() {
        let sink = MemorySink::new();
        sink.emit(DomainEvent::MeetingStarted {
            meeting_id: "m-1".to_string(),
        });
        sink.emit(DomainEvent::MeetingCancelled {
            meeting_id: "m-2".to_string(),
        });

        let events = sink.take();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], DomainEvent::MeetingStarted { meeting_id } if meeting_id == "m-1"));
        assert!(sink.is_empty());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = DomainEvent::SnapshotBuilt {
            meeting_id: "m-1".to_string(),
            queued_issues: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"snapshotBuilt\""));
        assert!(json.contains("\"queuedIssues\":3"));
    }
}

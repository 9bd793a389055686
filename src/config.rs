//! Engine configuration.
//!
//! Loaded by the host application (typically from its config JSON) and passed
//! into operations explicitly. Defaults follow the standard meeting template.

use serde::{Deserialize, Serialize};

use crate::types::AgendaSection;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Per-source timeout for the snapshot builder's three independent
    /// fetches. A timed-out source degrades to an empty collection.
    #[serde(default = "default_fetch_timeout_secs")]
    pub snapshot_fetch_timeout_secs: u64,
    /// Organization-configured agenda sections. `None` means the standard
    /// template is used verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agenda_template: Option<Vec<AgendaSection>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_fetch_timeout_secs: default_fetch_timeout_secs(),
            agenda_template: None,
        }
    }
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

impl EngineConfig {
    /// The agenda sections for a newly generated meeting: the org-configured
    /// template when present, the standard template otherwise.
    pub fn agenda_sections(&self) -> Vec<AgendaSection> {
        match &self.agenda_template {
            Some(sections) if !sections.is_empty() => sections.clone(),
            _ => standard_agenda(),
        }
    }
}

/// The standard fixed-agenda template.
pub fn standard_agenda() -> Vec<AgendaSection> {
    vec![
        AgendaSection::new("segue", 5),
        AgendaSection::new("scorecard_review", 5),
        AgendaSection::new("objective_review", 5),
        AgendaSection::new("headlines", 5),
        AgendaSection::new("todo_review", 5),
        AgendaSection::new("issue_solving", 60),
        AgendaSection::new("conclude", 5),
    ]
}

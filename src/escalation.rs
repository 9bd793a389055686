//! Issue escalation.
//!
//! Escalating promotes an issue one organizational level up: a linked
//! successor is created at the next level and the source is sealed, both in
//! one atomic store transaction. The escalation link fields are mutated
//! nowhere else in the system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, MAX_CHAIN_LEN};
use crate::events::{DomainEvent, EventSink};
use crate::store::RecordStore;
use crate::types::{IssueStatus, NodeStatus, ObjectiveNode, OrgUnit};

/// Caller-resolved context for an escalation. The identity collaborator
/// resolves the acting principal and the issue's organizational unit; the
/// engine receives them as already-validated input.
#[derive(Debug, Clone)]
pub struct EscalationContext {
    pub acting_user_id: String,
    /// The unit the issue currently belongs to. Its `parent_id` is where the
    /// successor lands; a root unit cannot escalate.
    pub org_unit: OrgUnit,
}

/// Position of a chain entry relative to the queried node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainDirection {
    From,
    Current,
    To,
}

/// One link of an escalation chain, oldest to newest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEntry {
    pub node: ObjectiveNode,
    pub direction: ChainDirection,
}

/// Promote `issue_id` one level up.
///
/// Creates the successor at the next level (title, description, and priority
/// copied; `status = open`) and seals the source (`status = escalated`,
/// forward link set) in a single atomic transaction. Returns the successor.
pub fn escalate(
    store: &dyn RecordStore,
    events: &dyn EventSink,
    issue_id: &str,
    ctx: &EscalationContext,
    now: DateTime<Utc>,
) -> Result<ObjectiveNode, EngineError> {
    let source = store
        .get_node(issue_id)?
        .ok_or_else(|| EngineError::NotFound(issue_id.to_string()))?;

    if !source.is_issue() {
        return Err(EngineError::NotAnIssue(issue_id.to_string()));
    }
    // At most one escalation from any given state.
    if source.escalated_to_id.is_some() {
        return Err(EngineError::AlreadyEscalated(issue_id.to_string()));
    }
    let next_level = source.level.promote().ok_or(EngineError::NoParentLevel)?;
    let parent_unit_id = ctx
        .org_unit
        .parent_id
        .clone()
        .ok_or_else(|| EngineError::NoParentUnit(ctx.org_unit.id.clone()))?;

    let successor = ObjectiveNode {
        id: Uuid::new_v4().to_string(),
        kind: source.kind,
        level: next_level,
        parent_id: None,
        org_unit_id: Some(parent_unit_id),
        title: source.title.clone(),
        description: source.description.clone(),
        status: NodeStatus::Issue(IssueStatus::Open),
        owner_id: source.owner_id.clone(),
        created_at: now,
        updated_at: now,
        version: 1,
        priority: source.priority,
        escalated_from_id: Some(source.id.clone()),
        escalated_to_id: None,
        // Preserved through the whole chain for audit; the source's own id
        // when the source is the original.
        original_level_id: Some(
            source
                .original_level_id
                .clone()
                .unwrap_or_else(|| source.id.clone()),
        ),
    };

    let mut sealed = source.clone();
    sealed.status = NodeStatus::Issue(IssueStatus::Escalated);
    sealed.escalated_to_id = Some(successor.id.clone());
    sealed.updated_at = now;

    store
        .escalate_atomic(&sealed, source.version, &successor)
        .map_err(|err| match err {
            crate::store::DbError::VersionConflict(id) => EngineError::ConcurrentModification(id),
            other => EngineError::EscalationFailed(other.to_string()),
        })?;

    log::info!(
        "escalated issue {} to {} as {} (actor {})",
        source.id,
        next_level,
        successor.id,
        ctx.acting_user_id
    );
    events.emit(DomainEvent::IssueEscalated {
        source_id: source.id.clone(),
        successor_id: successor.id.clone(),
        to_level: next_level,
    });

    Ok(successor)
}

/// Reconstruct the full escalation chain around `issue_id`.
///
/// Walks `escalated_from_id` back to the earliest ancestor and
/// `escalated_to_id` forward to the latest descendant, returning the chain
/// oldest to newest with each entry tagged relative to the queried node.
/// Both walks are capped so a cyclic (corrupt) chain terminates with
/// `ChainTooLong`; asymmetric links are reported, never repaired.
pub fn escalation_chain(
    store: &dyn RecordStore,
    issue_id: &str,
) -> Result<Vec<ChainEntry>, EngineError> {
    let current = store
        .get_node(issue_id)?
        .ok_or_else(|| EngineError::NotFound(issue_id.to_string()))?;

    // Backward: predecessors, collected newest-first then reversed.
    let mut predecessors: Vec<ObjectiveNode> = Vec::new();
    let mut cursor = current.clone();
    while let Some(from_id) = cursor.escalated_from_id.clone() {
        if predecessors.len() >= MAX_CHAIN_LEN {
            return Err(EngineError::ChainTooLong(issue_id.to_string()));
        }
        let predecessor = store.get_node(&from_id)?.ok_or_else(|| {
            EngineError::AsymmetricLink(cursor.id.clone(), from_id.clone())
        })?;
        if predecessor.escalated_to_id.as_deref() != Some(cursor.id.as_str()) {
            return Err(EngineError::AsymmetricLink(predecessor.id.clone(), cursor.id.clone()));
        }
        predecessors.push(predecessor.clone());
        cursor = predecessor;
    }
    predecessors.reverse();

    // Forward: successors, oldest-first already.
    let mut successors: Vec<ObjectiveNode> = Vec::new();
    let mut cursor = current.clone();
    while let Some(to_id) = cursor.escalated_to_id.clone() {
        if successors.len() >= MAX_CHAIN_LEN {
            return Err(EngineError::ChainTooLong(issue_id.to_string()));
        }
        let successor = store.get_node(&to_id)?.ok_or_else(|| {
            EngineError::AsymmetricLink(cursor.id.clone(), to_id.clone())
        })?;
        if successor.escalated_from_id.as_deref() != Some(cursor.id.as_str()) {
            return Err(EngineError::AsymmetricLink(cursor.id.clone(), successor.id.clone()));
        }
        successors.push(successor.clone());
        cursor = successor;
    }

    let mut chain = Vec::with_capacity(predecessors.len() + 1 + successors.len());
    chain.extend(predecessors.into_iter().map(|node| ChainEntry {
        node,
        direction: ChainDirection::From,
    }));
    chain.push(ChainEntry {
        node: current,
        direction: ChainDirection::Current,
    });
    chain.extend(successors.into_iter().map(|node| ChainEntry {
        node,
        direction: ChainDirection::To,
    }));

    Ok(chain)
}

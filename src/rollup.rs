//! Subtree roll-up statistics.
//!
//! Pure functions over a caller-supplied descendant set — no I/O, no caching,
//! no mutation. Statistics are always derived on read from the live child
//! set, so they cannot go stale independently of the underlying data.
//!
//! Subtree membership is computed over an id-indexed map with parent pointers
//! stored as ids (arena walk), never by chasing references.

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::types::{ObjectiveNode, ObjectiveStatus, OrgLevel};

/// Status counts and membership sets for one direct-child subtree.
///
/// The five per-status counts partition the rock total; issue-kind nodes are
/// tallied separately so mixed subtrees still reconcile:
/// `not_started + on_track + at_risk + off_track + complete + issue_count == total`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtreeStats {
    /// The direct child this subtree hangs off.
    pub child_id: String,
    pub total: usize,
    pub not_started: usize,
    pub on_track: usize,
    pub at_risk: usize,
    pub off_track: usize,
    pub complete: usize,
    /// Rocks counted as healthy: `on_track + complete`.
    pub healthy: usize,
    pub issue_count: usize,
    /// Distinct owners among individual-level descendants.
    pub owners: BTreeSet<String>,
    /// Distinct organizational sub-units among individual-level descendants.
    pub org_units: BTreeSet<String>,
}

impl SubtreeStats {
    fn empty(child_id: &str) -> Self {
        Self {
            child_id: child_id.to_string(),
            total: 0,
            not_started: 0,
            on_track: 0,
            at_risk: 0,
            off_track: 0,
            complete: 0,
            healthy: 0,
            issue_count: 0,
            owners: BTreeSet::new(),
            org_units: BTreeSet::new(),
        }
    }

    fn absorb(&mut self, node: &ObjectiveNode) {
        self.total += 1;
        match node.status.as_objective() {
            Some(ObjectiveStatus::NotStarted) => self.not_started += 1,
            Some(ObjectiveStatus::OnTrack) => {
                self.on_track += 1;
                self.healthy += 1;
            }
            Some(ObjectiveStatus::AtRisk) => self.at_risk += 1,
            Some(ObjectiveStatus::OffTrack) => self.off_track += 1,
            Some(ObjectiveStatus::Complete) => {
                self.complete += 1;
                self.healthy += 1;
            }
            None => self.issue_count += 1,
        }
        if node.level == OrgLevel::Individual {
            if let Some(owner) = &node.owner_id {
                self.owners.insert(owner.clone());
            }
            if let Some(unit) = &node.org_unit_id {
                self.org_units.insert(unit.clone());
            }
        }
    }

    fn merge(&mut self, other: &SubtreeStats) {
        self.total += other.total;
        self.not_started += other.not_started;
        self.on_track += other.on_track;
        self.at_risk += other.at_risk;
        self.off_track += other.off_track;
        self.complete += other.complete;
        self.healthy += other.healthy;
        self.issue_count += other.issue_count;
        self.owners.extend(other.owners.iter().cloned());
        self.org_units.extend(other.org_units.iter().cloned());
    }
}

/// Aggregate roll-up for one node over its full descendant set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupSummary {
    pub node_id: String,
    /// One entry per direct child, in child-id order.
    pub children: Vec<SubtreeStats>,
    /// Totals across every descendant (direct children included).
    pub totals: SubtreeStats,
    /// Healthy rocks over all rocks. 100% for a descendant set with no rocks
    /// — vacuously healthy, so a fresh root never displays as off-track.
    pub on_track_pct: f64,
    /// Distinct owners with at least one individual-level node, over the
    /// eligible personnel count. 0% when either side is empty.
    pub team_coverage_pct: f64,
}

/// Compute roll-up statistics for `node_id` from its full descendant set.
///
/// `descendants` must contain every node below `node_id` (the caller's read
/// layer supplies it); `eligible_personnel` is the denominator for team
/// coverage. Nodes whose parent chain does not reach `node_id` are ignored.
pub fn rollup(
    node_id: &str,
    descendants: &[ObjectiveNode],
    eligible_personnel: usize,
) -> RollupSummary {
    let by_id: HashMap<&str, &ObjectiveNode> = descendants
        .iter()
        .map(|node| (node.id.as_str(), node))
        .collect();

    let mut children_index: HashMap<&str, Vec<&ObjectiveNode>> = HashMap::new();
    for node in descendants {
        if let Some(parent) = node.parent_id.as_deref() {
            children_index.entry(parent).or_default().push(node);
        }
    }

    let mut direct_children: Vec<&ObjectiveNode> = children_index
        .get(node_id)
        .cloned()
        .unwrap_or_default();
    direct_children.sort_by(|a, b| a.id.cmp(&b.id));

    let mut totals = SubtreeStats::empty(node_id);
    let mut children = Vec::with_capacity(direct_children.len());

    for child in direct_children {
        let mut stats = SubtreeStats::empty(&child.id);

        // Breadth-first id walk from the direct child down.
        let mut frontier: VecDeque<&str> = VecDeque::new();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        frontier.push_back(child.id.as_str());
        seen.insert(child.id.as_str());

        while let Some(current) = frontier.pop_front() {
            if let Some(node) = by_id.get(current) {
                stats.absorb(node);
            }
            if let Some(kids) = children_index.get(current) {
                for kid in kids {
                    if seen.insert(kid.id.as_str()) {
                        frontier.push_back(kid.id.as_str());
                    }
                }
            }
        }

        totals.merge(&stats);
        children.push(stats);
    }

    let rock_total = totals.total - totals.issue_count;
    let on_track_pct = if rock_total == 0 {
        100.0
    } else {
        totals.healthy as f64 / rock_total as f64 * 100.0
    };

    let covering_owners = totals.owners.len();
    let team_coverage_pct = if eligible_personnel == 0 || covering_owners == 0 {
        0.0
    } else {
        covering_owners as f64 / eligible_personnel as f64 * 100.0
    };

    RollupSummary {
        node_id: node_id.to_string(),
        children,
        totals,
        on_track_pct,
        team_coverage_pct,
    }
}

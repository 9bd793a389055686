//! Issue prioritization for the problem-solving queue.
//!
//! Pure scoring over a candidate set: explicit priority dominates, age adds a
//! capped bonus so old issues creep up without ever outranking an urgent one.

use chrono::{DateTime, Utc};

use crate::types::ObjectiveNode;

/// Assumed priority when an issue carries none.
const DEFAULT_PRIORITY: i32 = 5;

/// Age bonus stops accruing after this many days.
const AGE_BONUS_CAP_DAYS: i64 = 14;

#[derive(Debug)]
struct ScoredIssue {
    issue: ObjectiveNode,
    score: i32,
}

/// Order `issues` for a meeting's problem-solving queue.
///
/// `score = priority * 10 + min(age_in_days, 14)`, descending. Ties break by
/// earlier `created_at`, then by id, so the ordering is fully deterministic
/// across runs. The score is an internal sort key and is discarded from the
/// output.
pub fn rank(issues: Vec<ObjectiveNode>, now: DateTime<Utc>) -> Vec<ObjectiveNode> {
    let mut scored: Vec<ScoredIssue> = issues
        .into_iter()
        .map(|issue| {
            let score = score_issue(&issue, now);
            ScoredIssue { issue, score }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.issue.created_at.cmp(&b.issue.created_at))
            .then_with(|| a.issue.id.cmp(&b.issue.id))
    });

    scored.into_iter().map(|s| s.issue).collect()
}

fn score_issue(issue: &ObjectiveNode, now: DateTime<Utc>) -> i32 {
    let priority = issue.priority.unwrap_or(DEFAULT_PRIORITY);
    let age_days = (now - issue.created_at).num_days().clamp(0, AGE_BONUS_CAP_DAYS);
    priority * 10 + age_days as i32
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::types::{IssueStatus, NodeStatus, ObjectiveKind, OrgLevel};

    fn issue(id: &str, priority: Option<i32>, age_days: i64, now: DateTime<Utc>) -> ObjectiveNode {
        ObjectiveNode {
            id: id.to_string(),
            kind: ObjectiveKind::Issue,
            level: OrgLevel::Individual,
            parent_id: None,
            org_unit_id: None,
            title: format!("issue {id}"),
            description: None,
            status: NodeStatus::Issue(IssueStatus::Open),
            owner_id: Some("u-1".to_string()),
            created_at: now - Duration::days(age_days),
            updated_at: now,
            version: 1,
            priority,
            escalated_from_id: None,
            escalated_to_id: None,
            original_level_id: None,
        }
    }

    #[test]
    fn priority_dominates_age() {
        let now = Utc::now();
        // 10*10+0=100 vs 2*10+14=34
        let ranked = rank(
            vec![issue("old", Some(2), 14, now), issue("hot", Some(10), 0, now)],
            now,
        );
        assert_eq!(ranked[0].id, "hot");
        assert_eq!(ranked[1].id, "old");
    }

    #[test]
    fn concrete_scenario_a_b_c() {
        let now = Utc::now();
        let a = issue("a", Some(9), 1, now); // 91
        let b = issue("b", Some(5), 10, now); // 60
        let c = issue("c", Some(5), 1, now); // 51
        let ranked = rank(vec![c.clone(), b.clone(), a.clone()], now);
        let ids: Vec<&str> = ranked.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn age_bonus_caps_at_fourteen_days() {
        let now = Utc::now();
        // Same priority; both past the cap score identically, so the tie
        // breaks by earlier creation.
        let ranked = rank(
            vec![issue("newer", Some(5), 20, now), issue("older", Some(5), 90, now)],
            now,
        );
        assert_eq!(ranked[0].id, "older");
    }

    #[test]
    fn missing_priority_defaults_to_mid_value() {
        let now = Utc::now();
        let ranked = rank(
            vec![issue("implicit", None, 0, now), issue("low", Some(4), 0, now)],
            now,
        );
        // 5*10 > 4*10
        assert_eq!(ranked[0].id, "implicit");
    }

    #[test]
    fn future_created_at_clamps_to_zero_age() {
        let now = Utc::now();
        let ranked = rank(vec![issue("future", Some(5), -3, now)], now);
        assert_eq!(ranked.len(), 1);
        // Would panic on overflow or mis-sort if the negative age leaked in.
    }

    #[test]
    fn ranking_is_deterministic() {
        let now = Utc::now();
        let input = vec![
            issue("a", Some(5), 2, now),
            issue("b", Some(5), 2, now),
            issue("c", Some(7), 0, now),
        ];
        let first = rank(input.clone(), now);
        let second = rank(input, now);
        let first_ids: Vec<&str> = first.iter().map(|i| i.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
        // a and b score identically and share created_at; id breaks the tie.
        assert_eq!(first_ids, vec!["c", "a", "b"]);
    }
}

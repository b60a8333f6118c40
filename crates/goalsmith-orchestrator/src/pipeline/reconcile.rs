// Judgment reconciliation
//
// A judgment set is accepted only when it maps 1:1 onto the run's goals.
// The result is returned in goal order regardless of the judge's order.

use std::collections::HashMap;

use crate::domain::{Judgment, SmartGoal};
use crate::error::{PipelineError, Result};

/// Matches `judgments` to `goals` by goal id and returns them in goal order.
///
/// # Errors
/// - `JudgmentCountMismatch` when the counts differ
/// - `JudgmentGoalMismatch` on duplicate or unknown goal ids
pub fn reconcile(goals: &[SmartGoal], judgments: Vec<Judgment>) -> Result<Vec<Judgment>> {
    if judgments.len() != goals.len() {
        return Err(PipelineError::JudgmentCountMismatch { expected: goals.len(), actual: judgments.len() });
    }

    let mut by_goal: HashMap<String, Judgment> = HashMap::with_capacity(judgments.len());
    for judgment in judgments {
        if !goals.iter().any(|g| g.goal_id == judgment.goal_id) {
            return Err(PipelineError::JudgmentGoalMismatch {
                reason: format!("judgment for unknown goal '{}'", judgment.goal_id),
            });
        }
        let goal_id = judgment.goal_id.clone();
        if by_goal.insert(goal_id.clone(), judgment).is_some() {
            return Err(PipelineError::JudgmentGoalMismatch { reason: format!("goal '{goal_id}' judged twice") });
        }
    }

    goals
        .iter()
        .map(|goal| {
            by_goal.remove(&goal.goal_id).ok_or_else(|| PipelineError::JudgmentGoalMismatch {
                reason: format!("goal '{}' was not judged", goal.goal_id),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Criterion;

    fn goal(id: &str) -> SmartGoal {
        SmartGoal {
            goal_id: id.to_string(),
            specific: None,
            measurable: None,
            actionable: None,
            relevant: None,
            time_bound: None,
            condition_tag: None,
            description: format!("goal {id}"),
        }
    }

    fn judgment(id: &str) -> Judgment {
        Judgment {
            goal_id: id.to_string(),
            scores: Criterion::ALL.iter().map(|c| (*c, 3.0)).collect(),
            overall_score: 3.0,
            rationale: String::new(),
        }
    }

    #[test]
    fn test_reorders_to_goal_order() {
        let goals = vec![goal("goal-1"), goal("goal-2"), goal("goal-3")];
        let judgments = vec![judgment("goal-3"), judgment("goal-1"), judgment("goal-2")];
        let reconciled = reconcile(&goals, judgments).unwrap();
        let ids: Vec<_> = reconciled.iter().map(|j| j.goal_id.as_str()).collect();
        assert_eq!(ids, vec!["goal-1", "goal-2", "goal-3"]);

        // Reconciled output reconciles to itself.
        assert_eq!(reconcile(&goals, reconciled.clone()).unwrap(), reconciled);
    }

    #[test]
    fn test_count_mismatch() {
        let goals = vec![goal("goal-1"), goal("goal-2"), goal("goal-3")];
        let err = reconcile(&goals, vec![judgment("goal-1"), judgment("goal-2")]).unwrap_err();
        assert_eq!(err, PipelineError::JudgmentCountMismatch { expected: 3, actual: 2 });
    }

    #[test]
    fn test_unknown_and_duplicate_ids() {
        let goals = vec![goal("goal-1"), goal("goal-2")];

        let unknown = reconcile(&goals, vec![judgment("goal-1"), judgment("goal-9")]).unwrap_err();
        assert!(matches!(unknown, PipelineError::JudgmentGoalMismatch { ref reason } if reason.contains("goal-9")));

        let duplicate = reconcile(&goals, vec![judgment("goal-1"), judgment("goal-1")]).unwrap_err();
        assert!(matches!(duplicate, PipelineError::JudgmentGoalMismatch { ref reason } if reason.contains("twice")));
    }
}

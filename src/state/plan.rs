//! Hierarchical investigation plans.
//!
//! The master planner decomposes a complex query into subtasks; drill-down
//! and plan revision grow the plan during execution. Revisions are
//! append-only so the plan's history stays auditable: the effective plan is
//! always the original subtasks plus every revision applied in order.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle of a subtask. Transitions never regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    /// Created, not yet picked up.
    Pending,
    /// Currently executing.
    InProgress,
    /// Finished with results saved.
    Completed,
    /// Finished without usable results.
    Failed,
}

impl SubtaskStatus {
    /// Whether `next` is a legal transition from this status.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed | Self::Failed)
        )
    }
}

/// A child investigation unit within a hierarchical plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    /// Unique id within the plan (s1, s2, ..., including drill-down children).
    pub id: String,
    /// Short title.
    pub title: String,
    /// The question this subtask investigates.
    pub question: String,
    /// Parent subtask id; `None` for top-level subtasks.
    pub parent_id: Option<String>,
    /// Drill-down depth; top-level subtasks are depth 0.
    pub depth: u64,
    /// Current lifecycle status.
    pub status: SubtaskStatus,
}

/// What prompted a plan revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionTrigger {
    /// An important entity appeared that no pending subtask covers.
    NewTopic,
    /// A completed subtask contradicts an earlier one.
    Contradiction,
    /// A necessary precondition is unmet.
    Gap,
}

/// An append-only adjustment to the master plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRevision {
    /// Revision sequence number (1-based).
    pub revision_id: u64,
    /// What prompted the revision.
    pub trigger: RevisionTrigger,
    /// Ids of the subtasks this revision added.
    pub added_subtask_ids: Vec<String>,
    /// Free-text rationale.
    pub rationale: String,
}

/// The hierarchical master plan: subtasks plus its revision history.
///
/// `subtasks` holds every subtask ever created (original decomposition,
/// drill-down children, revision additions); `revisions` records how the
/// plan evolved. Budgets are recorded here so steps and the engine check
/// the same numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterPlan {
    /// All subtasks, in creation order.
    pub subtasks: Vec<Subtask>,
    /// Append-only revision history.
    pub revisions: Vec<PlanRevision>,
    /// Total subtasks ever created (== `subtasks.len()`, kept explicit for
    /// budget checks against serialized snapshots).
    pub total_created: u64,
    /// Maximum drill-down depth for this run.
    pub max_depth: u64,
    /// Maximum total subtasks for this run.
    pub max_total_subtasks: u64,
}

impl MasterPlan {
    /// Creates a plan from the master planner's top-level decomposition.
    #[must_use]
    pub fn new(top_level: Vec<Subtask>, max_depth: u64, max_total_subtasks: u64) -> Self {
        let total_created = top_level.len() as u64;
        Self {
            subtasks: top_level,
            revisions: Vec::new(),
            total_created,
            max_depth,
            max_total_subtasks,
        }
    }

    /// Looks up a subtask by id.
    #[must_use]
    pub fn subtask(&self, id: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id == id)
    }

    /// Remaining headroom under the total-subtask budget.
    #[must_use]
    pub fn remaining_budget(&self) -> u64 {
        self.max_total_subtasks.saturating_sub(self.total_created)
    }

    /// Next free subtask id.
    #[must_use]
    pub fn next_id(&self) -> String {
        format!("s{}", self.total_created + 1)
    }

    /// Transitions a subtask's status, enforcing the no-regression rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] for unknown ids or illegal
    /// transitions.
    pub fn transition(&mut self, id: &str, next: SubtaskStatus) -> Result<()> {
        let subtask = self
            .subtasks
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::InvalidState {
                message: format!("unknown subtask: {id}"),
            })?;
        if !subtask.status.can_transition_to(next) {
            return Err(Error::InvalidState {
                message: format!(
                    "illegal subtask transition for {id}: {:?} -> {next:?}",
                    subtask.status
                ),
            });
        }
        subtask.status = next;
        Ok(())
    }

    /// Adds drill-down children under `parent_id`, returning their ids.
    ///
    /// Children get `depth = parent.depth + 1`. The caller is responsible
    /// for enqueueing the returned ids at the head of the pending order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the parent is unknown, the depth
    /// bound would be violated, or the total budget would be exceeded.
    pub fn add_children(
        &mut self,
        parent_id: &str,
        children: Vec<(String, String)>,
    ) -> Result<Vec<String>> {
        let parent = self.subtask(parent_id).ok_or_else(|| Error::InvalidState {
            message: format!("unknown parent subtask: {parent_id}"),
        })?;
        let depth = parent.depth + 1;
        if depth > self.max_depth {
            return Err(Error::InvalidState {
                message: format!("drill-down would exceed max depth {}", self.max_depth),
            });
        }
        if self.total_created + children.len() as u64 > self.max_total_subtasks {
            return Err(Error::InvalidState {
                message: format!(
                    "drill-down would exceed subtask budget {}",
                    self.max_total_subtasks
                ),
            });
        }

        let mut ids = Vec::with_capacity(children.len());
        for (title, question) in children {
            let id = self.next_id();
            self.subtasks.push(Subtask {
                id: id.clone(),
                title,
                question,
                parent_id: Some(parent_id.to_string()),
                depth,
                status: SubtaskStatus::Pending,
            });
            self.total_created += 1;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Applies a revision, appending its subtasks at depth 0 and recording
    /// the revision. Returns the new subtask ids.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the total budget would be
    /// exceeded; callers enforce the revision-count budget.
    pub fn apply_revision(
        &mut self,
        trigger: RevisionTrigger,
        additions: Vec<(String, String)>,
        rationale: String,
    ) -> Result<Vec<String>> {
        if self.total_created + additions.len() as u64 > self.max_total_subtasks {
            return Err(Error::InvalidState {
                message: format!(
                    "revision would exceed subtask budget {}",
                    self.max_total_subtasks
                ),
            });
        }
        let mut ids = Vec::with_capacity(additions.len());
        for (title, question) in additions {
            let id = self.next_id();
            self.subtasks.push(Subtask {
                id: id.clone(),
                title,
                question,
                parent_id: None,
                depth: 0,
                status: SubtaskStatus::Pending,
            });
            self.total_created += 1;
            ids.push(id);
        }
        self.revisions.push(PlanRevision {
            revision_id: self.revisions.len() as u64 + 1,
            trigger,
            added_subtask_ids: ids.clone(),
            rationale,
        });
        Ok(ids)
    }

    /// Top-level subtasks in plan order.
    pub fn top_level(&self) -> impl Iterator<Item = &Subtask> {
        self.subtasks.iter().filter(|s| s.parent_id.is_none())
    }
}

/// Builds a depth-0 pending subtask.
#[must_use]
pub fn top_level_subtask(id: &str, title: &str, question: &str) -> Subtask {
    Subtask {
        id: id.to_string(),
        title: title.to_string(),
        question: question.to_string(),
        parent_id: None,
        depth: 0,
        status: SubtaskStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with(n: usize) -> MasterPlan {
        let subtasks = (1..=n)
            .map(|i| top_level_subtask(&format!("s{i}"), &format!("t{i}"), &format!("q{i}")))
            .collect();
        MasterPlan::new(subtasks, 2, 20)
    }

    #[test]
    fn test_status_transitions() {
        assert!(SubtaskStatus::Pending.can_transition_to(SubtaskStatus::InProgress));
        assert!(SubtaskStatus::InProgress.can_transition_to(SubtaskStatus::Completed));
        assert!(SubtaskStatus::InProgress.can_transition_to(SubtaskStatus::Failed));
        // No regressions.
        assert!(!SubtaskStatus::Completed.can_transition_to(SubtaskStatus::Pending));
        assert!(!SubtaskStatus::InProgress.can_transition_to(SubtaskStatus::Pending));
        assert!(!SubtaskStatus::Completed.can_transition_to(SubtaskStatus::InProgress));
    }

    #[test]
    fn test_transition_enforced() {
        let mut plan = plan_with(1);
        plan.transition("s1", SubtaskStatus::InProgress).unwrap();
        plan.transition("s1", SubtaskStatus::Completed).unwrap();
        assert!(plan.transition("s1", SubtaskStatus::InProgress).is_err());
        assert!(plan.transition("sX", SubtaskStatus::InProgress).is_err());
    }

    #[test]
    fn test_add_children_sets_depth_and_parent() {
        let mut plan = plan_with(2);
        let ids = plan
            .add_children("s1", vec![("child".to_string(), "cq".to_string())])
            .unwrap();
        assert_eq!(ids, vec!["s3".to_string()]);
        let child = plan.subtask("s3").unwrap();
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_id.as_deref(), Some("s1"));
        assert_eq!(plan.total_created, 3);
    }

    #[test]
    fn test_add_children_respects_depth_bound() {
        let mut plan = plan_with(1);
        let c1 = plan
            .add_children("s1", vec![("c".to_string(), "q".to_string())])
            .unwrap();
        let c2 = plan
            .add_children(&c1[0], vec![("cc".to_string(), "q".to_string())])
            .unwrap();
        // Depth 3 would exceed max_depth = 2.
        let result = plan.add_children(&c2[0], vec![("ccc".to_string(), "q".to_string())]);
        assert!(result.is_err());
    }

    #[test]
    fn test_add_children_respects_total_budget() {
        let mut plan = plan_with(2);
        plan.max_total_subtasks = 3;
        let result = plan.add_children(
            "s1",
            vec![
                ("a".to_string(), "q".to_string()),
                ("b".to_string(), "q".to_string()),
            ],
        );
        assert!(result.is_err());
        assert_eq!(plan.total_created, 2);
    }

    #[test]
    fn test_apply_revision_appends_and_records() {
        let mut plan = plan_with(2);
        let ids = plan
            .apply_revision(
                RevisionTrigger::NewTopic,
                vec![("extra".to_string(), "eq".to_string())],
                "entity X uncovered".to_string(),
            )
            .unwrap();
        assert_eq!(ids, vec!["s3".to_string()]);
        assert_eq!(plan.revisions.len(), 1);
        assert_eq!(plan.revisions[0].revision_id, 1);
        assert_eq!(plan.revisions[0].trigger, RevisionTrigger::NewTopic);
        assert_eq!(plan.revisions[0].added_subtask_ids, ids);
        assert_eq!(plan.subtask("s3").unwrap().depth, 0);
    }

    #[test]
    fn test_remaining_budget() {
        let mut plan = plan_with(3);
        assert_eq!(plan.remaining_budget(), 17);
        plan.max_total_subtasks = 3;
        assert_eq!(plan.remaining_budget(), 0);
    }

    #[test]
    fn test_top_level_excludes_children() {
        let mut plan = plan_with(2);
        plan.add_children("s1", vec![("c".to_string(), "q".to_string())])
            .unwrap();
        assert_eq!(plan.top_level().count(), 2);
    }

    #[test]
    fn test_plan_round_trips() {
        let mut plan = plan_with(2);
        plan.add_children("s2", vec![("c".to_string(), "q".to_string())])
            .unwrap();
        plan.apply_revision(RevisionTrigger::Gap, vec![], "no additions".to_string())
            .unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let back: MasterPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Completion state of one array task.
///
/// Each task flows through: UNATTEMPTED → SUBMITTED → SUCCEEDED | FAILED.
/// A later rerun takes FAILED (or, in default mode, SUCCEEDED) back to
/// SUBMITTED. Only SUBMITTED is ephemeral: the persisted sentinel pair can
/// encode the other three, and an item with neither marker reads back as
/// UNATTEMPTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Unattempted,
    Submitted,
    Succeeded,
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Unattempted => write!(f, "UNATTEMPTED"),
            TaskState::Submitted => write!(f, "SUBMITTED"),
            TaskState::Succeeded => write!(f, "SUCCEEDED"),
            TaskState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Terminal result reported by the scheduler for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failure,
}

/// An event applied to a task's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    /// The launcher (re)submits the task, clearing any previous outcome.
    Submit,
    /// The output handler observes the task's exit status.
    Complete(TaskOutcome),
    /// Manual marker removal by an operator.
    Reset,
}

impl TaskState {
    /// The single transition function. Completion always lands on exactly
    /// one of SUCCEEDED/FAILED regardless of the previous outcome, which is
    /// what keeps the persisted sentinel pair mutually exclusive.
    pub fn next(self, event: TaskEvent) -> TaskState {
        match event {
            TaskEvent::Submit => TaskState::Submitted,
            TaskEvent::Complete(TaskOutcome::Success) => TaskState::Succeeded,
            TaskEvent::Complete(TaskOutcome::Failure) => TaskState::Failed,
            TaskEvent::Reset => TaskState::Unattempted,
        }
    }

    /// Whether the idempotency tracker selects this item in failed-only
    /// mode. Never-attempted items are eligible: only a success marker
    /// causes a skip.
    pub fn eligible_failed_only(self) -> bool {
        !matches!(self, TaskState::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_walks_submit_then_complete() {
        let s = TaskState::Unattempted.next(TaskEvent::Submit);
        assert_eq!(s, TaskState::Submitted);

        let ok = s.next(TaskEvent::Complete(TaskOutcome::Success));
        assert_eq!(ok, TaskState::Succeeded);

        let bad = s.next(TaskEvent::Complete(TaskOutcome::Failure));
        assert_eq!(bad, TaskState::Failed);
    }

    #[test]
    fn failed_returns_to_submitted_on_rerun() {
        let s = TaskState::Failed.next(TaskEvent::Submit);
        assert_eq!(s, TaskState::Submitted);
    }

    #[test]
    fn completion_overwrites_previous_outcome() {
        // A task that previously succeeded and is rerun to failure must end
        // up FAILED, never both.
        let s = TaskState::Succeeded.next(TaskEvent::Complete(TaskOutcome::Failure));
        assert_eq!(s, TaskState::Failed);

        let s = TaskState::Failed.next(TaskEvent::Complete(TaskOutcome::Success));
        assert_eq!(s, TaskState::Succeeded);
    }

    #[test]
    fn failed_only_eligibility() {
        assert!(TaskState::Unattempted.eligible_failed_only());
        assert!(TaskState::Failed.eligible_failed_only());
        assert!(TaskState::Submitted.eligible_failed_only());
        assert!(!TaskState::Succeeded.eligible_failed_only());
    }

    #[test]
    fn state_display() {
        assert_eq!(TaskState::Unattempted.to_string(), "UNATTEMPTED");
        assert_eq!(TaskState::Submitted.to_string(), "SUBMITTED");
        assert_eq!(TaskState::Succeeded.to_string(), "SUCCEEDED");
        assert_eq!(TaskState::Failed.to_string(), "FAILED");
    }
}

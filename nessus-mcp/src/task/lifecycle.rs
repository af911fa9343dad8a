// Task lifecycle machine.
//
// Centralizes the legal state transitions for a Task. No other code may set
// `Task.status` directly — every mutation goes through `TaskStatus::transition`.

use serde::{Deserialize, Serialize};

use crate::errors::LifecycleError;

/// Lifecycle state of a task.
///
/// ```text
/// queued ──► running ──► completed
///    │           │
///    │           ├──► failed
///    │           ├──► timeout
///    │           └──► cancelled
///    └──► cancelled
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Timeout | TaskStatus::Cancelled
        )
    }

    /// Whether entering this state sets `error_message`-bearing semantics
    /// (every terminal state other than `completed`).
    pub fn is_failure_terminal(&self) -> bool {
        self.is_terminal() && !matches!(self, TaskStatus::Completed)
    }

    /// Validate (and return) the transition `self -> next`, rejecting any
    /// edge not drawn in the diagram above.
    pub fn transition(&self, next: TaskStatus) -> Result<TaskStatus, LifecycleError> {
        let legal = match (*self, next) {
            (TaskStatus::Queued, TaskStatus::Running) => true,
            (TaskStatus::Queued, TaskStatus::Cancelled) => true,
            (TaskStatus::Running, TaskStatus::Completed) => true,
            (TaskStatus::Running, TaskStatus::Failed) => true,
            (TaskStatus::Running, TaskStatus::Timeout) => true,
            (TaskStatus::Running, TaskStatus::Cancelled) => true,
            _ => false,
        };

        if legal {
            Ok(next)
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_to_running_is_legal() {
        assert_eq!(TaskStatus::Queued.transition(TaskStatus::Running), Ok(TaskStatus::Running));
    }

    #[test]
    fn queued_to_completed_is_rejected() {
        assert!(TaskStatus::Queued.transition(TaskStatus::Completed).is_err());
    }

    #[test]
    fn running_reaches_every_terminal() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Timeout, TaskStatus::Cancelled] {
            assert_eq!(TaskStatus::Running.transition(terminal), Ok(terminal));
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Timeout, TaskStatus::Cancelled] {
            for next in [TaskStatus::Queued, TaskStatus::Running, TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Timeout, TaskStatus::Cancelled] {
                if terminal == next {
                    continue;
                }
                assert!(terminal.transition(next).is_err());
            }
        }
    }

    #[test]
    fn failure_terminal_classification() {
        assert!(!TaskStatus::Completed.is_failure_terminal());
        assert!(TaskStatus::Failed.is_failure_terminal());
        assert!(TaskStatus::Timeout.is_failure_terminal());
        assert!(TaskStatus::Cancelled.is_failure_terminal());
        assert!(!TaskStatus::Queued.is_failure_terminal());
    }
}

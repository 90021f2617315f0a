// Routine instance lifecycle transitions

use tracing::{debug, warn};

use crate::error::RoutineError;
use crate::model::InstanceStatus;
use crate::observability::engine_metrics;

/// Operations that act on an instance's lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceEvent {
    Start,
    RecordProgress,
    Complete,
    Cancel,
    Restart,
    Delete,
    Assign,
}

impl InstanceEvent {
    pub fn operation(&self) -> &'static str {
        match self {
            InstanceEvent::Start => "start",
            InstanceEvent::RecordProgress => "update progress of",
            InstanceEvent::Complete => "complete",
            InstanceEvent::Cancel => "cancel",
            InstanceEvent::Restart => "restart",
            InstanceEvent::Delete => "delete",
            InstanceEvent::Assign => "assign",
        }
    }
}

/// Status an instance moves to when `event` is applied in `status`.
///
/// `Delete` and `Assign` leave the status unchanged when allowed.
pub fn transition(status: InstanceStatus, event: InstanceEvent) -> Result<InstanceStatus, RoutineError> {
    use InstanceEvent as E;
    use InstanceStatus as S;

    let next = match (status, event) {
        (S::Scheduled, E::Start) => S::Started,

        (S::Started | S::InProgress, E::RecordProgress) => S::InProgress,

        (S::Started | S::InProgress, E::Complete) => S::Completed,

        (S::Scheduled | S::Started | S::InProgress, E::Cancel) => S::Cancelled,

        (S::Cancelled, E::Restart) => S::Scheduled,

        (S::Scheduled, E::Delete) | (S::Scheduled, E::Assign) => S::Scheduled,

        (status, event) => {
            warn!(
                status = %status,
                event = ?event,
                "Invalid routine instance transition"
            );
            engine_metrics().record_rejected_transition();
            return Err(RoutineError::InvalidState {
                operation: event.operation(),
                status,
            });
        }
    };

    debug!(from = %status, to = %next, event = ?event, "Routine instance transition");
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [InstanceStatus; 5] = [
        InstanceStatus::Scheduled,
        InstanceStatus::Started,
        InstanceStatus::InProgress,
        InstanceStatus::Completed,
        InstanceStatus::Cancelled,
    ];

    #[test]
    fn test_happy_path() {
        let started = transition(InstanceStatus::Scheduled, InstanceEvent::Start).unwrap();
        assert_eq!(started, InstanceStatus::Started);
        let progressing = transition(started, InstanceEvent::RecordProgress).unwrap();
        assert_eq!(progressing, InstanceStatus::InProgress);
        let done = transition(progressing, InstanceEvent::Complete).unwrap();
        assert_eq!(done, InstanceStatus::Completed);
    }

    #[test]
    fn test_cancel_rejected_once_finished() {
        for status in ALL {
            let result = transition(status, InstanceEvent::Cancel);
            let finished = matches!(status, InstanceStatus::Completed | InstanceStatus::Cancelled);
            assert_eq!(result.is_err(), finished, "cancel from {status}");
        }
    }

    #[test]
    fn test_restart_only_from_cancelled() {
        for status in ALL {
            let result = transition(status, InstanceEvent::Restart);
            assert_eq!(result.is_ok(), status == InstanceStatus::Cancelled, "restart from {status}");
        }
    }

    #[test]
    fn test_delete_and_assign_only_while_scheduled() {
        for status in ALL {
            for event in [InstanceEvent::Delete, InstanceEvent::Assign] {
                let result = transition(status, event);
                assert_eq!(result.is_ok(), status == InstanceStatus::Scheduled);
            }
        }
    }

    #[test]
    fn test_completed_is_terminal() {
        for event in [
            InstanceEvent::Start,
            InstanceEvent::RecordProgress,
            InstanceEvent::Complete,
            InstanceEvent::Cancel,
            InstanceEvent::Restart,
        ] {
            match transition(InstanceStatus::Completed, event) {
                Err(RoutineError::InvalidState { status, .. }) => {
                    assert_eq!(status, InstanceStatus::Completed)
                }
                other => panic!("expected invalid state, got {other:?}"),
            }
        }
    }
}

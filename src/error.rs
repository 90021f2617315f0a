use serde::Serialize;
use thiserror::Error;

use crate::model::InstanceStatus;
use crate::store::StoreError;

/// One malformed input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by routine engine operations
#[derive(Debug, Error)]
pub enum RoutineError {
    #[error("authentication required")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("cannot {operation} a routine instance that is {status}")]
    InvalidState {
        operation: &'static str,
        status: InstanceStatus,
    },

    #[error("validation failed: {}", summarize(.issues))]
    ValidationFailed { issues: Vec<ValidationIssue> },

    #[error("routine instance {id} was modified concurrently")]
    Conflict { id: String },

    #[error("internal error")]
    Internal(#[from] StoreError),
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{}: {}", issue.field, issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl RoutineError {
    pub fn not_found(entity: &'static str, id: &str) -> Self {
        RoutineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        RoutineError::Forbidden(reason.into())
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        RoutineError::ValidationFailed {
            issues: vec![ValidationIssue::new(field, message)],
        }
    }

    /// HTTP status the REST surface answers with
    pub fn status_code(&self) -> u16 {
        match self {
            RoutineError::Unauthorized => 401,
            RoutineError::Forbidden(_) => 403,
            RoutineError::NotFound { .. } => 404,
            RoutineError::Conflict { .. } => 409,
            RoutineError::InvalidState { .. } => 409,
            RoutineError::ValidationFailed { .. } => 400,
            RoutineError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RoutineError::Unauthorized => "unauthorized",
            RoutineError::Forbidden(_) => "forbidden",
            RoutineError::NotFound { .. } => "not_found",
            RoutineError::InvalidState { .. } => "invalid_state",
            RoutineError::ValidationFailed { .. } => "validation_failed",
            RoutineError::Conflict { .. } => "conflict",
            RoutineError::Internal(_) => "internal",
        }
    }
}

/// Collects validation issues before failing once with all of them
#[derive(Debug, Default)]
pub struct Validator {
    issues: Vec<ValidationIssue>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, condition: bool, field: &str, message: &str) -> &mut Self {
        if !condition {
            self.issues.push(ValidationIssue::new(field, message));
        }
        self
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        self.issues.push(ValidationIssue::new(field, message));
        self
    }

    pub fn finish(&mut self) -> Result<(), RoutineError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(RoutineError::ValidationFailed {
                issues: std::mem::take(&mut self.issues),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_errors_hide_their_source() {
        let err = RoutineError::from(StoreError::Unavailable("db-7 timed out".to_string()));
        assert_eq!(err.to_string(), "internal error");
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_validator_collects_every_issue() {
        let result = Validator::new()
            .check(false, "startDate", "required")
            .check(true, "endDate", "required")
            .check(false, "repeatDays", "must not be empty")
            .finish();

        match result {
            Err(RoutineError::ValidationFailed { issues }) => {
                let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
                assert_eq!(fields, vec!["startDate", "repeatDays"]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }
}

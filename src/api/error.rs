use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::error::{RoutineError, ValidationIssue};

/// JSON error payload
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ValidationIssue>,
}

impl IntoResponse for RoutineError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = self.code();
        let message = match &self {
            RoutineError::Internal(source) => {
                error!(error = %source, "Request failed with internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let issues = match self {
            RoutineError::ValidationFailed { issues } => issues,
            _ => Vec::new(),
        };
        let body = ErrorBody {
            error: code,
            message,
            issues,
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for RoutineError {
    fn from(rejection: JsonRejection) -> Self {
        RoutineError::validation("body", rejection.body_text())
    }
}

impl From<QueryRejection> for RoutineError {
    fn from(rejection: QueryRejection) -> Self {
        RoutineError::validation("query", rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstanceStatus;
    use crate::store::StoreError;
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn render(error: RoutineError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_state_is_conflict_with_its_own_code() {
        let (status, body) = render(RoutineError::InvalidState {
            operation: "complete",
            status: InstanceStatus::Scheduled,
        })
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "invalid_state");
        assert!(body.get("issues").is_none());
    }

    #[tokio::test]
    async fn test_internal_errors_are_not_leaked() {
        let (status, body) = render(RoutineError::Internal(StoreError::Unavailable(
            "replica 3 unreachable".to_string(),
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "internal error");
    }

    #[tokio::test]
    async fn test_validation_issues_are_listed() {
        let (status, body) = render(RoutineError::validation("stepId", "unknown step x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["issues"][0]["field"], "stepId");
    }
}

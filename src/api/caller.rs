use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::access::Caller;
use crate::error::RoutineError;
use crate::model::SystemRole;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SYSTEM_ROLE_HEADER: &str = "x-system-role";

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = RoutineError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(RoutineError::Unauthorized)?;

        let system_role = match parts.headers.get(SYSTEM_ROLE_HEADER) {
            None => SystemRole::default(),
            Some(value) => value
                .to_str()
                .ok()
                .and_then(SystemRole::parse)
                .ok_or(RoutineError::Unauthorized)?,
        };

        Ok(Caller::new(user_id, system_role))
    }
}

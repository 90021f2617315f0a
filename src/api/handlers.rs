use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::access::Caller;
use crate::error::RoutineError;
use crate::observability::engine_metrics;
use crate::routines::{
    AssignRequest, CancelRequest, CreateInstanceRequest, CreateScheduleRequest,
    CreateTemplateRequest, ListInstancesQuery, StartInstanceRequest, StepProgressUpdate,
    ToggleScheduleRequest, UpdateScheduleRequest, UpdateTemplateRequest,
};

type Payload<T> = Result<Json<T>, JsonRejection>;
type ApiResult<T> = Result<T, RoutineError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StableQuery {
    pub stable_id: String,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

pub async fn metrics(_caller: Caller) -> impl IntoResponse {
    Json(engine_metrics().get_stats())
}

pub async fn create_template(
    State(service): State<AppState>,
    caller: Caller,
    payload: Payload<CreateTemplateRequest>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let template = service.create_template(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn get_template(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(service.get_template(&caller, &id).await?))
}

pub async fn update_template(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Payload<UpdateTemplateRequest>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    Ok(Json(service.update_template(&caller, &id, request).await?))
}

pub async fn create_schedule(
    State(service): State<AppState>,
    caller: Caller,
    payload: Payload<CreateScheduleRequest>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let created = service.create_schedule(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_schedules(
    State(service): State<AppState>,
    caller: Caller,
    query: Result<Query<StableQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    Ok(Json(service.list_schedules(&caller, &query.stable_id).await?))
}

pub async fn get_schedule(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(service.get_schedule(&caller, &id).await?))
}

pub async fn update_schedule(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Payload<UpdateScheduleRequest>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    Ok(Json(service.update_schedule(&caller, &id, request).await?))
}

pub async fn toggle_schedule(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Payload<ToggleScheduleRequest>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    Ok(Json(service.toggle_schedule(&caller, &id, request).await?))
}

pub async fn regenerate_instances(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(service.regenerate_instances(&caller, &id).await?))
}

pub async fn create_instance(
    State(service): State<AppState>,
    caller: Caller,
    payload: Payload<CreateInstanceRequest>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let instance = service.create_instance(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

pub async fn list_instances(
    State(service): State<AppState>,
    caller: Caller,
    query: Result<Query<ListInstancesQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    Ok(Json(service.list_instances(&caller, &query).await?))
}

pub async fn get_instance(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(service.get_instance(&caller, &id).await?))
}

pub async fn delete_instance(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    service.delete(&caller, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Body is optional for start; an absent or empty body means no acknowledgement
pub async fn start(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Option<Json<StartInstanceRequest>>,
) -> ApiResult<impl IntoResponse> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(service.start(&caller, &id, request).await?))
}

pub async fn update_progress(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Payload<StepProgressUpdate>,
) -> ApiResult<impl IntoResponse> {
    let Json(update) = payload?;
    Ok(Json(service.update_step_progress(&caller, &id, update).await?))
}

pub async fn complete(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(service.complete(&caller, &id).await?))
}

pub async fn cancel(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Option<Json<CancelRequest>>,
) -> ApiResult<impl IntoResponse> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(service.cancel(&caller, &id, request).await?))
}

pub async fn restart(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(service.restart(&caller, &id).await?))
}

pub async fn assign(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    payload: Payload<AssignRequest>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    Ok(Json(service.assign(&caller, &id, request).await?))
}

pub async fn horse_access(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(service.horse_access(&caller, &id).await?))
}

pub async fn horse_history(
    State(service): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(service.horse_history(&caller, &id).await?))
}

//! REST surface over [`RoutineService`].
//!
//! Every route except `/healthz` requires an authenticated caller, taken
//! from the `x-user-id` and `x-system-role` headers set by the gateway.

mod caller;
mod error;
mod handlers;

use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;

use crate::routines::RoutineService;

pub use caller::{SYSTEM_ROLE_HEADER, USER_ID_HEADER};
pub use error::ErrorBody;

pub type AppState = Arc<RoutineService>;

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/routine-templates",
            post(handlers::create_template),
        )
        .route(
            "/routine-templates/:id",
            get(handlers::get_template).put(handlers::update_template),
        )
        .route(
            "/routine-schedules",
            post(handlers::create_schedule).get(handlers::list_schedules),
        )
        .route(
            "/routine-schedules/:id",
            get(handlers::get_schedule).put(handlers::update_schedule),
        )
        .route(
            "/routine-schedules/:id/toggle",
            post(handlers::toggle_schedule),
        )
        .route(
            "/routine-schedules/:id/generate",
            post(handlers::regenerate_instances),
        )
        .route(
            "/routines/instances",
            post(handlers::create_instance).get(handlers::list_instances),
        )
        .route(
            "/routines/instances/:id",
            get(handlers::get_instance).delete(handlers::delete_instance),
        )
        .route("/routines/instances/:id/start", post(handlers::start))
        .route(
            "/routines/instances/:id/progress",
            put(handlers::update_progress),
        )
        .route("/routines/instances/:id/complete", post(handlers::complete))
        .route("/routines/instances/:id/cancel", post(handlers::cancel))
        .route("/routines/instances/:id/restart", post(handlers::restart))
        .route("/routines/instances/:id/assign", post(handlers::assign))
        .route("/horses/:id/access", get(handlers::horse_access))
        .route(
            "/horses/:id/activity-history",
            get(handlers::horse_history),
        )
        .with_state(service)
}

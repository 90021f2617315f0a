// Stable Routines Library - recurring stable care routines
// This exposes the engine components for the binary, tests and embedding services

pub mod access;
pub mod api;
pub mod config;
pub mod error;
pub mod horses;
pub mod model;
pub mod observability;
pub mod routines;
pub mod schedule;
pub mod store;
pub mod telemetry;

// Re-export key types for easy access
pub use access::{AccessResolver, Caller, RequestAccess};
pub use config::StableRoutinesConfig;
pub use error::{RoutineError, ValidationIssue, Validator};
pub use horses::{HorseResolver, ResolvedHorse};
pub use observability::{engine_metrics, EngineMetrics, EngineStats, OperationTimer};
pub use routines::{
    transition, ActivityHistoryRecorder, InstanceEvent, RoutineService, ScheduleCreated,
    TemplateStore,
};
pub use schedule::{ExpansionReport, HolidayCalendar, Recurrence, ScheduleExpander};
pub use store::{
    Collection, DocumentStore, IdentityProvider, InMemoryIdentityProvider, InMemoryStore,
    NotificationSink, Repository, StoreError, StoreNotificationSink,
};
pub use telemetry::{create_routine_span, generate_correlation_id, init_telemetry, shutdown_telemetry};

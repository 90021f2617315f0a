//! Routine templates, schedules and instance execution.

pub mod history;
pub mod progress;
pub mod requests;
pub mod schedules;
pub mod selection;
pub mod service;
pub mod state_machine;
pub mod templates;

pub use history::ActivityHistoryRecorder;
pub use progress::{apply_step_update, percent_complete, StepChange};
pub use requests::*;
pub use schedules::ScheduleCreated;
pub use selection::SelectionGate;
pub use service::{EngineSettings, RoutineService};
pub use state_machine::{transition, InstanceEvent};
pub use templates::TemplateStore;

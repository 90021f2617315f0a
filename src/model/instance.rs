use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{RoutineStep, TemplateSnapshot};
use crate::store::{Collection, Record};

/// Lifecycle status of a routine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Scheduled,
    Started,
    InProgress,
    Completed,
    Cancelled,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Scheduled => "scheduled",
            InstanceStatus::Started => "started",
            InstanceStatus::InProgress => "in_progress",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, InstanceStatus::Started | InstanceStatus::InProgress)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    Auto,
    Manual,
    SelfBooked,
    #[default]
    Unassigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl StepStatus {
    /// Completed or skipped
    pub fn is_done(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlanketAction {
    On,
    Off,
    Changed,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HorseStepProgress {
    pub horse_id: String,
    #[serde(default)]
    pub horse_name: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub skip_reason: Option<String>,
    #[serde(default)]
    pub feeding_confirmed: Option<bool>,
    #[serde(default)]
    pub medication_given: Option<bool>,
    #[serde(default)]
    pub medication_skipped: Option<bool>,
    #[serde(default)]
    pub blanket_action: Option<BlanketAction>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl HorseStepProgress {
    pub fn is_done(&self) -> bool {
        self.completed || self.skipped
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step_id: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
    #[serde(default)]
    pub skip_reason: Option<String>,
    #[serde(default)]
    pub horse_progress: BTreeMap<String, HorseStepProgress>,
    #[serde(default)]
    pub horses_completed: u32,
    #[serde(default)]
    pub horses_total: u32,
}

impl StepProgress {
    pub fn pending(step_id: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RoutineProgress {
    pub steps_total: u32,
    pub steps_completed: u32,
    pub percent_complete: u8,
    #[serde(default)]
    pub step_progress: BTreeMap<String, StepProgress>,
}

impl RoutineProgress {
    /// Fresh progress with every step pending
    pub fn from_steps(steps: &[RoutineStep]) -> Self {
        Self {
            steps_total: steps.len() as u32,
            steps_completed: 0,
            percent_complete: 0,
            step_progress: steps
                .iter()
                .map(|step| (step.id.clone(), StepProgress::pending(&step.id)))
                .collect(),
        }
    }
}

/// One dated occurrence of a routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineInstance {
    pub id: String,
    #[serde(flatten)]
    pub template: TemplateSnapshot,
    pub organization_id: String,
    pub stable_id: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_start_time: String,
    pub status: InstanceStatus,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub assignment_type: AssignmentType,
    #[serde(default)]
    pub assigned_by: Option<String>,
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_step_id: Option<String>,
    #[serde(default)]
    pub daily_notes_acknowledged: bool,
    pub progress: RoutineProgress,
    #[serde(default)]
    pub points_awarded: Option<u32>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_by: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_by: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RoutineInstance {
    pub fn is_assigned_to(&self, user_id: &str) -> bool {
        self.assigned_to.as_deref() == Some(user_id)
    }
}

impl Record for RoutineInstance {
    const COLLECTION: Collection = Collection::RoutineInstances;

    fn id(&self) -> &str {
        &self.id
    }
}

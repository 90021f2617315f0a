//! Typed records for every document the engine touches.
//!
//! Field names serialise in camelCase to match the stored document shape.

pub mod history;
pub mod instance;
pub mod schedule;
pub mod selection;
pub mod stable;
pub mod template;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use history::{
    ActivityHistoryEntry, BlanketSnapshot, ExecutionStatus, FeedingInstruction, FeedingSnapshot,
    MedicationInstruction, MedicationSnapshot,
};
pub use instance::{
    AssignmentType, BlanketAction, HorseStepProgress, InstanceStatus, RoutineInstance,
    RoutineProgress, StepProgress, StepStatus,
};
pub use schedule::{AssignmentMode, RepeatPattern, RoutineSchedule};
pub use selection::{
    Notification, NotificationKind, SelectionEntry, SelectionProcess, SelectionProcessStatus,
    SelectionTurn, TurnStatus,
};
pub use stable::{
    Horse, HorseFeeding, HorseGroup, HorseMedication, HorseStatus, MemberStatus, Organization,
    OrganizationMember, OrganizationRole, Stable, StableAccess, SystemRole,
};
pub use template::{
    HorseContext, HorseFilter, RoutineStep, RoutineTemplate, StepCategory, TemplateSnapshot,
};

/// Access level, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Public,
    BasicCare,
    Professional,
    Management,
    Owner,
}

/// Relationship through which a user reaches a horse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessSource {
    Ownership,
    Placement,
    Stable,
}

/// Effective access of one user to one horse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessContext {
    pub horse_id: String,
    pub user_id: String,
    pub access_level: AccessLevel,
    pub access_source: AccessSource,
    pub is_owner: bool,
    pub organization_roles: Vec<OrganizationRole>,
    pub stable_access: StableAccess,
    /// History before this date is hidden from placement-based access
    pub placement_date: Option<NaiveDate>,
}

impl AccessContext {
    pub fn can_see_history_on(&self, date: NaiveDate) -> bool {
        match (self.access_source, self.placement_date) {
            (AccessSource::Placement, Some(placed)) => date >= placed,
            _ => true,
        }
    }
}

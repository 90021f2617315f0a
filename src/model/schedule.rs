use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::TemplateSnapshot;
use crate::store::{Collection, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatPattern {
    Daily,
    Weekly,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentMode {
    /// Left open for algorithmic assignment later
    Auto,
    Manual,
    #[default]
    Unassigned,
}

/// Recurring schedule that generates dated routine instances.
///
/// Weekdays are numbered 0 (Sunday) through 6 (Saturday) in `repeat_days`;
/// `custom_assignments` uses the same numbers as string keys (`"1"` = Monday).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineSchedule {
    pub id: String,
    pub organization_id: String,
    pub stable_id: String,
    #[serde(flatten)]
    pub template: TemplateSnapshot,
    #[serde(default)]
    pub name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub repeat_pattern: RepeatPattern,
    #[serde(default)]
    pub repeat_days: Vec<u8>,
    #[serde(default)]
    pub include_holidays: bool,
    /// Local wall-clock start, `HH:MM`
    pub scheduled_start_time: String,
    #[serde(default)]
    pub assignment_mode: AssignmentMode,
    #[serde(default)]
    pub default_assigned_to: Option<String>,
    #[serde(default)]
    pub custom_assignments: BTreeMap<String, String>,
    pub is_enabled: bool,
    #[serde(default)]
    pub instances_generated: u32,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoutineSchedule {
    /// Custom assignee for a weekday (0 = Sunday)
    pub fn custom_assignee(&self, weekday: u8) -> Option<&str> {
        self.custom_assignments
            .get(&weekday.to_string())
            .map(String::as_str)
    }

    /// Users referenced by the assignment configuration
    pub fn referenced_assignees(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .custom_assignments
            .values()
            .cloned()
            .chain(self.default_assigned_to.clone())
            .collect();
        users.sort();
        users.dedup();
        users
    }
}

impl Record for RoutineSchedule {
    const COLLECTION: Collection = Collection::RoutineSchedules;

    fn id(&self) -> &str {
        &self.id
    }
}

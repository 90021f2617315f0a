// Request payloads accepted by routine operations

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{
    AssignmentMode, BlanketAction, RepeatPattern, RoutineStep, StepStatus,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    pub template_id: String,
    pub stable_id: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_start_time: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInstanceRequest {
    #[serde(default)]
    pub daily_notes_acknowledged: bool,
}

/// Per-horse outcome reported with a step update; absent fields are left as they were
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorseProgressUpdate {
    pub horse_id: String,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default)]
    pub skipped: Option<bool>,
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
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgressUpdate {
    pub step_id: String,
    #[serde(default)]
    pub status: Option<StepStatus>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
    #[serde(default)]
    pub skip_reason: Option<String>,
    #[serde(default)]
    pub horse_updates: Vec<HorseProgressUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub assigned_to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInstancesQuery {
    pub stable_id: String,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    pub template_id: String,
    pub stable_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub repeat_pattern: RepeatPattern,
    #[serde(default)]
    pub repeat_days: Vec<u8>,
    #[serde(default)]
    pub include_holidays: bool,
    pub scheduled_start_time: String,
    #[serde(default)]
    pub assignment_mode: AssignmentMode,
    #[serde(default)]
    pub default_assigned_to: Option<String>,
    /// Weekday (`"0"` = Sunday) to user id
    #[serde(default)]
    pub custom_assignments: BTreeMap<String, String>,
}

/// Partial schedule update; absent fields keep their stored value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScheduleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub repeat_pattern: Option<RepeatPattern>,
    #[serde(default)]
    pub repeat_days: Option<Vec<u8>>,
    #[serde(default)]
    pub include_holidays: Option<bool>,
    #[serde(default)]
    pub scheduled_start_time: Option<String>,
    #[serde(default)]
    pub assignment_mode: Option<AssignmentMode>,
    #[serde(default)]
    pub default_assigned_to: Option<String>,
    #[serde(default)]
    pub custom_assignments: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleScheduleRequest {
    pub is_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub organization_id: String,
    #[serde(default)]
    pub stable_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<RoutineStep>,
    pub estimated_duration: u32,
    pub points_value: u32,
    #[serde(default)]
    pub requires_notes_read: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Replacing the steps regenerates every step id
    #[serde(default)]
    pub steps: Option<Vec<RoutineStep>>,
    #[serde(default)]
    pub estimated_duration: Option<u32>,
    #[serde(default)]
    pub points_value: Option<u32>,
    #[serde(default)]
    pub requires_notes_read: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// `HH:MM` in 24-hour time
pub fn is_valid_time(value: &str) -> bool {
    chrono::NaiveTime::parse_from_str(value, "%H:%M").is_ok() && value.len() == 5
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_update_defaults() {
        let update: StepProgressUpdate = serde_json::from_value(json!({
            "stepId": "feed",
            "horseUpdates": [{"horseId": "h1", "completed": true}],
        }))
        .unwrap();
        assert_eq!(update.status, None);
        assert_eq!(update.horse_updates[0].completed, Some(true));
        assert_eq!(update.horse_updates[0].skipped, None);
    }

    #[test]
    fn test_time_format() {
        assert!(is_valid_time("07:30"));
        assert!(!is_valid_time("7:30"));
        assert!(!is_valid_time("25:00"));
    }
}

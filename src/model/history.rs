use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{BlanketAction, StepCategory};
use crate::store::{Collection, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedingInstruction {
    pub feed_type: String,
    pub quantity: f64,
    pub unit: String,
    pub feeding_time: String,
}

/// Feeding plan as it stood when the step was executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedingSnapshot {
    pub instructions: Vec<FeedingInstruction>,
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationInstruction {
    pub name: String,
    pub dosage: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationSnapshot {
    pub medications: Vec<MedicationInstruction>,
    pub given: bool,
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlanketSnapshot {
    pub current_blanket: Option<String>,
    pub action: Option<BlanketAction>,
}

/// Immutable execution fact for one (instance, step, horse)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityHistoryEntry {
    pub id: String,
    pub instance_id: String,
    pub step_id: String,
    pub horse_id: String,
    pub horse_name: String,
    pub organization_id: String,
    pub stable_id: String,
    pub stable_name: String,
    pub routine_template_id: String,
    pub routine_name: String,
    pub step_name: String,
    pub category: StepCategory,
    pub execution_status: ExecutionStatus,
    pub executed_by: String,
    pub executed_at: DateTime<Utc>,
    pub scheduled_date: NaiveDate,
    #[serde(default)]
    pub skip_reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub feeding_snapshot: Option<FeedingSnapshot>,
    #[serde(default)]
    pub medication_snapshot: Option<MedicationSnapshot>,
    #[serde(default)]
    pub blanket_snapshot: Option<BlanketSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActivityHistoryEntry {
    /// Deterministic document id for the (instance, step, horse) key
    pub fn key(instance_id: &str, step_id: &str, horse_id: &str) -> String {
        format!("{instance_id}_{step_id}_{horse_id}")
    }
}

impl Record for ActivityHistoryEntry {
    const COLLECTION: Collection = Collection::ActivityHistory;

    fn id(&self) -> &str {
        &self.id
    }
}

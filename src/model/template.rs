use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Collection, Record};

/// How a step selects the horses it applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HorseContext {
    #[default]
    None,
    All,
    Specific,
    Groups,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HorseFilter {
    #[serde(default)]
    pub horse_ids: Vec<String>,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default)]
    pub exclude_horse_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    Feeding,
    Medication,
    Blanket,
    Turnout,
    BringIn,
    Mucking,
    HealthCheck,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineStep {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub category: StepCategory,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub horse_context: HorseContext,
    #[serde(default)]
    pub horse_filter: HorseFilter,
    #[serde(default)]
    pub show_feeding: bool,
    #[serde(default)]
    pub show_medication: bool,
    #[serde(default)]
    pub show_blanket_status: bool,
    #[serde(default)]
    pub show_horse_notes: bool,
    #[serde(default)]
    pub requires_confirmation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineTemplate {
    pub id: String,
    pub organization_id: String,
    #[serde(default)]
    pub stable_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<RoutineStep>,
    /// Minutes
    pub estimated_duration: u32,
    pub points_value: u32,
    /// Daily notes must be acknowledged before the first step
    #[serde(default)]
    pub requires_notes_read: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl RoutineTemplate {
    /// Whether the template may be used by instances at `stable_id`
    pub fn applies_to_stable(&self, stable_id: &str) -> bool {
        self.stable_id.as_deref().map_or(true, |s| s == stable_id)
    }

    pub fn snapshot(&self) -> TemplateSnapshot {
        TemplateSnapshot {
            template_id: self.id.clone(),
            template_name: self.name.clone(),
            estimated_duration: self.estimated_duration,
            points_value: self.points_value,
            requires_notes_read: self.requires_notes_read,
            steps: self.steps.clone(),
        }
    }
}

impl Record for RoutineTemplate {
    const COLLECTION: Collection = Collection::RoutineTemplates;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Template fields copied onto schedules and instances at write time.
///
/// This is a projection, not a live reference: editing the template later
/// does not update snapshots that were already written. Instances resolve
/// their steps from here, so progress keeps its step ids across edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSnapshot {
    pub template_id: String,
    pub template_name: String,
    pub estimated_duration: u32,
    pub points_value: u32,
    #[serde(default)]
    pub requires_notes_read: bool,
    #[serde(default)]
    pub steps: Vec<RoutineStep>,
}

impl TemplateSnapshot {
    pub fn step(&self, step_id: &str) -> Option<&RoutineStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}

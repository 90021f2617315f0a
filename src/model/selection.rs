// Turn-based routine picking and notification documents

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Collection, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionProcessStatus {
    Draft,
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Pending,
    Active,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionTurn {
    pub user_id: String,
    pub order: u32,
    pub status: TurnStatus,
}

/// Turn-based picking of routine instances within a stable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionProcess {
    pub id: String,
    pub organization_id: String,
    pub stable_id: String,
    pub status: SelectionProcessStatus,
    #[serde(default)]
    pub current_turn_user_id: Option<String>,
    #[serde(default)]
    pub turns: Vec<SelectionTurn>,
}

impl SelectionProcess {
    pub fn is_turn_of(&self, user_id: &str) -> bool {
        self.current_turn_user_id.as_deref() == Some(user_id)
    }
}

impl Record for SelectionProcess {
    const COLLECTION: Collection = Collection::SelectionProcesses;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A pick made during a selection process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionEntry {
    pub id: String,
    pub process_id: String,
    pub stable_id: String,
    pub user_id: String,
    pub instance_id: String,
    pub scheduled_date: NaiveDate,
    pub selected_at: DateTime<Utc>,
}

impl Record for SelectionEntry {
    const COLLECTION: Collection = Collection::SelectionEntries;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RoutineAssigned,
    RoutineCancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub organization_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Record for Notification {
    const COLLECTION: Collection = Collection::Notifications;

    fn id(&self) -> &str {
        &self.id
    }
}

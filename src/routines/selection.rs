// Turn-based routine picking

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::RoutineError;
use crate::model::{RoutineInstance, SelectionEntry, SelectionProcess, SelectionProcessStatus};
use crate::store::{Collection, Filter, Query, Repository, StoreError};

#[derive(Debug, Clone)]
pub struct SelectionGate {
    repo: Repository,
}

impl SelectionGate {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// The stable's active selection process, if one is running
    pub async fn active_process(
        &self,
        stable_id: &str,
    ) -> Result<Option<SelectionProcess>, StoreError> {
        Ok(self
            .repo
            .find::<SelectionProcess>(
                Query::new(Collection::SelectionProcesses)
                    .filter(Filter::eq("stableId", stable_id))
                    .filter(Filter::eq("status", "active"))
                    .limit(1),
            )
            .await?
            .into_iter()
            .next())
    }

    /// Fail unless `user_id` holds the current turn in `process`
    pub fn check_turn(process: &SelectionProcess, user_id: &str) -> Result<(), RoutineError> {
        debug_assert_eq!(process.status, SelectionProcessStatus::Active);
        if process.is_turn_of(user_id) {
            Ok(())
        } else {
            debug!(
                process_id = %process.id,
                user_id,
                current_turn = ?process.current_turn_user_id,
                "Assignment outside of selection turn"
            );
            Err(RoutineError::forbidden(
                "it is not your turn in the active selection process",
            ))
        }
    }

    /// Record a pick made through the selection process
    pub async fn record_pick(
        &self,
        process: &SelectionProcess,
        instance: &RoutineInstance,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SelectionEntry, StoreError> {
        let entry = SelectionEntry {
            id: Uuid::new_v4().to_string(),
            process_id: process.id.clone(),
            stable_id: instance.stable_id.clone(),
            user_id: user_id.to_string(),
            instance_id: instance.id.clone(),
            scheduled_date: instance.scheduled_date,
            selected_at: now,
        };
        self.repo.insert(&entry).await?;
        info!(
            process_id = %process.id,
            instance_id = %instance.id,
            user_id,
            "Recorded selection pick"
        );
        Ok(entry)
    }
}

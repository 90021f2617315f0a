//! Per-horse execution history.
//!
//! One entry per (instance, step, horse). Recording the same key again
//! overwrites the entry in place, so a reopened and re-finished step never
//! produces duplicates. Care instructions are copied into the entry as they
//! stand at execution time.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::horses::HorseResolver;
use crate::model::{
    ActivityHistoryEntry, BlanketSnapshot, ExecutionStatus, FeedingInstruction, FeedingSnapshot,
    Horse, HorseFeeding, HorseMedication, HorseStepProgress, MedicationInstruction,
    MedicationSnapshot, RoutineInstance, RoutineStep, Stable, StepProgress,
    StepStatus,
};
use crate::observability::engine_metrics;
use crate::store::{Collection, Direction, Filter, Query, Repository, StoreError};

#[derive(Debug, Clone)]
pub struct ActivityHistoryRecorder {
    repo: Repository,
    horses: HorseResolver,
}

impl ActivityHistoryRecorder {
    pub fn new(repo: Repository, horses: HorseResolver) -> Self {
        Self { repo, horses }
    }

    /// Record the outcome of a finished step for every horse it applies to.
    ///
    /// Returns the number of entries written; zero when the step resolves
    /// no horses.
    pub async fn record(
        &self,
        instance: &RoutineInstance,
        step_progress: &StepProgress,
        executed_by: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let Some(step) = instance.template.step(&step_progress.step_id) else {
            warn!(
                instance_id = %instance.id,
                step_id = %step_progress.step_id,
                "Step missing from instance snapshot, skipping history"
            );
            return Ok(0);
        };

        let horses = self
            .horses
            .resolve_step_roster(&instance.stable_id, step)
            .await?;
        if horses.is_empty() {
            debug!(instance_id = %instance.id, step_id = %step.id, "Step resolves no horses");
            return Ok(0);
        }

        let stable_name = self
            .repo
            .fetch::<Stable>(&instance.stable_id)
            .await?
            .map(|stable| stable.name)
            .unwrap_or_else(|| instance.stable_id.clone());
        let horse_ids: Vec<String> = horses.iter().map(|h| h.id.clone()).collect();
        let feedings = if step.show_feeding {
            self.active_by_horse::<HorseFeeding>(Collection::HorseFeedings, &horse_ids, |f| {
                &f.horse_id
            })
            .await?
        } else {
            HashMap::new()
        };
        let medications = if step.show_medication {
            self.active_by_horse::<HorseMedication>(Collection::HorseMedications, &horse_ids, |m| {
                &m.horse_id
            })
            .await?
        } else {
            HashMap::new()
        };

        let mut written = 0;
        for horse in &horses {
            let entry = build_entry(
                instance,
                step,
                step_progress,
                horse,
                &stable_name,
                feedings.get(&horse.id).map(Vec::as_slice),
                medications.get(&horse.id).map(Vec::as_slice),
                executed_by,
                now,
            );
            self.upsert(entry).await?;
            written += 1;
        }

        engine_metrics().record_history_entries(written as u64);
        info!(
            instance_id = %instance.id,
            step_id = %step.id,
            entries = written,
            "Recorded activity history"
        );
        Ok(written)
    }

    /// History of one horse, newest first
    pub async fn entries_for_horse(
        &self,
        horse_id: &str,
    ) -> Result<Vec<ActivityHistoryEntry>, StoreError> {
        self.repo
            .find(
                Query::new(Collection::ActivityHistory)
                    .filter(Filter::eq("horseId", horse_id))
                    .order_by("scheduledDate", Direction::Desc),
            )
            .await
    }

    pub async fn entries_for_instance(
        &self,
        instance_id: &str,
    ) -> Result<Vec<ActivityHistoryEntry>, StoreError> {
        self.repo
            .find(
                Query::new(Collection::ActivityHistory)
                    .filter(Filter::eq("instanceId", instance_id)),
            )
            .await
    }

    async fn upsert(&self, mut entry: ActivityHistoryEntry) -> Result<(), StoreError> {
        let existing = self
            .repo
            .find::<ActivityHistoryEntry>(
                Query::new(Collection::ActivityHistory)
                    .filter(Filter::eq("instanceId", entry.instance_id.as_str()))
                    .filter(Filter::eq("stepId", entry.step_id.as_str()))
                    .filter(Filter::eq("horseId", entry.horse_id.as_str()))
                    .limit(1),
            )
            .await?
            .into_iter()
            .next();

        if let Some(existing) = existing {
            entry.id = existing.id;
            entry.created_at = existing.created_at;
            self.repo.save(&entry).await?;
            return Ok(());
        }

        match self.repo.insert(&entry).await {
            Ok(_) => Ok(()),
            Err(StoreError::AlreadyExists { .. }) => {
                // Lost a race with a concurrent recorder for the same key
                if let Some(current) = self.repo.fetch::<ActivityHistoryEntry>(&entry.id).await? {
                    entry.created_at = current.created_at;
                }
                self.repo.save(&entry).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    async fn active_by_horse<T>(
        &self,
        collection: Collection,
        horse_ids: &[String],
        horse_of: impl Fn(&T) -> &String,
    ) -> Result<HashMap<String, Vec<T>>, StoreError>
    where
        T: crate::store::Record,
    {
        let records: Vec<T> = self
            .repo
            .find(
                Query::new(collection)
                    .filter(Filter::one_of("horseId", horse_ids))
                    .filter(Filter::eq("isActive", true)),
            )
            .await?;
        let mut grouped: HashMap<String, Vec<T>> = HashMap::new();
        for record in records {
            grouped.entry(horse_of(&record).clone()).or_default().push(record);
        }
        Ok(grouped)
    }
}

#[allow(clippy::too_many_arguments)]
fn build_entry(
    instance: &RoutineInstance,
    step: &RoutineStep,
    step_progress: &StepProgress,
    horse: &Horse,
    stable_name: &str,
    feedings: Option<&[HorseFeeding]>,
    medications: Option<&[HorseMedication]>,
    executed_by: &str,
    now: DateTime<Utc>,
) -> ActivityHistoryEntry {
    let outcome = step_progress.horse_progress.get(&horse.id);
    let step_skipped = step_progress.status == StepStatus::Skipped;
    let skipped = step_skipped || outcome.is_some_and(|h| h.skipped);
    let execution_status = if skipped {
        ExecutionStatus::Skipped
    } else {
        ExecutionStatus::Completed
    };
    let skip_reason = if skipped {
        outcome
            .and_then(|h| h.skip_reason.clone())
            .or_else(|| step_progress.skip_reason.clone())
    } else {
        None
    };

    let flag = |pick: fn(&HorseStepProgress) -> Option<bool>| outcome.and_then(pick).unwrap_or(false);

    let feeding_snapshot = step.show_feeding.then(|| FeedingSnapshot {
        instructions: feedings
            .unwrap_or_default()
            .iter()
            .map(|f| FeedingInstruction {
                feed_type: f.feed_type.clone(),
                quantity: f.quantity,
                unit: f.unit.clone(),
                feeding_time: f.feeding_time.clone(),
            })
            .collect(),
        confirmed: flag(|h| h.feeding_confirmed),
    });
    let medication_snapshot = step.show_medication.then(|| MedicationSnapshot {
        medications: medications
            .unwrap_or_default()
            .iter()
            .map(|m| MedicationInstruction {
                name: m.name.clone(),
                dosage: m.dosage.clone(),
                instructions: m.instructions.clone(),
            })
            .collect(),
        given: flag(|h| h.medication_given),
        skipped: flag(|h| h.medication_skipped),
    });
    let blanket_snapshot = step.show_blanket_status.then(|| BlanketSnapshot {
        current_blanket: horse.current_blanket.clone(),
        action: outcome.and_then(|h| h.blanket_action),
    });

    ActivityHistoryEntry {
        id: ActivityHistoryEntry::key(&instance.id, &step.id, &horse.id),
        instance_id: instance.id.clone(),
        step_id: step.id.clone(),
        horse_id: horse.id.clone(),
        horse_name: horse.name.clone(),
        organization_id: instance.organization_id.clone(),
        stable_id: instance.stable_id.clone(),
        stable_name: stable_name.to_string(),
        routine_template_id: instance.template.template_id.clone(),
        routine_name: instance.template.template_name.clone(),
        step_name: step.name.clone(),
        category: step.category,
        execution_status,
        executed_by: executed_by.to_string(),
        executed_at: now,
        scheduled_date: instance.scheduled_date,
        skip_reason,
        notes: outcome
            .and_then(|h| h.notes.clone())
            .or_else(|| step_progress.notes.clone()),
        feeding_snapshot,
        medication_snapshot,
        blanket_snapshot,
        created_at: now,
        updated_at: now,
    }
}

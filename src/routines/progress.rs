//! Step and horse progress aggregation.
//!
//! Skipped steps count as done. `percentComplete` is the rounded integer
//! percentage of done steps, 0 for an instance without steps.

use chrono::{DateTime, Utc};

use super::requests::{HorseProgressUpdate, StepProgressUpdate};
use crate::horses::ResolvedHorse;
use crate::model::{HorseStepProgress, RoutineProgress, RoutineStep, StepProgress, StepStatus};

/// Round-half-up percentage of `done` out of `total`
pub fn percent_complete(done: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let done = done.min(total) as u64;
    ((done * 200 + total as u64) / (total as u64 * 2)) as u8
}

/// Outcome of merging one step update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepChange {
    pub previous: StepStatus,
    pub current: StepStatus,
    /// The update explicitly finished the step (completed or skipped)
    pub finished: bool,
}

/// Merge `update` into the progress of one step.
///
/// `horses` is the step's execution-time horse set and defines
/// `horsesTotal`. Counters for the whole instance are recomputed.
pub fn apply_step_update(
    progress: &mut RoutineProgress,
    update: &StepProgressUpdate,
    horses: &[ResolvedHorse],
    now: DateTime<Utc>,
) -> StepChange {
    let step = progress
        .step_progress
        .entry(update.step_id.clone())
        .or_insert_with(|| StepProgress::pending(&update.step_id));
    let previous = step.status;

    for horse_update in &update.horse_updates {
        let name = horses
            .iter()
            .find(|h| h.horse_id == horse_update.horse_id)
            .map(|h| h.name.clone());
        let entry = step
            .horse_progress
            .entry(horse_update.horse_id.clone())
            .or_insert_with(|| HorseStepProgress {
                horse_id: horse_update.horse_id.clone(),
                ..Default::default()
            });
        if entry.horse_name.is_none() {
            entry.horse_name = name;
        }
        merge_horse(entry, horse_update, now);
    }

    if let Some(notes) = &update.notes {
        step.notes = Some(notes.clone());
    }
    for url in &update.photo_urls {
        if !step.photo_urls.contains(url) {
            step.photo_urls.push(url.clone());
        }
    }

    let next = match update.status {
        Some(status) => status,
        None if previous == StepStatus::Pending && !update.horse_updates.is_empty() => {
            StepStatus::InProgress
        }
        None => previous,
    };

    if next != StepStatus::Pending && step.started_at.is_none() {
        step.started_at = Some(now);
    }
    match next {
        StepStatus::Completed => {
            step.completed_at = Some(now);
            step.skip_reason = None;
        }
        StepStatus::Skipped => {
            step.completed_at = Some(now);
            if update.skip_reason.is_some() {
                step.skip_reason = update.skip_reason.clone();
            }
            for horse in horses {
                let entry = step
                    .horse_progress
                    .entry(horse.horse_id.clone())
                    .or_insert_with(|| HorseStepProgress {
                        horse_id: horse.horse_id.clone(),
                        horse_name: Some(horse.name.clone()),
                        ..Default::default()
                    });
                entry.completed = false;
                entry.skipped = true;
                if entry.skip_reason.is_none() {
                    entry.skip_reason = step.skip_reason.clone();
                }
            }
        }
        StepStatus::Pending | StepStatus::InProgress => {
            step.completed_at = None;
        }
    }
    step.status = next;

    step.horses_total = horses.len() as u32;
    step.horses_completed = horses
        .iter()
        .filter(|h| step.horse_progress.get(&h.horse_id).is_some_and(HorseStepProgress::is_done))
        .count() as u32;

    recompute_totals(progress);

    StepChange {
        previous,
        current: next,
        finished: update.status.is_some_and(|s| s.is_done()),
    }
}

fn merge_horse(entry: &mut HorseStepProgress, update: &HorseProgressUpdate, now: DateTime<Utc>) {
    if let Some(completed) = update.completed {
        entry.completed = completed;
        if completed {
            entry.skipped = false;
            entry.completed_at = Some(now);
        }
    }
    if let Some(skipped) = update.skipped {
        entry.skipped = skipped;
        if skipped {
            entry.completed = false;
            entry.completed_at = Some(now);
        }
    }
    if update.skip_reason.is_some() {
        entry.skip_reason = update.skip_reason.clone();
    }
    if update.feeding_confirmed.is_some() {
        entry.feeding_confirmed = update.feeding_confirmed;
    }
    if update.medication_given.is_some() {
        entry.medication_given = update.medication_given;
    }
    if update.medication_skipped.is_some() {
        entry.medication_skipped = update.medication_skipped;
    }
    if update.blanket_action.is_some() {
        entry.blanket_action = update.blanket_action;
    }
    if update.notes.is_some() {
        entry.notes = update.notes.clone();
    }
}

/// Recompute `stepsCompleted` and `percentComplete` from the step map
pub fn recompute_totals(progress: &mut RoutineProgress) {
    let done = progress
        .step_progress
        .values()
        .filter(|step| step.status.is_done())
        .count() as u32;
    progress.steps_completed = done.min(progress.steps_total);
    progress.percent_complete = percent_complete(progress.steps_completed, progress.steps_total);
}

/// Mark every step done for a completed instance
pub fn force_complete(progress: &mut RoutineProgress) {
    progress.steps_completed = progress.steps_total;
    progress.percent_complete = 100;
}

/// First step, in template order, that is not done yet
pub fn next_open_step(steps: &[RoutineStep], progress: &RoutineProgress) -> Option<String> {
    steps
        .iter()
        .filter(|step| progress.step_progress.contains_key(&step.id))
        .find(|step| {
            progress
                .step_progress
                .get(&step.id)
                .is_some_and(|p| !p.status.is_done())
        })
        .map(|step| step.id.clone())
        .or_else(|| {
            progress
                .step_progress
                .values()
                .find(|p| !p.status.is_done())
                .map(|p| p.step_id.clone())
        })
}

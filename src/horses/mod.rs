//! Horse selection for routine steps.
//!
//! A step's horse set is computed from the stable's current roster, never
//! from a list frozen on the template.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

use crate::model::{Horse, HorseContext, HorseGroup, HorseStatus, RoutineStep};
use crate::store::{Collection, Direction, Filter, Query, Repository, StoreError};

/// A horse selected for a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedHorse {
    pub horse_id: String,
    pub name: String,
}

impl From<&Horse> for ResolvedHorse {
    fn from(horse: &Horse) -> Self {
        Self {
            horse_id: horse.id.clone(),
            name: horse.name.clone(),
        }
    }
}

/// Select the horses a step applies to.
///
/// `roster` is the stable's active horses in display order; the result keeps
/// that order. `groups` only needs to contain the groups the step names.
/// `excludeHorseIds` applies to every context, `specific` included.
pub fn select_horses(step: &RoutineStep, roster: &[Horse], groups: &[HorseGroup]) -> Vec<ResolvedHorse> {
    let filter = &step.horse_filter;
    let excluded: BTreeSet<&str> = filter.exclude_horse_ids.iter().map(String::as_str).collect();

    let wanted: Option<BTreeSet<&str>> = match step.horse_context {
        HorseContext::None => return Vec::new(),
        HorseContext::All => None,
        HorseContext::Specific => {
            if filter.horse_ids.is_empty() {
                return Vec::new();
            }
            Some(filter.horse_ids.iter().map(String::as_str).collect())
        }
        HorseContext::Groups => {
            if filter.group_ids.is_empty() {
                return Vec::new();
            }
            Some(
                groups
                    .iter()
                    .filter(|g| filter.group_ids.contains(&g.id))
                    .flat_map(|g| g.horse_ids.iter().map(String::as_str))
                    .collect(),
            )
        }
    };

    roster
        .iter()
        .filter(|horse| wanted.as_ref().map_or(true, |ids| ids.contains(horse.id.as_str())))
        .filter(|horse| !excluded.contains(horse.id.as_str()))
        .map(ResolvedHorse::from)
        .collect()
}

#[derive(Debug, Clone)]
pub struct HorseResolver {
    repo: Repository,
}

impl HorseResolver {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Active horses currently in `stable_id`, ordered by name
    pub async fn roster(&self, stable_id: &str) -> Result<Vec<Horse>, StoreError> {
        self.repo
            .find(
                Query::new(Collection::Horses)
                    .filter(Filter::eq("currentStableId", stable_id))
                    .filter(Filter::eq("status", "active"))
                    .order_by("name", Direction::Asc),
            )
            .await
    }

    /// Horses a step applies to at `stable_id`, evaluated against the current roster
    pub async fn resolve_step_horses(
        &self,
        stable_id: &str,
        step: &RoutineStep,
    ) -> Result<Vec<ResolvedHorse>, StoreError> {
        Ok(self
            .resolve_step_roster(stable_id, step)
            .await?
            .iter()
            .map(ResolvedHorse::from)
            .collect())
    }

    /// Same selection as [`resolve_step_horses`](Self::resolve_step_horses),
    /// returning the full horse records
    pub async fn resolve_step_roster(
        &self,
        stable_id: &str,
        step: &RoutineStep,
    ) -> Result<Vec<Horse>, StoreError> {
        if step.horse_context == HorseContext::None {
            return Ok(Vec::new());
        }

        let roster = self.roster(stable_id).await?;
        let groups = if step.horse_context == HorseContext::Groups {
            self.repo
                .fetch_many::<HorseGroup>(&step.horse_filter.group_ids)
                .await?
                .into_iter()
                .filter(|group| group.stable_id == stable_id)
                .collect()
        } else {
            Vec::new()
        };

        let selected: BTreeSet<String> = select_horses(step, &roster, &groups)
            .into_iter()
            .map(|h| h.horse_id)
            .collect();
        debug!(
            stable_id,
            step_id = %step.id,
            roster = roster.len(),
            selected = selected.len(),
            "Resolved step horses"
        );

        Ok(roster
            .into_iter()
            .filter(|horse| horse.status == HorseStatus::Active && selected.contains(&horse.id))
            .collect())
    }
}

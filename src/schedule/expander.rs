use chrono::{DateTime, Datelike, NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::HolidayCalendar;
use crate::error::Validator;
use crate::model::{
    AssignmentMode, AssignmentType, InstanceStatus, RepeatPattern, RoutineInstance,
    RoutineProgress, RoutineSchedule, RoutineTemplate,
};
use crate::observability::engine_metrics;
use crate::store::{BatchOp, Collection, Record, Repository, StoreError};

/// Weekday number with Sunday as 0
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Deterministic id of the instance a schedule generates for `date`
pub fn schedule_instance_id(schedule_id: &str, date: NaiveDate) -> String {
    format!("{}_{}", schedule_id, date.format("%Y-%m-%d"))
}

/// The date rule of a schedule, separated from its assignment settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurrence {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub repeat_pattern: RepeatPattern,
    pub repeat_days: Vec<u8>,
    pub include_holidays: bool,
}

impl From<&RoutineSchedule> for Recurrence {
    fn from(schedule: &RoutineSchedule) -> Self {
        Self {
            start_date: schedule.start_date,
            end_date: schedule.end_date,
            repeat_pattern: schedule.repeat_pattern,
            repeat_days: schedule.repeat_days.clone(),
            include_holidays: schedule.include_holidays,
        }
    }
}

impl Recurrence {
    /// Whether `date` is retained by the rule, ignoring the date range
    pub fn matches(&self, date: NaiveDate, calendar: &HolidayCalendar) -> bool {
        let weekday = weekday_index(date);
        match self.repeat_pattern {
            RepeatPattern::Daily => true,
            RepeatPattern::Weekly => {
                if self.repeat_days.is_empty() {
                    weekday == weekday_index(self.start_date)
                } else {
                    self.repeat_days.contains(&weekday)
                }
            }
            RepeatPattern::Custom => {
                self.repeat_days.contains(&weekday)
                    || (self.include_holidays && calendar.is_holiday(date))
            }
        }
    }

    /// Reject reversed ranges and ranges longer than `max_days`
    pub fn check_range(&self, validator: &mut Validator, max_days: i64) {
        let span = (self.end_date - self.start_date).num_days() + 1;
        validator
            .check(
                self.end_date >= self.start_date,
                "endDate",
                "must not be before startDate",
            )
            .check(
                span <= max_days,
                "endDate",
                &format!("range may cover at most {max_days} days"),
            );
    }

    /// Every retained date from start to end, inclusive
    pub fn dates(&self, calendar: &HolidayCalendar) -> Vec<NaiveDate> {
        self.start_date
            .iter_days()
            .take_while(|date| *date <= self.end_date)
            .filter(|date| self.matches(*date, calendar))
            .collect()
    }
}

/// Outcome of one expansion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpansionReport {
    pub instances_generated: u32,
    pub skipped_existing: u32,
    pub failed_chunks: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExpansionReport {
    pub fn is_complete(&self) -> bool {
        self.failed_chunks == 0 && self.error.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleExpander {
    repo: Repository,
    calendar: HolidayCalendar,
}

impl ScheduleExpander {
    pub fn new(repo: Repository, calendar: HolidayCalendar) -> Self {
        Self { repo, calendar }
    }

    pub fn calendar(&self) -> &HolidayCalendar {
        &self.calendar
    }

    /// Build, without persisting, the instances a schedule yields
    pub fn build_instances(
        &self,
        schedule: &RoutineSchedule,
        template: &RoutineTemplate,
        now: DateTime<Utc>,
    ) -> Vec<RoutineInstance> {
        Recurrence::from(schedule)
            .dates(&self.calendar)
            .into_iter()
            .map(|date| {
                let (assigned_to, assignment_type) = assignment_for(schedule, date);
                let manual = assigned_to.is_some();
                RoutineInstance {
                    id: schedule_instance_id(&schedule.id, date),
                    template: template.snapshot(),
                    organization_id: schedule.organization_id.clone(),
                    stable_id: schedule.stable_id.clone(),
                    scheduled_date: date,
                    scheduled_start_time: schedule.scheduled_start_time.clone(),
                    status: InstanceStatus::Scheduled,
                    assigned_to,
                    assignment_type,
                    assigned_by: manual.then(|| schedule.created_by.clone()),
                    assigned_at: manual.then_some(now),
                    current_step_id: None,
                    daily_notes_acknowledged: false,
                    progress: RoutineProgress::from_steps(&template.steps),
                    points_awarded: None,
                    created_by: schedule.created_by.clone(),
                    created_at: now,
                    started_by: None,
                    started_at: None,
                    completed_by: None,
                    completed_at: None,
                    cancelled_by: None,
                    cancelled_at: None,
                    cancellation_reason: None,
                    updated_at: now,
                }
            })
            .collect()
    }

    /// Persist every instance the schedule yields that does not exist yet.
    ///
    /// Writes are chunked to the store's batch limit and committed in
    /// parallel. A failed chunk is reported, not rolled back; rerunning
    /// picks up exactly the missing dates.
    pub async fn expand(
        &self,
        schedule: &RoutineSchedule,
        template: &RoutineTemplate,
        now: DateTime<Utc>,
    ) -> Result<ExpansionReport, StoreError> {
        let candidates = self.build_instances(schedule, template, now);
        let ids: Vec<String> = candidates.iter().map(|i| i.id.clone()).collect();
        let existing: HashSet<String> = self
            .repo
            .store()
            .get_all(Collection::RoutineInstances, &ids)
            .await?
            .into_iter()
            .map(|doc| doc.id)
            .collect();

        let mut report = ExpansionReport {
            skipped_existing: existing.len() as u32,
            ..Default::default()
        };

        let mut ops = Vec::new();
        for instance in candidates.iter().filter(|i| !existing.contains(&i.id)) {
            ops.push(BatchOp::Create {
                collection: RoutineInstance::COLLECTION,
                id: instance.id.clone(),
                data: Repository::encode(instance)?,
            });
        }
        if ops.is_empty() {
            debug!(schedule_id = %schedule.id, "Schedule has no missing instances");
            return Ok(report);
        }

        let limit = self.repo.store().batch_limit();
        let mut chunks: Vec<Vec<BatchOp>> = Vec::new();
        let mut remaining = ops.into_iter().peekable();
        while remaining.peek().is_some() {
            chunks.push(remaining.by_ref().take(limit).collect());
        }
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();

        let store = self.repo.store();
        let results = join_all(chunks.into_iter().map(|chunk| store.commit_batch(chunk))).await;

        for (size, result) in sizes.into_iter().zip(results) {
            match result {
                Ok(()) => report.instances_generated += size as u32,
                Err(e) => {
                    warn!(
                        schedule_id = %schedule.id,
                        chunk_size = size,
                        error = %e,
                        "Instance batch commit failed"
                    );
                    engine_metrics().record_generation_failure();
                    report.failed_chunks += 1;
                    report.error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        engine_metrics().record_instances_generated(report.instances_generated as u64);
        info!(
            schedule_id = %schedule.id,
            generated = report.instances_generated,
            skipped = report.skipped_existing,
            failed_chunks = report.failed_chunks,
            "Schedule expanded"
        );
        Ok(report)
    }
}

fn assignment_for(schedule: &RoutineSchedule, date: NaiveDate) -> (Option<String>, AssignmentType) {
    match schedule.assignment_mode {
        AssignmentMode::Auto => (None, AssignmentType::Auto),
        AssignmentMode::Unassigned => (None, AssignmentType::Unassigned),
        AssignmentMode::Manual => {
            let assignee = schedule
                .custom_assignee(weekday_index(date))
                .map(str::to_string)
                .or_else(|| schedule.default_assigned_to.clone());
            match assignee {
                Some(user) => (Some(user), AssignmentType::Manual),
                None => (None, AssignmentType::Unassigned),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HorseContext, HorseFilter, RoutineStep, StepCategory};
    use crate::store::mocks::FaultInjectingStore;
    use crate::store::InMemoryStore;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn recurrence(start: NaiveDate, end: NaiveDate) -> Recurrence {
        Recurrence {
            start_date: start,
            end_date: end,
            repeat_pattern: RepeatPattern::Daily,
            repeat_days: vec![],
            include_holidays: false,
        }
    }

    #[test]
    fn test_recurrence_range_limits() {
        let mut ok = Validator::new();
        recurrence(date(2025, 1, 1), date(2025, 12, 31)).check_range(&mut ok, 366);
        assert!(ok.finish().is_ok());

        let mut reversed = Validator::new();
        recurrence(date(2025, 2, 1), date(2025, 1, 1)).check_range(&mut reversed, 366);
        assert!(reversed.finish().is_err());

        let mut too_long = Validator::new();
        recurrence(date(2025, 1, 1), date(2026, 1, 2)).check_range(&mut too_long, 366);
        assert!(too_long.finish().is_err());
    }

    fn template() -> RoutineTemplate {
        let now = Utc::now();
        RoutineTemplate {
            id: "t1".to_string(),
            organization_id: "org1".to_string(),
            stable_id: None,
            name: "Morning".to_string(),
            description: None,
            steps: vec![RoutineStep {
                id: "feed".to_string(),
                name: "Feed".to_string(),
                category: StepCategory::Feeding,
                description: None,
                horse_context: HorseContext::All,
                horse_filter: HorseFilter::default(),
                show_feeding: true,
                show_medication: false,
                show_blanket_status: false,
                show_horse_notes: false,
                requires_confirmation: false,
            }],
            estimated_duration: 45,
            points_value: 10,
            requires_notes_read: false,
            is_active: true,
            created_by: "boss".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn schedule(pattern: RepeatPattern, days: Vec<u8>, start: NaiveDate, end: NaiveDate) -> RoutineSchedule {
        let now = Utc::now();
        RoutineSchedule {
            id: "sch1".to_string(),
            organization_id: "org1".to_string(),
            stable_id: "s1".to_string(),
            template: template().snapshot(),
            name: None,
            start_date: start,
            end_date: end,
            repeat_pattern: pattern,
            repeat_days: days,
            include_holidays: false,
            scheduled_start_time: "07:00".to_string(),
            assignment_mode: AssignmentMode::Unassigned,
            default_assigned_to: None,
            custom_assignments: BTreeMap::new(),
            is_enabled: true,
            instances_generated: 0,
            created_by: "boss".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_custom_monday_wednesday_week() {
        let rule = Recurrence::from(&schedule(
            RepeatPattern::Custom,
            vec![1, 3],
            date(2025, 1, 6),
            date(2025, 1, 12),
        ));
        assert_eq!(
            rule.dates(&HolidayCalendar::default()),
            vec![date(2025, 1, 6), date(2025, 1, 8)]
        );
    }

    #[test]
    fn test_custom_pattern_includes_holidays_when_asked() {
        let mut s = schedule(RepeatPattern::Custom, vec![], date(2024, 12, 23), date(2024, 12, 27));
        s.include_holidays = true;
        assert_eq!(
            Recurrence::from(&s).dates(&HolidayCalendar::default()),
            vec![date(2024, 12, 24), date(2024, 12, 25), date(2024, 12, 26)]
        );
    }

    #[test]
    fn test_daily_and_weekly_rules() {
        let calendar = HolidayCalendar::default();
        let daily = schedule(RepeatPattern::Daily, vec![], date(2025, 1, 1), date(2025, 1, 3));
        assert_eq!(Recurrence::from(&daily).dates(&calendar).len(), 3);

        // 2025-01-01 is a Wednesday
        let weekly = schedule(RepeatPattern::Weekly, vec![], date(2025, 1, 1), date(2025, 1, 31));
        let dates = Recurrence::from(&weekly).dates(&calendar);
        assert_eq!(dates.len(), 5);
        assert!(dates.iter().all(|d| weekday_index(*d) == 3));
    }

    #[test]
    fn test_manual_assignment_prefers_weekday_override() {
        let expander = ScheduleExpander::new(
            Repository::new(Arc::new(InMemoryStore::new())),
            HolidayCalendar::default(),
        );
        let mut s = schedule(RepeatPattern::Daily, vec![], date(2025, 1, 6), date(2025, 1, 7));
        s.assignment_mode = AssignmentMode::Manual;
        s.default_assigned_to = Some("anna".to_string());
        s.custom_assignments.insert("2".to_string(), "bertil".to_string());

        let instances = expander.build_instances(&s, &template(), Utc::now());
        assert_eq!(instances[0].assigned_to.as_deref(), Some("anna"));
        assert_eq!(instances[1].assigned_to.as_deref(), Some("bertil"));
        assert_eq!(instances[1].assignment_type, AssignmentType::Manual);
        assert_eq!(instances[0].id, "sch1_2025-01-06");
        assert_eq!(instances[0].progress.steps_total, 1);
        assert_eq!(instances[0].status, InstanceStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_expand_is_idempotent_and_chunked() {
        let store = Arc::new(InMemoryStore::with_batch_limit(4));
        let expander = ScheduleExpander::new(Repository::new(store.clone()), HolidayCalendar::default());
        let s = schedule(RepeatPattern::Daily, vec![], date(2025, 1, 1), date(2025, 1, 10));

        let first = expander.expand(&s, &template(), Utc::now()).await.unwrap();
        assert_eq!(first.instances_generated, 10);
        assert!(first.is_complete());

        let second = expander.expand(&s, &template(), Utc::now()).await.unwrap();
        assert_eq!(second.instances_generated, 0);
        assert_eq!(second.skipped_existing, 10);
        assert_eq!(store.count(Collection::RoutineInstances).await, 10);
    }

    #[tokio::test]
    async fn test_partial_failure_is_reported_and_retry_fills_gaps() {
        let inner = Arc::new(InMemoryStore::with_batch_limit(3));
        let faulty = Arc::new(FaultInjectingStore::new(inner.clone()));
        faulty.fail_batches_after(1);
        let expander = ScheduleExpander::new(Repository::new(faulty.clone()), HolidayCalendar::default());
        let s = schedule(RepeatPattern::Daily, vec![], date(2025, 1, 1), date(2025, 1, 7));

        let report = expander.expand(&s, &template(), Utc::now()).await.unwrap();
        assert_eq!(report.instances_generated, 3);
        assert_eq!(report.failed_chunks, 2);
        assert!(report.error.is_some());

        faulty.heal();
        let retry = expander.expand(&s, &template(), Utc::now()).await.unwrap();
        assert_eq!(retry.skipped_existing, 3);
        assert_eq!(retry.instances_generated, 4);
        assert_eq!(inner.count(Collection::RoutineInstances).await, 7);
    }
}

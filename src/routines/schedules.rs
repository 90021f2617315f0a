use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::requests::{
    is_valid_time, CreateScheduleRequest, ToggleScheduleRequest, UpdateScheduleRequest,
};
use super::service::RoutineService;
use crate::access::{Caller, RequestAccess};
use crate::error::{RoutineError, Validator};
use crate::model::{RepeatPattern, RoutineSchedule, RoutineTemplate, Stable};
use crate::observability::engine_metrics;
use crate::schedule::{ExpansionReport, Recurrence};
use crate::store::{Collection, Direction, Filter, Query};
use crate::time_operation;

/// Result of creating a schedule. Instance generation failures do not undo
/// the schedule; they are reported in `generation_error`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleCreated {
    pub schedule: RoutineSchedule,
    pub instances_generated: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
}

impl RoutineService {
    pub async fn create_schedule(
        &self,
        caller: &Caller,
        request: CreateScheduleRequest,
    ) -> Result<ScheduleCreated, RoutineError> {
        let operation = async move {
            let access = self.request_access(caller);
            let stable = self.managed_stable(&access, &request.stable_id).await?;
            let template = self.templates.usable(&request.template_id, &stable).await?;

            let now = Utc::now();
            let mut schedule = RoutineSchedule {
                id: Uuid::new_v4().to_string(),
                organization_id: stable.organization_id.clone(),
                stable_id: stable.id.clone(),
                template: template.snapshot(),
                name: request.name,
                start_date: request.start_date,
                end_date: request.end_date,
                repeat_pattern: request.repeat_pattern,
                repeat_days: request.repeat_days,
                include_holidays: request.include_holidays,
                scheduled_start_time: request.scheduled_start_time,
                assignment_mode: request.assignment_mode,
                default_assigned_to: request.default_assigned_to,
                custom_assignments: request.custom_assignments,
                is_enabled: true,
                instances_generated: 0,
                created_by: caller.user_id.clone(),
                created_at: now,
                updated_at: now,
            };
            self.validate_schedule(&schedule, &stable).await?;
            self.repo.insert(&schedule).await?;
            info!(
                schedule_id = %schedule.id,
                stable_id = %schedule.stable_id,
                from = %schedule.start_date,
                to = %schedule.end_date,
                "Created routine schedule"
            );

            let report = self.generate(&mut schedule, &template).await;
            Ok(ScheduleCreated {
                instances_generated: report.instances_generated,
                generation_error: report.error,
                schedule,
            })
        };
        self.traced("create_schedule", None, caller, operation).await
    }

    pub async fn list_schedules(
        &self,
        caller: &Caller,
        stable_id: &str,
    ) -> Result<Vec<RoutineSchedule>, RoutineError> {
        let access = self.request_access(caller);
        let stable = self.visible_stable(&access, stable_id).await?;
        Ok(self
            .repo
            .find(
                Query::new(Collection::RoutineSchedules)
                    .filter(Filter::eq("stableId", stable.id.as_str()))
                    .order_by("startDate", Direction::Asc),
            )
            .await?)
    }

    pub async fn get_schedule(
        &self,
        caller: &Caller,
        schedule_id: &str,
    ) -> Result<RoutineSchedule, RoutineError> {
        let access = self.request_access(caller);
        self.visible_schedule(&access, schedule_id).await
    }

    /// Partial update. Instances already generated are left untouched.
    pub async fn update_schedule(
        &self,
        caller: &Caller,
        schedule_id: &str,
        request: UpdateScheduleRequest,
    ) -> Result<RoutineSchedule, RoutineError> {
        let operation = async move {
            let access = self.request_access(caller);
            let mut schedule = self.visible_schedule(&access, schedule_id).await?;
            let stable = self.managed_stable(&access, &schedule.stable_id).await?;

            if request.name.is_some() {
                schedule.name = request.name;
            }
            if let Some(end_date) = request.end_date {
                schedule.end_date = end_date;
            }
            if let Some(pattern) = request.repeat_pattern {
                schedule.repeat_pattern = pattern;
            }
            if let Some(days) = request.repeat_days {
                schedule.repeat_days = days;
            }
            if let Some(include) = request.include_holidays {
                schedule.include_holidays = include;
            }
            if let Some(time) = request.scheduled_start_time {
                schedule.scheduled_start_time = time;
            }
            if let Some(mode) = request.assignment_mode {
                schedule.assignment_mode = mode;
            }
            if request.default_assigned_to.is_some() {
                schedule.default_assigned_to = request.default_assigned_to;
            }
            if let Some(custom) = request.custom_assignments {
                schedule.custom_assignments = custom;
            }
            self.validate_schedule(&schedule, &stable).await?;

            schedule.updated_at = Utc::now();
            self.repo.save(&schedule).await?;
            info!(schedule_id = %schedule.id, "Updated routine schedule");
            Ok(schedule)
        };
        self.traced("update_schedule", None, caller, operation).await
    }

    pub async fn toggle_schedule(
        &self,
        caller: &Caller,
        schedule_id: &str,
        request: ToggleScheduleRequest,
    ) -> Result<RoutineSchedule, RoutineError> {
        let access = self.request_access(caller);
        let mut schedule = self.visible_schedule(&access, schedule_id).await?;
        self.managed_stable(&access, &schedule.stable_id).await?;

        schedule.is_enabled = request.is_enabled;
        schedule.updated_at = Utc::now();
        self.repo.save(&schedule).await?;
        info!(schedule_id = %schedule.id, enabled = schedule.is_enabled, "Toggled routine schedule");
        Ok(schedule)
    }

    /// Generate the instances of an enabled schedule that are still missing
    pub async fn regenerate_instances(
        &self,
        caller: &Caller,
        schedule_id: &str,
    ) -> Result<ExpansionReport, RoutineError> {
        let operation = async move {
            let access = self.request_access(caller);
            let mut schedule = self.visible_schedule(&access, schedule_id).await?;
            let stable = self.managed_stable(&access, &schedule.stable_id).await?;
            if !schedule.is_enabled {
                return Err(RoutineError::validation("isEnabled", "schedule is disabled"));
            }
            self.validate_schedule(&schedule, &stable).await?;
            let template = self
                .templates
                .usable(&schedule.template.template_id, &stable)
                .await?;
            Ok(self.generate(&mut schedule, &template).await)
        };
        self.traced("regenerate_instances", None, caller, operation).await
    }

    /// Expand and record the generated count on the schedule. Never fails the
    /// caller; problems are reported in the returned report.
    async fn generate(
        &self,
        schedule: &mut RoutineSchedule,
        template: &RoutineTemplate,
    ) -> ExpansionReport {
        let expanded = time_operation!(
            "expand_schedule",
            self.expander.expand(schedule, template, Utc::now()).await
        );
        let report = match expanded {
            Ok(report) => report,
            Err(e) => {
                engine_metrics().record_generation_failure();
                warn!(schedule_id = %schedule.id, error = %e, "Instance generation failed");
                return ExpansionReport {
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };
        if !report.is_complete() {
            warn!(
                schedule_id = %schedule.id,
                generated = report.instances_generated,
                failed_chunks = report.failed_chunks,
                "Instance generation incomplete"
            );
        }

        if report.instances_generated > 0 {
            schedule.instances_generated += report.instances_generated;
            schedule.updated_at = Utc::now();
            if let Err(e) = self.repo.save(&*schedule).await {
                warn!(schedule_id = %schedule.id, error = %e, "Failed to record generated count");
            }
        }
        report
    }

    async fn visible_schedule(
        &self,
        access: &RequestAccess,
        schedule_id: &str,
    ) -> Result<RoutineSchedule, RoutineError> {
        match self.repo.fetch::<RoutineSchedule>(schedule_id).await? {
            Some(schedule) if access.can_access_stable(&schedule.stable_id).await => Ok(schedule),
            _ => Err(RoutineError::not_found("routine schedule", schedule_id)),
        }
    }

    /// Stable the caller may manage schedules for. Invisible stables answer
    /// `NotFound`, visible ones without rights `Forbidden`.
    async fn managed_stable(
        &self,
        access: &RequestAccess,
        stable_id: &str,
    ) -> Result<Stable, RoutineError> {
        let stable = self.visible_stable(access, stable_id).await?;
        if access.can_manage_schedules(&stable.id).await {
            Ok(stable)
        } else {
            Err(RoutineError::forbidden("managing schedules requires schedule rights"))
        }
    }

    async fn validate_schedule(
        &self,
        schedule: &RoutineSchedule,
        stable: &Stable,
    ) -> Result<(), RoutineError> {
        let mut validator = Validator::new();
        Recurrence::from(schedule).check_range(&mut validator, self.settings.max_range_days);
        validator
            .check(
                is_valid_time(&schedule.scheduled_start_time),
                "scheduledStartTime",
                "expected HH:MM",
            )
            .check(
                schedule.repeat_days.iter().all(|day| *day <= 6),
                "repeatDays",
                "weekdays are numbered 0 (Sunday) to 6 (Saturday)",
            );
        if schedule.repeat_pattern == RepeatPattern::Custom {
            validator.check(
                !schedule.repeat_days.is_empty() || schedule.include_holidays,
                "repeatDays",
                "a custom schedule needs at least one weekday or holidays",
            );
        }
        check_weekday_keys(&mut validator, &schedule.custom_assignments);

        if let Some(user) = &schedule.default_assigned_to {
            if let Some(problem) = self.assignee_problem(stable, user).await? {
                validator.push("defaultAssignedTo", problem);
            }
        }
        for (day, user) in &schedule.custom_assignments {
            if let Some(problem) = self.assignee_problem(stable, user).await? {
                validator.push(&format!("customAssignments.{day}"), problem);
            }
        }
        validator.finish()
    }
}

fn check_weekday_keys(validator: &mut Validator, assignments: &BTreeMap<String, String>) {
    for day in assignments.keys() {
        if !matches!(day.parse::<u8>(), Ok(0..=6)) {
            validator.push(
                &format!("customAssignments.{day}"),
                "keys are weekdays 0 (Sunday) to 6 (Saturday)",
            );
        }
    }
}

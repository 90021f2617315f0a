//! Instance lifecycle operations.
//!
//! Every mutation is a read-modify-write against the instance's stored
//! version. A version conflict re-runs the whole operation from a fresh read
//! (guards included) until the retry budget is spent.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::history::ActivityHistoryRecorder;
use super::progress::{apply_step_update, force_complete, next_open_step};
use super::requests::{
    is_valid_time, AssignRequest, CancelRequest, CreateInstanceRequest, CreateTemplateRequest,
    ListInstancesQuery, StartInstanceRequest, StepProgressUpdate, UpdateTemplateRequest,
};
use super::selection::SelectionGate;
use super::state_machine::{transition, InstanceEvent};
use super::templates::TemplateStore;
use crate::access::{AccessResolver, Caller, RequestAccess};
use crate::config::StableRoutinesConfig;
use crate::error::{RoutineError, Validator};
use crate::horses::HorseResolver;
use crate::model::{
    AccessContext, ActivityHistoryEntry, AssignmentType, InstanceStatus, Notification,
    NotificationKind, RoutineInstance, RoutineProgress, RoutineTemplate, Stable,
};
use crate::observability::engine_metrics;
use crate::schedule::{HolidayCalendar, ScheduleExpander};
use crate::store::{
    Collection, DeleteGuard, Direction, Document, DocumentStore, Filter, IdentityProvider,
    NotificationSink, Query, Repository, StoreError, Versioned,
};
use crate::telemetry::{create_routine_span, generate_correlation_id};

/// Tunables taken from configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_conflict_retries: u32,
    pub max_range_days: i64,
    pub predicate_cache_capacity: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&StableRoutinesConfig::default())
    }
}

impl From<&StableRoutinesConfig> for EngineSettings {
    fn from(config: &StableRoutinesConfig) -> Self {
        Self {
            max_conflict_retries: config.store.max_conflict_retries,
            max_range_days: config.schedule.max_range_days,
            predicate_cache_capacity: config.access.predicate_cache_capacity,
        }
    }
}

/// Facade over the routine engine components
pub struct RoutineService {
    pub(super) repo: Repository,
    pub(super) access: AccessResolver,
    pub(super) horses: HorseResolver,
    pub(super) history: ActivityHistoryRecorder,
    pub(super) expander: ScheduleExpander,
    pub(super) selection: SelectionGate,
    pub(super) templates: TemplateStore,
    pub(super) identity: Arc<dyn IdentityProvider>,
    pub(super) notifications: Arc<dyn NotificationSink>,
    pub(super) settings: EngineSettings,
}

impl std::fmt::Debug for RoutineService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutineService")
            .field("settings", &self.settings)
            .finish()
    }
}

impl RoutineService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self::with_config(
            store,
            identity,
            notifications,
            &StableRoutinesConfig::default(),
        )
    }

    pub fn with_config(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        notifications: Arc<dyn NotificationSink>,
        config: &StableRoutinesConfig,
    ) -> Self {
        let repo = Repository::new(store);
        let settings = EngineSettings::from(config);
        let horses = HorseResolver::new(repo.clone());
        let calendar = HolidayCalendar::new(
            &config.schedule.holiday_region,
            config.schedule.extra_holidays.iter().copied(),
        );
        Self {
            access: AccessResolver::new(repo.clone())
                .with_cache_capacity(settings.predicate_cache_capacity),
            history: ActivityHistoryRecorder::new(repo.clone(), horses.clone()),
            expander: ScheduleExpander::new(repo.clone(), calendar),
            selection: SelectionGate::new(repo.clone()),
            templates: TemplateStore::new(repo.clone()),
            horses,
            repo,
            identity,
            notifications,
            settings,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn access_resolver(&self) -> &AccessResolver {
        &self.access
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn expander(&self) -> &ScheduleExpander {
        &self.expander
    }

    /// Per-request predicate view for `caller`
    pub fn request_access(&self, caller: &Caller) -> RequestAccess {
        self.access.for_request(caller)
    }

    pub async fn create_instance(
        &self,
        caller: &Caller,
        request: CreateInstanceRequest,
    ) -> Result<RoutineInstance, RoutineError> {
        let operation = async move {
            let access = self.request_access(caller);
            let stable = self.visible_stable(&access, &request.stable_id).await?;
            if !access.can_manage_schedules(&stable.id).await {
                return Err(RoutineError::forbidden(
                    "creating routine instances requires schedule rights",
                ));
            }
            Validator::new()
                .check(
                    is_valid_time(&request.scheduled_start_time),
                    "scheduledStartTime",
                    "expected HH:MM",
                )
                .finish()?;
            let template = self.templates.usable(&request.template_id, &stable).await?;
            if let Some(assignee) = &request.assigned_to {
                self.validate_assignee(&stable, assignee, "assignedTo").await?;
            }

            let now = Utc::now();
            let assigned = request.assigned_to.is_some();
            let instance = RoutineInstance {
                id: Uuid::new_v4().to_string(),
                template: template.snapshot(),
                organization_id: stable.organization_id.clone(),
                stable_id: stable.id.clone(),
                scheduled_date: request.scheduled_date,
                scheduled_start_time: request.scheduled_start_time,
                status: InstanceStatus::Scheduled,
                assignment_type: if assigned {
                    AssignmentType::Manual
                } else {
                    AssignmentType::Unassigned
                },
                assigned_by: assigned.then(|| caller.user_id.clone()),
                assigned_at: assigned.then_some(now),
                assigned_to: request.assigned_to,
                current_step_id: None,
                daily_notes_acknowledged: false,
                progress: RoutineProgress::from_steps(&template.steps),
                points_awarded: None,
                created_by: caller.user_id.clone(),
                created_at: now,
                started_by: None,
                started_at: None,
                completed_by: None,
                completed_at: None,
                cancelled_by: None,
                cancelled_at: None,
                cancellation_reason: None,
                updated_at: now,
            };
            self.repo.insert(&instance).await?;
            info!(instance_id = %instance.id, stable_id = %instance.stable_id, "Created routine instance");

            if let Some(assignee) = instance.assigned_to.as_deref() {
                if assignee != caller.user_id {
                    self.notify_assigned(&instance, assignee).await;
                }
            }
            Ok(instance)
        };
        self.traced("create_instance", None, caller, operation).await
    }

    pub async fn get_instance(
        &self,
        caller: &Caller,
        instance_id: &str,
    ) -> Result<RoutineInstance, RoutineError> {
        let access = self.request_access(caller);
        Ok(self.load_instance(&access, instance_id).await?.record)
    }

    /// Instances of a stable, ordered by date, optionally limited to a date range
    pub async fn list_instances(
        &self,
        caller: &Caller,
        query: &ListInstancesQuery,
    ) -> Result<Vec<RoutineInstance>, RoutineError> {
        let access = self.request_access(caller);
        let stable = self.visible_stable(&access, &query.stable_id).await?;

        let mut store_query = Query::new(Collection::RoutineInstances)
            .filter(Filter::eq("stableId", stable.id.as_str()))
            .order_by("scheduledDate", Direction::Asc);
        if let Some(from) = query.from {
            store_query = store_query.filter(Filter::gte("scheduledDate", from.to_string()));
        }
        if let Some(to) = query.to {
            store_query = store_query.filter(Filter::lte("scheduledDate", to.to_string()));
        }
        Ok(self.repo.find(store_query).await?)
    }

    pub async fn start(
        &self,
        caller: &Caller,
        instance_id: &str,
        request: StartInstanceRequest,
    ) -> Result<RoutineInstance, RoutineError> {
        let access = self.request_access(caller);
        let operation =
            self.retrying(instance_id, || self.try_start(&access, instance_id, &request));
        self.traced("start", Some(instance_id), caller, operation).await
    }

    async fn try_start(
        &self,
        access: &RequestAccess,
        instance_id: &str,
        request: &StartInstanceRequest,
    ) -> Result<RoutineInstance, RoutineError> {
        let caller = access.caller();
        let Versioned { version, record: mut instance } =
            self.load_instance(access, instance_id).await?;
        let next = transition(instance.status, InstanceEvent::Start)?;

        if let Some(assignee) = instance.assigned_to.as_deref() {
            if assignee != caller.user_id && !access.can_manage_schedules(&instance.stable_id).await {
                return Err(RoutineError::forbidden("routine is assigned to someone else"));
            }
        }
        if instance.template.requires_notes_read && !request.daily_notes_acknowledged {
            return Err(RoutineError::validation(
                "dailyNotesAcknowledged",
                "daily notes must be acknowledged before starting",
            ));
        }

        let now = Utc::now();
        if instance.assigned_to.is_none() {
            instance.assigned_to = Some(caller.user_id.clone());
            instance.assignment_type = AssignmentType::SelfBooked;
            instance.assigned_by = Some(caller.user_id.clone());
            instance.assigned_at = Some(now);
        }
        instance.status = next;
        instance.daily_notes_acknowledged = request.daily_notes_acknowledged;
        instance.current_step_id = next_open_step(&instance.template.steps, &instance.progress);
        instance.started_by = Some(caller.user_id.clone());
        instance.started_at = Some(now);
        instance.updated_at = now;

        self.repo.replace(&instance, version).await?;
        engine_metrics().record_transition();
        info!(instance_id = %instance.id, user_id = %caller.user_id, "Started routine instance");
        Ok(instance)
    }

    /// Merge a step update; a step finished by this update is written to
    /// activity history after the instance is saved. History failures are
    /// logged and dropped.
    pub async fn update_step_progress(
        &self,
        caller: &Caller,
        instance_id: &str,
        update: StepProgressUpdate,
    ) -> Result<RoutineInstance, RoutineError> {
        let access = self.request_access(caller);
        let operation = async move {
            let (instance, finished) = self
                .retrying(instance_id, || self.try_update_step(&access, instance_id, &update))
                .await?;

            if finished {
                if let Some(step_progress) = instance.progress.step_progress.get(&update.step_id) {
                    if let Err(e) = self
                        .history
                        .record(&instance, step_progress, &caller.user_id, Utc::now())
                        .await
                    {
                        engine_metrics().record_history_failure();
                        warn!(
                            instance_id = %instance.id,
                            step_id = %update.step_id,
                            error = %e,
                            "Activity history recording failed"
                        );
                    }
                }
            }
            Ok(instance)
        };
        self.traced("update_step_progress", Some(instance_id), caller, operation)
            .await
    }

    async fn try_update_step(
        &self,
        access: &RequestAccess,
        instance_id: &str,
        update: &StepProgressUpdate,
    ) -> Result<(RoutineInstance, bool), RoutineError> {
        let Versioned { version, record: mut instance } =
            self.load_instance(access, instance_id).await?;
        let next = transition(instance.status, InstanceEvent::RecordProgress)?;

        let step = instance
            .template
            .step(&update.step_id)
            .cloned()
            .filter(|_| instance.progress.step_progress.contains_key(&update.step_id))
            .ok_or_else(|| {
                RoutineError::validation("stepId", format!("unknown step {}", update.step_id))
            })?;
        let horses = self
            .horses
            .resolve_step_horses(&instance.stable_id, &step)
            .await?;

        let now = Utc::now();
        let change = apply_step_update(&mut instance.progress, update, &horses, now);
        debug!(
            instance_id = %instance.id,
            step_id = %update.step_id,
            from = ?change.previous,
            to = ?change.current,
            "Step progress merged"
        );

        instance.status = next;
        instance.current_step_id = next_open_step(&instance.template.steps, &instance.progress);
        instance.updated_at = now;
        self.repo.replace(&instance, version).await?;
        engine_metrics().record_transition();
        Ok((instance, change.finished))
    }

    pub async fn complete(
        &self,
        caller: &Caller,
        instance_id: &str,
    ) -> Result<RoutineInstance, RoutineError> {
        let access = self.request_access(caller);
        let operation = self.retrying(instance_id, || self.try_complete(&access, instance_id));
        self.traced("complete", Some(instance_id), caller, operation).await
    }

    async fn try_complete(
        &self,
        access: &RequestAccess,
        instance_id: &str,
    ) -> Result<RoutineInstance, RoutineError> {
        let caller = access.caller();
        let Versioned { version, record: mut instance } =
            self.load_instance(access, instance_id).await?;
        let next = transition(instance.status, InstanceEvent::Complete)?;

        let now = Utc::now();
        force_complete(&mut instance.progress);
        instance.status = next;
        instance.current_step_id = None;
        instance.completed_by = Some(caller.user_id.clone());
        instance.completed_at = Some(now);
        instance.points_awarded = Some(instance.template.points_value);
        instance.updated_at = now;

        self.repo.replace(&instance, version).await?;
        engine_metrics().record_transition();
        info!(
            instance_id = %instance.id,
            user_id = %caller.user_id,
            points = instance.template.points_value,
            "Completed routine instance"
        );
        Ok(instance)
    }

    pub async fn cancel(
        &self,
        caller: &Caller,
        instance_id: &str,
        request: CancelRequest,
    ) -> Result<RoutineInstance, RoutineError> {
        let access = self.request_access(caller);
        let operation = async move {
            let instance = self
                .retrying(instance_id, || self.try_cancel(&access, instance_id, &request))
                .await?;
            if let Some(assignee) = instance.assigned_to.as_deref() {
                if assignee != caller.user_id {
                    self.notify(
                        &instance,
                        assignee,
                        NotificationKind::RoutineCancelled,
                        "Routine cancelled",
                        format!(
                            "{} on {} was cancelled",
                            instance.template.template_name, instance.scheduled_date
                        ),
                    )
                    .await;
                }
            }
            Ok(instance)
        };
        self.traced("cancel", Some(instance_id), caller, operation).await
    }

    async fn try_cancel(
        &self,
        access: &RequestAccess,
        instance_id: &str,
        request: &CancelRequest,
    ) -> Result<RoutineInstance, RoutineError> {
        let caller = access.caller();
        let Versioned { version, record: mut instance } =
            self.load_instance(access, instance_id).await?;
        let next = transition(instance.status, InstanceEvent::Cancel)?;
        self.require_assignee_or_manager(access, &instance, "cancel").await?;

        let now = Utc::now();
        instance.status = next;
        instance.cancelled_by = Some(caller.user_id.clone());
        instance.cancelled_at = Some(now);
        instance.cancellation_reason = request.reason.clone();
        instance.updated_at = now;

        self.repo.replace(&instance, version).await?;
        engine_metrics().record_transition();
        info!(instance_id = %instance.id, user_id = %caller.user_id, "Cancelled routine instance");
        Ok(instance)
    }

    pub async fn restart(
        &self,
        caller: &Caller,
        instance_id: &str,
    ) -> Result<RoutineInstance, RoutineError> {
        let access = self.request_access(caller);
        let operation = self.retrying(instance_id, || self.try_restart(&access, instance_id));
        self.traced("restart", Some(instance_id), caller, operation).await
    }

    async fn try_restart(
        &self,
        access: &RequestAccess,
        instance_id: &str,
    ) -> Result<RoutineInstance, RoutineError> {
        let Versioned { version, record: mut instance } =
            self.load_instance(access, instance_id).await?;
        let next = transition(instance.status, InstanceEvent::Restart)?;
        self.require_assignee_or_manager(access, &instance, "restart").await?;

        instance.status = next;
        instance.cancelled_by = None;
        instance.cancelled_at = None;
        instance.cancellation_reason = None;
        instance.updated_at = Utc::now();

        self.repo.replace(&instance, version).await?;
        engine_metrics().record_transition();
        info!(instance_id = %instance.id, "Restarted routine instance");
        Ok(instance)
    }

    /// Hard delete, only while scheduled. The status is re-checked inside the
    /// delete transaction.
    pub async fn delete(&self, caller: &Caller, instance_id: &str) -> Result<(), RoutineError> {
        let operation = async move {
            let access = self.request_access(caller);
            let instance = self.load_instance(&access, instance_id).await?.record;
            if !access.can_manage_schedules(&instance.stable_id).await {
                return Err(RoutineError::forbidden(
                    "deleting routine instances requires schedule rights",
                ));
            }
            transition(instance.status, InstanceEvent::Delete)?;

            let guard: DeleteGuard = Box::new(|doc: &Document| {
                match doc.data.get("status").and_then(|s| s.as_str()) {
                    Some("scheduled") => Ok(()),
                    other => Err(format!("status is {}", other.unwrap_or("unknown"))),
                }
            });
            match self
                .repo
                .store()
                .delete_if(Collection::RoutineInstances, instance_id, guard)
                .await
            {
                Ok(()) => {
                    info!(instance_id, "Deleted routine instance");
                    Ok(())
                }
                Err(StoreError::PreconditionFailed { reason, .. }) => {
                    warn!(instance_id, reason = %reason, "Instance changed before delete");
                    match self.repo.fetch::<RoutineInstance>(instance_id).await? {
                        Some(current) => Err(RoutineError::InvalidState {
                            operation: InstanceEvent::Delete.operation(),
                            status: current.status,
                        }),
                        None => Err(RoutineError::not_found("routine instance", instance_id)),
                    }
                }
                Err(StoreError::NotFound { .. }) => {
                    Err(RoutineError::not_found("routine instance", instance_id))
                }
                Err(e) => Err(e.into()),
            }
        };
        self.traced("delete", Some(instance_id), caller, operation).await
    }

    /// Assign a scheduled instance. With an active selection process in the
    /// stable only the current turn holder may assign, and the pick is
    /// recorded against the process. Assigning someone else always needs
    /// schedule rights.
    pub async fn assign(
        &self,
        caller: &Caller,
        instance_id: &str,
        request: AssignRequest,
    ) -> Result<RoutineInstance, RoutineError> {
        let access = self.request_access(caller);
        let operation = async move {
            let (instance, process) = self
                .retrying(instance_id, || self.try_assign(&access, instance_id, &request))
                .await?;

            if let Some(process) = &process {
                if let Err(e) = self
                    .selection
                    .record_pick(process, &instance, &caller.user_id, Utc::now())
                    .await
                {
                    warn!(
                        instance_id = %instance.id,
                        process_id = %process.id,
                        error = %e,
                        "Failed to record selection pick"
                    );
                }
            }
            if request.assigned_to != caller.user_id {
                self.notify_assigned(&instance, &request.assigned_to).await;
            }
            Ok(instance)
        };
        self.traced("assign", Some(instance_id), caller, operation).await
    }

    async fn try_assign(
        &self,
        access: &RequestAccess,
        instance_id: &str,
        request: &AssignRequest,
    ) -> Result<(RoutineInstance, Option<crate::model::SelectionProcess>), RoutineError> {
        let caller = access.caller();
        let Versioned { version, record: mut instance } =
            self.load_instance(access, instance_id).await?;
        transition(instance.status, InstanceEvent::Assign)?;

        let process = self.selection.active_process(&instance.stable_id).await?;
        if let Some(process) = &process {
            SelectionGate::check_turn(process, &caller.user_id)?;
        }
        let self_booking = request.assigned_to == caller.user_id;
        if !self_booking && !access.can_manage_schedules(&instance.stable_id).await {
            return Err(RoutineError::forbidden(
                "assigning others requires schedule rights",
            ));
        }

        let stable = self
            .repo
            .fetch::<Stable>(&instance.stable_id)
            .await?
            .ok_or_else(|| RoutineError::not_found("stable", &instance.stable_id))?;
        self.validate_assignee(&stable, &request.assigned_to, "assignedTo")
            .await?;

        let now = Utc::now();
        instance.assigned_to = Some(request.assigned_to.clone());
        instance.assignment_type = if request.assigned_to == caller.user_id {
            AssignmentType::SelfBooked
        } else {
            AssignmentType::Manual
        };
        instance.assigned_by = Some(caller.user_id.clone());
        instance.assigned_at = Some(now);
        instance.updated_at = now;

        self.repo.replace(&instance, version).await?;
        info!(
            instance_id = %instance.id,
            assigned_to = %request.assigned_to,
            by = %caller.user_id,
            "Assigned routine instance"
        );
        Ok((instance, process))
    }

    pub async fn create_template(
        &self,
        caller: &Caller,
        request: CreateTemplateRequest,
    ) -> Result<RoutineTemplate, RoutineError> {
        let access = self.request_access(caller);
        let operation = self.templates.create(&access, request, Utc::now());
        self.traced("create_template", None, caller, operation).await
    }

    pub async fn update_template(
        &self,
        caller: &Caller,
        template_id: &str,
        request: UpdateTemplateRequest,
    ) -> Result<RoutineTemplate, RoutineError> {
        let access = self.request_access(caller);
        let operation = self.templates.update(&access, template_id, request, Utc::now());
        self.traced("update_template", None, caller, operation).await
    }

    pub async fn get_template(
        &self,
        caller: &Caller,
        template_id: &str,
    ) -> Result<RoutineTemplate, RoutineError> {
        let access = self.request_access(caller);
        self.templates.get(&access, template_id).await
    }

    /// Effective access of the caller to a horse
    pub async fn horse_access(
        &self,
        caller: &Caller,
        horse_id: &str,
    ) -> Result<AccessContext, RoutineError> {
        self.access
            .resolve(horse_id, &caller.user_id, caller.system_role)
            .await
            .ok_or_else(|| RoutineError::not_found("horse", horse_id))
    }

    /// Activity history of a horse as visible to the caller. Placement-based
    /// access hides entries dated before the placement.
    pub async fn horse_history(
        &self,
        caller: &Caller,
        horse_id: &str,
    ) -> Result<Vec<ActivityHistoryEntry>, RoutineError> {
        let context = self.horse_access(caller, horse_id).await?;
        let entries = self.history.entries_for_horse(horse_id).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| context.can_see_history_on(entry.scheduled_date))
            .collect())
    }

    pub(super) async fn traced<T, F>(
        &self,
        operation: &str,
        instance_id: Option<&str>,
        caller: &Caller,
        future: F,
    ) -> Result<T, RoutineError>
    where
        F: Future<Output = Result<T, RoutineError>>,
    {
        let span = create_routine_span(
            operation,
            instance_id,
            Some(&caller.user_id),
            &generate_correlation_id(),
        );
        let result = future.instrument(span.clone()).await;
        if let Err(e) = &result {
            span.in_scope(|| match e {
                RoutineError::Internal(source) => {
                    error!(operation, error = %source, "Routine operation failed")
                }
                other => debug!(operation, code = other.code(), error = %other, "Routine operation rejected"),
            });
        }
        result
    }

    async fn retrying<T, F, Fut>(&self, instance_id: &str, mut attempt: F) -> Result<T, RoutineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RoutineError>>,
    {
        let mut conflicts = 0;
        loop {
            match attempt().await {
                Err(RoutineError::Internal(e)) if e.is_version_conflict() => {
                    if conflicts >= self.settings.max_conflict_retries {
                        warn!(instance_id, conflicts, "Giving up after repeated version conflicts");
                        return Err(RoutineError::Conflict {
                            id: instance_id.to_string(),
                        });
                    }
                    conflicts += 1;
                    engine_metrics().record_conflict_retry();
                    debug!(instance_id, attempt = conflicts, "Version conflict, retrying");
                }
                other => return other,
            }
        }
    }

    /// Read an instance for a gated operation. Unreadable or invisible
    /// instances answer `NotFound`; store failures answer `Forbidden`.
    pub(super) async fn load_instance(
        &self,
        access: &RequestAccess,
        instance_id: &str,
    ) -> Result<Versioned<RoutineInstance>, RoutineError> {
        let loaded = gate_read(
            self.repo.fetch_versioned::<RoutineInstance>(instance_id).await,
            instance_id,
        )?;
        match loaded {
            Some(versioned) if access.can_access_stable(&versioned.record.stable_id).await => {
                Ok(versioned)
            }
            _ => Err(RoutineError::not_found("routine instance", instance_id)),
        }
    }

    /// Stable the caller may see, else `NotFound`
    pub(super) async fn visible_stable(
        &self,
        access: &RequestAccess,
        stable_id: &str,
    ) -> Result<Stable, RoutineError> {
        match gate_read(self.repo.fetch::<Stable>(stable_id).await, stable_id)? {
            Some(stable) if access.can_access_stable(&stable.id).await => Ok(stable),
            _ => Err(RoutineError::not_found("stable", stable_id)),
        }
    }

    async fn require_assignee_or_manager(
        &self,
        access: &RequestAccess,
        instance: &RoutineInstance,
        action: &str,
    ) -> Result<(), RoutineError> {
        if instance.is_assigned_to(&access.caller().user_id)
            || access.can_manage_schedules(&instance.stable_id).await
        {
            Ok(())
        } else {
            Err(RoutineError::forbidden(format!(
                "only the assignee or a schedule manager may {action} this routine"
            )))
        }
    }

    /// Reason `user_id` cannot be assigned work at `stable`, if any
    pub(super) async fn assignee_problem(
        &self,
        stable: &Stable,
        user_id: &str,
    ) -> Result<Option<&'static str>, RoutineError> {
        if !self.identity.user_exists(user_id).await? {
            return Ok(Some("unknown user"));
        }
        let member = self
            .access
            .member_with_stable_access(user_id, stable)
            .await?;
        Ok(member
            .is_none()
            .then_some("not an active member with access to this stable"))
    }

    async fn validate_assignee(
        &self,
        stable: &Stable,
        user_id: &str,
        field: &str,
    ) -> Result<(), RoutineError> {
        match self.assignee_problem(stable, user_id).await? {
            Some(problem) => Err(RoutineError::validation(field, problem)),
            None => Ok(()),
        }
    }

    async fn notify_assigned(&self, instance: &RoutineInstance, assignee: &str) {
        self.notify(
            instance,
            assignee,
            NotificationKind::RoutineAssigned,
            "Routine assigned",
            format!(
                "You have been assigned {} on {} at {}",
                instance.template.template_name,
                instance.scheduled_date,
                instance.scheduled_start_time
            ),
        )
        .await;
    }

    /// Fire-and-forget notification; failures are logged and dropped
    async fn notify(
        &self,
        instance: &RoutineInstance,
        user_id: &str,
        kind: NotificationKind,
        title: &str,
        message: String,
    ) {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            organization_id: instance.organization_id.clone(),
            kind,
            title: title.to_string(),
            message,
            instance_id: Some(instance.id.clone()),
            read: false,
            created_at: Utc::now(),
        };
        match self.notifications.send(notification).await {
            Ok(()) => engine_metrics().record_notification_sent(),
            Err(e) => {
                engine_metrics().record_notification_dropped();
                warn!(
                    instance_id = %instance.id,
                    user_id,
                    kind = ?kind,
                    error = %e,
                    "Notification could not be delivered"
                );
            }
        }
    }
}

/// Store failures while authorizing deny access instead of surfacing as 500s
fn gate_read<T>(result: Result<T, StoreError>, id: &str) -> Result<T, RoutineError> {
    result.map_err(|e| {
        warn!(id, error = %e, "Authorization read failed, denying");
        engine_metrics().record_access_denial();
        RoutineError::forbidden("access could not be verified")
    })
}

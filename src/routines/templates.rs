use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use super::requests::{CreateTemplateRequest, UpdateTemplateRequest};
use crate::access::RequestAccess;
use crate::error::{RoutineError, Validator};
use crate::model::{RoutineStep, RoutineTemplate, Stable};
use crate::store::Repository;

/// Routine template definitions
#[derive(Debug, Clone)]
pub struct TemplateStore {
    repo: Repository,
}

impl TemplateStore {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn create(
        &self,
        access: &RequestAccess,
        request: CreateTemplateRequest,
        now: DateTime<Utc>,
    ) -> Result<RoutineTemplate, RoutineError> {
        self.authorize(access, &request.organization_id, request.stable_id.as_deref())
            .await?;
        validate_definition(&request.name, &request.steps)?;

        let template = RoutineTemplate {
            id: Uuid::new_v4().to_string(),
            organization_id: request.organization_id,
            stable_id: request.stable_id,
            name: request.name,
            description: request.description,
            steps: with_step_ids(request.steps, false),
            estimated_duration: request.estimated_duration,
            points_value: request.points_value,
            requires_notes_read: request.requires_notes_read,
            is_active: true,
            created_by: access.caller().user_id.clone(),
            created_at: now,
            updated_at: now,
        };
        self.repo.insert(&template).await?;
        info!(template_id = %template.id, steps = template.steps.len(), "Created routine template");
        Ok(template)
    }

    /// Explicit edit. New steps always get fresh ids; instances already
    /// created keep their own snapshot.
    pub async fn update(
        &self,
        access: &RequestAccess,
        template_id: &str,
        request: UpdateTemplateRequest,
        now: DateTime<Utc>,
    ) -> Result<RoutineTemplate, RoutineError> {
        let mut template = self.visible(access, template_id).await?;
        self.authorize(access, &template.organization_id, template.stable_id.as_deref())
            .await?;

        if let Some(name) = request.name {
            template.name = name;
        }
        if request.description.is_some() {
            template.description = request.description;
        }
        if let Some(steps) = request.steps {
            template.steps = with_step_ids(steps, true);
        }
        if let Some(duration) = request.estimated_duration {
            template.estimated_duration = duration;
        }
        if let Some(points) = request.points_value {
            template.points_value = points;
        }
        if let Some(required) = request.requires_notes_read {
            template.requires_notes_read = required;
        }
        if let Some(active) = request.is_active {
            template.is_active = active;
        }
        validate_definition(&template.name, &template.steps)?;

        template.updated_at = now;
        self.repo.save(&template).await?;
        info!(template_id = %template.id, "Updated routine template");
        Ok(template)
    }

    /// Template readable by the caller
    pub async fn get(
        &self,
        access: &RequestAccess,
        template_id: &str,
    ) -> Result<RoutineTemplate, RoutineError> {
        self.visible(access, template_id).await
    }

    /// Active template usable at `stable_id`
    pub async fn usable(
        &self,
        template_id: &str,
        stable: &Stable,
    ) -> Result<RoutineTemplate, RoutineError> {
        let template = self
            .repo
            .fetch::<RoutineTemplate>(template_id)
            .await?
            .filter(|t| t.organization_id == stable.organization_id)
            .ok_or_else(|| RoutineError::not_found("routine template", template_id))?;
        Validator::new()
            .check(template.is_active, "templateId", "template is inactive")
            .check(
                template.applies_to_stable(&stable.id),
                "templateId",
                "template belongs to another stable",
            )
            .finish()?;
        Ok(template)
    }

    /// Fetch regardless of active flag
    async fn fetch(&self, template_id: &str) -> Result<RoutineTemplate, RoutineError> {
        self.repo
            .fetch::<RoutineTemplate>(template_id)
            .await?
            .ok_or_else(|| RoutineError::not_found("routine template", template_id))
    }

    async fn visible(
        &self,
        access: &RequestAccess,
        template_id: &str,
    ) -> Result<RoutineTemplate, RoutineError> {
        let template = self.fetch(template_id).await?;
        if access.has_organization_access(&template.organization_id).await {
            Ok(template)
        } else {
            Err(RoutineError::not_found("routine template", template_id))
        }
    }

    async fn authorize(
        &self,
        access: &RequestAccess,
        organization_id: &str,
        stable_id: Option<&str>,
    ) -> Result<(), RoutineError> {
        let allowed = match stable_id {
            Some(stable_id) => access.can_manage_schedules(stable_id).await,
            None => access.is_organization_admin(organization_id).await,
        };
        if allowed {
            Ok(())
        } else {
            Err(RoutineError::forbidden("managing routine templates requires schedule rights"))
        }
    }
}

fn with_step_ids(steps: Vec<RoutineStep>, regenerate: bool) -> Vec<RoutineStep> {
    steps
        .into_iter()
        .map(|mut step| {
            if regenerate || step.id.is_empty() {
                step.id = Uuid::new_v4().to_string();
            }
            step
        })
        .collect()
}

fn validate_definition(name: &str, steps: &[RoutineStep]) -> Result<(), RoutineError> {
    let mut validator = Validator::new();
    validator
        .check(!name.trim().is_empty(), "name", "must not be empty")
        .check(!steps.is_empty(), "steps", "a routine needs at least one step");
    for (index, step) in steps.iter().enumerate() {
        validator.check(
            !step.name.trim().is_empty(),
            &format!("steps[{index}].name"),
            "must not be empty",
        );
    }
    validator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessResolver, Caller};
    use crate::model::{HorseContext, HorseFilter, Organization, StepCategory};
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    fn step(id: &str) -> RoutineStep {
        RoutineStep {
            id: id.to_string(),
            name: "Muck out".to_string(),
            category: StepCategory::Mucking,
            description: None,
            horse_context: HorseContext::None,
            horse_filter: HorseFilter::default(),
            show_feeding: false,
            show_medication: false,
            show_blanket_status: false,
            show_horse_notes: false,
            requires_confirmation: false,
        }
    }

    async fn setup() -> (TemplateStore, RequestAccess) {
        let repo = Repository::new(Arc::new(InMemoryStore::new()));
        repo.insert(&Organization {
            id: "org1".to_string(),
            name: "Ridklubben".to_string(),
            owner_id: "boss".to_string(),
        })
        .await
        .unwrap();
        let access = AccessResolver::new(repo.clone()).for_request(&Caller::user("boss"));
        (TemplateStore::new(repo), access)
    }

    fn request(steps: Vec<RoutineStep>) -> CreateTemplateRequest {
        CreateTemplateRequest {
            organization_id: "org1".to_string(),
            stable_id: None,
            name: "Evening".to_string(),
            description: None,
            steps,
            estimated_duration: 30,
            points_value: 5,
            requires_notes_read: false,
        }
    }

    #[tokio::test]
    async fn test_create_fills_missing_step_ids() {
        let (store, access) = setup().await;
        let template = store
            .create(&access, request(vec![step(""), step("keep-me")]), Utc::now())
            .await
            .unwrap();

        assert!(!template.steps[0].id.is_empty());
        assert_eq!(template.steps[1].id, "keep-me");
    }

    #[tokio::test]
    async fn test_editing_steps_regenerates_every_id() {
        let (store, access) = setup().await;
        let template = store
            .create(&access, request(vec![step("a"), step("b")]), Utc::now())
            .await
            .unwrap();

        let updated = store
            .update(
                &access,
                &template.id,
                UpdateTemplateRequest {
                    steps: Some(template.steps.clone()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(updated.steps.len(), 2);
        assert!(updated.steps.iter().all(|s| s.id != "a" && s.id != "b"));
    }

    #[tokio::test]
    async fn test_empty_definition_is_rejected() {
        let (store, access) = setup().await;
        let result = store.create(&access, request(Vec::new()), Utc::now()).await;
        assert!(matches!(result, Err(RoutineError::ValidationFailed { .. })));
    }

    #[tokio::test]
    async fn test_non_member_cannot_create() {
        let (store, _) = setup().await;
        let repo = Repository::new(Arc::new(InMemoryStore::new()));
        let stranger = AccessResolver::new(repo).for_request(&Caller::user("stranger"));
        let result = store.create(&stranger, request(vec![step("a")]), Utc::now()).await;
        assert!(matches!(result, Err(RoutineError::Forbidden(_))));
    }
}

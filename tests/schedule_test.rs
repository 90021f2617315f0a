// Schedule creation, expansion and regeneration

mod fixtures;

use chrono::NaiveDate;
use fixtures::*;
use serde_json::{json, Value};

use stable_routines::model::{AssignmentType, MemberStatus, OrganizationMember, RoutineInstance};
use stable_routines::routines::{
    CreateScheduleRequest, ListInstancesQuery, ToggleScheduleRequest, UpdateScheduleRequest,
};
use stable_routines::schedule::schedule_instance_id;
use stable_routines::RoutineError;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn schedule_request(overrides: Value) -> CreateScheduleRequest {
    let mut body = json!({
        "templateId": TEMPLATE,
        "stableId": STABLE,
        "startDate": "2025-01-06",
        "endDate": "2025-01-19",
        "repeatPattern": "custom",
        "repeatDays": [1, 3],
        "scheduledStartTime": "17:00",
    });
    if let (Some(body), Some(overrides)) = (body.as_object_mut(), overrides.as_object()) {
        for (key, value) in overrides {
            body.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(body).unwrap()
}

async fn instances_between(world: &World, from: &str, to: &str) -> Vec<RoutineInstance> {
    world
        .service
        .list_instances(
            &caller(MANAGER),
            &ListInstancesQuery {
                stable_id: STABLE.to_string(),
                from: Some(date(from)),
                to: Some(date(to)),
            },
        )
        .await
        .unwrap()
}

fn invalid_fields(error: RoutineError) -> Vec<String> {
    match error {
        RoutineError::ValidationFailed { issues } => {
            issues.into_iter().map(|issue| issue.field).collect()
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_custom_weekdays_expand_and_regenerate_idempotently() {
    let world = World::new().await;
    let created = world
        .service
        .create_schedule(&caller(MANAGER), schedule_request(json!({})))
        .await
        .unwrap();
    assert_eq!(created.instances_generated, 4);
    assert!(created.generation_error.is_none());
    assert!(created.schedule.is_enabled);

    let days: Vec<_> = instances_between(&world, "2025-01-01", "2025-01-31")
        .await
        .iter()
        .map(|i| i.scheduled_date)
        .collect();
    assert_eq!(
        days,
        vec![
            date("2025-01-06"),
            date("2025-01-08"),
            date("2025-01-13"),
            date("2025-01-15")
        ]
    );

    let again = world
        .service
        .regenerate_instances(&caller(MANAGER), &created.schedule.id)
        .await
        .unwrap();
    assert_eq!(again.instances_generated, 0);
    assert_eq!(again.skipped_existing, 4);
    assert_eq!(instances_between(&world, "2025-01-01", "2025-01-31").await.len(), 4);

    let stored = world
        .service
        .get_schedule(&caller(GROOM), &created.schedule.id)
        .await
        .unwrap();
    assert_eq!(stored.instances_generated, 4);
}

#[tokio::test]
async fn test_holidays_only_schedule() {
    let world = World::new().await;
    let created = world
        .service
        .create_schedule(
            &caller(MANAGER),
            schedule_request(json!({
                "startDate": "2025-12-20",
                "endDate": "2025-12-31",
                "repeatDays": [],
                "includeHolidays": true,
            })),
        )
        .await
        .unwrap();

    let days: Vec<_> = instances_between(&world, "2025-12-01", "2025-12-31")
        .await
        .iter()
        .map(|i| i.scheduled_date)
        .collect();
    assert_eq!(created.instances_generated, 4);
    assert_eq!(
        days,
        vec![
            date("2025-12-24"),
            date("2025-12-25"),
            date("2025-12-26"),
            date("2025-12-31")
        ]
    );
}

#[tokio::test]
async fn test_weekly_without_days_uses_start_weekday() {
    let world = World::new().await;
    // 2025-02-05 is a Wednesday
    let created = world
        .service
        .create_schedule(
            &caller(MANAGER),
            schedule_request(json!({
                "startDate": "2025-02-05",
                "endDate": "2025-02-28",
                "repeatPattern": "weekly",
                "repeatDays": [],
            })),
        )
        .await
        .unwrap();
    assert_eq!(created.instances_generated, 4);
    let instances = instances_between(&world, "2025-02-01", "2025-02-28").await;
    assert!(instances.iter().all(|i| i.scheduled_date.format("%a").to_string() == "Wed"));
}

#[tokio::test]
async fn test_manual_assignment_per_weekday() {
    let world = World::new().await;
    let created = world
        .service
        .create_schedule(
            &caller(MANAGER),
            schedule_request(json!({
                "startDate": "2025-05-01",
                "endDate": "2025-05-07",
                "repeatPattern": "daily",
                "assignmentMode": "manual",
                "defaultAssignedTo": GROOM,
                "customAssignments": {"6": MANAGER},
            })),
        )
        .await
        .unwrap();
    assert_eq!(created.instances_generated, 7);

    // 2025-05-03 is a Saturday
    let saturday = world
        .service
        .get_instance(
            &caller(MANAGER),
            &schedule_instance_id(&created.schedule.id, date("2025-05-03")),
        )
        .await
        .unwrap();
    assert_eq!(saturday.assigned_to.as_deref(), Some(MANAGER));
    assert_eq!(saturday.assignment_type, AssignmentType::Manual);

    let friday = world
        .service
        .get_instance(
            &caller(GROOM),
            &schedule_instance_id(&created.schedule.id, date("2025-05-02")),
        )
        .await
        .unwrap();
    assert_eq!(friday.assigned_to.as_deref(), Some(GROOM));
    assert_eq!(friday.template.points_value, 10);
    assert_eq!(friday.progress.steps_total, 3);
}

#[tokio::test]
async fn test_unassigned_mode_leaves_instances_open() {
    let world = World::new().await;
    world
        .service
        .create_schedule(&caller(MANAGER), schedule_request(json!({})))
        .await
        .unwrap();
    let instances = instances_between(&world, "2025-01-01", "2025-01-31").await;
    assert!(instances
        .iter()
        .all(|i| i.assigned_to.is_none() && i.assignment_type == AssignmentType::Unassigned));
}

#[tokio::test]
async fn test_schedule_validation() {
    let world = World::new().await;
    let cases = [
        (json!({"endDate": "2025-01-01"}), "endDate"),
        (json!({"endDate": "2026-03-01"}), "endDate"),
        (json!({"repeatDays": []}), "repeatDays"),
        (json!({"repeatDays": [1, 7]}), "repeatDays"),
        (json!({"scheduledStartTime": "5pm"}), "scheduledStartTime"),
        (json!({"customAssignments": {"9": GROOM}}), "customAssignments.9"),
        (json!({"assignmentMode": "manual", "defaultAssignedTo": OUTSIDER}), "defaultAssignedTo"),
        (json!({"customAssignments": {"2": SOUTH_GROOM}}), "customAssignments.2"),
    ];

    for (overrides, field) in cases {
        let error = world
            .service
            .create_schedule(&caller(MANAGER), schedule_request(overrides.clone()))
            .await
            .unwrap_err();
        let fields = invalid_fields(error);
        assert!(
            fields.iter().any(|f| f == field),
            "{overrides} should flag {field}, got {fields:?}"
        );
    }

    let schedules = world.service.list_schedules(&caller(MANAGER), STABLE).await.unwrap();
    assert!(schedules.is_empty(), "rejected schedules are not stored");
}

#[tokio::test]
async fn test_inactive_template_rejected() {
    let world = World::new().await;
    let result = world
        .service
        .create_schedule(
            &caller(MANAGER),
            schedule_request(json!({"templateId": "tpl-retired"})),
        )
        .await;
    assert!(matches!(result, Err(RoutineError::ValidationFailed { .. })));
}

#[tokio::test]
async fn test_schedule_rights() {
    let world = World::new().await;
    let by_groom = world
        .service
        .create_schedule(&caller(GROOM), schedule_request(json!({})))
        .await;
    assert!(matches!(by_groom, Err(RoutineError::Forbidden(_))));

    let by_other_stable = world
        .service
        .create_schedule(&caller(SOUTH_GROOM), schedule_request(json!({})))
        .await;
    assert!(matches!(by_other_stable, Err(RoutineError::NotFound { .. })));

    let by_owner = world
        .service
        .create_schedule(&caller(OWNER), schedule_request(json!({})))
        .await;
    assert!(by_owner.is_ok());
}

#[tokio::test]
async fn test_disabled_schedule_does_not_regenerate() {
    let world = World::new().await;
    let created = world
        .service
        .create_schedule(&caller(MANAGER), schedule_request(json!({})))
        .await
        .unwrap();
    let id = created.schedule.id;

    let disabled = world
        .service
        .toggle_schedule(&caller(MANAGER), &id, ToggleScheduleRequest { is_enabled: false })
        .await
        .unwrap();
    assert!(!disabled.is_enabled);

    let result = world.service.regenerate_instances(&caller(MANAGER), &id).await;
    assert!(matches!(result, Err(RoutineError::ValidationFailed { .. })));

    world
        .service
        .toggle_schedule(&caller(MANAGER), &id, ToggleScheduleRequest { is_enabled: true })
        .await
        .unwrap();
    assert!(world.service.regenerate_instances(&caller(MANAGER), &id).await.is_ok());
}

#[tokio::test]
async fn test_regenerate_rechecks_assignee_membership() {
    let world = World::new().await;
    let created = world
        .service
        .create_schedule(
            &caller(MANAGER),
            schedule_request(json!({
                "startDate": "2025-01-06",
                "endDate": "2025-01-08",
                "repeatPattern": "daily",
                "assignmentMode": "manual",
                "defaultAssignedTo": GROOM,
            })),
        )
        .await
        .unwrap();
    assert_eq!(created.instances_generated, 3);
    let id = created.schedule.id;

    world
        .service
        .delete(&caller(MANAGER), &schedule_instance_id(&id, date("2025-01-07")))
        .await
        .unwrap();

    let key = OrganizationMember::key(GROOM, ORG);
    let mut membership: OrganizationMember = world.repo().fetch(&key).await.unwrap().unwrap();
    membership.status = MemberStatus::Expired;
    world.repo().save(&membership).await.unwrap();

    let result = world.service.regenerate_instances(&caller(MANAGER), &id).await;
    assert_eq!(invalid_fields(result.unwrap_err()), vec!["defaultAssignedTo".to_string()]);
    assert_eq!(instances_between(&world, "2025-01-06", "2025-01-08").await.len(), 2);
}

#[tokio::test]
async fn test_extending_schedule_generates_only_new_dates() {
    let world = World::new().await;
    let created = world
        .service
        .create_schedule(&caller(MANAGER), schedule_request(json!({})))
        .await
        .unwrap();
    let id = created.schedule.id;

    let updated = world
        .service
        .update_schedule(
            &caller(MANAGER),
            &id,
            UpdateScheduleRequest {
                end_date: Some(date("2025-01-26")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.end_date, date("2025-01-26"));
    assert_eq!(updated.repeat_days, vec![1, 3]);

    let report = world.service.regenerate_instances(&caller(MANAGER), &id).await.unwrap();
    assert_eq!(report.instances_generated, 2);
    assert_eq!(report.skipped_existing, 4);

    let schedule = world.service.get_schedule(&caller(MANAGER), &id).await.unwrap();
    assert_eq!(schedule.instances_generated, 6);
}

#[tokio::test]
async fn test_invalid_update_is_not_saved() {
    let world = World::new().await;
    let created = world
        .service
        .create_schedule(&caller(MANAGER), schedule_request(json!({})))
        .await
        .unwrap();
    let id = created.schedule.id;

    let result = world
        .service
        .update_schedule(
            &caller(MANAGER),
            &id,
            UpdateScheduleRequest {
                repeat_days: Some(vec![]),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(invalid_fields(result.unwrap_err()), vec!["repeatDays".to_string()]);

    let stored = world.service.get_schedule(&caller(MANAGER), &id).await.unwrap();
    assert_eq!(stored.repeat_days, vec![1, 3]);
}

#[tokio::test]
async fn test_schedules_hidden_from_other_stables() {
    let world = World::new().await;
    let created = world
        .service
        .create_schedule(&caller(MANAGER), schedule_request(json!({})))
        .await
        .unwrap();

    let result = world
        .service
        .get_schedule(&caller(SOUTH_GROOM), &created.schedule.id)
        .await;
    assert!(matches!(result, Err(RoutineError::NotFound { .. })));

    let listed = world.service.list_schedules(&caller(GROOM), STABLE).await.unwrap();
    assert_eq!(listed.len(), 1);
}

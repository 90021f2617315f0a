// Shared stable fixture for integration tests
#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use stable_routines::{
    Caller, InMemoryIdentityProvider, InMemoryStore, Repository, RoutineService,
    StoreNotificationSink,
};

pub const ORG: &str = "org-nord";
pub const STABLE: &str = "stable-norr";
pub const OTHER_STABLE: &str = "stable-syd";
pub const TEMPLATE: &str = "tpl-evening";

/// Organization owner, also an administrator member
pub const OWNER: &str = "olivia";
pub const MANAGER: &str = "mia";
pub const GROOM: &str = "gus";
/// Groom limited to the other stable
pub const SOUTH_GROOM: &str = "sam";
pub const INACTIVE: &str = "ina";
/// Exists in the identity provider but is not a member anywhere
pub const OUTSIDER: &str = "oskar";
/// Member of the organization a horse is placed with
pub const PLACEMENT_GROOM: &str = "pia";

pub struct World {
    pub store: Arc<InMemoryStore>,
    pub identity: Arc<InMemoryIdentityProvider>,
    pub service: Arc<RoutineService>,
}

impl World {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        store
            .load_fixture(&documents())
            .await
            .expect("fixture documents load");
        let identity = Arc::new(InMemoryIdentityProvider::with_users([
            OWNER,
            MANAGER,
            GROOM,
            SOUTH_GROOM,
            INACTIVE,
            OUTSIDER,
            PLACEMENT_GROOM,
        ]));
        let notifications = Arc::new(StoreNotificationSink::new(Repository::new(store.clone())));
        let service = Arc::new(RoutineService::new(
            store.clone(),
            identity.clone(),
            notifications,
        ));
        Self {
            store,
            identity,
            service,
        }
    }

    pub fn repo(&self) -> Repository {
        Repository::new(self.store.clone())
    }
}

pub fn caller(user: &str) -> Caller {
    Caller::user(user)
}

fn member(user: &str, roles: &[&str], stables: Option<&[&str]>, status: &str) -> Value {
    json!({
        "id": format!("{user}_{ORG}"),
        "userId": user,
        "organizationId": ORG,
        "status": status,
        "roles": roles,
        "stableAccess": if stables.is_some() { "specific" } else { "all" },
        "assignedStableIds": stables.unwrap_or_default(),
    })
}

fn documents() -> BTreeMap<String, Vec<Value>> {
    let now = "2025-01-01T08:00:00Z";
    BTreeMap::from([
        (
            "organizations".to_string(),
            vec![
                json!({"id": ORG, "name": "Nordens Ridklubb", "ownerId": OWNER}),
                json!({"id": "org-host", "name": "Värdstallet", "ownerId": "harald"}),
            ],
        ),
        (
            "stables".to_string(),
            vec![
                json!({"id": STABLE, "name": "Norrgården", "organizationId": ORG, "ownerId": OWNER}),
                json!({"id": OTHER_STABLE, "name": "Södergården", "organizationId": ORG, "ownerId": OWNER}),
            ],
        ),
        (
            "organizationMembers".to_string(),
            vec![
                member(OWNER, &["administrator"], None, "active"),
                member(MANAGER, &["schedule_manager"], None, "active"),
                member(GROOM, &["groom"], None, "active"),
                member(SOUTH_GROOM, &["groom"], Some(&[OTHER_STABLE]), "active"),
                member(INACTIVE, &["groom"], None, "expired"),
                json!({
                    "id": format!("{PLACEMENT_GROOM}_org-host"),
                    "userId": PLACEMENT_GROOM,
                    "organizationId": "org-host",
                    "status": "active",
                    "roles": ["groom"],
                }),
            ],
        ),
        (
            "horses".to_string(),
            vec![
                json!({
                    "id": "h-blixten",
                    "name": "Blixten",
                    "ownerOrganizationId": ORG,
                    "placementOrganizationId": "org-host",
                    "placementDate": "2025-03-01",
                    "currentStableId": STABLE,
                    "status": "active",
                    "currentBlanket": "lightweight",
                }),
                json!({"id": "h-stjarna", "name": "Stjärna", "currentStableId": STABLE, "status": "active"}),
                json!({"id": "h-vega", "name": "Vega", "currentStableId": STABLE, "status": "inactive"}),
                json!({"id": "h-saga", "name": "Saga", "currentStableId": OTHER_STABLE, "status": "active"}),
            ],
        ),
        (
            "horseGroups".to_string(),
            vec![json!({"id": "g-paddock", "stableId": STABLE, "name": "Paddock A", "horseIds": ["h-blixten"]})],
        ),
        (
            "horseFeedings".to_string(),
            vec![
                json!({
                    "id": "f1", "horseId": "h-blixten", "feedType": "Hay", "quantity": 4.5,
                    "unit": "kg", "feedingTime": "evening", "isActive": true
                }),
                json!({
                    "id": "f2", "horseId": "h-blixten", "feedType": "Oats", "quantity": 1.0,
                    "unit": "kg", "feedingTime": "evening", "isActive": false
                }),
            ],
        ),
        (
            "routineTemplates".to_string(),
            vec![
                json!({
                    "id": TEMPLATE,
                    "organizationId": ORG,
                    "name": "Evening stable",
                    "steps": [
                        {"id": "feed", "name": "Evening feed", "category": "feeding",
                         "horseContext": "all", "showFeeding": true},
                        {"id": "blankets", "name": "Blankets", "category": "blanket",
                         "horseContext": "groups", "horseFilter": {"groupIds": ["g-paddock"]},
                         "showBlanketStatus": true},
                        {"id": "muck", "name": "Muck out", "category": "mucking", "horseContext": "none"}
                    ],
                    "estimatedDuration": 45,
                    "pointsValue": 10,
                    "requiresNotesRead": false,
                    "isActive": true,
                    "createdBy": OWNER,
                    "createdAt": now,
                    "updatedAt": now,
                }),
                json!({
                    "id": "tpl-retired",
                    "organizationId": ORG,
                    "name": "Old morning",
                    "steps": [{"id": "x", "name": "Feed", "category": "feeding"}],
                    "estimatedDuration": 20,
                    "pointsValue": 5,
                    "isActive": false,
                    "createdBy": OWNER,
                    "createdAt": now,
                    "updatedAt": now,
                }),
                json!({
                    "id": "tpl-notes",
                    "organizationId": ORG,
                    "name": "Vet day",
                    "steps": [{"id": "check", "name": "Health check", "category": "health_check"}],
                    "estimatedDuration": 30,
                    "pointsValue": 8,
                    "requiresNotesRead": true,
                    "isActive": true,
                    "createdBy": OWNER,
                    "createdAt": now,
                    "updatedAt": now,
                }),
            ],
        ),
    ])
}

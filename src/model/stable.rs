// Organizations, stables, horses and the care data attached to them

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::{Collection, Record};

/// Platform-wide role carried by the authenticated identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SystemRole {
    SystemAdmin,
    StableOwner,
    #[default]
    StableUser,
}

impl SystemRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system_admin" => Some(SystemRole::SystemAdmin),
            "stable_owner" => Some(SystemRole::StableOwner),
            "stable_user" => Some(SystemRole::StableUser),
            _ => None,
        }
    }
}

/// Role a member holds inside an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationRole {
    Administrator,
    ScheduleManager,
    Veterinarian,
    Dentist,
    Farrier,
    Groom,
    Rider,
    Customer,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Pending,
    Active,
    Expired,
}

/// Which stables of the organization a member may see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StableAccess {
    #[default]
    All,
    Specific,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub owner_id: String,
}

impl Record for Organization {
    const COLLECTION: Collection = Collection::Organizations;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Membership of a user in an organization, keyed by `{userId}_{organizationId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationMember {
    pub id: String,
    pub user_id: String,
    pub organization_id: String,
    pub status: MemberStatus,
    #[serde(default)]
    pub roles: Vec<OrganizationRole>,
    #[serde(default)]
    pub stable_access: StableAccess,
    #[serde(default)]
    pub assigned_stable_ids: Vec<String>,
}

impl OrganizationMember {
    pub fn key(user_id: &str, organization_id: &str) -> String {
        format!("{user_id}_{organization_id}")
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }

    pub fn has_role(&self, role: OrganizationRole) -> bool {
        self.roles.contains(&role)
    }

    /// Whether the member's stable scope covers `stable_id`
    pub fn covers_stable(&self, stable_id: &str) -> bool {
        match self.stable_access {
            StableAccess::All => true,
            StableAccess::Specific => self.assigned_stable_ids.iter().any(|s| s == stable_id),
        }
    }
}

impl Record for OrganizationMember {
    const COLLECTION: Collection = Collection::OrganizationMembers;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stable {
    pub id: String,
    pub name: String,
    pub organization_id: String,
    pub owner_id: String,
}

impl Record for Stable {
    const COLLECTION: Collection = Collection::Stables;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HorseStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Horse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub owner_organization_id: Option<String>,
    #[serde(default)]
    pub placement_organization_id: Option<String>,
    #[serde(default)]
    pub placement_date: Option<NaiveDate>,
    #[serde(default)]
    pub current_stable_id: Option<String>,
    #[serde(default)]
    pub status: HorseStatus,
    /// Blanket currently on the horse, if any
    #[serde(default)]
    pub current_blanket: Option<String>,
}

impl Horse {
    pub fn is_active(&self) -> bool {
        self.status == HorseStatus::Active
    }
}

impl Record for Horse {
    const COLLECTION: Collection = Collection::Horses;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Named group of horses within a stable; the membership index used by
/// `groups` step selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorseGroup {
    pub id: String,
    pub stable_id: String,
    pub name: String,
    #[serde(default)]
    pub horse_ids: Vec<String>,
}

impl Record for HorseGroup {
    const COLLECTION: Collection = Collection::HorseGroups;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorseFeeding {
    pub id: String,
    pub horse_id: String,
    pub feed_type: String,
    pub quantity: f64,
    pub unit: String,
    /// Feeding slot such as `"morning"` or `"07:00"`
    pub feeding_time: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Record for HorseFeeding {
    const COLLECTION: Collection = Collection::HorseFeedings;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorseMedication {
    pub id: String,
    pub horse_id: String,
    pub name: String,
    pub dosage: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Record for HorseMedication {
    const COLLECTION: Collection = Collection::HorseMedications;

    fn id(&self) -> &str {
        &self.id
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_roles_decode_as_other() {
        let member: OrganizationMember = serde_json::from_value(json!({
            "id": "u1_o1",
            "userId": "u1",
            "organizationId": "o1",
            "status": "active",
            "roles": ["groom", "stable_hand"],
        }))
        .unwrap();

        assert_eq!(
            member.roles,
            vec![OrganizationRole::Groom, OrganizationRole::Other]
        );
        assert_eq!(member.stable_access, StableAccess::All);
    }

    #[test]
    fn test_specific_stable_access_requires_assignment() {
        let member = OrganizationMember {
            id: OrganizationMember::key("u1", "o1"),
            user_id: "u1".to_string(),
            organization_id: "o1".to_string(),
            status: MemberStatus::Active,
            roles: vec![OrganizationRole::Rider],
            stable_access: StableAccess::Specific,
            assigned_stable_ids: vec!["s1".to_string()],
        };
        assert!(member.covers_stable("s1"));
        assert!(!member.covers_stable("s2"));
    }
}

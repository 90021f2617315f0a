//! Access resolution: who may see and act on a horse or stable.
//!
//! Resolution fails closed. A store error while resolving is logged and
//! treated as "no access", never surfaced as an internal error.

pub mod predicates;

use tracing::{debug, warn};

use crate::model::{
    AccessContext, AccessLevel, AccessSource, Horse, Organization, OrganizationMember,
    OrganizationRole, Stable, StableAccess, SystemRole,
};
use crate::observability::engine_metrics;
use crate::store::{Repository, StoreError};

pub use predicates::RequestAccess;

/// The authenticated identity behind a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub system_role: SystemRole,
}

impl Caller {
    pub fn new(user_id: &str, system_role: SystemRole) -> Self {
        Self {
            user_id: user_id.to_string(),
            system_role,
        }
    }

    pub fn user(user_id: &str) -> Self {
        Self::new(user_id, SystemRole::StableUser)
    }

    pub fn is_system_admin(&self) -> bool {
        self.system_role == SystemRole::SystemAdmin
    }
}

/// Map organization roles to an access level. First match wins.
pub fn access_level_for(
    system_role: SystemRole,
    owns_context: bool,
    roles: &[OrganizationRole],
) -> AccessLevel {
    if system_role == SystemRole::SystemAdmin || owns_context {
        return AccessLevel::Management;
    }
    if roles.contains(&OrganizationRole::Administrator) {
        return AccessLevel::Management;
    }
    if roles.iter().any(|r| {
        matches!(
            r,
            OrganizationRole::Veterinarian | OrganizationRole::Dentist | OrganizationRole::Farrier
        )
    }) {
        return AccessLevel::Professional;
    }
    if roles.iter().any(|r| {
        matches!(
            r,
            OrganizationRole::Groom | OrganizationRole::Rider | OrganizationRole::Customer
        )
    }) {
        return AccessLevel::BasicCare;
    }
    AccessLevel::Public
}

#[derive(Debug, Clone)]
pub struct AccessResolver {
    repo: Repository,
    cache_capacity: u64,
}

impl AccessResolver {
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            cache_capacity: predicates::DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Size of the per-request predicate cache
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity.max(1);
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Per-request predicate view for `caller`
    pub fn for_request(&self, caller: &Caller) -> RequestAccess {
        RequestAccess::new(self.clone(), caller.clone(), self.cache_capacity)
    }

    /// Effective access of `user_id` to a horse, or `None` when the user has
    /// no relationship to it (or the lookup failed).
    pub async fn resolve(
        &self,
        horse_id: &str,
        user_id: &str,
        system_role: SystemRole,
    ) -> Option<AccessContext> {
        match self.try_resolve(horse_id, user_id, system_role).await {
            Ok(context) => {
                if context.is_none() {
                    engine_metrics().record_access_denial();
                }
                context
            }
            Err(e) => {
                warn!(horse_id, user_id, error = %e, "Access resolution failed, denying access");
                engine_metrics().record_access_denial();
                None
            }
        }
    }

    async fn try_resolve(
        &self,
        horse_id: &str,
        user_id: &str,
        system_role: SystemRole,
    ) -> Result<Option<AccessContext>, StoreError> {
        let Some(horse) = self.repo.fetch::<Horse>(horse_id).await? else {
            return Ok(None);
        };

        let context = |level: AccessLevel,
                       source: AccessSource,
                       roles: Vec<OrganizationRole>,
                       stable_access: StableAccess| AccessContext {
            horse_id: horse.id.clone(),
            user_id: user_id.to_string(),
            access_level: level,
            access_source: source,
            is_owner: level == AccessLevel::Owner,
            organization_roles: roles,
            stable_access,
            placement_date: None,
        };

        if horse.owner_id.as_deref() == Some(user_id) {
            debug!(horse_id, user_id, "Access via direct ownership");
            return Ok(Some(context(
                AccessLevel::Owner,
                AccessSource::Ownership,
                Vec::new(),
                StableAccess::All,
            )));
        }

        if let Some(org_id) = horse.owner_organization_id.as_deref() {
            if let Some(member) = self.active_membership(user_id, org_id).await? {
                let owns = self.owns_organization(user_id, org_id).await?;
                let level = access_level_for(system_role, owns, &member.roles);
                return Ok(Some(context(
                    level,
                    AccessSource::Ownership,
                    member.roles,
                    member.stable_access,
                )));
            }
        }

        if let Some(org_id) = horse.placement_organization_id.as_deref() {
            if let Some(member) = self.active_membership(user_id, org_id).await? {
                let owns = self.owns_organization(user_id, org_id).await?;
                let level = access_level_for(system_role, owns, &member.roles);
                let mut placed = context(
                    level,
                    AccessSource::Placement,
                    member.roles,
                    member.stable_access,
                );
                placed.placement_date = horse.placement_date;
                return Ok(Some(placed));
            }
        }

        if let Some(stable_id) = horse.current_stable_id.as_deref() {
            if let Some(stable) = self.repo.fetch::<Stable>(stable_id).await? {
                if let Some(member) = self
                    .active_membership(user_id, &stable.organization_id)
                    .await?
                {
                    if member.covers_stable(stable_id) {
                        let owns = stable.owner_id == user_id;
                        let level = access_level_for(system_role, owns, &member.roles);
                        return Ok(Some(context(
                            level,
                            AccessSource::Stable,
                            member.roles,
                            member.stable_access,
                        )));
                    }
                }
            }
        }

        if system_role == SystemRole::SystemAdmin {
            return Ok(Some(context(
                AccessLevel::Management,
                AccessSource::Stable,
                Vec::new(),
                StableAccess::All,
            )));
        }

        Ok(None)
    }

    /// Active membership of `user_id` in `organization_id`, if any
    pub async fn active_membership(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Option<OrganizationMember>, StoreError> {
        let key = OrganizationMember::key(user_id, organization_id);
        Ok(self
            .repo
            .fetch::<OrganizationMember>(&key)
            .await?
            .filter(OrganizationMember::is_active))
    }

    pub async fn owns_organization(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .repo
            .fetch::<Organization>(organization_id)
            .await?
            .map(|org| org.owner_id == user_id)
            .unwrap_or(false))
    }

    /// Whether `user_id` is an active member whose stable scope covers `stable`
    pub async fn member_with_stable_access(
        &self,
        user_id: &str,
        stable: &Stable,
    ) -> Result<Option<OrganizationMember>, StoreError> {
        Ok(self
            .active_membership(user_id, &stable.organization_id)
            .await?
            .filter(|member| member.covers_stable(&stable.id)))
    }
}

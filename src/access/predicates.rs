// Per-request stable and organization predicates, memoized for the request

use moka::future::Cache;
use tracing::{debug, warn};

use super::{AccessResolver, Caller};
use crate::model::{Organization, OrganizationRole, Stable};
use crate::store::StoreError;

pub const DEFAULT_CACHE_CAPACITY: u64 = 256;

/// Access predicates evaluated on behalf of one caller.
///
/// Answers are cached for the lifetime of this value, which is one request.
/// Store failures answer `false`.
#[derive(Debug, Clone)]
pub struct RequestAccess {
    resolver: AccessResolver,
    caller: Caller,
    cache: Cache<String, bool>,
}

impl RequestAccess {
    pub fn new(resolver: AccessResolver, caller: Caller, capacity: u64) -> Self {
        Self {
            resolver,
            caller,
            cache: Cache::builder().max_capacity(capacity).build(),
        }
    }

    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn resolver(&self) -> &AccessResolver {
        &self.resolver
    }

    /// Active member covering the stable, stable owner or organization owner
    pub async fn can_access_stable(&self, stable_id: &str) -> bool {
        self.cached(format!("stable:{stable_id}"), self.stable_role_check(stable_id, None))
            .await
    }

    /// Stable owner, organization owner or administrator covering the stable
    pub async fn can_manage_stable(&self, stable_id: &str) -> bool {
        self.cached(
            format!("manage:{stable_id}"),
            self.stable_role_check(stable_id, Some(&[OrganizationRole::Administrator][..])),
        )
        .await
    }

    /// As [`can_manage_stable`](Self::can_manage_stable), plus schedule managers
    pub async fn can_manage_schedules(&self, stable_id: &str) -> bool {
        self.cached(
            format!("schedules:{stable_id}"),
            self.stable_role_check(
                stable_id,
                Some(&[
                    OrganizationRole::Administrator,
                    OrganizationRole::ScheduleManager,
                ][..]),
            ),
        )
        .await
    }

    pub async fn has_organization_access(&self, organization_id: &str) -> bool {
        self.cached(
            format!("org:{organization_id}"),
            self.organization_check(organization_id, None),
        )
        .await
    }

    pub async fn is_organization_admin(&self, organization_id: &str) -> bool {
        self.cached(
            format!("org-admin:{organization_id}"),
            self.organization_check(organization_id, Some(OrganizationRole::Administrator)),
        )
        .await
    }

    async fn organization_check(
        &self,
        organization_id: &str,
        role: Option<OrganizationRole>,
    ) -> Result<bool, StoreError> {
        if self.owns_organization(organization_id).await? {
            return Ok(true);
        }
        Ok(self
            .resolver
            .active_membership(&self.caller.user_id, organization_id)
            .await?
            .is_some_and(|m| role.map_or(true, |role| m.has_role(role))))
    }

    /// `roles` of `None` only requires stable coverage
    async fn stable_role_check(
        &self,
        stable_id: &str,
        roles: Option<&[OrganizationRole]>,
    ) -> Result<bool, StoreError> {
        let Some(stable) = self.load_stable(stable_id).await? else {
            return Ok(false);
        };
        if stable.owner_id == self.caller.user_id {
            return Ok(true);
        }
        if self.owns_organization(&stable.organization_id).await? {
            return Ok(true);
        }
        Ok(self
            .resolver
            .member_with_stable_access(&self.caller.user_id, &stable)
            .await?
            .is_some_and(|m| roles.map_or(true, |roles| roles.iter().any(|r| m.has_role(*r)))))
    }

    async fn load_stable(&self, stable_id: &str) -> Result<Option<Stable>, StoreError> {
        self.resolver.repository().fetch::<Stable>(stable_id).await
    }

    async fn owns_organization(&self, organization_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .resolver
            .repository()
            .fetch::<Organization>(organization_id)
            .await?
            .is_some_and(|org| org.owner_id == self.caller.user_id))
    }

    async fn cached<F>(&self, key: String, check: F) -> bool
    where
        F: std::future::Future<Output = Result<bool, StoreError>>,
    {
        if self.caller.is_system_admin() {
            return true;
        }
        if let Some(answer) = self.cache.get(&key).await {
            debug!(key = %key, answer, "Access predicate cache hit");
            return answer;
        }

        let answer = match check.await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(
                    key = %key,
                    user_id = %self.caller.user_id,
                    error = %e,
                    "Access predicate failed, denying"
                );
                false
            }
        };
        self.cache.insert(key, answer).await;
        answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemberStatus, OrganizationMember, StableAccess, SystemRole};
    use crate::store::mocks::FaultInjectingStore;
    use crate::store::{Collection, InMemoryStore, Repository};
    use std::sync::Arc;

    async fn fixture(store: Arc<InMemoryStore>) -> Repository {
        let repo = Repository::new(store);
        repo.insert(&Organization {
            id: "org1".to_string(),
            name: "Hästgården".to_string(),
            owner_id: "boss".to_string(),
        })
        .await
        .unwrap();
        for id in ["s1", "s2"] {
            repo.insert(&Stable {
                id: id.to_string(),
                name: id.to_string(),
                organization_id: "org1".to_string(),
                owner_id: "boss".to_string(),
            })
            .await
            .unwrap();
        }
        repo.insert(&OrganizationMember {
            id: OrganizationMember::key("planner", "org1"),
            user_id: "planner".to_string(),
            organization_id: "org1".to_string(),
            status: MemberStatus::Active,
            roles: vec![OrganizationRole::ScheduleManager],
            stable_access: StableAccess::Specific,
            assigned_stable_ids: vec!["s1".to_string()],
        })
        .await
        .unwrap();
        repo
    }

    #[tokio::test]
    async fn test_schedule_manager_scoped_to_assigned_stables() {
        let repo = fixture(Arc::new(InMemoryStore::new())).await;
        let access = AccessResolver::new(repo).for_request(&Caller::user("planner"));

        assert!(access.can_access_stable("s1").await);
        assert!(!access.can_access_stable("s2").await);
        assert!(access.can_manage_schedules("s1").await);
        assert!(!access.can_manage_schedules("s2").await);
        assert!(!access.can_manage_stable("s1").await);
        assert!(access.has_organization_access("org1").await);
        assert!(!access.is_organization_admin("org1").await);
    }

    #[tokio::test]
    async fn test_owner_and_system_admin_short_circuit() {
        let repo = fixture(Arc::new(InMemoryStore::new())).await;
        let resolver = AccessResolver::new(repo);

        let owner = resolver.for_request(&Caller::user("boss"));
        assert!(owner.can_manage_stable("s2").await);
        assert!(owner.is_organization_admin("org1").await);

        let admin = resolver.for_request(&Caller::new("root", SystemRole::SystemAdmin));
        assert!(admin.can_manage_schedules("missing-stable").await);

        let stranger = resolver.for_request(&Caller::user("nobody"));
        assert!(!stranger.can_access_stable("s1").await);
    }

    #[tokio::test]
    async fn test_answers_are_memoized_per_request() {
        let inner = Arc::new(InMemoryStore::new());
        let faulty = Arc::new(FaultInjectingStore::new(inner.clone()));
        fixture(inner).await;
        let access =
            AccessResolver::new(Repository::new(faulty.clone())).for_request(&Caller::user("planner"));

        assert!(access.can_access_stable("s1").await);
        faulty.fail_reads(Collection::Stables);
        assert!(access.can_access_stable("s1").await);
        assert!(!access.can_access_stable("s2").await);
    }
}

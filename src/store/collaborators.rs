// Identity provider and notification sink seams

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;
use tracing::debug;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::{Repository, StoreError};
use crate::model::Notification;

/// Source of truth for whether a user identity exists
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn user_exists(&self, user_id: &str) -> Result<bool, StoreError>;
}

/// Fire-and-forget delivery of notification documents
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), StoreError>;
}

/// Identity provider backed by a fixed user set
#[derive(Debug, Default)]
pub struct InMemoryIdentityProvider {
    users: RwLock<HashSet<String>>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: RwLock::new(users.into_iter().map(Into::into).collect()),
        }
    }

    pub fn add_user(&self, user_id: &str) {
        if let Ok(mut users) = self.users.write() {
            users.insert(user_id.to_string());
        }
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn user_exists(&self, user_id: &str) -> Result<bool, StoreError> {
        let users = self
            .users
            .read()
            .map_err(|_| StoreError::Unavailable("identity registry poisoned".to_string()))?;
        Ok(users.contains(user_id))
    }
}

/// Writes notifications into the notifications collection
#[derive(Debug, Clone)]
pub struct StoreNotificationSink {
    repo: Repository,
}

impl StoreNotificationSink {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl NotificationSink for StoreNotificationSink {
    async fn send(&self, notification: Notification) -> Result<(), StoreError> {
        debug!(
            user_id = %notification.user_id,
            kind = ?notification.kind,
            "Writing notification"
        );
        self.repo.insert(&notification).await.map(|_| ())
    }
}

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::{Collection, Document, DocumentStore, Query, StoreError};

/// A typed record that lives in exactly one collection
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
}

/// A decoded record together with the version it was read at
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub version: u64,
    pub record: T,
}

/// Typed facade over a [`DocumentStore`].
///
/// Documents are decoded exactly once here; a document that does not match
/// its record shape is rejected with [`StoreError::Decode`].
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("batch_limit", &self.store.batch_limit())
            .finish()
    }
}

impl Repository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn decode<T: Record>(doc: Document) -> Result<T, StoreError> {
        serde_json::from_value(doc.data).map_err(|e| StoreError::Decode {
            collection: T::COLLECTION,
            id: doc.id,
            reason: e.to_string(),
        })
    }

    pub fn encode<T: Record>(record: &T) -> Result<Value, StoreError> {
        Ok(serde_json::to_value(record)?)
    }

    pub async fn fetch<T: Record>(&self, id: &str) -> Result<Option<T>, StoreError> {
        Ok(self
            .fetch_versioned::<T>(id)
            .await?
            .map(|versioned| versioned.record))
    }

    pub async fn fetch_versioned<T: Record>(
        &self,
        id: &str,
    ) -> Result<Option<Versioned<T>>, StoreError> {
        match self.store.get(T::COLLECTION, id).await? {
            Some(doc) => {
                let version = doc.version;
                Ok(Some(Versioned {
                    version,
                    record: Self::decode(doc)?,
                }))
            }
            None => Ok(None),
        }
    }

    pub async fn fetch_many<T: Record>(&self, ids: &[String]) -> Result<Vec<T>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.store
            .get_all(T::COLLECTION, ids)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    pub async fn find<T: Record>(&self, query: Query) -> Result<Vec<T>, StoreError> {
        debug_assert_eq!(query.collection, T::COLLECTION);
        self.store
            .query(&query)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    pub async fn find_versioned<T: Record>(
        &self,
        query: Query,
    ) -> Result<Vec<Versioned<T>>, StoreError> {
        self.store
            .query(&query)
            .await?
            .into_iter()
            .map(|doc| {
                let version = doc.version;
                Self::decode(doc).map(|record| Versioned { version, record })
            })
            .collect()
    }

    /// Insert a new record; fails if the id is already taken
    pub async fn insert<T: Record>(&self, record: &T) -> Result<u64, StoreError> {
        let doc = self
            .store
            .create(T::COLLECTION, record.id(), Self::encode(record)?)
            .await?;
        Ok(doc.version)
    }

    /// Insert or overwrite unconditionally
    pub async fn save<T: Record>(&self, record: &T) -> Result<u64, StoreError> {
        let doc = self
            .store
            .set(T::COLLECTION, record.id(), Self::encode(record)?)
            .await?;
        Ok(doc.version)
    }

    /// Overwrite only if the stored version is still `expected_version`
    pub async fn replace<T: Record>(
        &self,
        record: &T,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let doc = self
            .store
            .update(
                T::COLLECTION,
                record.id(),
                Self::encode(record)?,
                Some(expected_version),
            )
            .await?;
        Ok(doc.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Horse;
    use crate::store::InMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_malformed_document_is_rejected_at_boundary() {
        let store = Arc::new(InMemoryStore::new());
        store
            .create(Collection::Horses, "h1", json!({"id": "h1", "name": 42}))
            .await
            .unwrap();
        let repo = Repository::new(store);

        let result = repo.fetch::<Horse>("h1").await;
        match result {
            Err(StoreError::Decode { collection, id, .. }) => {
                assert_eq!(collection, Collection::Horses);
                assert_eq!(id, "h1");
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }
}

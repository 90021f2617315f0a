// Fault-injecting store for exercising fail-closed and best-effort paths

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::{
    BatchOp, Collection, DeleteGuard, Document, DocumentStore, InMemoryStore, Query, StoreError,
};

/// Wraps an [`InMemoryStore`] and fails selected operations on demand.
#[derive(Debug, Default)]
pub struct FaultInjectingStore {
    inner: Arc<InMemoryStore>,
    failing_reads: Mutex<HashSet<Collection>>,
    failing_writes: Mutex<HashSet<Collection>>,
    failing_batches_after: Mutex<Option<usize>>,
    committed_batches: Mutex<usize>,
    pending_conflicts: Mutex<u32>,
    write_before_delete: Mutex<Option<(Collection, String, Value)>>,
}

impl FaultInjectingStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn inner(&self) -> &Arc<InMemoryStore> {
        &self.inner
    }

    pub fn fail_reads(&self, collection: Collection) {
        self.failing_reads.lock().unwrap().insert(collection);
    }

    pub fn fail_writes(&self, collection: Collection) {
        self.failing_writes.lock().unwrap().insert(collection);
    }

    /// Let the first `count` batch commits succeed and fail every later one
    pub fn fail_batches_after(&self, count: usize) {
        *self.failing_batches_after.lock().unwrap() = Some(count);
    }

    /// Answer the next `count` versioned updates as if another writer got there first
    pub fn conflict_next_updates(&self, count: u32) {
        *self.pending_conflicts.lock().unwrap() = count;
    }

    /// Overwrite a document right before the next guarded delete, as a
    /// concurrent writer landing between read and delete would
    pub fn write_before_next_delete(&self, collection: Collection, id: &str, data: Value) {
        *self.write_before_delete.lock().unwrap() = Some((collection, id.to_string(), data));
    }

    pub fn heal(&self) {
        self.failing_reads.lock().unwrap().clear();
        self.failing_writes.lock().unwrap().clear();
        *self.failing_batches_after.lock().unwrap() = None;
        *self.pending_conflicts.lock().unwrap() = 0;
        *self.write_before_delete.lock().unwrap() = None;
    }

    fn check_read(&self, collection: Collection) -> Result<(), StoreError> {
        if self.failing_reads.lock().unwrap().contains(&collection) {
            return Err(StoreError::Unavailable(format!(
                "injected read failure on {collection}"
            )));
        }
        Ok(())
    }

    fn check_write(&self, collection: Collection) -> Result<(), StoreError> {
        if self.failing_writes.lock().unwrap().contains(&collection) {
            return Err(StoreError::Unavailable(format!(
                "injected write failure on {collection}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FaultInjectingStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        self.check_read(collection)?;
        self.inner.get(collection, id).await
    }

    async fn get_all(
        &self,
        collection: Collection,
        ids: &[String],
    ) -> Result<Vec<Document>, StoreError> {
        self.check_read(collection)?;
        self.inner.get_all(collection, ids).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.check_read(query.collection)?;
        self.inner.query(query).await
    }

    async fn create(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Document, StoreError> {
        self.check_write(collection)?;
        self.inner.create(collection, id, data).await
    }

    async fn set(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Document, StoreError> {
        self.check_write(collection)?;
        self.inner.set(collection, id, data).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
        expected_version: Option<u64>,
    ) -> Result<Document, StoreError> {
        self.check_write(collection)?;
        if let Some(expected) = expected_version {
            let mut pending = self.pending_conflicts.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                return Err(StoreError::VersionConflict {
                    collection,
                    id: id.to_string(),
                    expected,
                    actual: expected + 1,
                });
            }
        }
        self.inner.update(collection, id, data, expected_version).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.check_write(collection)?;
        self.inner.delete(collection, id).await
    }

    async fn commit_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        {
            let limit = *self.failing_batches_after.lock().unwrap();
            let mut committed = self.committed_batches.lock().unwrap();
            if let Some(limit) = limit {
                if *committed >= limit {
                    return Err(StoreError::Unavailable(
                        "injected batch failure".to_string(),
                    ));
                }
            }
            *committed += 1;
        }
        self.inner.commit_batch(ops).await
    }

    async fn delete_if(
        &self,
        collection: Collection,
        id: &str,
        guard: DeleteGuard,
    ) -> Result<(), StoreError> {
        self.check_write(collection)?;
        let interleaved = self.write_before_delete.lock().unwrap().take();
        if let Some((target, target_id, data)) = interleaved {
            self.inner.set(target, &target_id, data).await?;
        }
        self.inner.delete_if(collection, id, guard).await
    }

    fn batch_limit(&self) -> usize {
        self.inner.batch_limit()
    }
}

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    BatchOp, Collection, DeleteGuard, Direction, Document, DocumentStore, Filter, FilterOp, Query,
    StoreError,
};

/// Default per-batch write limit, matching hosted document stores
pub const DEFAULT_BATCH_LIMIT: usize = 500;

type Table = BTreeMap<String, Document>;

/// In-process document store used by the `serve` command and the test suite.
///
/// All writes take the single write lock, so batch commits and the
/// delete transaction are atomic with respect to every other operation.
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<Collection, Table>>,
    batch_limit: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_batch_limit(DEFAULT_BATCH_LIMIT)
    }

    pub fn with_batch_limit(batch_limit: usize) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            batch_limit: batch_limit.max(1),
        }
    }

    /// Number of documents currently held in a collection
    pub async fn count(&self, collection: Collection) -> usize {
        self.tables
            .read()
            .await
            .get(&collection)
            .map(|table| table.len())
            .unwrap_or(0)
    }

    /// Bulk-load fixture documents keyed by collection name. Every document
    /// needs a string `id` field.
    pub async fn load_fixture(
        &self,
        documents: &BTreeMap<String, Vec<Value>>,
    ) -> Result<usize, StoreError> {
        let mut tables = self.tables.write().await;
        let mut loaded = 0;
        for (name, docs) in documents {
            let collection = Collection::from_name(name).ok_or_else(|| {
                StoreError::Unavailable(format!("unknown collection {name}"))
            })?;
            let table = tables.entry(collection).or_default();
            for data in docs {
                let id = data
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| StoreError::Decode {
                        collection,
                        id: String::new(),
                        reason: "fixture document without string id".to_string(),
                    })?
                    .to_string();
                let version = Self::next_version(table.get(&id));
                table.insert(
                    id.clone(),
                    Document {
                        id,
                        version,
                        data: data.clone(),
                    },
                );
                loaded += 1;
            }
        }
        debug!(documents = loaded, "Loaded fixture documents");
        Ok(loaded)
    }

    fn next_version(existing: Option<&Document>) -> u64 {
        existing.map(|doc| doc.version + 1).unwrap_or(1)
    }
}

/// Resolve a dotted field path inside a JSON document
pub(crate) fn field_value<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(data, |current, segment| current.get(segment))
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        _ => None,
    }
}

fn matches_filter(data: &Value, filter: &Filter) -> bool {
    let Some(actual) = field_value(data, &filter.field) else {
        return false;
    };

    match filter.op {
        FilterOp::Eq => actual == &filter.value,
        FilterOp::In => filter
            .value
            .as_array()
            .map(|candidates| candidates.contains(actual))
            .unwrap_or(false),
        FilterOp::ArrayContains => actual
            .as_array()
            .map(|items| items.contains(&filter.value))
            .unwrap_or(false),
        FilterOp::Gte => matches!(
            compare_values(actual, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lte => matches!(
            compare_values(actual, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.get(&collection).and_then(|t| t.get(id)).cloned())
    }

    async fn get_all(
        &self,
        collection: Collection,
        ids: &[String],
    ) -> Result<Vec<Document>, StoreError> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&collection) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| table.get(id)).cloned().collect())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let mut docs: Vec<Document> = table
            .values()
            .filter(|doc| query.filters.iter().all(|f| matches_filter(&doc.data, f)))
            .cloned()
            .collect();

        if let Some((field, direction)) = &query.order_by {
            docs.sort_by(|a, b| {
                let left = field_value(&a.data, field).unwrap_or(&Value::Null);
                let right = field_value(&b.data, field).unwrap_or(&Value::Null);
                let ordering = compare_values(left, right)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id));
                match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        debug!(
            collection = %query.collection,
            filters = query.filters.len(),
            matched = docs.len(),
            "In-memory query"
        );
        Ok(docs.into_iter().skip(query.offset).take(limit).collect())
    }

    async fn create(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Document, StoreError> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();
        if table.contains_key(id) {
            return Err(StoreError::AlreadyExists {
                collection,
                id: id.to_string(),
            });
        }
        let doc = Document {
            id: id.to_string(),
            version: 1,
            data,
        };
        table.insert(id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn set(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Document, StoreError> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();
        let doc = Document {
            id: id.to_string(),
            version: Self::next_version(table.get(id)),
            data,
        };
        table.insert(id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
        expected_version: Option<u64>,
    ) -> Result<Document, StoreError> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();
        let Some(existing) = table.get(id) else {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        };

        if let Some(expected) = expected_version {
            if existing.version != expected {
                return Err(StoreError::VersionConflict {
                    collection,
                    id: id.to_string(),
                    expected,
                    actual: existing.version,
                });
            }
        }

        let doc = Document {
            id: id.to_string(),
            version: existing.version + 1,
            data,
        };
        table.insert(id.to_string(), doc.clone());
        Ok(doc)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(table) = tables.get_mut(&collection) {
            table.remove(id);
        }
        Ok(())
    }

    async fn commit_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        if ops.len() > self.batch_limit {
            return Err(StoreError::BatchTooLarge {
                size: ops.len(),
                limit: self.batch_limit,
            });
        }

        let mut tables = self.tables.write().await;

        // Validate everything before touching any table
        for op in &ops {
            if let BatchOp::Create { collection, id, .. } = op {
                let exists = tables
                    .get(collection)
                    .map(|t| t.contains_key(id))
                    .unwrap_or(false);
                if exists {
                    return Err(StoreError::AlreadyExists {
                        collection: *collection,
                        id: id.clone(),
                    });
                }
            }
        }

        for op in ops {
            match op {
                BatchOp::Create {
                    collection,
                    id,
                    data,
                }
                | BatchOp::Set {
                    collection,
                    id,
                    data,
                } => {
                    let table = tables.entry(collection).or_default();
                    let version = Self::next_version(table.get(&id));
                    table.insert(id.clone(), Document { id, version, data });
                }
                BatchOp::Delete { collection, id } => {
                    if let Some(table) = tables.get_mut(&collection) {
                        table.remove(&id);
                    }
                }
            }
        }

        Ok(())
    }

    async fn delete_if(
        &self,
        collection: Collection,
        id: &str,
        guard: DeleteGuard,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();
        let Some(current) = table.get(id) else {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        };

        guard(current).map_err(|reason| StoreError::PreconditionFailed {
            collection,
            id: id.to_string(),
            reason,
        })?;

        table.remove(id);
        Ok(())
    }

    fn batch_limit(&self) -> usize {
        self.batch_limit
    }
}

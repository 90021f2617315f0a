//! Document store abstraction and the external collaborators the engine consumes.
//!
//! The engine never talks to a concrete database. It is handed an
//! `Arc<dyn DocumentStore>` per service instance, plus an identity provider
//! and a notification sink. Records are decoded once, here, through
//! [`Repository`]; nothing above this module touches raw JSON documents.

pub mod collaborators;
pub mod error;
pub mod memory;
pub mod repository;

#[cfg(any(test, feature = "testing"))]
pub mod mocks;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub use collaborators::{
    IdentityProvider, InMemoryIdentityProvider, NotificationSink, StoreNotificationSink,
};
pub use error::StoreError;
pub use memory::InMemoryStore;
pub use repository::{Record, Repository, Versioned};

/// Collections the engine reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    Organizations,
    OrganizationMembers,
    Stables,
    Horses,
    HorseGroups,
    HorseFeedings,
    HorseMedications,
    RoutineTemplates,
    RoutineSchedules,
    RoutineInstances,
    ActivityHistory,
    SelectionProcesses,
    SelectionEntries,
    Notifications,
}

impl Collection {
    pub const ALL: [Collection; 14] = [
        Collection::Organizations,
        Collection::OrganizationMembers,
        Collection::Stables,
        Collection::Horses,
        Collection::HorseGroups,
        Collection::HorseFeedings,
        Collection::HorseMedications,
        Collection::RoutineTemplates,
        Collection::RoutineSchedules,
        Collection::RoutineInstances,
        Collection::ActivityHistory,
        Collection::SelectionProcesses,
        Collection::SelectionEntries,
        Collection::Notifications,
    ];

    /// Look a collection up by its stored name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Organizations => "organizations",
            Collection::OrganizationMembers => "organizationMembers",
            Collection::Stables => "stables",
            Collection::Horses => "horses",
            Collection::HorseGroups => "horseGroups",
            Collection::HorseFeedings => "horseFeedings",
            Collection::HorseMedications => "horseMedications",
            Collection::RoutineTemplates => "routineTemplates",
            Collection::RoutineSchedules => "routineSchedules",
            Collection::RoutineInstances => "routineInstances",
            Collection::ActivityHistory => "horseActivityHistory",
            Collection::SelectionProcesses => "selectionProcesses",
            Collection::SelectionEntries => "selectionProcessEntries",
            Collection::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored document with its optimistic-concurrency version
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub version: u64,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    In,
    ArrayContains,
    Gte,
    Lte,
}

/// A single field predicate. Field paths are dotted (`"progress.stepsTotal"`).
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: &str, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }

    pub fn one_of(field: &str, values: &[String]) -> Self {
        Self::new(
            field,
            FilterOp::In,
            Value::Array(values.iter().cloned().map(Value::String).collect()),
        )
    }

    pub fn array_contains(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::ArrayContains, value)
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Gte, value)
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOp::Lte, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: Collection,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: None,
            limit: None,
            offset: 0,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// One write inside an atomic batch commit
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Create {
        collection: Collection,
        id: String,
        data: Value,
    },
    Set {
        collection: Collection,
        id: String,
        data: Value,
    },
    Delete {
        collection: Collection,
        id: String,
    },
}

/// Guard evaluated inside a delete transaction against the freshly read document.
/// Returning `Err(reason)` aborts the delete.
pub type DeleteGuard = Box<dyn FnOnce(&Document) -> Result<(), String> + Send>;

/// Document store primitives: get/query, single writes, atomic batches and a
/// read-then-delete transaction.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError>;

    /// Fetch several documents by id; missing ids are omitted from the result
    async fn get_all(
        &self,
        collection: Collection,
        ids: &[String],
    ) -> Result<Vec<Document>, StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Insert a new document, failing with `AlreadyExists` if the id is taken
    async fn create(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Document, StoreError>;

    /// Insert or overwrite unconditionally
    async fn set(&self, collection: Collection, id: &str, data: Value)
        -> Result<Document, StoreError>;

    /// Overwrite an existing document. With `expected_version` the write only
    /// happens if the stored version still matches.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
        expected_version: Option<u64>,
    ) -> Result<Document, StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    /// Apply all operations atomically or none of them
    async fn commit_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError>;

    /// Transaction: re-read the document, run `guard`, delete only if it passes
    async fn delete_if(
        &self,
        collection: Collection,
        id: &str,
        guard: DeleteGuard,
    ) -> Result<(), StoreError>;

    /// Maximum number of operations accepted by one `commit_batch`
    fn batch_limit(&self) -> usize;
}

//! DocumentStore port - Interface for the document database.
//!
//! The persistence engine behind this port is an external collaborator.
//! The core consumes generic CRUD/query/batch/transaction primitives and
//! addresses nested collections with `"{parent}/{parent_id}/{sub}"` string
//! paths (see [`subcollection_path`]).
//!
//! Write semantics the core relies on:
//! - `create` is a set: an existing document with the same id is replaced.
//!   This is what makes redundant status batch-writes under at-least-once
//!   event delivery harmless upserts.
//! - `update` patches top-level fields and fails with `NotFound` when the
//!   document is absent.
//! - `batch_write` groups independent mutations; cross-document atomicity
//!   is only as strong as the underlying store.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value as JsonValue;

/// Errors surfaced by document store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The addressed document does not exist.
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// The payload could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The backing store rejected or failed the operation.
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// True when the error is the benign absent-document case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// A stored document: its id within the collection plus the JSON body.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub data: JsonValue,
}

/// Comparison operator for a field filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// A single field predicate. Fields are addressed by top-level key.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: JsonValue,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }
}

/// Sort directive for queries.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

/// Query parameters for `find`/`find_with_pagination`/`count`.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<FieldFilter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A page of results plus the total match count before limit/offset.
#[derive(Debug, Clone)]
pub struct Page {
    pub documents: Vec<Document>,
    pub total: u64,
}

/// One mutation inside a batch write.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Create {
        collection: String,
        id: String,
        data: JsonValue,
    },
    Update {
        collection: String,
        id: String,
        data: JsonValue,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// Read/write surface available inside `run_transaction`.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;
    async fn create(
        &mut self,
        collection: &str,
        id: &str,
        data: JsonValue,
    ) -> Result<(), StoreError>;
    async fn update(
        &mut self,
        collection: &str,
        id: &str,
        data: JsonValue,
    ) -> Result<(), StoreError>;
    async fn delete(&mut self, collection: &str, id: &str) -> Result<(), StoreError>;
}

/// Transaction body: staged reads/writes that commit atomically on `Ok`
/// and are discarded on `Err`.
pub type TransactionFn =
    Box<dyn for<'t> FnOnce(&'t mut dyn StoreTransaction) -> BoxFuture<'t, Result<(), StoreError>> + Send>;

/// Port for the document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Set a document (replaces any existing document with the same id).
    async fn create(&self, collection: &str, id: &str, data: JsonValue) -> Result<(), StoreError>;

    /// Fetch a document by id. Absence is `Ok(None)`, not an error.
    async fn find_by_id(&self, collection: &str, id: &str)
        -> Result<Option<Document>, StoreError>;

    /// Patch top-level fields of an existing document.
    async fn update(&self, collection: &str, id: &str, data: JsonValue) -> Result<(), StoreError>;

    /// Delete a document. Deleting an absent document is a no-op.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Query a collection.
    async fn find(&self, collection: &str, query: Query) -> Result<Vec<Document>, StoreError>;

    /// Query with a total count for pagination.
    async fn find_with_pagination(
        &self,
        collection: &str,
        query: Query,
    ) -> Result<Page, StoreError>;

    /// Count matching documents.
    async fn count(&self, collection: &str, filters: &[FieldFilter]) -> Result<u64, StoreError>;

    /// Submit multiple independent mutations together.
    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Run reads and writes against a single aggregate atomically.
    async fn run_transaction(&self, tx: TransactionFn) -> Result<(), StoreError>;

    /// Set a document inside a parent document's subcollection.
    async fn create_in_subcollection(
        &self,
        parent: &str,
        parent_id: &str,
        sub: &str,
        id: &str,
        data: JsonValue,
    ) -> Result<(), StoreError> {
        self.create(&subcollection_path(parent, parent_id, sub), id, data)
            .await
    }

    /// Query a parent document's subcollection.
    async fn find_in_subcollection(
        &self,
        parent: &str,
        parent_id: &str,
        sub: &str,
        query: Query,
    ) -> Result<Vec<Document>, StoreError> {
        self.find(&subcollection_path(parent, parent_id, sub), query)
            .await
    }
}

/// Collection path for a subcollection nested under a parent document.
pub fn subcollection_path(parent: &str, parent_id: &str, sub: &str) -> String {
    format!("{}/{}/{}", parent, parent_id, sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that the trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn DocumentStore) {}

    #[test]
    fn subcollection_path_follows_convention() {
        assert_eq!(
            subcollection_path("conversations", "c-1", "participants"),
            "conversations/c-1/participants"
        );
        assert_eq!(
            subcollection_path("messages", "m-1", "status"),
            "messages/m-1/status"
        );
    }

    #[test]
    fn query_builder_composes() {
        let query = Query::all()
            .filter(FieldFilter::eq("status", "SENT"))
            .order_by("sent_at", true)
            .limit(10)
            .offset(20);

        assert_eq!(query.filters.len(), 1);
        assert!(query.order_by.as_ref().unwrap().descending);
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(20));
    }

    #[test]
    fn not_found_is_recognizable() {
        let err = StoreError::not_found("messages", "m-1");
        assert!(err.is_not_found());
        assert!(!StoreError::Backend("boom".into()).is_not_found());
    }
}

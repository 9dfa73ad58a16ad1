//! In-memory document store.
//!
//! A complete implementation of the `DocumentStore` contract backed by a
//! process-local map. Used by the test suite and by single-node
//! deployments; multi-instance deployments plug a real document database
//! adapter behind the same port.
//!
//! Collections (including `"{parent}/{id}/{sub}"` subcollection paths) are
//! plain string keys; documents within a collection are kept in a
//! `BTreeMap` so unordered queries return documents in stable id order.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::ports::{
    Document, DocumentStore, FieldFilter, FilterOp, Page, Query, StoreError, StoreTransaction,
    TransactionFn, WriteOp,
};

type Collections = HashMap<String, BTreeMap<String, JsonValue>>;

/// Process-local document store.
pub struct InMemoryDocumentStore {
    collections: RwLock<Collections>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Total documents in a collection (for assertions and diagnostics).
    pub async fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Removes every document (for test isolation).
    pub async fn clear(&self) {
        self.collections.write().await.clear();
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Total order over the JSON scalar types the store can sort and compare.
/// Non-scalar or mixed-type comparisons yield `None` and fail range
/// filters.
fn json_cmp(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        (JsonValue::Null, JsonValue::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn matches(data: &JsonValue, filter: &FieldFilter) -> bool {
    let Some(actual) = data.get(&filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => actual == &filter.value,
        FilterOp::Ne => actual != &filter.value,
        FilterOp::Gt => json_cmp(actual, &filter.value) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(
            json_cmp(actual, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lt => json_cmp(actual, &filter.value) == Some(Ordering::Less),
        FilterOp::Lte => matches!(
            json_cmp(actual, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

/// Shallow merge: top-level keys of `patch` replace keys of `existing`.
/// Non-object patches replace the document wholesale.
fn apply_patch(existing: &mut JsonValue, patch: JsonValue) {
    match (existing.as_object_mut(), patch) {
        (Some(target), JsonValue::Object(fields)) => {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        (_, patch) => *existing = patch,
    }
}

fn run_query(collection: &BTreeMap<String, JsonValue>, query: &Query) -> (Vec<Document>, u64) {
    let mut matched: Vec<Document> = collection
        .iter()
        .filter(|(_, data)| query.filters.iter().all(|f| matches(data, f)))
        .map(|(id, data)| Document {
            id: id.clone(),
            data: data.clone(),
        })
        .collect();

    if let Some(order) = &query.order_by {
        matched.sort_by(|a, b| {
            let av = a.data.get(&order.field).unwrap_or(&JsonValue::Null);
            let bv = b.data.get(&order.field).unwrap_or(&JsonValue::Null);
            let ord = json_cmp(av, bv).unwrap_or(Ordering::Equal);
            if order.descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }

    let total = matched.len() as u64;
    let offset = query.offset.unwrap_or(0).min(matched.len());
    let mut page: Vec<Document> = matched.split_off(offset);
    if let Some(limit) = query.limit {
        page.truncate(limit);
    }
    (page, total)
}

/// Applies one mutation to a collections map. Used by both `batch_write`
/// and transactions so semantics stay identical.
fn apply_op(collections: &mut Collections, op: WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::Create { collection, id, data } => {
            collections.entry(collection).or_default().insert(id, data);
            Ok(())
        }
        WriteOp::Update { collection, id, data } => {
            let existing = collections
                .get_mut(&collection)
                .and_then(|c| c.get_mut(&id))
                .ok_or_else(|| StoreError::not_found(collection.clone(), id.clone()))?;
            apply_patch(existing, data);
            Ok(())
        }
        WriteOp::Delete { collection, id } => {
            if let Some(c) = collections.get_mut(&collection) {
                c.remove(&id);
                if c.is_empty() {
                    collections.remove(&collection);
                }
            }
            Ok(())
        }
    }
}

struct InMemoryTransaction<'a> {
    collections: &'a mut Collections,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction<'_> {
    async fn get(&mut self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn create(
        &mut self,
        collection: &str,
        id: &str,
        data: JsonValue,
    ) -> Result<(), StoreError> {
        apply_op(
            self.collections,
            WriteOp::Create {
                collection: collection.to_string(),
                id: id.to_string(),
                data,
            },
        )
    }

    async fn update(
        &mut self,
        collection: &str,
        id: &str,
        data: JsonValue,
    ) -> Result<(), StoreError> {
        apply_op(
            self.collections,
            WriteOp::Update {
                collection: collection.to_string(),
                id: id.to_string(),
                data,
            },
        )
    }

    async fn delete(&mut self, collection: &str, id: &str) -> Result<(), StoreError> {
        apply_op(
            self.collections,
            WriteOp::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            },
        )
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create(&self, collection: &str, id: &str, data: JsonValue) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        apply_op(
            &mut collections,
            WriteOp::Create {
                collection: collection.to_string(),
                id: id.to_string(),
                data,
            },
        )
    }

    async fn find_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn update(&self, collection: &str, id: &str, data: JsonValue) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        apply_op(
            &mut collections,
            WriteOp::Update {
                collection: collection.to_string(),
                id: id.to_string(),
                data,
            },
        )
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        apply_op(
            &mut collections,
            WriteOp::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            },
        )
    }

    async fn find(&self, collection: &str, query: Query) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(run_query(docs, &query).0)
    }

    async fn find_with_pagination(
        &self,
        collection: &str,
        query: Query,
    ) -> Result<Page, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Page {
                documents: Vec::new(),
                total: 0,
            });
        };
        let (documents, total) = run_query(docs, &query);
        Ok(Page { documents, total })
    }

    async fn count(&self, collection: &str, filters: &[FieldFilter]) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(0);
        };
        Ok(docs
            .values()
            .filter(|data| filters.iter().all(|f| matches(data, f)))
            .count() as u64)
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        // Stage against a scratch copy so a failing op leaves nothing applied.
        let mut scratch = collections.clone();
        for op in ops {
            apply_op(&mut scratch, op)?;
        }
        *collections = scratch;
        Ok(())
    }

    async fn run_transaction(&self, tx: TransactionFn) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let mut scratch = collections.clone();
        {
            let mut txn = InMemoryTransaction {
                collections: &mut scratch,
            };
            tx(&mut txn).await?;
        }
        *collections = scratch;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::subcollection_path;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_find_by_id() {
        let store = InMemoryDocumentStore::new();
        store
            .create("messages", "m-1", json!({"content": "hi"}))
            .await
            .unwrap();

        let doc = store.find_by_id("messages", "m-1").await.unwrap().unwrap();
        assert_eq!(doc.data["content"], "hi");
    }

    #[tokio::test]
    async fn create_replaces_existing_document() {
        let store = InMemoryDocumentStore::new();
        store
            .create("messages", "m-1", json!({"content": "first"}))
            .await
            .unwrap();
        store
            .create("messages", "m-1", json!({"content": "second"}))
            .await
            .unwrap();

        let doc = store.find_by_id("messages", "m-1").await.unwrap().unwrap();
        assert_eq!(doc.data["content"], "second");
        assert_eq!(store.document_count("messages").await, 1);
    }

    #[tokio::test]
    async fn find_by_id_missing_is_none() {
        let store = InMemoryDocumentStore::new();
        assert!(store.find_by_id("messages", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_patches_top_level_fields() {
        let store = InMemoryDocumentStore::new();
        store
            .create("users", "u-1", json!({"name": "Alice", "online": false}))
            .await
            .unwrap();
        store
            .update("users", "u-1", json!({"online": true}))
            .await
            .unwrap();

        let doc = store.find_by_id("users", "u-1").await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Alice");
        assert_eq!(doc.data["online"], true);
    }

    #[tokio::test]
    async fn update_missing_document_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .update("users", "ghost", json!({"online": true}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_missing_document_is_noop() {
        let store = InMemoryDocumentStore::new();
        assert!(store.delete("users", "ghost").await.is_ok());
    }

    #[tokio::test]
    async fn find_applies_filters() {
        let store = InMemoryDocumentStore::new();
        store
            .create("status", "a", json!({"status": "SENT", "n": 1}))
            .await
            .unwrap();
        store
            .create("status", "b", json!({"status": "READ", "n": 2}))
            .await
            .unwrap();
        store
            .create("status", "c", json!({"status": "SENT", "n": 3}))
            .await
            .unwrap();

        let docs = store
            .find("status", Query::all().filter(FieldFilter::eq("status", "SENT")))
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn find_orders_limits_and_offsets() {
        let store = InMemoryDocumentStore::new();
        for (id, n) in [("a", 3), ("b", 1), ("c", 2), ("d", 4)] {
            store.create("nums", id, json!({ "n": n })).await.unwrap();
        }

        let query = Query::all().order_by("n", false).offset(1).limit(2);
        let docs = store.find("nums", query).await.unwrap();
        let ns: Vec<i64> = docs.iter().map(|d| d.data["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![2, 3]);
    }

    #[tokio::test]
    async fn pagination_reports_total_before_slicing() {
        let store = InMemoryDocumentStore::new();
        for i in 0..5 {
            store
                .create("nums", &format!("d-{}", i), json!({ "n": i }))
                .await
                .unwrap();
        }

        let page = store
            .find_with_pagination("nums", Query::all().limit(2))
            .await
            .unwrap();
        assert_eq!(page.documents.len(), 2);
        assert_eq!(page.total, 5);
    }

    #[tokio::test]
    async fn count_with_filters() {
        let store = InMemoryDocumentStore::new();
        store
            .create("status", "a", json!({"status": "SENT"}))
            .await
            .unwrap();
        store
            .create("status", "b", json!({"status": "READ"}))
            .await
            .unwrap();

        let count = store
            .count("status", &[FieldFilter::eq("status", "READ")])
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn batch_write_applies_all_ops() {
        let store = InMemoryDocumentStore::new();
        store
            .batch_write(vec![
                WriteOp::Create {
                    collection: "a".into(),
                    id: "1".into(),
                    data: json!({"x": 1}),
                },
                WriteOp::Create {
                    collection: "b".into(),
                    id: "2".into(),
                    data: json!({"y": 2}),
                },
            ])
            .await
            .unwrap();

        assert!(store.find_by_id("a", "1").await.unwrap().is_some());
        assert!(store.find_by_id("b", "2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_batch_applies_nothing() {
        let store = InMemoryDocumentStore::new();
        let result = store
            .batch_write(vec![
                WriteOp::Create {
                    collection: "a".into(),
                    id: "1".into(),
                    data: json!({"x": 1}),
                },
                WriteOp::Update {
                    collection: "a".into(),
                    id: "missing".into(),
                    data: json!({"x": 2}),
                },
            ])
            .await;

        assert!(result.is_err());
        assert!(store.find_by_id("a", "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transaction_commits_on_ok() {
        let store = InMemoryDocumentStore::new();
        store
            .create("counters", "c", json!({"value": 1}))
            .await
            .unwrap();

        store
            .run_transaction(Box::new(|tx: &mut dyn StoreTransaction| {
                Box::pin(async move {
                    let doc = tx.get("counters", "c").await?.unwrap();
                    let next = doc.data["value"].as_i64().unwrap() + 1;
                    tx.update("counters", "c", json!({ "value": next })).await
                })
            }))
            .await
            .unwrap();

        let doc = store.find_by_id("counters", "c").await.unwrap().unwrap();
        assert_eq!(doc.data["value"], 2);
    }

    #[tokio::test]
    async fn transaction_rolls_back_on_error() {
        let store = InMemoryDocumentStore::new();

        let result = store
            .run_transaction(Box::new(|tx: &mut dyn StoreTransaction| {
                Box::pin(async move {
                    tx.create("a", "1", json!({"x": 1})).await?;
                    Err(StoreError::Backend("forced failure".into()))
                })
            }))
            .await;

        assert!(result.is_err());
        assert!(store.find_by_id("a", "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn subcollections_are_independent_collections() {
        let store = InMemoryDocumentStore::new();
        store
            .create_in_subcollection(
                "conversations",
                "c-1",
                "participants",
                "alice",
                json!({"user_id": "alice"}),
            )
            .await
            .unwrap();

        let docs = store
            .find_in_subcollection("conversations", "c-1", "participants", Query::all())
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);

        // Parent collection remains untouched
        assert_eq!(store.document_count("conversations").await, 0);
        assert_eq!(
            store
                .document_count(&subcollection_path("conversations", "c-1", "participants"))
                .await,
            1
        );
    }
}

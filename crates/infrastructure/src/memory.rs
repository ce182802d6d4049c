use crate::store::{
    index_key, matches_expected, Document, DocumentId, DocumentStore, Fields, IndexDefinition,
    PatchOutcome, SortOrder, StoreError,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// 開発・テスト用のインメモリ実装
///
/// 作成順は挿入ごとに採番するシーケンス番号で保持する。
pub struct InMemoryDocumentStore {
    definitions: Vec<IndexDefinition>,
    inner: RwLock<Inner>,
    // 呼び出し回数（テスト観測用）
    operations: AtomicUsize,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    collections: HashMap<String, Collection>,
}

#[derive(Default)]
struct Collection {
    docs: HashMap<DocumentId, Stored>,
    order: BTreeMap<u64, DocumentId>,
    indexes: HashMap<String, IndexState>,
}

struct Stored {
    seq: u64,
    doc: Document,
}

struct IndexState {
    field: String,
    entries: HashMap<String, BTreeMap<u64, DocumentId>>,
}

impl IndexState {
    fn add(&mut self, fields: &Fields, seq: u64, id: &DocumentId) {
        if let Some(value) = fields.get(&self.field) {
            self.entries
                .entry(index_key(value))
                .or_default()
                .insert(seq, id.clone());
        }
    }

    fn remove(&mut self, fields: &Fields, seq: u64) {
        if let Some(value) = fields.get(&self.field) {
            let key = index_key(value);
            if let Some(bucket) = self.entries.get_mut(&key) {
                bucket.remove(&seq);
                if bucket.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }
}

impl Collection {
    fn new(name: &str, definitions: &[IndexDefinition]) -> Self {
        let indexes = definitions
            .iter()
            .filter(|d| d.collection == name)
            .map(|d| {
                (
                    d.name.clone(),
                    IndexState {
                        field: d.field.clone(),
                        entries: HashMap::new(),
                    },
                )
            })
            .collect();

        Self {
            indexes,
            ..Default::default()
        }
    }

    fn apply_patch(&mut self, id: &DocumentId, fields: Fields) {
        let Some(stored) = self.docs.get_mut(id) else {
            return;
        };

        for index in self.indexes.values_mut() {
            index.remove(&stored.doc.fields, stored.seq);
        }
        for (key, value) in fields {
            stored.doc.fields.insert(key, value);
        }
        for index in self.indexes.values_mut() {
            index.add(&stored.doc.fields, stored.seq, id);
        }
    }
}

impl InMemoryDocumentStore {
    pub fn new(definitions: Vec<IndexDefinition>) -> Self {
        Self {
            definitions,
            inner: RwLock::new(Inner::default()),
            operations: AtomicUsize::new(0),
        }
    }

    /// これまでに受け付けた操作の回数
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    fn record_operation(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }

    fn has_index(&self, collection: &str, index: &str) -> bool {
        self.definitions
            .iter()
            .any(|d| d.collection == collection && d.name == index)
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn indexed_query(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        self.record_operation();
        if !self.has_index(collection, index) {
            return Err(StoreError::UnknownIndex {
                collection: collection.to_string(),
                index: index.to_string(),
            });
        }

        let inner = self.inner.read().await;
        let Some(col) = inner.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let docs = col
            .indexes
            .get(index)
            .and_then(|state| state.entries.get(&index_key(value)))
            .map(|bucket| {
                bucket
                    .values()
                    .filter_map(|id| col.docs.get(id).map(|s| s.doc.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Ok(docs)
    }

    async fn natural_order_query(
        &self,
        collection: &str,
        order: SortOrder,
    ) -> Result<Vec<Document>, StoreError> {
        self.record_operation();
        let inner = self.inner.read().await;
        let Some(col) = inner.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let ids: Vec<&DocumentId> = match order {
            SortOrder::Ascending => col.order.values().collect(),
            SortOrder::Descending => col.order.values().rev().collect(),
        };

        Ok(ids
            .into_iter()
            .filter_map(|id| col.docs.get(id).map(|s| s.doc.clone()))
            .collect())
    }

    async fn get(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        self.record_operation();
        let inner = self.inner.read().await;
        Ok(inner
            .collections
            .get(collection)
            .and_then(|col| col.docs.get(id))
            .map(|s| s.doc.clone()))
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<DocumentId, StoreError> {
        self.record_operation();
        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let id = DocumentId::generate();
        let col = inner
            .collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection::new(collection, &self.definitions));

        for index in col.indexes.values_mut() {
            index.add(&fields, seq, &id);
        }
        col.order.insert(seq, id.clone());
        col.docs.insert(
            id.clone(),
            Stored {
                seq,
                doc: Document {
                    id: id.clone(),
                    creation_time: Utc::now(),
                    fields,
                },
            },
        );

        debug!(collection, id = %id, "document inserted");
        Ok(id)
    }

    async fn patch(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<PatchOutcome, StoreError> {
        self.record_operation();
        let mut inner = self.inner.write().await;
        let Some(col) = inner.collections.get_mut(collection) else {
            return Ok(PatchOutcome::Missing);
        };
        if !col.docs.contains_key(id) {
            return Ok(PatchOutcome::Missing);
        }

        col.apply_patch(id, fields);
        Ok(PatchOutcome::Applied)
    }

    async fn patch_if(
        &self,
        collection: &str,
        id: &DocumentId,
        expected: &Fields,
        fields: Fields,
    ) -> Result<PatchOutcome, StoreError> {
        self.record_operation();
        let mut inner = self.inner.write().await;
        let Some(col) = inner.collections.get_mut(collection) else {
            return Ok(PatchOutcome::Missing);
        };
        let Some(stored) = col.docs.get(id) else {
            return Ok(PatchOutcome::Missing);
        };
        if !matches_expected(&stored.doc.fields, expected) {
            return Ok(PatchOutcome::Conflict);
        }

        col.apply_patch(id, fields);
        Ok(PatchOutcome::Applied)
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        self.record_operation();
        let mut inner = self.inner.write().await;
        let Some(col) = inner.collections.get_mut(collection) else {
            return Ok(());
        };

        if let Some(stored) = col.docs.remove(id) {
            col.order.remove(&stored.seq);
            for index in col.indexes.values_mut() {
                index.remove(&stored.doc.fields, stored.seq);
            }
            debug!(collection, id = %id, "document deleted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use serde_json::json;
    use std::sync::Arc;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn store() -> InMemoryDocumentStore {
        InMemoryDocumentStore::new(vec![IndexDefinition::new("todos", "by_owner", "ownerId")])
    }

    #[tokio::test]
    async fn test_indexed_query_returns_matching_in_insertion_order() {
        let store = store();
        let a = store
            .insert("todos", fields(json!({"text": "a", "ownerId": "u1"})))
            .await
            .unwrap();
        store
            .insert("todos", fields(json!({"text": "b", "ownerId": "u2"})))
            .await
            .unwrap();
        let c = store
            .insert("todos", fields(json!({"text": "c", "ownerId": "u1"})))
            .await
            .unwrap();

        let docs = store
            .indexed_query("todos", "by_owner", &json!("u1"))
            .await
            .unwrap();
        let ids: Vec<DocumentId> = docs.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[tokio::test]
    async fn test_unknown_index_is_an_error() {
        let store = store();
        let result = store.indexed_query("todos", "by_text", &json!("a")).await;
        assert!(matches!(result, Err(StoreError::UnknownIndex { .. })));
    }

    #[tokio::test]
    async fn test_natural_order_query_both_directions() {
        let store = store();
        let mut ids = Vec::new();
        for text in ["a", "b", "c"] {
            ids.push(
                store
                    .insert("todos", fields(json!({"text": text})))
                    .await
                    .unwrap(),
            );
        }

        let asc: Vec<DocumentId> = store
            .natural_order_query("todos", SortOrder::Ascending)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(asc, ids);

        let desc: Vec<DocumentId> = store
            .natural_order_query("todos", SortOrder::Descending)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        ids.reverse();
        assert_eq!(desc, ids);
    }

    #[tokio::test]
    async fn test_patch_missing_and_delete_missing() {
        let store = store();
        let ghost = DocumentId::from_string("01HZX3Q5D8M6V4K2J9R7T1W0AB".to_string());

        let outcome = store
            .patch("todos", &ghost, fields(json!({"completed": true})))
            .await
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Missing);
        assert!(store.get("todos", &ghost).await.unwrap().is_none());

        store.delete("todos", &ghost).await.unwrap();
    }

    #[tokio::test]
    async fn test_patch_moves_index_entry() {
        let store = store();
        let id = store
            .insert("todos", fields(json!({"text": "a", "ownerId": "u1"})))
            .await
            .unwrap();

        store
            .patch("todos", &id, fields(json!({"ownerId": "u2"})))
            .await
            .unwrap();

        assert!(store
            .indexed_query("todos", "by_owner", &json!("u1"))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .indexed_query("todos", "by_owner", &json!("u2"))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_removes_from_index_and_order() {
        let store = store();
        let id = store
            .insert("todos", fields(json!({"text": "a", "ownerId": "u1"})))
            .await
            .unwrap();

        store.delete("todos", &id).await.unwrap();

        assert!(store.get("todos", &id).await.unwrap().is_none());
        assert!(store
            .indexed_query("todos", "by_owner", &json!("u1"))
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .natural_order_query("todos", SortOrder::Ascending)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_patch_if_conflict_leaves_document_untouched() {
        let store = store();
        let id = store
            .insert("todos", fields(json!({"completed": false})))
            .await
            .unwrap();

        let outcome = store
            .patch_if(
                "todos",
                &id,
                &fields(json!({"completed": true})),
                fields(json!({"completed": false})),
            )
            .await
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Conflict);

        let doc = store.get("todos", &id).await.unwrap().unwrap();
        assert_eq!(doc.fields["completed"], json!(false));
    }

    #[tokio::test]
    async fn test_concurrent_patch_if_only_one_wins() {
        let store = Arc::new(store());
        let id = store
            .insert("todos", fields(json!({"completed": false})))
            .await
            .unwrap();

        let attempts = (0..8).map(|_| {
            let store = store.clone();
            let id = id.clone();
            async move {
                store
                    .patch_if(
                        "todos",
                        &id,
                        &fields(json!({"completed": false})),
                        fields(json!({"completed": true})),
                    )
                    .await
                    .unwrap()
            }
        });

        let outcomes = join_all(attempts).await;
        let applied = outcomes
            .iter()
            .filter(|o| **o == PatchOutcome::Applied)
            .count();
        assert_eq!(applied, 1);
        assert_eq!(outcomes.len() - applied, 7);
    }

    #[tokio::test]
    async fn test_operation_count() {
        let store = store();
        assert_eq!(store.operation_count(), 0);
        store
            .natural_order_query("todos", SortOrder::Ascending)
            .await
            .unwrap();
        assert_eq!(store.operation_count(), 1);
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::TodoError;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// ドキュメントのフィールド（JSON オブジェクト）
pub type Fields = Map<String, Value>;

/// ストアが払い出すドキュメント ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl DocumentId {
    pub(crate) fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 保存済みドキュメント
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub creation_time: DateTime<Utc>,
    pub fields: Fields,
}

/// 作成順での並び
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// patch / patch_if の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    /// 対象 ID のドキュメントが存在しない（何も書き込まない）
    Missing,
    /// `patch_if` の期待値が現在値と一致しなかった
    Conflict,
}

/// コレクションに張るインデックス（単一フィールドの等価検索）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub collection: String,
    pub name: String,
    pub field: String,
}

impl IndexDefinition {
    pub fn new(collection: &str, name: &str, field: &str) -> Self {
        Self {
            collection: collection.to_string(),
            name: name.to_string(),
            field: field.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("unknown index {index} on collection {collection}")]
    UnknownIndex { collection: String, index: String },
}

impl From<StoreError> for TodoError {
    fn from(e: StoreError) -> Self {
        TodoError::Store(e.to_string())
    }
}

/// ドキュメントストア
///
/// 各呼び出しは個別にアトミック。呼び出しをまたぐトランザクションは持たない。
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// インデックスによる等価検索。作成順で返す
    async fn indexed_query(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError>;

    /// コレクション全体を作成順で返す
    async fn natural_order_query(
        &self,
        collection: &str,
        order: SortOrder,
    ) -> Result<Vec<Document>, StoreError>;

    async fn get(&self, collection: &str, id: &DocumentId)
        -> Result<Option<Document>, StoreError>;

    async fn insert(&self, collection: &str, fields: Fields) -> Result<DocumentId, StoreError>;

    /// 部分更新。存在しない ID に対しては `Missing` を返し、作成はしない
    async fn patch(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<PatchOutcome, StoreError>;

    /// `expected` の全フィールドが現在値と一致する場合のみ部分更新する
    async fn patch_if(
        &self,
        collection: &str,
        id: &DocumentId,
        expected: &Fields,
        fields: Fields,
    ) -> Result<PatchOutcome, StoreError>;

    /// 削除。存在しない ID は何もしない
    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError>;
}

/// `expected` の全フィールドが `current` と一致するか
pub(crate) fn matches_expected(current: &Fields, expected: &Fields) -> bool {
    expected
        .iter()
        .all(|(key, value)| current.get(key).unwrap_or(&Value::Null) == value)
}

/// インデックスキー用に値を文字列化する
pub(crate) fn index_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_matches_expected() {
        let current = fields(json!({"completed": false, "text": "a"}));

        assert!(matches_expected(&current, &fields(json!({"completed": false}))));
        assert!(!matches_expected(&current, &fields(json!({"completed": true}))));
        assert!(matches_expected(&current, &fields(json!({"missing": null}))));
        assert!(matches_expected(&current, &Fields::new()));
    }

    #[test]
    fn test_index_key() {
        assert_eq!(index_key(&json!("u1")), "u1");
        assert_eq!(index_key(&json!(42)), "42");
        assert_eq!(index_key(&json!(true)), "true");
    }

    #[test]
    fn test_store_error_maps_to_todo_store_error() {
        let err: TodoError = StoreError::Backend("timeout".to_string()).into();
        assert!(matches!(err, TodoError::Store(msg) if msg.contains("timeout")));
    }
}

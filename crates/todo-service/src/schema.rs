use chrono::{DateTime, Utc};
use domain::{Todo, TodoError, TodoId};
use infrastructure::{Document, DocumentId, Fields, IndexDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ToDo を格納するコレクション
pub const TODOS: &str = "todos";
/// 所有者による等価検索インデックス
pub const BY_OWNER: &str = "by_owner";

pub const FIELD_COMPLETED: &str = "completed";
pub const FIELD_OWNER_ID: &str = "ownerId";

/// ストアに登録するインデックス定義
pub fn indexes() -> Vec<IndexDefinition> {
    vec![IndexDefinition::new(TODOS, BY_OWNER, FIELD_OWNER_ID)]
}

/// ストア上の ToDo フィールド
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoFields {
    pub text: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl TodoFields {
    pub fn into_fields(self) -> Result<Fields, TodoError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(TodoError::Store("todo fields are not an object".to_string())),
            Err(e) => Err(TodoError::Store(format!("todo serialization error: {e}"))),
        }
    }
}

/// ドキュメントを ToDo に変換
pub fn todo_from_document(doc: Document) -> Result<Todo, TodoError> {
    let Document { id, fields, .. } = doc;
    let parsed: TodoFields = serde_json::from_value(Value::Object(fields))
        .map_err(|e| TodoError::Store(format!("malformed todo document {id}: {e}")))?;

    Ok(Todo {
        id: TodoId::from_string(id.into_inner()),
        text: parsed.text,
        completed: parsed.completed,
        owner_id: parsed.owner_id,
        created_at: parsed.created_at,
    })
}

pub fn document_id(id: &TodoId) -> DocumentId {
    DocumentId::from_string(id.as_str().to_string())
}

/// 単一フィールドのマップ
pub fn single_field(name: &str, value: Value) -> Fields {
    let mut fields = Fields::new();
    fields.insert(name.to_string(), value);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_fields_use_camel_case_and_epoch_millis() {
        let created_at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let fields = TodoFields {
            text: "buy milk".to_string(),
            completed: false,
            owner_id: Some("u1".to_string()),
            created_at: Some(created_at),
        }
        .into_fields()
        .unwrap();

        assert_eq!(fields["text"], json!("buy milk"));
        assert_eq!(fields["completed"], json!(false));
        assert_eq!(fields["ownerId"], json!("u1"));
        assert_eq!(fields["createdAt"], json!(1_700_000_000_123_i64));
    }

    #[test]
    fn test_open_fields_omit_owner_and_timestamp() {
        let fields = TodoFields {
            text: "a".to_string(),
            completed: false,
            owner_id: None,
            created_at: None,
        }
        .into_fields()
        .unwrap();

        assert!(!fields.contains_key("ownerId"));
        assert!(!fields.contains_key("createdAt"));
    }

    #[test]
    fn test_todo_from_document() {
        let doc = Document {
            id: DocumentId::from_string("01HZX3Q5D8M6V4K2J9R7T1W0AB".to_string()),
            creation_time: Utc::now(),
            fields: match json!({"text": "a", "completed": true, "ownerId": "u1", "createdAt": 1_700_000_000_000_i64}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            },
        };

        let todo = todo_from_document(doc).unwrap();
        assert_eq!(todo.id.as_str(), "01HZX3Q5D8M6V4K2J9R7T1W0AB");
        assert!(todo.completed);
        assert_eq!(todo.owner_id.as_deref(), Some("u1"));
        assert_eq!(todo.created_at.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_malformed_document_is_a_store_error() {
        let doc = Document {
            id: DocumentId::from_string("01HZX3Q5D8M6V4K2J9R7T1W0AB".to_string()),
            creation_time: Utc::now(),
            fields: single_field("completed", json!("yes")),
        };

        assert!(matches!(todo_from_document(doc), Err(TodoError::Store(_))));
    }
}

use crate::store::{index_key, Document, DocumentId, Fields, IndexDefinition, StoreError};
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

const ENTITY_TYPE: &str = "Document";

/// DynamoDB Single Table Design のキー構造
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamoDbKeys {
    pub pk: String,              // パーティションキー
    pub sk: String,              // ソートキー
    pub gsi1_pk: Option<String>, // GSI1 パーティションキー
    pub gsi1_sk: Option<String>, // GSI1 ソートキー
}

impl DynamoDbKeys {
    pub fn collection_pk(collection: &str) -> String {
        format!("COLLECTION#{collection}")
    }

    pub fn document_sk(id: &DocumentId) -> String {
        format!("DOC#{}", id.as_str())
    }

    pub fn index_pk(collection: &str, index_name: &str, value: &Value) -> String {
        format!("INDEX#{collection}#{index_name}#{}", index_key(value))
    }

    /// ドキュメント用のキーを生成。インデックス対象フィールドがあれば GSI1 に投影する
    pub fn for_document(
        collection: &str,
        id: &DocumentId,
        index: Option<&IndexDefinition>,
        fields: &Fields,
    ) -> Self {
        let gsi1_pk = index.and_then(|def| {
            fields
                .get(&def.field)
                .map(|value| Self::index_pk(collection, &def.name, value))
        });
        let gsi1_sk = gsi1_pk.as_ref().map(|_| id.as_str().to_string());

        Self {
            pk: Self::collection_pk(collection),
            sk: Self::document_sk(id),
            gsi1_pk,
            gsi1_sk,
        }
    }
}

/// ドキュメント 1 件分の DynamoDB アイテム
#[derive(Debug, Clone)]
pub struct DocumentItem {
    pub keys: DynamoDbKeys,
    pub id: DocumentId,
    pub data: Fields,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentItem {
    pub fn new(
        collection: &str,
        id: DocumentId,
        index: Option<&IndexDefinition>,
        data: Fields,
    ) -> Self {
        let now = Utc::now();
        Self {
            keys: DynamoDbKeys::for_document(collection, &id, index, &data),
            id,
            data,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// 部分更新を適用した次のバージョンを作る
    pub fn patched(
        &self,
        collection: &str,
        index: Option<&IndexDefinition>,
        fields: Fields,
    ) -> Self {
        let mut data = self.data.clone();
        for (key, value) in fields {
            data.insert(key, value);
        }

        Self {
            keys: DynamoDbKeys::for_document(collection, &self.id, index, &data),
            id: self.id.clone(),
            data,
            version: self.version + 1,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }

    /// DynamoDB AttributeValue マップに変換
    pub fn to_attribute_map(&self) -> HashMap<String, AttributeValue> {
        let mut map = HashMap::new();

        map.insert("PK".to_string(), AttributeValue::S(self.keys.pk.clone()));
        map.insert("SK".to_string(), AttributeValue::S(self.keys.sk.clone()));
        map.insert(
            "EntityType".to_string(),
            AttributeValue::S(ENTITY_TYPE.to_string()),
        );

        if let Some(gsi1_pk) = &self.keys.gsi1_pk {
            map.insert("GSI1PK".to_string(), AttributeValue::S(gsi1_pk.clone()));
        }

        if let Some(gsi1_sk) = &self.keys.gsi1_sk {
            map.insert("GSI1SK".to_string(), AttributeValue::S(gsi1_sk.clone()));
        }

        map.insert(
            "Id".to_string(),
            AttributeValue::S(self.id.as_str().to_string()),
        );
        map.insert(
            "Data".to_string(),
            AttributeValue::S(Value::Object(self.data.clone()).to_string()),
        );
        map.insert(
            "Version".to_string(),
            AttributeValue::N(self.version.to_string()),
        );
        map.insert(
            "CreatedAt".to_string(),
            AttributeValue::S(self.created_at.to_rfc3339()),
        );
        map.insert(
            "UpdatedAt".to_string(),
            AttributeValue::S(self.updated_at.to_rfc3339()),
        );

        map
    }

    /// DynamoDB AttributeValue マップから復元
    pub fn from_attribute_map(map: &HashMap<String, AttributeValue>) -> Result<Self, StoreError> {
        let string_attr = |name: &str| -> Result<String, StoreError> {
            map.get(name)
                .and_then(|v| v.as_s().ok())
                .cloned()
                .ok_or_else(|| StoreError::Malformed(format!("Missing {name}")))
        };
        let optional_attr = |name: &str| map.get(name).and_then(|v| v.as_s().ok()).cloned();
        let timestamp_attr = |name: &str| -> Result<DateTime<Utc>, StoreError> {
            DateTime::parse_from_rfc3339(&string_attr(name)?)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StoreError::Malformed(format!("Invalid {name}: {e}")))
        };

        let data = match serde_json::from_str::<Value>(&string_attr("Data")?) {
            Ok(Value::Object(data)) => data,
            Ok(_) => return Err(StoreError::Malformed("Data is not an object".to_string())),
            Err(e) => {
                return Err(StoreError::Malformed(format!(
                    "Failed to parse Data JSON: {e}"
                )))
            }
        };

        let version = map
            .get("Version")
            .and_then(|v| v.as_n().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| StoreError::Malformed("Missing or invalid Version".to_string()))?;

        Ok(Self {
            keys: DynamoDbKeys {
                pk: string_attr("PK")?,
                sk: string_attr("SK")?,
                gsi1_pk: optional_attr("GSI1PK"),
                gsi1_sk: optional_attr("GSI1SK"),
            },
            id: DocumentId::from_string(string_attr("Id")?),
            data,
            version,
            created_at: timestamp_attr("CreatedAt")?,
            updated_at: timestamp_attr("UpdatedAt")?,
        })
    }

    pub fn into_document(self) -> Document {
        Document {
            id: self.id,
            creation_time: self.created_at,
            fields: self.data,
        }
    }
}

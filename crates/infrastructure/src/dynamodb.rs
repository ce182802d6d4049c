use crate::models::{DocumentItem, DynamoDbKeys};
use crate::store::{
    matches_expected, Document, DocumentId, DocumentStore, Fields, IndexDefinition, PatchOutcome,
    SortOrder, StoreError,
};
use async_trait::async_trait;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use serde_json::Value;
use shared::Config;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct DynamoDbClient {
    client: Client,
    table_name: String,
    index_name: String,
}

impl DynamoDbClient {
    pub async fn new(config: &Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.aws_region.clone()));
        // DynamoDB Local などエンドポイントの上書き
        if let Some(endpoint) = &config.dynamodb_endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_config = loader.load().await;

        Self::from_client(
            Client::new(&aws_config),
            &config.dynamodb_table,
            &config.dynamodb_index_name,
        )
    }

    pub fn from_client(client: Client, table_name: &str, index_name: &str) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
            index_name: index_name.to_string(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }
}

fn backend_error<E: std::error::Error>(e: E) -> StoreError {
    StoreError::Backend(DisplayErrorContext(e).to_string())
}

/// DynamoDB 単一テーブル上のドキュメントストア
///
/// パッチは `Version` 属性による楽観的ロックで書き込み、
/// バージョン競合時は `max_attempts` 回まで読み直す。
/// コレクションごとに GSI1 へ投影できるインデックスは 1 つだけ。
pub struct DynamoDbDocumentStore {
    db: DynamoDbClient,
    indexes: HashMap<String, IndexDefinition>,
    max_attempts: u32,
}

impl DynamoDbDocumentStore {
    pub fn new(db: DynamoDbClient, definitions: Vec<IndexDefinition>, max_attempts: u32) -> Self {
        let mut indexes = HashMap::new();
        for def in definitions {
            if indexes.contains_key(&def.collection) {
                warn!(
                    "コレクション {} のインデックス {} は無視されます（GSI1 は 1 コレクション 1 インデックス）",
                    def.collection, def.name
                );
                continue;
            }
            indexes.insert(def.collection.clone(), def);
        }

        Self {
            db,
            indexes,
            max_attempts: max_attempts.max(1),
        }
    }

    fn index_for(&self, collection: &str) -> Option<&IndexDefinition> {
        self.indexes.get(collection)
    }

    async fn get_item(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<DocumentItem>, StoreError> {
        let response = self
            .db
            .client()
            .get_item()
            .table_name(self.db.table_name())
            .key("PK", AttributeValue::S(DynamoDbKeys::collection_pk(collection)))
            .key("SK", AttributeValue::S(DynamoDbKeys::document_sk(id)))
            .consistent_read(true)
            .send()
            .await
            .map_err(backend_error)?;

        response
            .item
            .as_ref()
            .map(DocumentItem::from_attribute_map)
            .transpose()
    }

    /// 読み出し → マージ → Version 条件付き put
    async fn versioned_patch(
        &self,
        collection: &str,
        id: &DocumentId,
        expected: Option<&Fields>,
        fields: Fields,
    ) -> Result<PatchOutcome, StoreError> {
        for attempt in 1..=self.max_attempts {
            let Some(current) = self.get_item(collection, id).await? else {
                return Ok(PatchOutcome::Missing);
            };

            if let Some(expected) = expected {
                if !matches_expected(&current.data, expected) {
                    return Ok(PatchOutcome::Conflict);
                }
            }

            let next = current.patched(collection, self.index_for(collection), fields.clone());
            let result = self
                .db
                .client()
                .put_item()
                .table_name(self.db.table_name())
                .set_item(Some(next.to_attribute_map()))
                .condition_expression("#version = :expected_version")
                .expression_attribute_names("#version", "Version")
                .expression_attribute_values(
                    ":expected_version",
                    AttributeValue::N(current.version.to_string()),
                )
                .send()
                .await;

            match result {
                Ok(_) => {
                    debug!(
                        "条件付き更新完了: id={}, version={}",
                        id, next.version
                    );
                    return Ok(PatchOutcome::Applied);
                }
                Err(e)
                    if e
                        .as_service_error()
                        .map(|se| se.is_conditional_check_failed_exception())
                        .unwrap_or(false) =>
                {
                    warn!(
                        "バージョン不一致 (attempt {}/{}): id={}, expected={}",
                        attempt, self.max_attempts, id, current.version
                    );
                }
                Err(e) => return Err(backend_error(e)),
            }
        }

        match expected {
            // 呼び出し側で読み直して判断させる
            Some(_) => Ok(PatchOutcome::Conflict),
            None => Err(StoreError::Backend(format!(
                "optimistic lock retries exhausted for {id}"
            ))),
        }
    }

    async fn query_all(
        &self,
        index_name: Option<&str>,
        key_attribute: &str,
        key_value: String,
        forward: bool,
    ) -> Result<Vec<Document>, StoreError> {
        let mut documents = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let output = self
                .db
                .client()
                .query()
                .table_name(self.db.table_name())
                .set_index_name(index_name.map(str::to_string))
                .key_condition_expression("#key = :key")
                .expression_attribute_names("#key", key_attribute)
                .expression_attribute_values(":key", AttributeValue::S(key_value.clone()))
                .scan_index_forward(forward)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(backend_error)?;

            for item in output.items.unwrap_or_default() {
                documents.push(DocumentItem::from_attribute_map(&item)?.into_document());
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(documents)
    }
}

#[async_trait]
impl DocumentStore for DynamoDbDocumentStore {
    async fn indexed_query(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        let def = self
            .index_for(collection)
            .filter(|def| def.name == index)
            .ok_or_else(|| StoreError::UnknownIndex {
                collection: collection.to_string(),
                index: index.to_string(),
            })?;

        let pk = DynamoDbKeys::index_pk(collection, &def.name, value);
        self.query_all(Some(self.db.index_name()), "GSI1PK", pk, true)
            .await
    }

    async fn natural_order_query(
        &self,
        collection: &str,
        order: SortOrder,
    ) -> Result<Vec<Document>, StoreError> {
        self.query_all(
            None,
            "PK",
            DynamoDbKeys::collection_pk(collection),
            order == SortOrder::Ascending,
        )
        .await
    }

    async fn get(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self
            .get_item(collection, id)
            .await?
            .map(DocumentItem::into_document))
    }

    async fn insert(&self, collection: &str, fields: Fields) -> Result<DocumentId, StoreError> {
        let id = DocumentId::generate();
        let item = DocumentItem::new(collection, id.clone(), self.index_for(collection), fields);

        self.db
            .client()
            .put_item()
            .table_name(self.db.table_name())
            .set_item(Some(item.to_attribute_map()))
            .condition_expression("attribute_not_exists(PK)")
            .send()
            .await
            .map_err(backend_error)?;

        info!("ドキュメント保存完了: collection={}, id={}", collection, id);
        Ok(id)
    }

    async fn patch(
        &self,
        collection: &str,
        id: &DocumentId,
        fields: Fields,
    ) -> Result<PatchOutcome, StoreError> {
        self.versioned_patch(collection, id, None, fields).await
    }

    async fn patch_if(
        &self,
        collection: &str,
        id: &DocumentId,
        expected: &Fields,
        fields: Fields,
    ) -> Result<PatchOutcome, StoreError> {
        self.versioned_patch(collection, id, Some(expected), fields)
            .await
    }

    async fn delete(&self, collection: &str, id: &DocumentId) -> Result<(), StoreError> {
        self.db
            .client()
            .delete_item()
            .table_name(self.db.table_name())
            .key("PK", AttributeValue::S(DynamoDbKeys::collection_pk(collection)))
            .key("SK", AttributeValue::S(DynamoDbKeys::document_sk(id)))
            .send()
            .await
            .map_err(backend_error)?;

        debug!("ドキュメント削除: collection={}, id={}", collection, id);
        Ok(())
    }
}

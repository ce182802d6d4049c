//! ToDo サービスの HTTP API（axum）
//!
//! 呼び出し元は `Authorization: Bearer <token>` ヘッダーで識別する。

pub mod error;
pub mod handlers;

use axum::{
    routing::{get, patch},
    Router,
};
use domain::TodoError;
use error::ApiError;
use infrastructure::{DocumentStore, DynamoDbClient, DynamoDbDocumentStore, InMemoryDocumentStore};
use shared::{Config, RequestContext, StoreBackend};
use std::sync::Arc;
use todo_service::TodoService;
use tracing::info;

/// アプリケーションの共有状態
#[derive(Clone)]
pub struct AppState {
    service: TodoService,
    include_error_details: bool,
}

impl AppState {
    /// `include_error_details` はエラーレスポンスに `details` を含めるか（本番では false）
    pub fn new(service: TodoService, include_error_details: bool) -> Self {
        Self {
            service,
            include_error_details,
        }
    }

    pub fn service(&self) -> &TodoService {
        &self.service
    }

    pub(crate) fn api_error(&self, error: TodoError, ctx: &RequestContext) -> ApiError {
        ApiError {
            error,
            request_id: ctx.request_id().to_string(),
            include_details: self.include_error_details,
        }
    }
}

/// ルータを構築して返します。
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/todos",
            get(handlers::list_todos).post(handlers::create_todo),
        )
        .route("/todos/:id", axum::routing::delete(handlers::delete_todo))
        .route("/todos/:id/toggle", patch(handlers::toggle_todo))
        .with_state(state)
}

/// 設定に従ってドキュメントストアを構築
pub async fn build_store(config: &Config) -> Arc<dyn DocumentStore> {
    match config.store_backend {
        StoreBackend::Memory => {
            info!("インメモリストアを使用");
            Arc::new(InMemoryDocumentStore::new(TodoService::indexes()))
        }
        StoreBackend::DynamoDb => {
            info!(
                table = %config.dynamodb_table,
                endpoint = config.dynamodb_endpoint.as_deref().unwrap_or("default"),
                "DynamoDB ストアを使用"
            );
            let client = DynamoDbClient::new(config).await;
            Arc::new(DynamoDbDocumentStore::new(
                client,
                TodoService::indexes(),
                config.retry_max_attempts,
            ))
        }
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::TodoError;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// 標準化されたエラーレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// エラーコード
    pub code: String,
    /// ユーザー向けメッセージ
    pub message: String,
    /// 詳細情報（本番以外のみ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub request_id: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn from_todo_error(error: &TodoError, request_id: &str, include_details: bool) -> Self {
        Self {
            code: error_code(error).to_string(),
            message: user_message(error).to_string(),
            details: include_details.then(|| error.to_string()),
            request_id: request_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// HTTP ステータスコード
pub fn http_status(error: &TodoError) -> StatusCode {
    match error {
        TodoError::Unauthenticated => StatusCode::UNAUTHORIZED,
        TodoError::Forbidden(_) => StatusCode::FORBIDDEN,
        TodoError::NotFound(_) => StatusCode::NOT_FOUND,
        TodoError::Validation(_) => StatusCode::BAD_REQUEST,
        TodoError::ConcurrentModification => StatusCode::CONFLICT,
        TodoError::IdentityProvider(_) => StatusCode::SERVICE_UNAVAILABLE,
        TodoError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_code(error: &TodoError) -> &'static str {
    match error {
        TodoError::Unauthenticated => "UNAUTHENTICATED",
        TodoError::Forbidden(_) => "FORBIDDEN",
        TodoError::NotFound(_) => "NOT_FOUND",
        TodoError::Validation(_) => "VALIDATION_ERROR",
        TodoError::ConcurrentModification => "CONCURRENT_MODIFICATION",
        TodoError::IdentityProvider(_) => "IDENTITY_PROVIDER_UNAVAILABLE",
        TodoError::Store(_) => "STORE_ERROR",
    }
}

fn user_message(error: &TodoError) -> &'static str {
    match error {
        TodoError::Unauthenticated => "認証が必要です",
        TodoError::Forbidden(_) => "この操作を行う権限がありません",
        TodoError::NotFound(_) => "リソースが見つかりません",
        TodoError::Validation(_) => "入力内容に誤りがあります",
        TodoError::ConcurrentModification => "他の更新と競合しました。しばらくしてから再試行してください",
        TodoError::IdentityProvider(_) => "認証サービスが一時的に利用できません",
        TodoError::Store(_) => "内部エラーが発生しました",
    }
}

/// ハンドラが返すエラー
#[derive(Debug)]
pub struct ApiError {
    pub error: TodoError,
    pub request_id: String,
    pub include_details: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = http_status(&self.error);
        if status.is_server_error() {
            error!(request_id = %self.request_id, error = %self.error, "Request failed");
        } else {
            warn!(request_id = %self.request_id, error = %self.error, "Request rejected");
        }

        let body =
            ErrorResponse::from_todo_error(&self.error, &self.request_id, self.include_details);
        (status, Json(body)).into_response()
    }
}

use crate::error::ApiError;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use domain::{Todo, TodoError, TodoId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::{create_request_span, RequestContext};
use tracing::Instrument;

/// POST /todos リクエスト
#[derive(Debug, Deserialize)]
pub struct CreateTodoRequest {
    pub text: String,
}

/// POST /todos レスポンス
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateTodoResponse {
    pub id: TodoId,
}

/// PATCH /todos/:id/toggle リクエスト。Open モードでは `completed` が必須
#[derive(Debug, Default, Deserialize)]
pub struct ToggleTodoRequest {
    #[serde(default)]
    pub completed: Option<bool>,
}

/// PATCH /todos/:id/toggle レスポンス
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToggleTodoResponse {
    pub id: TodoId,
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthBody {
    status: &'static str,
    mode: &'static str,
}

/// `Authorization` ヘッダーから呼び出し元コンテキストを作る
fn request_context(headers: &HeaderMap) -> RequestContext {
    RequestContext::from_authorization_header(
        headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
    )
}

fn parse_id(raw: &str) -> Result<TodoId, TodoError> {
    Ok(TodoId::parse(raw)?)
}

/// JSON ボディの解析。空ボディは既定値として扱う
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, TodoError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| TodoError::Validation(format!("invalid JSON: {e}")))
}

pub(crate) async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let body = HealthBody {
        status: "ok",
        mode: state.service.mode().as_str(),
    };
    (StatusCode::OK, Json(body))
}

pub(crate) async fn list_todos(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Todo>>, ApiError> {
    let ctx = request_context(&headers);
    let span = create_request_span("todo-api", "list", ctx.request_id());

    let todos = state
        .service
        .list(&ctx)
        .instrument(span)
        .await
        .map_err(|e| state.api_error(e, &ctx))?;
    Ok(Json(todos))
}

pub(crate) async fn create_todo(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateTodoResponse>), ApiError> {
    let ctx = request_context(&headers);
    let span = create_request_span("todo-api", "add", ctx.request_id());

    let input: CreateTodoRequest = serde_json::from_slice(&body)
        .map_err(|e| state.api_error(TodoError::Validation(format!("invalid JSON: {e}")), &ctx))?;

    let id = state
        .service
        .add(&ctx, &input.text)
        .instrument(span)
        .await
        .map_err(|e| state.api_error(e, &ctx))?;
    Ok((StatusCode::CREATED, Json(CreateTodoResponse { id })))
}

pub(crate) async fn toggle_todo(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ToggleTodoResponse>, ApiError> {
    let ctx = request_context(&headers);
    let span = create_request_span("todo-api", "toggle", ctx.request_id());

    let id = parse_id(&raw_id).map_err(|e| state.api_error(e, &ctx))?;
    let input: ToggleTodoRequest = parse_body(&body).map_err(|e| state.api_error(e, &ctx))?;

    let completed = state
        .service
        .toggle(&ctx, &id, input.completed)
        .instrument(span)
        .await
        .map_err(|e| state.api_error(e, &ctx))?;
    Ok(Json(ToggleTodoResponse { id, completed }))
}

pub(crate) async fn delete_todo(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let ctx = request_context(&headers);
    let span = create_request_span("todo-api", "delete", ctx.request_id());

    let id = parse_id(&raw_id).map_err(|e| state.api_error(e, &ctx))?;
    state
        .service
        .delete(&ctx, &id)
        .instrument(span)
        .await
        .map_err(|e| state.api_error(e, &ctx))?;
    Ok(StatusCode::NO_CONTENT)
}

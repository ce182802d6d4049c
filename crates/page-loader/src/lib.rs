//! サーバーサイドのページデータ読み込み

pub mod client;
pub mod loader;

pub use client::*;
pub use loader::*;

use axum::{
    extract::State,
    http::{
        header::{AUTHORIZATION, COOKIE},
        HeaderMap,
    },
    routing::get,
    Json, Router,
};
use shared::{bearer_token, create_request_span, RequestContext};
use tracing::Instrument;

/// セッショントークンを保持する Cookie 名
pub const SESSION_COOKIE: &str = "__session";

/// ページサーバーのルータ
pub fn app(loader: PageLoader) -> Router {
    Router::new()
        .route("/", get(load_page))
        .with_state(loader)
}

async fn load_page(State(loader): State<PageLoader>, headers: HeaderMap) -> Json<PageData> {
    let ctx = RequestContext::new(session_token(&headers));
    let span = create_request_span("page-loader", "load", ctx.request_id());
    Json(loader.load(&ctx).instrument(span).await)
}

/// `__session` Cookie、なければ `Authorization` ヘッダーからセッショントークンを取り出す
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string());

    from_cookie.or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_string)
    })
}

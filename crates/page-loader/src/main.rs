//! page-server バイナリのエントリポイント

use anyhow::Context;
use page_loader::{app, HttpTodoClient, PageLoader};
use shared::{init_tracing, Config, JwtIdentityProvider};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing().map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let config = Config::from_env().context("failed to load configuration")?;

    // セッショントークンを受け入れ、API 向けトークンを発行する
    let identity = Arc::new(JwtIdentityProvider::new(
        &config.jwt_secret,
        &config.jwt_issuer,
        &config.session_audience,
        config.token_ttl_secs,
    ));
    let client = Arc::new(HttpTodoClient::new(&config.todo_api_url));
    let loader = PageLoader::new(identity, client, &config.api_audience);

    let listener = tokio::net::TcpListener::bind(&config.page_bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.page_bind_addr))?;
    info!(
        addr = %config.page_bind_addr,
        todo_api = %config.todo_api_url,
        "page server starting"
    );

    axum::serve(listener, app(loader))
        .await
        .context("server error")?;

    Ok(())
}

//! todo-api バイナリのエントリポイント

use anyhow::Context;
use shared::{init_tracing, Config, JwtIdentityProvider};
use std::sync::Arc;
use todo_api::{app, build_store, AppState};
use todo_service::TodoService;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing().map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let config = Config::from_env().context("failed to load configuration")?;
    info!(
        environment = %config.environment,
        mode = %config.auth_mode,
        "todo-api 起動中"
    );

    let store = build_store(&config).await;
    let identity = Arc::new(JwtIdentityProvider::new(
        &config.jwt_secret,
        &config.jwt_issuer,
        &config.api_audience,
        config.token_ttl_secs,
    ));
    let service = TodoService::new(store, identity, config.auth_mode)
        .with_max_toggle_attempts(config.retry_max_attempts);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "server starting");

    let router = app(AppState::new(service, !config.is_production()));
    axum::serve(listener, router).await.context("server error")?;

    Ok(())
}

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// トレーシングサブスクライバーを初期化
/// RUST_LOG 未設定時は info レベル
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).json())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()?;

    Ok(())
}

/// リクエスト単位のスパンを作成
pub fn create_request_span(component: &str, operation: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        component = component,
        operation = operation,
        request_id = request_id
    )
}

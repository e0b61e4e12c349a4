use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use animap_core::config_file;
use animap_web::{AppState, build_app};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let file = config_file::apply_env(config_file::load_config(), |name| {
        std::env::var(name).ok()
    });
    let config = file.to_config();
    let bind = file.bind_addr();

    let state = Arc::new(AppState::from_config(&config)?);
    let app = build_app(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    state.log_cache_stats();
    Ok(())
}

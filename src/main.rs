mod background;
mod config;
mod edge_config;
mod error;
mod flagship;
mod routes;
mod state;
#[cfg(test)]
mod testutils;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::background::BackgroundTasks;
use crate::edge_config::{EdgeConfigStore, HttpEdgeConfig, StaticEdgeConfig};
use crate::error::StartupError;
use crate::flagship::decision_api::DecisionApiProvider;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
    }
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = config::Config::from_env()?;
    init_tracing();

    if let Err(e) = config.flagship.credentials() {
        tracing::warn!(error = %e, "flag credentials not configured, /api/hello will fail");
    }

    let edge_config: Arc<dyn EdgeConfigStore> = match &config.edge_config {
        Some(connection) => Arc::new(HttpEdgeConfig::from_connection_string(
            connection,
            config.flagship.timeout,
        )?),
        None => {
            tracing::info!("EDGE_CONFIG not set, serving without a bucketing snapshot");
            Arc::new(StaticEdgeConfig::default())
        }
    };

    let flags = Arc::new(DecisionApiProvider::new(&config.flagship)?);

    let state = state::AppState {
        config: Arc::new(config.clone()),
        edge_config,
        flags,
        background: BackgroundTasks::default(),
    };
    let background = state.background.clone();

    let app = routes::routes(state);

    let listener = tokio::net::TcpListener::bind(config.addr()).await?;

    tracing::info!("server is chilling at http://{}", config.addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Hits queued by the last requests are flushed before exiting.
    background.drain().await;
    tracing::info!("shut down");
    Ok(())
}

use anyhow::{Context, Result};
use axum::Router;
use grid_study::{api, config, controller, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load().context("failed to load configuration")?;

    let app_state = controller::AppState::new(cfg.clone())?;

    let app: Router = api::router(app_state.clone(), &cfg);

    let addr = cfg.server.socket_addr()?;

    if cfg.server.host == "0.0.0.0" {
        warn!("Server binding to 0.0.0.0 - the API is reachable from the network");
    }

    info!(%addr, engines = cfg.engines.len(), "starting grid study service");

    let consumers = controller::spawn_consumer_tasks(&app_state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    for handle in consumers {
        handle.abort();
    }
    warn!("shutdown complete");
    Ok(())
}

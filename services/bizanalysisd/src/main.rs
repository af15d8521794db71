use clap::Parser;
use hyper::Server;
use metrics::MetricsHandle;
use storage::open_store;
use tokio::task;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod cors;
mod error;
mod extract;

#[cfg(test)]
mod api_tests;

use api::{router, AppState};
use config::{ensure_sqlite_parent_dir, log_startup, Args, Config};

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_args(Args::parse())?;
    info!(app = %config.app_name, "booting bizanalysisd");
    log_startup(&config);

    let store = match &config.database {
        Some(db) => {
            ensure_sqlite_parent_dir(&db.url)?;
            Some(open_store(&db.url, db.connect_timeout).await?)
        }
        None => {
            warn!("persistence disabled; data endpoints will answer 503");
            None
        }
    };

    let metrics = MetricsHandle::new()?;
    let metrics_addr = config.metrics_addr;
    let metrics_task = metrics.clone();
    task::spawn(async move {
        if let Err(err) = metrics_task.serve(metrics_addr).await {
            tracing::error!(error = ?err, "metrics server error");
        }
    });

    let bind = config.bind;
    let app = router(AppState::new(config, store, metrics));
    let server = Server::try_bind(&bind)?.serve(app.into_make_service());
    info!(addr = %bind, "ready");

    server.with_graceful_shutdown(shutdown_signal()).await?;
    info!("stopped");
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use activity_usage_api::app::{create_app, AppState};
use activity_usage_api::config::Config;
use activity_usage_api::jobs::{JobScheduler, KeyRotationJob};
use activity_usage_api::middleware::{init_logging, init_metrics};
use activity_usage_api::services::EnvSecretStore;
use persistence::PgTableStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    init_logging(&config.logging)?;
    init_metrics()?;

    info!("Starting Activity Usage API v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&config.database.pool_config()).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let addr = config.socket_addr()?;
    let state = AppState::build(
        config.clone(),
        Arc::new(PgTableStore::new(pool)),
        Arc::new(EnvSecretStore::new()),
    )
    .await?;

    let mut scheduler = JobScheduler::new();
    match (&config.pseudonymization.previous_secret_name, config.rotation.job_enabled) {
        (Some(previous), true) => {
            scheduler.register(KeyRotationJob::new(state.rotation.clone(), previous.clone()));
        }
        (None, true) => {
            warn!("rotation.job_enabled is set but no previous_secret_name is configured");
        }
        _ => {}
    }
    scheduler.start();

    let app = create_app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(30)).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

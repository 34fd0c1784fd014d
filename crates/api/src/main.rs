use std::sync::Arc;

use anyhow::{Context, Result};

use ewallet_api::app::{build_app, AppServices};
use ewallet_api::config::AppConfig;
use ewallet_infra::{migrations, PostgresLedgerStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("failed to read configuration")?;
    ewallet_observability::init();

    tracing::info!(database = ?config.database, "starting ewallet-api");

    let store = PostgresLedgerStore::connect(&config.database).context("failed to configure database pool")?;

    if config.database.run_migrations {
        migrations::run(store.pool())
            .await
            .context("failed to run migrations")?;
    }

    let services = Arc::new(AppServices::new(store, config.request_timeout));
    let app = build_app(services);

    let address = config.address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received");
    }
}

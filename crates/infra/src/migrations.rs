//! Embedded schema migrations (`crates/infra/migrations`).

use sqlx::PgPool;
use sqlx::migrate::{MigrateError, Migrator};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply every pending migration.
pub async fn run(pool: &PgPool) -> Result<(), MigrateError> {
    tracing::info!(migrations = MIGRATOR.iter().count(), "applying schema migrations");
    MIGRATOR.run(pool).await
}

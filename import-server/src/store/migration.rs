//! Database migration management.
//!
//! Migrations are applied before the API starts serving requests; startup
//! aborts when they cannot be applied.

use rocket_db_pools::sqlx::{self, PgPool, migrate::Migrator};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations.
///
/// Idempotent: migrations already recorded in `_sqlx_migrations` are skipped
/// after their checksums are verified.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    log::info!("checking database migration state");

    MIGRATOR.run(pool).await?;

    log::info!("database migrations up to date");
    Ok(())
}

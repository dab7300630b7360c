use rocket_db_pools::{sqlx, Database};

/// Process-wide Postgres pool holding both the ledger and the target tables.
#[derive(Database)]
#[database("import_db")]
pub struct ImportDb(sqlx::PgPool);

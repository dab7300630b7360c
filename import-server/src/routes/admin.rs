//! Administrative endpoints for ledger inspection.

use crate::config::ImportConfig;
use crate::error::ApiError;
use crate::models::{DataResponse, ImportJob};
use crate::store::JobLedger;
use rocket::State;
use rocket::serde::json::Json;
use rocket_db_pools::sqlx;
use rocket_okapi::openapi;
use std::time::Duration;

/// List `pending` jobs older than `older_than_secs`.
///
/// These were interrupted between their transaction outcome and ledger
/// finalization and need reconciliation. Defaults to the configured
/// threshold.
#[openapi(tag = "Admin")]
#[get("/admin/imports/stale?<older_than_secs>")]
pub async fn list_stale_imports(
    older_than_secs: Option<u64>,
    pool: &State<sqlx::PgPool>,
    config: &State<ImportConfig>,
) -> Result<Json<DataResponse<Vec<ImportJob>>>, ApiError> {
    let older_than = older_than_secs
        .map(Duration::from_secs)
        .unwrap_or(config.stale_pending_after);

    let ledger = JobLedger::new(pool.inner().clone());
    let jobs = ledger.list_stale_pending(older_than).await?;

    if !jobs.is_empty() {
        log::warn!(
            "{} import job(s) pending for longer than {}s",
            jobs.len(),
            older_than.as_secs()
        );
    }

    Ok(Json(DataResponse { data: jobs }))
}

//! Liveness and readiness endpoints.

use crate::error::ApiError;
use rocket::State;
use rocket::serde::json::Json;
use rocket_db_pools::sqlx;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};

/// Basic response payload describing service health.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HealthResponse {
    /// `ok` when the check passed.
    pub status: String,
}

/// Process liveness; never touches the database.
#[openapi(tag = "Health")]
#[get("/health/live")]
pub fn live_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness: confirms a pooled connection can run a query.
#[openapi(tag = "Health")]
#[get("/health/ready")]
pub async fn ready_health(pool: &State<sqlx::PgPool>) -> Result<Json<HealthResponse>, ApiError> {
    sqlx::query("SELECT 1").execute(pool.inner()).await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

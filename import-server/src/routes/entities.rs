//! Read access to imported entities.

use crate::error::ApiError;
use crate::models::PersistedEntity;
use crate::store::entities;
use rocket::State;
use rocket::serde::json::Json;
use rocket_db_pools::sqlx;
use rocket_okapi::openapi;

/// Fetch an entity by its exact email.
#[openapi(tag = "Entities")]
#[get("/entities/<email>")]
pub async fn get_entity(
    email: String,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<PersistedEntity>, ApiError> {
    entities::find_by_email(pool.inner(), &email)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Entity '{email}' not found")))
}

//! Import endpoint and ledger lookups.

use crate::config::ImportConfig;
use crate::error::ApiError;
use crate::import::{ImportOrchestrator, ImportOutcome};
use crate::models::{ImportJob, ImportRecord};
use crate::store::JobLedger;
use crate::validation::validate_batch;
use rocket::State;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::json::Json;
use rocket_db_pools::sqlx;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use rocket_okapi::request::OpenApiFromRequest;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use uuid::Uuid;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

const GENERATED_TOKEN_NOTE: &str = "No Idempotency-Key was supplied; a key was generated for this request. Resubmitting without it will not be deduplicated.";

/// Raw `Idempotency-Key` header, checked by [`IdempotencyKey::token`] so a
/// malformed value surfaces as an [`ApiError`] body.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct IdempotencyKey(pub Option<String>);

impl IdempotencyKey {
    pub fn token(&self) -> Result<Option<String>, ApiError> {
        parse_idempotency_key(self.0.as_deref()).map_err(ApiError::BadRequest)
    }
}

/// Interpret the raw header value. Absent is fine; blank or oversized is not.
pub fn parse_idempotency_key(raw: Option<&str>) -> Result<Option<String>, String> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let token = raw.trim();
    if token.is_empty() {
        return Err(format!("{IDEMPOTENCY_HEADER} header must not be empty"));
    }
    if token.chars().count() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(format!(
            "{IDEMPOTENCY_HEADER} header exceeds {MAX_IDEMPOTENCY_KEY_LEN} characters"
        ));
    }
    Ok(Some(token.to_string()))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for IdempotencyKey {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(IdempotencyKey(
            request
                .headers()
                .get_one(IDEMPOTENCY_HEADER)
                .map(str::to_string),
        ))
    }
}

/// Result of an import request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub job_id: Uuid,
    /// Token the job is recorded under; echo it on retries.
    pub token: String,
    pub total: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Present when the token had already completed and nothing was written.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
    /// Present when the server generated `token`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub token_generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ImportResponse {
    fn from_outcome(outcome: ImportOutcome, token: String, token_generated: bool) -> Self {
        let summary = outcome.summary();
        Self {
            job_id: outcome.job_id(),
            token,
            total: summary.total,
            inserted: summary.inserted,
            updated: summary.updated,
            duplicate: outcome.is_duplicate(),
            token_generated,
            note: token_generated.then(|| GENERATED_TOKEN_NOTE.to_string()),
        }
    }
}

/// Import a batch of records exactly once per idempotency key.
///
/// The whole batch commits or none of it does. Replaying a completed key
/// returns the stored summary with `duplicate: true`; a key still being
/// processed yields 409.
#[openapi(tag = "Imports")]
#[post("/imports", data = "<records>")]
pub async fn create_import(
    key: IdempotencyKey,
    records: Json<Vec<ImportRecord>>,
    pool: &State<sqlx::PgPool>,
    config: &State<ImportConfig>,
) -> Result<Json<ImportResponse>, ApiError> {
    let supplied = key.token()?;
    let records = records.into_inner();
    validate_batch(&records, config.inner())?;

    let (token, token_generated) = match supplied {
        Some(token) => (token, false),
        None => (Uuid::new_v4().to_string(), true),
    };
    if token_generated {
        log::debug!("generated idempotency key '{}'", token);
    }

    let orchestrator = ImportOrchestrator::new(pool.inner().clone(), config.inner());
    let outcome = orchestrator.run(&token, records).await?;

    Ok(Json(ImportResponse::from_outcome(
        outcome,
        token,
        token_generated,
    )))
}

/// Look up the ledger entry for an idempotency key.
#[openapi(tag = "Imports")]
#[get("/imports/<token>")]
pub async fn get_import(
    token: String,
    pool: &State<sqlx::PgPool>,
) -> Result<Json<ImportJob>, ApiError> {
    let ledger = JobLedger::new(pool.inner().clone());
    ledger
        .find_by_token(&token)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No import recorded for key '{token}'")))
}

//! Import job ledger.
//!
//! Claims are made inside the caller's import transaction so that the
//! `pending` row and the entity writes commit or roll back together. A second
//! request for the same token blocks on the uncommitted row inside the UNIQUE
//! index and then either wins the insert (the first rolled back) or observes
//! the committed row. Finalization runs on the pool after that transaction has
//! ended.

use crate::models::{ImportJob, ImportSummary, JobStatus};
use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, PgConnection, PgPool, types::Json};
use std::time::Duration;
use uuid::Uuid;

/// Bound on insert / re-read / re-claim rounds for one claim.
const CLAIM_ROUNDS: usize = 3;

/// Result of trying to reserve the ledger slot for a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This request owns the job and must perform the writes.
    Claimed { job_id: Uuid, attempt: i32 },
    /// The token already finished; replay its summary.
    AlreadyCompleted { job_id: Uuid, summary: ImportSummary },
    /// Another request holds the token.
    AlreadyInProgress { job_id: Uuid },
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    token: String,
    status: JobStatus,
    summary: Json<ImportSummary>,
    attempts: i32,
    payload_digest: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for ImportJob {
    fn from(row: JobRow) -> Self {
        ImportJob {
            id: row.id,
            token: row.token,
            status: row.status,
            summary: row.summary.0,
            attempts: row.attempts,
            payload_digest: row.payload_digest,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const JOB_COLUMNS: &str =
    "id, token, status, summary, attempts, payload_digest, created_at, updated_at";

pub struct JobLedger {
    pool: PgPool,
}

impl JobLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reserve the ledger slot for `token` on the caller's transaction.
    ///
    /// Never reads before writing: the conditional insert is the claim, and
    /// the existing row is only consulted once the insert reported a conflict.
    /// A `failed` job is taken over with a status-guarded update.
    pub async fn claim(
        &self,
        conn: &mut PgConnection,
        token: &str,
        total: usize,
        payload_digest: &str,
    ) -> Result<ClaimOutcome, sqlx::Error> {
        let pending = Json(ImportSummary::pending(total));

        for round in 0..CLAIM_ROUNDS {
            let job_id = Uuid::new_v4();
            let inserted: Option<Uuid> = sqlx::query_scalar(
                r#"INSERT INTO import_jobs (id, token, status, summary, payload_digest)
                   VALUES ($1, $2, 'pending', $3, $4)
                   ON CONFLICT (token) DO NOTHING
                   RETURNING id"#,
            )
            .bind(job_id)
            .bind(token)
            .bind(&pending)
            .bind(payload_digest)
            .fetch_optional(&mut *conn)
            .await?;

            if let Some(job_id) = inserted {
                log::debug!("claimed import token '{}' as job {}", token, job_id);
                return Ok(ClaimOutcome::Claimed { job_id, attempt: 1 });
            }

            let existing: Option<(Uuid, JobStatus, Json<ImportSummary>, Option<String>)> =
                sqlx::query_as(
                    "SELECT id, status, summary, payload_digest FROM import_jobs WHERE token = $1",
                )
                .bind(token)
                .fetch_optional(&mut *conn)
                .await?;

            let Some((job_id, status, summary, stored_digest)) = existing else {
                log::debug!(
                    "import token '{}' conflicted but no row is visible (round {})",
                    token,
                    round
                );
                continue;
            };

            match status {
                JobStatus::Completed => {
                    if stored_digest.as_deref() != Some(payload_digest) {
                        log::warn!(
                            "import token '{}' replayed with a different payload; returning job {} result",
                            token,
                            job_id
                        );
                    }
                    return Ok(ClaimOutcome::AlreadyCompleted {
                        job_id,
                        summary: summary.0,
                    });
                }
                JobStatus::Pending => {
                    return Ok(ClaimOutcome::AlreadyInProgress { job_id });
                }
                JobStatus::Failed => {
                    let reclaimed: Option<(Uuid, i32)> = sqlx::query_as(
                        r#"UPDATE import_jobs
                           SET status = 'pending',
                               summary = $2,
                               payload_digest = $3,
                               attempts = attempts + 1,
                               updated_at = NOW()
                           WHERE token = $1 AND status = 'failed'
                           RETURNING id, attempts"#,
                    )
                    .bind(token)
                    .bind(&pending)
                    .bind(payload_digest)
                    .fetch_optional(&mut *conn)
                    .await?;

                    if let Some((job_id, attempt)) = reclaimed {
                        log::info!(
                            "re-claimed failed import job {} for token '{}' (attempt {})",
                            job_id,
                            token,
                            attempt
                        );
                        return Ok(ClaimOutcome::Claimed { job_id, attempt });
                    }
                }
            }
        }

        Err(sqlx::Error::Protocol(format!(
            "could not resolve claim for import token '{token}' after {CLAIM_ROUNDS} rounds"
        )))
    }

    /// Mark a committed job as completed.
    ///
    /// Returns `false` when the job was no longer `pending`.
    pub async fn finalize_completed(
        &self,
        job_id: Uuid,
        summary: &ImportSummary,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE import_jobs
               SET status = 'completed', summary = $2, updated_at = NOW()
               WHERE id = $1 AND status = 'pending'"#,
        )
        .bind(job_id)
        .bind(Json(summary))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record a failed job after its transaction rolled back.
    ///
    /// The rollback erases a first-time claim, so the row is recreated under
    /// the same id. A re-claim of a `failed` job is undone by the rollback as
    /// well, including its `attempts` increment; that row is still `failed`
    /// under this id and is counted and relabelled here. Any other existing
    /// row (another job's, or one a concurrent request has re-claimed) is left
    /// alone.
    pub async fn finalize_failed(
        &self,
        job_id: Uuid,
        token: &str,
        summary: &ImportSummary,
        payload_digest: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"INSERT INTO import_jobs (id, token, status, summary, payload_digest)
               VALUES ($1, $2, 'failed', $3, $4)
               ON CONFLICT (token) DO UPDATE
               SET summary = EXCLUDED.summary,
                   payload_digest = EXCLUDED.payload_digest,
                   attempts = import_jobs.attempts + 1,
                   updated_at = NOW()
               WHERE import_jobs.id = EXCLUDED.id AND import_jobs.status = 'failed'"#,
        )
        .bind(job_id)
        .bind(token)
        .bind(Json(summary))
        .bind(payload_digest)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Option<ImportJob>, sqlx::Error> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM import_jobs WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ImportJob::from))
    }

    /// Pending jobs not touched for at least `older_than`, oldest first.
    ///
    /// These are jobs whose request died between commit/rollback and
    /// finalization.
    pub async fn list_stale_pending(
        &self,
        older_than: Duration,
    ) -> Result<Vec<ImportJob>, sqlx::Error> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            r#"SELECT {JOB_COLUMNS} FROM import_jobs
               WHERE status = 'pending'
                 AND updated_at < NOW() - make_interval(secs => $1)
               ORDER BY updated_at ASC"#
        ))
        .bind(older_than.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ImportJob::from).collect())
    }
}

//! Job orchestration for idempotent imports.
//!
//! One import request is one transaction: the ledger claim and every chunk
//! write share it, so a failure anywhere discards the whole batch including
//! a first-time claim. The ledger is finalized afterwards on its own
//! connection because a rolled-back transaction cannot record its own
//! failure.

use crate::config::ImportConfig;
use crate::import::upsert::{BatchUpsertEngine, collapse_duplicates};
use crate::import::{ImportError, ImportOutcome};
use crate::models::{ImportRecord, ImportSummary};
use crate::store::{ClaimOutcome, JobLedger};
use rocket_db_pools::sqlx::{PgPool, Postgres, Transaction};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Message stored on the ledger for failed jobs. Details stay in the logs.
const FAILED_SUMMARY_MESSAGE: &str = "import transaction rolled back";

/// Stable fingerprint of a collapsed batch, stored on the ledger row.
pub fn payload_digest(records: &[ImportRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.email.as_bytes());
        hasher.update([0u8]);
        hasher.update(record.name.as_bytes());
        hasher.update([0u8]);
        if let Some(metadata) = &record.metadata {
            hasher.update(metadata.to_string().as_bytes());
        }
        hasher.update([0xffu8]);
    }
    format!("{:x}", hasher.finalize())
}

pub struct ImportOrchestrator {
    pool: PgPool,
    ledger: JobLedger,
    engine: BatchUpsertEngine,
}

impl ImportOrchestrator {
    pub fn new(pool: PgPool, config: &ImportConfig) -> Self {
        Self {
            ledger: JobLedger::new(pool.clone()),
            engine: BatchUpsertEngine::new(config.chunk_size),
            pool,
        }
    }

    /// Import `records` at most once under `token`.
    ///
    /// Returns [`ImportOutcome::Duplicate`] with the stored summary when the
    /// token already completed, and [`ImportError::InProgress`] when another
    /// request holds it. Any storage error rolls back every write.
    pub async fn run(
        &self,
        token: &str,
        records: Vec<ImportRecord>,
    ) -> Result<ImportOutcome, ImportError> {
        let submitted = records.len();
        let (records, dropped) = collapse_duplicates(records);
        if dropped > 0 {
            log::info!(
                "import token '{}': collapsed {} duplicate email(s) out of {} records",
                token,
                dropped,
                submitted
            );
        }
        let digest = payload_digest(&records);

        let mut tx = self.pool.begin().await?;

        let claim = self
            .ledger
            .claim(&mut *tx, token, records.len(), &digest)
            .await?;

        let job_id = match claim {
            ClaimOutcome::Claimed { job_id, attempt } => {
                log::info!(
                    "import job {} claimed for token '{}' ({} records, attempt {})",
                    job_id,
                    token,
                    records.len(),
                    attempt
                );
                job_id
            }
            ClaimOutcome::AlreadyCompleted { job_id, summary } => {
                release(tx, token).await;
                log::info!(
                    "import token '{}' already completed as job {}; returning stored summary",
                    token,
                    job_id
                );
                return Ok(ImportOutcome::Duplicate { job_id, summary });
            }
            ClaimOutcome::AlreadyInProgress { job_id } => {
                release(tx, token).await;
                log::info!(
                    "import token '{}' is in progress as job {}; rejecting",
                    token,
                    job_id
                );
                return Err(ImportError::InProgress {
                    token: token.to_string(),
                    job_id,
                });
            }
        };

        let result = match self.engine.upsert_all(&mut *tx, &records).await {
            Ok(summary) => tx.commit().await.map(|_| summary).map_err(ImportError::from),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    log::error!(
                        "rollback failed for import job {}: {}",
                        job_id,
                        rollback_err
                    );
                }
                Err(err)
            }
        };

        match result {
            Ok(summary) => {
                self.finish_completed(job_id, token, &summary).await;
                Ok(ImportOutcome::Completed { job_id, summary })
            }
            Err(err) => {
                log::error!(
                    "import job {} for token '{}' failed: {}",
                    job_id,
                    token,
                    err
                );
                self.finish_failed(job_id, token, records.len(), &digest)
                    .await;
                Err(err)
            }
        }
    }

    async fn finish_completed(&self, job_id: Uuid, token: &str, summary: &ImportSummary) {
        match self.ledger.finalize_completed(job_id, summary).await {
            Ok(true) => log::info!(
                "import job {} completed: {} total, {} inserted, {} updated",
                job_id,
                summary.total,
                summary.inserted,
                summary.updated
            ),
            Ok(false) => log::warn!(
                "import job {} for token '{}' committed but was no longer pending at finalize",
                job_id,
                token
            ),
            Err(err) => log::error!(
                "import job {} for token '{}' committed but finalize failed; left pending for reconciliation: {}",
                job_id,
                token,
                err
            ),
        }
    }

    /// Best effort: a failure here is logged and left for reconciliation.
    async fn finish_failed(&self, job_id: Uuid, token: &str, total: usize, digest: &str) {
        let summary = ImportSummary::failed(total, FAILED_SUMMARY_MESSAGE);
        match self
            .ledger
            .finalize_failed(job_id, token, &summary, digest)
            .await
        {
            Ok(true) => log::info!("import job {} marked failed", job_id),
            Ok(false) => log::warn!(
                "import job {} not marked failed: token '{}' was taken over by another request",
                job_id,
                token
            ),
            Err(err) => log::error!(
                "could not mark import job {} failed; left for reconciliation: {}",
                job_id,
                err
            ),
        }
    }
}

/// End a transaction that performed no writes besides a losing claim.
async fn release(tx: Transaction<'static, Postgres>, token: &str) {
    if let Err(err) = tx.rollback().await {
        log::warn!(
            "rollback after losing claim for token '{}' failed: {}",
            token,
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn digest_is_stable_and_payload_sensitive() {
        let records = vec![
            ImportRecord::new("Alice", "alice@example.com"),
            ImportRecord::new("Bob", "bob@example.com"),
        ];
        let digest = payload_digest(&records);

        assert_eq!(digest.len(), 64);
        assert_eq!(digest, payload_digest(&records.clone()));

        let renamed = vec![
            ImportRecord::new("Alicia", "alice@example.com"),
            ImportRecord::new("Bob", "bob@example.com"),
        ];
        assert_ne!(digest, payload_digest(&renamed));

        let with_meta = vec![
            ImportRecord::new("Alice", "alice@example.com").with_metadata(json!({"vip": true})),
            ImportRecord::new("Bob", "bob@example.com"),
        ];
        assert_ne!(digest, payload_digest(&with_meta));
    }

    #[test]
    fn digest_separates_fields() {
        let a = vec![ImportRecord::new("b", "a@x.com")];
        let b = vec![ImportRecord::new("", "a@x.comb")];
        assert_ne!(payload_digest(&a), payload_digest(&b));
    }
}

//! Idempotent bulk import pipeline.
//!
//! # Components
//!
//! - **`upsert`**: collapses duplicate emails, splits the batch into chunks
//!   and classifies each chunk against the rows it locks before issuing one
//!   set-based write per chunk.
//! - **`orchestrator`**: owns the transaction boundary. Claims the token on
//!   the ledger, drives the upsert engine chunk by chunk, commits or rolls
//!   back, then finalizes the ledger row in a separate unit of work.
//!
//! # Flow
//!
//! 1. Collapse duplicate emails (last occurrence wins)
//! 2. `BEGIN`; claim the token with a conditional insert
//! 3. Per chunk: lock existing emails, classify, write
//! 4. `COMMIT` (or `ROLLBACK` on any error)
//! 5. Finalize the ledger row as `completed` or `failed`
//!
//! A crash between 4 and 5 leaves the job `pending`; those rows are listed by
//! [`crate::store::JobLedger::list_stale_pending`] for reconciliation.

pub mod orchestrator;
pub mod upsert;

pub use orchestrator::ImportOrchestrator;
pub use upsert::BatchUpsertEngine;

use crate::models::ImportSummary;
use rocket_db_pools::sqlx;
use thiserror::Error;
use uuid::Uuid;

/// Successful result of an import request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// This request performed the writes.
    Completed { job_id: Uuid, summary: ImportSummary },
    /// The token had already completed; nothing was written.
    Duplicate { job_id: Uuid, summary: ImportSummary },
}

impl ImportOutcome {
    pub fn job_id(&self) -> Uuid {
        match self {
            ImportOutcome::Completed { job_id, .. } | ImportOutcome::Duplicate { job_id, .. } => {
                *job_id
            }
        }
    }

    pub fn summary(&self) -> &ImportSummary {
        match self {
            ImportOutcome::Completed { summary, .. }
            | ImportOutcome::Duplicate { summary, .. } => summary,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, ImportOutcome::Duplicate { .. })
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import token '{token}' is already being processed by job {job_id}")]
    InProgress { token: String, job_id: Uuid },
    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error(
        "chunk write affected {actual_inserted} inserts and {actual_updated} updates, expected {expected_inserted} and {expected_updated}"
    )]
    Inconsistent {
        expected_inserted: usize,
        expected_updated: usize,
        actual_inserted: u64,
        actual_updated: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_accessors() {
        let job_id = Uuid::new_v4();
        let summary = ImportSummary {
            total: 2,
            inserted: 2,
            updated: 0,
            error: None,
        };
        let outcome = ImportOutcome::Duplicate {
            job_id,
            summary: summary.clone(),
        };
        assert_eq!(outcome.job_id(), job_id);
        assert_eq!(outcome.summary(), &summary);
        assert!(outcome.is_duplicate());
        assert!(!ImportOutcome::Completed { job_id, summary }.is_duplicate());
    }

    #[test]
    fn in_progress_message_names_token() {
        let conflict = ImportError::InProgress {
            token: "T1".into(),
            job_id: Uuid::new_v4(),
        };
        assert!(conflict.to_string().contains("'T1'"));
    }
}

//! Persistent state for the import pipeline.
//!
//! - **`ledger`**: the `import_jobs` table. One row per idempotency token,
//!   claimed with an atomic conditional insert and finalized outside the
//!   import transaction.
//! - **`entities`**: the `entities` table keyed by email. Only written from
//!   inside an import transaction.
//! - **`migration`**: applies the SQLx migrations at startup.
//!
//! The UNIQUE constraints on `import_jobs.token` and `entities.email` are the
//! only mechanism used for deduplication and upsert classification.

pub mod entities;
pub mod ledger;
pub mod migration;

pub use ledger::{ClaimOutcome, JobLedger};
pub use migration::run_migrations;

//! Batch upsert engine.
//!
//! Classifies every record as an insert or an update by reading the target
//! rows inside the import transaction, rather than relying on engine-specific
//! "row was inserted" markers. Correctness only depends on read-your-writes
//! within one transaction plus the UNIQUE index on `entities.email`.

use crate::import::ImportError;
use crate::models::{ImportRecord, ImportSummary};
use crate::store::entities;
use rocket_db_pools::sqlx::PgConnection;
use std::collections::HashSet;

/// Records split by whether their email already has a row.
#[derive(Debug, Default, PartialEq)]
pub struct ChunkPlan {
    pub fresh: Vec<ImportRecord>,
    pub existing: Vec<ImportRecord>,
}

/// Drop earlier records that share an email with a later one.
///
/// The survivors keep the relative order of their last occurrence. Returns the
/// collapsed batch and how many records were dropped.
pub fn collapse_duplicates(records: Vec<ImportRecord>) -> (Vec<ImportRecord>, usize) {
    let submitted = records.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(submitted);
    let mut kept: Vec<ImportRecord> = Vec::with_capacity(submitted);

    for record in records.into_iter().rev() {
        if seen.insert(record.email.clone()) {
            kept.push(record);
        }
    }
    kept.reverse();

    let dropped = submitted - kept.len();
    (kept, dropped)
}

/// Partition a chunk against the set of emails already stored.
pub fn classify(chunk: &[ImportRecord], existing_emails: &HashSet<String>) -> ChunkPlan {
    let (existing, fresh): (Vec<ImportRecord>, Vec<ImportRecord>) = chunk
        .iter()
        .cloned()
        .partition(|record| existing_emails.contains(&record.email));
    ChunkPlan { fresh, existing }
}

pub struct BatchUpsertEngine {
    chunk_size: usize,
}

impl BatchUpsertEngine {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Write every chunk sequentially on `conn`.
    ///
    /// `records` must already be collapsed; the returned summary has
    /// `total == records.len()`.
    pub async fn upsert_all(
        &self,
        conn: &mut PgConnection,
        records: &[ImportRecord],
    ) -> Result<ImportSummary, ImportError> {
        let mut summary = ImportSummary::pending(records.len());
        let chunk_count = records.len().div_ceil(self.chunk_size);

        for (index, chunk) in records.chunks(self.chunk_size).enumerate() {
            let plan = self.upsert_chunk(conn, chunk).await?;
            summary.record_chunk(plan.fresh.len(), plan.existing.len());
            log::debug!(
                "chunk {}/{}: {} inserted, {} updated",
                index + 1,
                chunk_count,
                plan.fresh.len(),
                plan.existing.len()
            );
        }

        Ok(summary)
    }

    async fn upsert_chunk(
        &self,
        conn: &mut PgConnection,
        chunk: &[ImportRecord],
    ) -> Result<ChunkPlan, ImportError> {
        let emails: Vec<String> = chunk.iter().map(|record| record.email.clone()).collect();
        let existing_emails = entities::lock_existing_emails(conn, &emails).await?;
        let plan = classify(chunk, &existing_emails);

        let counts = entities::write_chunk(conn, &plan.fresh, &plan.existing).await?;
        if counts.inserted != plan.fresh.len() as u64 || counts.updated != plan.existing.len() as u64
        {
            return Err(ImportError::Inconsistent {
                expected_inserted: plan.fresh.len(),
                expected_updated: plan.existing.len(),
                actual_inserted: counts.inserted,
                actual_updated: counts.updated,
            });
        }

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emails(records: &[ImportRecord]) -> Vec<&str> {
        records.iter().map(|record| record.email.as_str()).collect()
    }

    #[test]
    fn collapse_keeps_last_occurrence() {
        let records = vec![
            ImportRecord::new("First A", "a@x.com"),
            ImportRecord::new("B", "b@x.com"),
            ImportRecord::new("Second A", "a@x.com"),
        ];

        let (collapsed, dropped) = collapse_duplicates(records);

        assert_eq!(dropped, 1);
        assert_eq!(emails(&collapsed), vec!["b@x.com", "a@x.com"]);
        assert_eq!(collapsed[1].name, "Second A");
    }

    #[test]
    fn collapse_is_exact_match_on_email() {
        let records = vec![
            ImportRecord::new("Upper", "A@x.com"),
            ImportRecord::new("Lower", "a@x.com"),
        ];

        let (collapsed, dropped) = collapse_duplicates(records);

        assert_eq!(dropped, 0);
        assert_eq!(collapsed.len(), 2);
    }

    #[test]
    fn collapse_without_duplicates_is_identity() {
        let records = vec![
            ImportRecord::new("Alice", "alice@example.com"),
            ImportRecord::new("Bob", "bob@example.com"),
        ];

        let (collapsed, dropped) = collapse_duplicates(records.clone());

        assert_eq!(dropped, 0);
        assert_eq!(collapsed, records);
    }

    #[test]
    fn classify_partitions_by_existing_email() {
        let chunk = vec![
            ImportRecord::new("Alice", "alice@example.com"),
            ImportRecord::new("Bob", "bob@example.com"),
            ImportRecord::new("Carol", "carol@example.com"),
        ];
        let existing: HashSet<String> = ["bob@example.com".to_string()].into_iter().collect();

        let plan = classify(&chunk, &existing);

        assert_eq!(
            emails(&plan.fresh),
            vec!["alice@example.com", "carol@example.com"]
        );
        assert_eq!(emails(&plan.existing), vec!["bob@example.com"]);
    }

    #[test]
    fn classify_against_empty_store_is_all_new() {
        let chunk = vec![ImportRecord::new("Alice", "alice@example.com")];

        let plan = classify(&chunk, &HashSet::new());

        assert_eq!(plan.fresh.len(), 1);
        assert!(plan.existing.is_empty());
    }

    #[test]
    fn chunk_size_is_at_least_one() {
        assert_eq!(BatchUpsertEngine::new(0).chunk_size, 1);
        assert_eq!(BatchUpsertEngine::new(500).chunk_size, 500);
    }
}

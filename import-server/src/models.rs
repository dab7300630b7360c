use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::{self, FromRow};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ===== Import Input =====

/// A single candidate record submitted for import.
///
/// Records are keyed by `email`, compared exactly as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImportRecord {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ImportRecord {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// ===== Target Store =====

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ===== Ledger =====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "import_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

/// Outcome counters recorded on the ledger row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ImportSummary {
    pub total: usize,
    pub inserted: usize,
    pub updated: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportSummary {
    /// Summary stored alongside a freshly claimed job.
    pub fn pending(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn failed(total: usize, error: impl Into<String>) -> Self {
        Self {
            total,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Add the counts from one written chunk.
    pub fn record_chunk(&mut self, inserted: usize, updated: usize) {
        self.inserted += inserted;
        self.updated += updated;
    }

    /// True when every record was classified exactly once.
    pub fn is_consistent(&self) -> bool {
        self.error.is_none() && self.inserted + self.updated == self.total
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: Uuid,
    pub token: String,
    pub status: JobStatus,
    pub summary: ImportSummary,
    pub attempts: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_digest: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Generic `{ "data": ... }` envelope for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DataResponse<T> {
    pub data: T,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_accumulates_chunks() {
        let mut summary = ImportSummary::pending(5);
        summary.record_chunk(2, 1);
        assert!(!summary.is_consistent());
        summary.record_chunk(1, 1);
        assert_eq!(summary.inserted, 3);
        assert_eq!(summary.updated, 2);
        assert!(summary.is_consistent());
    }

    #[test]
    fn failed_summary_is_never_consistent() {
        let summary = ImportSummary::failed(0, "boom");
        assert!(!summary.is_consistent());
    }

    #[test]
    fn summary_omits_missing_error() {
        let value = serde_json::to_value(ImportSummary::pending(2)).expect("serialize");
        assert_eq!(value, json!({"total": 2, "inserted": 0, "updated": 0}));

        let parsed: ImportSummary =
            serde_json::from_value(json!({"total": 1, "inserted": 1, "updated": 0}))
                .expect("deserialize");
        assert_eq!(parsed.error, None);
    }

    #[test]
    fn record_metadata_is_optional() {
        let record: ImportRecord =
            serde_json::from_value(json!({"name": "Alice", "email": "alice@example.com"}))
                .expect("deserialize");
        assert_eq!(record, ImportRecord::new("Alice", "alice@example.com"));

        let with_meta = record.with_metadata(json!({"tier": "gold"}));
        let value = serde_json::to_value(&with_meta).expect("serialize");
        assert_eq!(value["metadata"]["tier"], "gold");
    }

    #[test]
    fn job_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(JobStatus::Pending).expect("serialize"), "pending");
        assert_eq!(serde_json::to_value(JobStatus::Failed).expect("serialize"), "failed");
    }
}

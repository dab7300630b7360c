//! Shape validation for submitted import batches.
//!
//! Runs in front of the import core; the orchestrator assumes its input
//! already passed these checks.

use crate::config::ImportConfig;
use crate::models::ImportRecord;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// Longest email accepted (RFC 5321 path limit).
pub const MAX_EMAIL_LEN: usize = 320;

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email regex")
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("batch must contain between 1 and {max} records, got {actual}")]
    BatchSize { actual: usize, max: usize },
    #[error("record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },
}

fn invalid(index: usize, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidRecord {
        index,
        reason: reason.into(),
    }
}

/// Check batch bounds and every record's shape.
///
/// Reports the first offending record by its position in the submission.
pub fn validate_batch(
    records: &[ImportRecord],
    config: &ImportConfig,
) -> Result<(), ValidationError> {
    if records.is_empty() || records.len() > config.max_records {
        return Err(ValidationError::BatchSize {
            actual: records.len(),
            max: config.max_records,
        });
    }

    for (index, record) in records.iter().enumerate() {
        validate_record(index, record, config)?;
    }

    Ok(())
}

/// True when any string or object key inside `value` contains NUL.
fn json_contains_nul(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains('\0'),
        Value::Array(items) => items.iter().any(json_contains_nul),
        Value::Object(map) => map
            .iter()
            .any(|(key, item)| key.contains('\0') || json_contains_nul(item)),
        _ => false,
    }
}

fn validate_record(
    index: usize,
    record: &ImportRecord,
    config: &ImportConfig,
) -> Result<(), ValidationError> {
    // Postgres TEXT and JSONB cannot store NUL.
    if record.name.contains('\0') || record.email.contains('\0') {
        return Err(invalid(index, "name and email must not contain NUL characters"));
    }
    if record.name.trim().is_empty() {
        return Err(invalid(index, "name must not be empty"));
    }
    if record.name.chars().count() > config.max_name_len {
        return Err(invalid(
            index,
            format!("name exceeds {} characters", config.max_name_len),
        ));
    }
    if record.email.len() > MAX_EMAIL_LEN {
        return Err(invalid(
            index,
            format!("email exceeds {MAX_EMAIL_LEN} characters"),
        ));
    }
    if !email_regex().is_match(&record.email) {
        return Err(invalid(
            index,
            format!("'{}' is not a valid email address", record.email),
        ));
    }
    if let Some(metadata) = &record.metadata {
        if json_contains_nul(metadata) {
            return Err(invalid(index, "metadata must not contain NUL characters"));
        }
        if metadata.to_string().len() > config.max_metadata_bytes {
            return Err(invalid(
                index,
                format!("metadata exceeds {} bytes", config.max_metadata_bytes),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn config() -> ImportConfig {
        ImportConfig {
            max_records: 3,
            max_name_len: 10,
            max_metadata_bytes: 64,
            ..ImportConfig::default()
        }
    }

    #[test]
    fn accepts_well_formed_batch() {
        let records = vec![
            ImportRecord::new("Alice", "alice@example.com"),
            ImportRecord::new("Bob", "bob@example.com"),
        ];
        assert_eq!(validate_batch(&records, &config()), Ok(()));
    }

    #[test]
    fn rejects_empty_and_oversized_batches() {
        assert_eq!(
            validate_batch(&[], &config()),
            Err(ValidationError::BatchSize { actual: 0, max: 3 })
        );

        let records = vec![ImportRecord::new("A", "a@x.com"); 4];
        assert_eq!(
            validate_batch(&records, &config()),
            Err(ValidationError::BatchSize { actual: 4, max: 3 })
        );
    }

    #[test]
    fn reports_first_bad_record_index() {
        let records = vec![
            ImportRecord::new("Alice", "alice@example.com"),
            ImportRecord::new("   ", "blank@example.com"),
            ImportRecord::new("Carol", "not-an-email"),
        ];
        match validate_batch(&records, &config()) {
            Err(ValidationError::InvalidRecord { index, reason }) => {
                assert_eq!(index, 1);
                assert!(reason.contains("name"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn enforces_name_length_in_characters() {
        let ok = vec![ImportRecord::new("Zoë Ærøskø", "zoe@example.com")];
        assert!(validate_batch(&ok, &config()).is_ok());

        let too_long = vec![ImportRecord::new("Bartholomew", "bart@example.com")];
        assert!(validate_batch(&too_long, &config()).is_err());
    }

    #[test]
    fn rejects_malformed_emails() {
        for email in ["", "plain", "a@b", "a b@example.com", "@example.com"] {
            let records = vec![ImportRecord::new("Name", email)];
            assert!(
                validate_batch(&records, &config()).is_err(),
                "{email:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_nul_characters() {
        let cases = vec![
            ImportRecord::new("Al\0ice", "alice@example.com"),
            ImportRecord::new("Alice", "ali\0ce@example.com"),
            ImportRecord::new("Alice", "alice@example.com").with_metadata(json!({"note": "a\u{0}b"})),
            ImportRecord::new("Alice", "alice@example.com").with_metadata(json!({"k\u{0}": 1})),
            ImportRecord::new("Alice", "alice@example.com").with_metadata(json!([["\u{0}"]])),
        ];
        for record in cases {
            match validate_batch(std::slice::from_ref(&record), &config()) {
                Err(ValidationError::InvalidRecord { index: 0, reason }) => {
                    assert!(reason.contains("NUL"), "unexpected reason: {reason}");
                }
                other => panic!("{record:?} should be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn bounds_metadata_size() {
        let small = vec![
            ImportRecord::new("Alice", "alice@example.com").with_metadata(json!({"vip": true})),
        ];
        assert!(validate_batch(&small, &config()).is_ok());

        let large = vec![
            ImportRecord::new("Alice", "alice@example.com")
                .with_metadata(json!({"blob": "x".repeat(100)})),
        ];
        match validate_batch(&large, &config()) {
            Err(ValidationError::InvalidRecord { reason, .. }) => {
                assert!(reason.contains("metadata"))
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

//! Runtime knobs for the import pipeline, read from the environment.

use crate::validation::MAX_EMAIL_LEN;
use std::env;
use std::time::Duration;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_MAX_RECORDS: usize = 10_000;
pub const DEFAULT_MAX_NAME_LEN: usize = 255;
pub const DEFAULT_STALE_PENDING_SECS: u64 = 900;
pub const DEFAULT_MAX_METADATA_BYTES: usize = 4096;

/// JSON punctuation, keys and escapes around one record.
const RECORD_OVERHEAD_BYTES: usize = 64;

fn parse_usize(value: Option<String>, default: usize) -> usize {
    value
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_secs(value: Option<String>, default_secs: u64) -> Duration {
    value
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

/// Configuration for the import endpoint and orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    /// Records written per set-based statement. Always at least 1.
    pub chunk_size: usize,
    /// Upper bound on records accepted in one request.
    pub max_records: usize,
    /// Longest accepted `name`, in characters.
    pub max_name_len: usize,
    /// Age after which a `pending` job is reported as stale.
    pub stale_pending_after: Duration,
    /// Longest accepted `metadata`, as serialized JSON bytes.
    pub max_metadata_bytes: usize,
}

impl ImportConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            chunk_size: parse_usize(lookup("IMPORT_CHUNK_SIZE"), DEFAULT_CHUNK_SIZE).max(1),
            max_records: parse_usize(lookup("IMPORT_MAX_RECORDS"), DEFAULT_MAX_RECORDS).max(1),
            max_name_len: parse_usize(lookup("IMPORT_MAX_NAME_LEN"), DEFAULT_MAX_NAME_LEN)
                .max(1),
            stale_pending_after: parse_secs(
                lookup("IMPORT_STALE_PENDING_SECS"),
                DEFAULT_STALE_PENDING_SECS,
            ),
            max_metadata_bytes: parse_usize(
                lookup("IMPORT_MAX_METADATA_BYTES"),
                DEFAULT_MAX_METADATA_BYTES,
            ),
        }
    }

    /// Request body limit for the `json` data guard.
    ///
    /// Large enough for `max_records` records that each sit at the field
    /// limits, so any batch the validator would accept can be read.
    pub fn json_body_limit(&self) -> u64 {
        // Names are bounded in characters; allow four UTF-8 bytes each.
        let per_record =
            self.max_name_len * 4 + MAX_EMAIL_LEN + self.max_metadata_bytes + RECORD_OVERHEAD_BYTES;
        (self.max_records as u64).saturating_mul(per_record as u64)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ImportConfig::default();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.max_records, 10_000);
        assert_eq!(config.max_name_len, 255);
        assert_eq!(config.stale_pending_after, Duration::from_secs(900));
        assert_eq!(config.max_metadata_bytes, 4096);
    }

    #[test]
    fn body_limit_covers_largest_accepted_batch() {
        let config = ImportConfig::default();
        let limit = config.json_body_limit();

        assert!(limit > 1024 * 1024);
        let widest_record = (config.max_name_len * 4 + MAX_EMAIL_LEN + config.max_metadata_bytes)
            as u64;
        assert!(limit >= widest_record * config.max_records as u64);

        let smaller = ImportConfig {
            max_records: 10,
            ..ImportConfig::default()
        };
        assert!(smaller.json_body_limit() < limit);
    }

    #[test]
    fn reads_overrides() {
        let config = ImportConfig::from_lookup(lookup_from(&[
            ("IMPORT_CHUNK_SIZE", "50"),
            ("IMPORT_MAX_RECORDS", " 200 "),
            ("IMPORT_STALE_PENDING_SECS", "60"),
        ]));
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.max_records, 200);
        assert_eq!(config.stale_pending_after, Duration::from_secs(60));
    }

    #[test]
    fn zero_and_garbage_fall_back() {
        let config = ImportConfig::from_lookup(lookup_from(&[
            ("IMPORT_CHUNK_SIZE", "0"),
            ("IMPORT_MAX_RECORDS", "lots"),
        ]));
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.max_records, DEFAULT_MAX_RECORDS);
        assert_eq!(ImportConfig::default().with_chunk_size(0).chunk_size, 1);
    }
}

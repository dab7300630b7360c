//! Set-based access to the `entities` table.
//!
//! Writes are fed through `UNNEST` so that each chunk costs one round trip
//! regardless of its size.

use crate::models::{ImportRecord, PersistedEntity};
use rocket_db_pools::sqlx::{self, PgConnection, PgPool};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// Rows affected by one chunk write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub inserted: u64,
    pub updated: u64,
}

/// Lock and return the emails from `emails` that already have a row.
///
/// `FOR UPDATE` pins the matched rows for the rest of the transaction so the
/// classification cannot drift before the write.
pub async fn lock_existing_emails(
    conn: &mut PgConnection,
    emails: &[String],
) -> Result<HashSet<String>, sqlx::Error> {
    if emails.is_empty() {
        return Ok(HashSet::new());
    }

    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT email FROM entities WHERE email = ANY($1) FOR UPDATE")
            .bind(emails)
            .fetch_all(&mut *conn)
            .await?;

    Ok(rows.into_iter().map(|(email,)| email).collect())
}

/// Insert `fresh` and update `existing` in one statement.
///
/// New rows use a plain INSERT, so an email inserted concurrently by another
/// job surfaces as a unique violation. Existing rows keep their `id` and
/// `created_at`.
pub async fn write_chunk(
    conn: &mut PgConnection,
    fresh: &[ImportRecord],
    existing: &[ImportRecord],
) -> Result<WriteCounts, sqlx::Error> {
    let count = fresh.len() + existing.len();
    if count == 0 {
        return Ok(WriteCounts::default());
    }

    let mut ids: Vec<Uuid> = Vec::with_capacity(count);
    let mut names: Vec<String> = Vec::with_capacity(count);
    let mut emails: Vec<String> = Vec::with_capacity(count);
    let mut metadata: Vec<Option<Value>> = Vec::with_capacity(count);
    let mut is_new: Vec<bool> = Vec::with_capacity(count);

    for (record, new) in fresh
        .iter()
        .map(|record| (record, true))
        .chain(existing.iter().map(|record| (record, false)))
    {
        ids.push(Uuid::new_v4());
        names.push(record.name.clone());
        emails.push(record.email.clone());
        metadata.push(record.metadata.clone());
        is_new.push(new);
    }

    let (inserted, updated): (i64, i64) = sqlx::query_as(
        r#"WITH input AS (
               SELECT *
               FROM UNNEST($1::uuid[], $2::text[], $3::text[], $4::jsonb[], $5::bool[])
                   AS t (id, name, email, metadata, is_new)
           ),
           inserted AS (
               INSERT INTO entities (id, name, email, metadata, created_at, updated_at)
               SELECT id, name, email, metadata, NOW(), NOW()
               FROM input
               WHERE is_new
               RETURNING 1
           ),
           updated AS (
               UPDATE entities e
               SET name = i.name,
                   metadata = i.metadata,
                   updated_at = NOW()
               FROM input i
               WHERE NOT i.is_new AND e.email = i.email
               RETURNING 1
           )
           SELECT (SELECT COUNT(*) FROM inserted), (SELECT COUNT(*) FROM updated)"#,
    )
    .bind(&ids)
    .bind(&names)
    .bind(&emails)
    .bind(&metadata)
    .bind(&is_new)
    .fetch_one(&mut *conn)
    .await?;

    log::trace!(
        "chunk write: {} inserted, {} updated",
        inserted,
        updated
    );

    Ok(WriteCounts {
        inserted: inserted as u64,
        updated: updated as u64,
    })
}

pub async fn find_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<PersistedEntity>, sqlx::Error> {
    sqlx::query_as(
        r#"SELECT id, name, email, metadata, created_at, updated_at
           FROM entities
           WHERE email = $1"#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

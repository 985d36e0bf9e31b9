//! Durable queue of pending outbound mutations.
//!
//! At most one unprocessed entry exists per (entity_type, entity_id,
//! operation): a second identical mutation coalesces into the existing entry,
//! replacing its payload and clearing the error text while preserving the
//! attempt counter and backoff schedule. Entries are never deleted; they stay
//! for audit once processed.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::database::Database;
use super::{fmt_ts, parse_ts, parse_ts_opt};
use crate::error::CoreError;

/// One pending (or archived) outbound mutation.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: String,
    pub payload_json: Option<String>,
    pub attempts: i64,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const OUTBOX_COLUMNS: &str = "id, entity_type, entity_id, operation, payload_json, attempts, \
     next_retry_at, last_error, processed_at, created_at, updated_at";

fn row_to_entry(row: &rusqlite::Row) -> Result<OutboxEntry, rusqlite::Error> {
    let created_at_str: String = row.get(9)?;
    let updated_at_str: String = row.get(10)?;
    Ok(OutboxEntry {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        operation: row.get(3)?,
        payload_json: row.get(4)?,
        attempts: row.get(5)?,
        next_retry_at: parse_ts_opt(row.get(6)?),
        last_error: row.get(7)?,
        processed_at: parse_ts_opt(row.get(8)?),
        created_at: parse_ts(&created_at_str),
        updated_at: parse_ts(&updated_at_str),
    })
}

impl Database {
    /// Enqueue an outbound mutation, coalescing into an existing unprocessed
    /// entry for the same (entity_type, entity_id, operation).
    pub fn enqueue_outbox(
        &self,
        entity_type: &str,
        entity_id: &str,
        operation: &str,
        payload_json: Option<&str>,
    ) -> Result<OutboxEntry, CoreError> {
        let now = fmt_ts(Utc::now());
        let updated = self.conn.execute(
            "UPDATE sync_outbox
             SET payload_json = ?4, updated_at = ?5, last_error = NULL
             WHERE entity_type = ?1 AND entity_id = ?2 AND operation = ?3
               AND processed_at IS NULL",
            params![entity_type, entity_id, operation, payload_json, now],
        )?;
        if updated == 0 {
            self.conn.execute(
                "INSERT INTO sync_outbox
                     (id, entity_type, entity_id, operation, payload_json, attempts,
                      next_retry_at, last_error, processed_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, NULL, NULL, ?6, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    entity_type,
                    entity_id,
                    operation,
                    payload_json,
                    now,
                ],
            )?;
        }
        self.pending_outbox_entry(entity_type, entity_id, operation)?
            .ok_or_else(|| {
                crate::error::DatabaseError::QueryFailed(
                    "outbox entry missing after upsert".to_string(),
                )
                .into()
            })
    }

    /// The unprocessed entry for a given key, if any.
    pub fn pending_outbox_entry(
        &self,
        entity_type: &str,
        entity_id: &str,
        operation: &str,
    ) -> Result<Option<OutboxEntry>, CoreError> {
        let entry = self
            .conn
            .query_row(
                &format!(
                    "SELECT {OUTBOX_COLUMNS} FROM sync_outbox
                     WHERE entity_type = ?1 AND entity_id = ?2 AND operation = ?3
                       AND processed_at IS NULL"
                ),
                params![entity_type, entity_id, operation],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn get_outbox_entry(&self, id: &str) -> Result<Option<OutboxEntry>, CoreError> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {OUTBOX_COLUMNS} FROM sync_outbox WHERE id = ?1"),
                params![id],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Unprocessed entries due at `now`, FIFO by creation order, capped at
    /// `limit`.
    pub fn due_outbox_entries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<OutboxEntry>, CoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM sync_outbox
             WHERE processed_at IS NULL
               AND (next_retry_at IS NULL OR next_retry_at <= ?1)
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?2"
        ))?;
        let entries = stmt
            .query_map(params![fmt_ts(now), limit as i64], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Mark an entry consumed. A terminal error (e.g. missing entity) is
    /// recorded on the processed row instead of retrying forever.
    pub fn mark_outbox_processed(
        &self,
        id: &str,
        now: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<(), CoreError> {
        self.conn.execute(
            "UPDATE sync_outbox
             SET processed_at = ?2, last_error = ?3, next_retry_at = NULL, updated_at = ?2
             WHERE id = ?1",
            params![id, fmt_ts(now), error],
        )?;
        Ok(())
    }

    /// Record a failed delivery attempt and schedule the retry.
    pub fn mark_outbox_failed(
        &self,
        id: &str,
        now: DateTime<Utc>,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.conn.execute(
            "UPDATE sync_outbox
             SET attempts = attempts + 1, last_error = ?3, next_retry_at = ?4, updated_at = ?2
             WHERE id = ?1",
            params![id, fmt_ts(now), error, fmt_ts(next_retry_at)],
        )?;
        Ok(())
    }

    pub fn pending_outbox_count(&self) -> Result<i64, CoreError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_outbox WHERE processed_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

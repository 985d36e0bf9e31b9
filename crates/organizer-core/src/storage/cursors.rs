//! Per-calendar sync cursor state.
//!
//! One row per remote calendar/list: the opaque continuation token, the
//! optional webhook channel identity, the activity window that drives poll
//! cadence, and the last pull outcome. A cursor with `token = None` forces a
//! full windowed resync on the next pull.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::database::Database;
use super::{fmt_ts, parse_ts, parse_ts_opt};
use crate::error::CoreError;

/// Reserved cursor key tracking local edit activity across all calendars.
const LOCAL_ACTIVITY_KEY: &str = "__local_activity__";

const CURSOR_COLUMNS: &str = "id, calendar_id, token, channel_id, resource_id, expiration, \
     active_until, last_sync_status, last_sync_error, created_at, updated_at";

/// Persistent continuation state for one remote calendar.
#[derive(Debug, Clone)]
pub struct SyncCursor {
    pub id: String,
    pub calendar_id: String,
    pub token: Option<String>,
    pub channel_id: Option<String>,
    pub resource_id: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
    pub active_until: Option<DateTime<Utc>>,
    pub last_sync_status: Option<String>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_cursor(row: &rusqlite::Row) -> Result<SyncCursor, rusqlite::Error> {
    let created_at_str: String = row.get(9)?;
    let updated_at_str: String = row.get(10)?;
    Ok(SyncCursor {
        id: row.get(0)?,
        calendar_id: row.get(1)?,
        token: row.get(2)?,
        channel_id: row.get(3)?,
        resource_id: row.get(4)?,
        expiration: parse_ts_opt(row.get(5)?),
        active_until: parse_ts_opt(row.get(6)?),
        last_sync_status: row.get(7)?,
        last_sync_error: row.get(8)?,
        created_at: parse_ts(&created_at_str),
        updated_at: parse_ts(&updated_at_str),
    })
}

impl Database {
    pub fn get_cursor(&self, calendar_id: &str) -> Result<Option<SyncCursor>, CoreError> {
        let cursor = self
            .conn
            .query_row(
                &format!("SELECT {CURSOR_COLUMNS} FROM sync_cursors WHERE calendar_id = ?1"),
                params![calendar_id],
                row_to_cursor,
            )
            .optional()?;
        Ok(cursor)
    }

    /// Fetch the cursor for a calendar, creating an empty one on first use.
    pub fn get_or_create_cursor(&self, calendar_id: &str) -> Result<SyncCursor, CoreError> {
        if let Some(cursor) = self.get_cursor(calendar_id)? {
            return Ok(cursor);
        }
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO sync_cursors (id, calendar_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![id, calendar_id, fmt_ts(now)],
        )?;
        Ok(SyncCursor {
            id,
            calendar_id: calendar_id.to_string(),
            token: None,
            channel_id: None,
            resource_id: None,
            expiration: None,
            active_until: None,
            last_sync_status: None,
            last_sync_error: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace the continuation token after a fully successful page sequence.
    pub fn store_cursor_token(&self, calendar_id: &str, token: &str) -> Result<(), CoreError> {
        self.get_or_create_cursor(calendar_id)?;
        self.conn.execute(
            "UPDATE sync_cursors SET token = ?2, updated_at = ?3 WHERE calendar_id = ?1",
            params![calendar_id, token, fmt_ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Drop the token, forcing a full windowed resync on the next pull.
    pub fn clear_cursor_token(&self, calendar_id: &str) -> Result<(), CoreError> {
        self.conn.execute(
            "UPDATE sync_cursors SET token = NULL, updated_at = ?2 WHERE calendar_id = ?1",
            params![calendar_id, fmt_ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Record the outcome of a pull pass.
    pub fn record_sync_outcome(
        &self,
        calendar_id: &str,
        outcome: Result<(), &str>,
    ) -> Result<(), CoreError> {
        self.get_or_create_cursor(calendar_id)?;
        let (status, error) = match outcome {
            Ok(()) => ("ok", None),
            Err(message) => ("error", Some(message)),
        };
        self.conn.execute(
            "UPDATE sync_cursors SET last_sync_status = ?2, last_sync_error = ?3, updated_at = ?4
             WHERE calendar_id = ?1",
            params![calendar_id, status, error, fmt_ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Extend the local-activity window that keeps polling on the short
    /// "active" interval.
    pub fn note_local_activity(&self, until: DateTime<Utc>) -> Result<(), CoreError> {
        self.get_or_create_cursor(LOCAL_ACTIVITY_KEY)?;
        self.conn.execute(
            "UPDATE sync_cursors SET active_until = ?2, updated_at = ?3 WHERE calendar_id = ?1",
            params![LOCAL_ACTIVITY_KEY, fmt_ts(until), fmt_ts(Utc::now())],
        )?;
        Ok(())
    }

    pub fn local_activity_until(&self) -> Result<Option<DateTime<Utc>>, CoreError> {
        Ok(self
            .get_cursor(LOCAL_ACTIVITY_KEY)?
            .and_then(|cursor| cursor.active_until))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_use_creates_empty_cursor() {
        let db = Database::open_memory().unwrap();
        let cursor = db.get_or_create_cursor("primary").unwrap();
        assert_eq!(cursor.calendar_id, "primary");
        assert!(cursor.token.is_none());
        assert!(cursor.last_sync_status.is_none());
    }

    #[test]
    fn token_store_and_clear() {
        let db = Database::open_memory().unwrap();
        db.store_cursor_token("primary", "cursor-1").unwrap();
        assert_eq!(
            db.get_cursor("primary").unwrap().unwrap().token.as_deref(),
            Some("cursor-1")
        );

        db.store_cursor_token("primary", "cursor-2").unwrap();
        assert_eq!(
            db.get_cursor("primary").unwrap().unwrap().token.as_deref(),
            Some("cursor-2")
        );

        db.clear_cursor_token("primary").unwrap();
        assert!(db.get_cursor("primary").unwrap().unwrap().token.is_none());
    }

    #[test]
    fn outcome_stamping() {
        let db = Database::open_memory().unwrap();
        db.record_sync_outcome("primary", Ok(())).unwrap();
        let cursor = db.get_cursor("primary").unwrap().unwrap();
        assert_eq!(cursor.last_sync_status.as_deref(), Some("ok"));
        assert!(cursor.last_sync_error.is_none());

        db.record_sync_outcome("primary", Err("boom")).unwrap();
        let cursor = db.get_cursor("primary").unwrap().unwrap();
        assert_eq!(cursor.last_sync_status.as_deref(), Some("error"));
        assert_eq!(cursor.last_sync_error.as_deref(), Some("boom"));
    }

    #[test]
    fn activity_window_is_separate_from_calendars() {
        let db = Database::open_memory().unwrap();
        assert!(db.local_activity_until().unwrap().is_none());

        let until = Utc::now() + chrono::Duration::minutes(30);
        db.note_local_activity(until).unwrap();
        let stored = db.local_activity_until().unwrap().unwrap();
        assert_eq!(stored.timestamp(), until.timestamp());
        assert!(db.get_cursor("primary").unwrap().is_none());
    }
}

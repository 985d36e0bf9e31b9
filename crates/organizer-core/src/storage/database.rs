//! SQLite-based storage for items, sync cursors, conflicts and the outbox.
//!
//! One [`Database`] owns one connection; every public method is a single
//! transaction-per-call write or a read, matching the engine's
//! one-logical-unit-per-transaction model. Cross-row consistency during a
//! pull pass comes from cursor-advance-after-success, not from multi-row
//! transactions.

use rusqlite::Connection;
use std::path::Path;

use super::data_dir;
use crate::error::{CoreError, DatabaseError};

/// SQLite database for sync storage.
pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/organizer/organizer.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("organizer.db");
        Self::open_at(&path)
    }

    /// Open a database at a specific path.
    pub fn open_at(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (tests and ephemeral runs).
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS items (
                id             TEXT PRIMARY KEY,
                kind           TEXT NOT NULL,
                status         TEXT NOT NULL,
                title          TEXT NOT NULL,
                description    TEXT,
                project        TEXT,
                calendar_id    TEXT,
                scheduled_at   TEXT,
                duration_min   INTEGER,
                remote_id      TEXT,
                remote_etag    TEXT,
                remote_uid     TEXT,
                remote_updated TEXT,
                sync_state     TEXT NOT NULL DEFAULT 'synced',
                sync_status    TEXT NOT NULL DEFAULT 'pending',
                sync_attempts  INTEGER NOT NULL DEFAULT 0,
                sync_error     TEXT,
                synced_at      TEXT,
                created_at     TEXT NOT NULL,
                updated_at     TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_remote_id ON items(remote_id);
            CREATE INDEX IF NOT EXISTS idx_items_sync_state ON items(sync_state);

            CREATE TABLE IF NOT EXISTS sync_cursors (
                id               TEXT PRIMARY KEY,
                calendar_id      TEXT NOT NULL UNIQUE,
                token            TEXT,
                channel_id       TEXT,
                resource_id      TEXT,
                expiration       TEXT,
                active_until     TEXT,
                last_sync_status TEXT,
                last_sync_error  TEXT,
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conflicts (
                id                TEXT PRIMARY KEY,
                item_id           TEXT NOT NULL REFERENCES items(id),
                source            TEXT NOT NULL,
                field             TEXT NOT NULL,
                local_value       TEXT,
                remote_value      TEXT,
                remote_patch_json TEXT,
                status            TEXT NOT NULL DEFAULT 'open',
                resolution        TEXT,
                row_ref           TEXT,
                created_at        TEXT NOT NULL,
                resolved_at       TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_conflicts_item_id ON conflicts(item_id);
            CREATE INDEX IF NOT EXISTS idx_conflicts_status ON conflicts(status);

            CREATE TABLE IF NOT EXISTS sync_outbox (
                id            TEXT PRIMARY KEY,
                entity_type   TEXT NOT NULL DEFAULT 'item',
                entity_id     TEXT NOT NULL,
                operation     TEXT NOT NULL DEFAULT 'upsert',
                payload_json  TEXT,
                attempts      INTEGER NOT NULL DEFAULT 0,
                next_retry_at TEXT,
                last_error    TEXT,
                processed_at  TEXT,
                created_at    TEXT NOT NULL,
                updated_at    TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sync_outbox_entity_id ON sync_outbox(entity_id);
            CREATE INDEX IF NOT EXISTS idx_sync_outbox_processed_at ON sync_outbox(processed_at);
            CREATE INDEX IF NOT EXISTS idx_sync_outbox_next_retry_at ON sync_outbox(next_retry_at);

            -- At most one unprocessed entry per (entity_type, entity_id, operation)
            CREATE UNIQUE INDEX IF NOT EXISTS uq_sync_outbox_pending_entity_op
                ON sync_outbox(entity_type, entity_id, operation)
                WHERE processed_at IS NULL;",
        )?;
        Ok(())
    }
}

//! Item CRUD and the local-mutation hook.

use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension};

use super::database::Database;
use super::{fmt_ts, fmt_ts_opt, parse_ts, parse_ts_opt};
use crate::error::{CoreError, ValidationError};
use crate::item::{Item, ItemKind, ItemStatus, SyncState, SyncStatus};

/// How long a local edit keeps the poll cadence on the short "active"
/// interval.
pub(crate) const LOCAL_ACTIVITY_WINDOW_MIN: i64 = 30;

const ITEM_COLUMNS: &str = "id, kind, status, title, description, project, calendar_id, \
     scheduled_at, duration_min, remote_id, remote_etag, remote_uid, remote_updated, \
     sync_state, sync_status, sync_attempts, sync_error, synced_at, created_at, updated_at";

fn parse_item_kind(kind_str: &str) -> ItemKind {
    match kind_str {
        "meeting" => ItemKind::Meeting,
        _ => ItemKind::Task,
    }
}

fn format_item_kind(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Task => "task",
        ItemKind::Meeting => "meeting",
    }
}

fn parse_item_status(status_str: &str) -> ItemStatus {
    match status_str {
        "done" => ItemStatus::Done,
        "canceled" => ItemStatus::Canceled,
        _ => ItemStatus::Active,
    }
}

pub(crate) fn format_item_status(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Active => "active",
        ItemStatus::Done => "done",
        ItemStatus::Canceled => "canceled",
    }
}

pub(crate) fn parse_item_status_opt(status_str: &str) -> Option<ItemStatus> {
    match status_str {
        "active" => Some(ItemStatus::Active),
        "done" => Some(ItemStatus::Done),
        "canceled" => Some(ItemStatus::Canceled),
        _ => None,
    }
}

fn parse_sync_state(state_str: &str) -> SyncState {
    match state_str {
        "dirty" => SyncState::Dirty,
        "conflict" => SyncState::Conflict,
        _ => SyncState::Synced,
    }
}

fn format_sync_state(state: SyncState) -> &'static str {
    match state {
        SyncState::Synced => "synced",
        SyncState::Dirty => "dirty",
        SyncState::Conflict => "conflict",
    }
}

fn parse_sync_status(status_str: &str) -> SyncStatus {
    match status_str {
        "synced" => SyncStatus::Synced,
        "failed" => SyncStatus::Failed,
        _ => SyncStatus::Pending,
    }
}

fn format_sync_status(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Pending => "pending",
        SyncStatus::Synced => "synced",
        SyncStatus::Failed => "failed",
    }
}

fn row_to_item(row: &rusqlite::Row) -> Result<Item, rusqlite::Error> {
    let kind_str: String = row.get(1)?;
    let status_str: String = row.get(2)?;
    let sync_state_str: String = row.get(13)?;
    let sync_status_str: String = row.get(14)?;
    let created_at_str: String = row.get(18)?;
    let updated_at_str: String = row.get(19)?;

    Ok(Item {
        id: row.get(0)?,
        kind: parse_item_kind(&kind_str),
        status: parse_item_status(&status_str),
        title: row.get(3)?,
        description: row.get(4)?,
        project: row.get(5)?,
        calendar_id: row.get(6)?,
        scheduled_at: parse_ts_opt(row.get(7)?),
        duration_min: row.get(8)?,
        remote_id: row.get(9)?,
        remote_etag: row.get(10)?,
        remote_uid: row.get(11)?,
        remote_updated: parse_ts_opt(row.get(12)?),
        sync_state: parse_sync_state(&sync_state_str),
        sync_status: parse_sync_status(&sync_status_str),
        sync_attempts: row.get(15)?,
        sync_error: row.get(16)?,
        synced_at: parse_ts_opt(row.get(17)?),
        created_at: parse_ts(&created_at_str),
        updated_at: parse_ts(&updated_at_str),
    })
}

impl Database {
    /// Insert a new item.
    pub fn insert_item(&self, item: &Item) -> Result<(), CoreError> {
        self.conn.execute(
            "INSERT INTO items (id, kind, status, title, description, project, calendar_id,
                 scheduled_at, duration_min, remote_id, remote_etag, remote_uid, remote_updated,
                 sync_state, sync_status, sync_attempts, sync_error, synced_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                item.id,
                format_item_kind(item.kind),
                format_item_status(item.status),
                item.title,
                item.description,
                item.project,
                item.calendar_id,
                fmt_ts_opt(item.scheduled_at),
                item.duration_min,
                item.remote_id,
                item.remote_etag,
                item.remote_uid,
                fmt_ts_opt(item.remote_updated),
                format_sync_state(item.sync_state),
                format_sync_status(item.sync_status),
                item.sync_attempts,
                item.sync_error,
                fmt_ts_opt(item.synced_at),
                fmt_ts(item.created_at),
                fmt_ts(item.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Write back every field of an existing item.
    pub fn update_item(&self, item: &Item) -> Result<(), CoreError> {
        let changed = self.conn.execute(
            "UPDATE items SET kind = ?2, status = ?3, title = ?4, description = ?5,
                 project = ?6, calendar_id = ?7, scheduled_at = ?8, duration_min = ?9,
                 remote_id = ?10, remote_etag = ?11, remote_uid = ?12, remote_updated = ?13,
                 sync_state = ?14, sync_status = ?15, sync_attempts = ?16, sync_error = ?17,
                 synced_at = ?18, updated_at = ?19
             WHERE id = ?1",
            params![
                item.id,
                format_item_kind(item.kind),
                format_item_status(item.status),
                item.title,
                item.description,
                item.project,
                item.calendar_id,
                fmt_ts_opt(item.scheduled_at),
                item.duration_min,
                item.remote_id,
                item.remote_etag,
                item.remote_uid,
                fmt_ts_opt(item.remote_updated),
                format_sync_state(item.sync_state),
                format_sync_status(item.sync_status),
                item.sync_attempts,
                item.sync_error,
                fmt_ts_opt(item.synced_at),
                fmt_ts(item.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(ValidationError::NotFound {
                entity: "item",
                id: item.id.clone(),
            }
            .into());
        }
        Ok(())
    }

    pub fn get_item(&self, id: &str) -> Result<Option<Item>, CoreError> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                params![id],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    /// Get an item, failing with a validation error if it does not exist.
    pub fn require_item(&self, id: &str) -> Result<Item, CoreError> {
        self.get_item(id)?.ok_or_else(|| {
            ValidationError::NotFound {
                entity: "item",
                id: id.to_string(),
            }
            .into()
        })
    }

    pub fn find_item_by_remote_id(&self, remote_id: &str) -> Result<Option<Item>, CoreError> {
        let item = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE remote_id = ?1"),
                params![remote_id],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    pub fn list_items(&self) -> Result<Vec<Item>, CoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY created_at ASC, rowid ASC"
        ))?;
        let items = stmt
            .query_map([], row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn count_items_in_state(&self, state: SyncState) -> Result<i64, CoreError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM items WHERE sync_state = ?1",
            params![format_sync_state(state)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Local-mutation hook: flag the item for outbound delivery.
    ///
    /// Marks the item dirty/pending, coalesces an `upsert` entry into the
    /// outbox, and keeps the poll cadence on the active interval for the
    /// next 30 minutes.
    pub fn mark_item_dirty(&self, id: &str) -> Result<Item, CoreError> {
        let mut item = self.require_item(id)?;
        let now = Utc::now();
        item.sync_state = SyncState::Dirty;
        item.sync_status = SyncStatus::Pending;
        item.updated_at = now;
        self.update_item(&item)?;

        let payload = serde_json::json!({ "item_id": id }).to_string();
        self.enqueue_outbox("item", id, "upsert", Some(&payload))?;
        self.note_local_activity(now + Duration::minutes(LOCAL_ACTIVITY_WINDOW_MIN))?;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn insert_and_get_roundtrip() {
        let db = Database::open_memory().unwrap();
        let mut item = Item::new(ItemKind::Meeting, "Planning");
        item.description = Some("weekly".into());
        item.scheduled_at = Some(Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap());
        item.duration_min = Some(60);
        db.insert_item(&item).unwrap();

        let loaded = db.get_item(&item.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Planning");
        assert_eq!(loaded.kind, ItemKind::Meeting);
        assert_eq!(loaded.scheduled_at, item.scheduled_at);
        assert_eq!(loaded.sync_state, SyncState::Dirty);
        assert_eq!(loaded.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn find_by_remote_id() {
        let db = Database::open_memory().unwrap();
        let mut item = Item::new(ItemKind::Meeting, "1:1");
        item.remote_id = Some("evt-42".into());
        db.insert_item(&item).unwrap();

        let found = db.find_item_by_remote_id("evt-42").unwrap().unwrap();
        assert_eq!(found.id, item.id);
        assert!(db.find_item_by_remote_id("evt-missing").unwrap().is_none());
    }

    #[test]
    fn update_missing_item_is_not_found() {
        let db = Database::open_memory().unwrap();
        let item = Item::new(ItemKind::Task, "ghost");
        let err = db.update_item(&item).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::NotFound { entity: "item", .. })
        ));
    }

    #[test]
    fn mark_item_dirty_enqueues_and_bumps_activity() {
        let db = Database::open_memory().unwrap();
        let mut item = Item::new(ItemKind::Task, "Buy milk");
        item.sync_state = SyncState::Synced;
        db.insert_item(&item).unwrap();

        let marked = db.mark_item_dirty(&item.id).unwrap();
        assert_eq!(marked.sync_state, SyncState::Dirty);
        assert_eq!(db.pending_outbox_count().unwrap(), 1);

        let until = db.local_activity_until().unwrap().unwrap();
        assert!(until > Utc::now());
    }

    #[test]
    fn list_items_in_creation_order() {
        let db = Database::open_memory().unwrap();
        let first = Item::new(ItemKind::Task, "first");
        let second = Item::new(ItemKind::Task, "second");
        db.insert_item(&first).unwrap();
        db.insert_item(&second).unwrap();

        let items = db.list_items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "first");
        assert_eq!(items[1].title, "second");
    }
}

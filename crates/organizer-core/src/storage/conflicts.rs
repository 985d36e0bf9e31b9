//! Persisted field-level conflicts and their resolution.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use super::database::Database;
use super::items::parse_item_status_opt;
use super::{fmt_ts, parse_ts, parse_ts_opt};
use crate::error::{CoreError, ValidationError};
use crate::item::SyncState;
use crate::sync::conflict::FieldConflict;
use crate::sync::types::{PatchField, RemotePatch, SyncSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStatus {
    Open,
    Resolved,
}

/// Explicit external resolution decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    KeepLocal,
    AcceptRemote,
}

impl ConflictChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictChoice::KeepLocal => "keep_local",
            ConflictChoice::AcceptRemote => "accept_remote",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "keep_local" => Some(ConflictChoice::KeepLocal),
            "accept_remote" => Some(ConflictChoice::AcceptRemote),
            _ => None,
        }
    }
}

/// One recorded (item, source, field) divergence.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub id: String,
    pub item_id: String,
    pub source: SyncSource,
    pub field: PatchField,
    pub local_value: Option<String>,
    pub remote_value: Option<String>,
    /// Full remote patch at detection time, for later application.
    pub remote_patch_json: Option<String>,
    pub status: ConflictStatus,
    pub resolution: Option<ConflictChoice>,
    /// Opaque reference to the remote row/record that produced the patch.
    pub row_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

const CONFLICT_COLUMNS: &str = "id, item_id, source, field, local_value, remote_value, \
     remote_patch_json, status, resolution, row_ref, created_at, resolved_at";

fn row_to_conflict(row: &rusqlite::Row) -> Result<Conflict, rusqlite::Error> {
    let source_str: String = row.get(2)?;
    let field_str: String = row.get(3)?;
    let status_str: String = row.get(7)?;
    let resolution_str: Option<String> = row.get(8)?;
    let created_at_str: String = row.get(10)?;

    Ok(Conflict {
        id: row.get(0)?,
        item_id: row.get(1)?,
        source: SyncSource::parse(&source_str).unwrap_or(SyncSource::CalendarPull),
        field: PatchField::parse(&field_str).unwrap_or(PatchField::Title),
        local_value: row.get(4)?,
        remote_value: row.get(5)?,
        remote_patch_json: row.get(6)?,
        status: if status_str == "resolved" {
            ConflictStatus::Resolved
        } else {
            ConflictStatus::Open
        },
        resolution: resolution_str.as_deref().and_then(ConflictChoice::parse),
        row_ref: row.get(9)?,
        created_at: parse_ts(&created_at_str),
        resolved_at: parse_ts_opt(row.get(11)?),
    })
}

impl Database {
    /// Persist detected conflicts, deduplicating against existing open rows
    /// with the identical (item, source, field, local, remote) tuple.
    pub fn persist_conflicts(
        &self,
        detected: &[FieldConflict],
        patch: &RemotePatch,
        row_ref: Option<&str>,
    ) -> Result<Vec<Conflict>, CoreError> {
        let patch_json = serde_json::to_string(patch)?;
        let mut rows = Vec::with_capacity(detected.len());
        for conflict in detected {
            rows.push(self.persist_one_conflict(conflict, &patch_json, row_ref)?);
        }
        Ok(rows)
    }

    fn persist_one_conflict(
        &self,
        detected: &FieldConflict,
        patch_json: &str,
        row_ref: Option<&str>,
    ) -> Result<Conflict, CoreError> {
        let existing = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CONFLICT_COLUMNS} FROM conflicts
                     WHERE item_id = ?1 AND source = ?2 AND field = ?3
                       AND local_value IS ?4 AND remote_value IS ?5 AND status = 'open'"
                ),
                params![
                    detected.item_id,
                    detected.source.as_str(),
                    detected.field.as_str(),
                    detected.local_value,
                    detected.remote_value,
                ],
                row_to_conflict,
            )
            .optional()?;
        if let Some(row) = existing {
            return Ok(row);
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO conflicts (id, item_id, source, field, local_value, remote_value,
                 remote_patch_json, status, row_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'open', ?8, ?9)",
            params![
                id,
                detected.item_id,
                detected.source.as_str(),
                detected.field.as_str(),
                detected.local_value,
                detected.remote_value,
                patch_json,
                row_ref,
                fmt_ts(now),
            ],
        )?;
        Ok(Conflict {
            id,
            item_id: detected.item_id.clone(),
            source: detected.source,
            field: detected.field,
            local_value: detected.local_value.clone(),
            remote_value: detected.remote_value.clone(),
            remote_patch_json: Some(patch_json.to_string()),
            status: ConflictStatus::Open,
            resolution: None,
            row_ref: row_ref.map(str::to_string),
            created_at: now,
            resolved_at: None,
        })
    }

    pub fn get_conflict(&self, id: &str) -> Result<Option<Conflict>, CoreError> {
        let conflict = self
            .conn
            .query_row(
                &format!("SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE id = ?1"),
                params![id],
                row_to_conflict,
            )
            .optional()?;
        Ok(conflict)
    }

    /// Open conflicts, oldest first.
    pub fn list_open_conflicts(&self, limit: usize) -> Result<Vec<Conflict>, CoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE status = 'open'
             ORDER BY created_at ASC, rowid ASC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_conflict)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn open_conflict_count(&self) -> Result<i64, CoreError> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM conflicts WHERE status = 'open'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Resolve a conflict with an explicit choice.
    ///
    /// `accept_remote` re-applies the recorded remote value onto the item
    /// (parsed per field type) and stamps the item synced; `keep_local`
    /// marks the item dirty so it is pushed back out. Resolving an
    /// already-resolved conflict is a no-op returning the existing row.
    pub fn apply_conflict_choice(
        &self,
        conflict_id: &str,
        choice: &str,
    ) -> Result<Conflict, CoreError> {
        let conflict = self.get_conflict(conflict_id)?.ok_or_else(|| {
            CoreError::from(ValidationError::NotFound {
                entity: "conflict",
                id: conflict_id.to_string(),
            })
        })?;
        if conflict.status == ConflictStatus::Resolved {
            return Ok(conflict);
        }

        let choice = ConflictChoice::parse(choice)
            .ok_or_else(|| ValidationError::InvalidChoice(choice.to_string()))?;

        match choice {
            ConflictChoice::AcceptRemote => {
                let mut item = self.require_item(&conflict.item_id)?;
                apply_remote_field(&mut item, conflict.field, conflict.remote_value.as_deref());
                let now = Utc::now();
                item.updated_at = now;
                item.sync_state = SyncState::Synced;
                item.mark_sync_ok(now);
                self.update_item(&item)?;
            }
            ConflictChoice::KeepLocal => {
                self.mark_item_dirty(&conflict.item_id)?;
            }
        }

        let resolved_at = Utc::now();
        self.conn.execute(
            "UPDATE conflicts SET status = 'resolved', resolution = ?2, resolved_at = ?3
             WHERE id = ?1",
            params![conflict_id, choice.as_str(), fmt_ts(resolved_at)],
        )?;
        Ok(Conflict {
            status: ConflictStatus::Resolved,
            resolution: Some(choice),
            resolved_at: Some(resolved_at),
            ..conflict
        })
    }
}

/// Write a single remote field value onto the item, parsed per field type.
fn apply_remote_field(item: &mut crate::item::Item, field: PatchField, value: Option<&str>) {
    match field {
        PatchField::Title => {
            if let Some(value) = value {
                item.title = value.to_string();
            }
        }
        PatchField::Description => {
            item.description = value.map(str::to_string);
        }
        PatchField::ScheduledAt => {
            item.scheduled_at = value
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|dt| dt.with_timezone(&Utc));
        }
        PatchField::DurationMin => {
            item.duration_min = value.and_then(|v| v.parse().ok());
        }
        PatchField::Status => {
            if let Some(status) = value.and_then(parse_item_status_opt) {
                item.status = status;
            }
        }
    }
}

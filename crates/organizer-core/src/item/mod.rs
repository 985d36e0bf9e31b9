//! Item types: the locally owned task/meeting entity being synchronized.
//!
//! An Item carries two independent pieces of sync bookkeeping:
//!
//! - [`SyncState`] describes the relationship between local content and the
//!   remote copy (content-level):
//!
//!     SYNCED ─────────> DIRTY ─────────> SYNCED
//!       |     local edit    |     push ok / remote applied
//!       |                   |  remote newer + fields differ
//!       |                   v
//!       |               CONFLICT ──────> SYNCED or DIRTY
//!       |                      resolve (accept_remote / keep_local)
//!       +<── remote pull applied
//!
//! - [`SyncStatus`] describes delivery of the latest local mutation to the
//!   remote system (transport-level): pending -> synced, or failed with an
//!   attempt counter and error text.
//!
//! An Item in `Conflict` state must never be pushed outbound until resolved.
//! An Item without remote linkage is implicitly a pending create. Items are
//! never hard-deleted; cancellation is a status transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of synchronized entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Task,
    Meeting,
}

impl Default for ItemKind {
    fn default() -> Self {
        ItemKind::Task
    }
}

/// Lifecycle status of an item. Cancellation is a status, not a deletion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Active,
    Done,
    Canceled,
}

impl Default for ItemStatus {
    fn default() -> Self {
        ItemStatus::Active
    }
}

/// Content-level relationship between the local item and its remote copy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Local content matches the last known remote state.
    Synced,
    /// Local edits not yet confirmed synced to the remote system.
    Dirty,
    /// A divergence was detected; outbound pushes are blocked until resolved.
    Conflict,
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState::Synced
    }
}

/// Transport-level delivery status of the latest local mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::Pending
    }
}

/// The synchronized entity (a task or meeting).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Stable local id, never reused.
    pub id: String,
    pub kind: ItemKind,
    pub status: ItemStatus,
    pub title: String,
    pub description: Option<String>,
    /// Container name; pulled items land in the default container.
    pub project: Option<String>,
    /// Remote calendar/list this item is mirrored to, if any.
    pub calendar_id: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_min: Option<i64>,
    /// Remote event/task id.
    pub remote_id: Option<String>,
    /// Remote revision tag for optimistic concurrency.
    pub remote_etag: Option<String>,
    /// Remote stable UID (survives id changes on some providers).
    pub remote_uid: Option<String>,
    /// Remote last-modified timestamp as of the last successful sync.
    pub remote_updated: Option<DateTime<Utc>>,
    pub sync_state: SyncState,
    pub sync_status: SyncStatus,
    pub sync_attempts: i64,
    pub sync_error: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Create a locally-authored item: dirty, delivery pending, no remote
    /// linkage (an implicit pending create).
    pub fn new(kind: ItemKind, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            status: ItemStatus::Active,
            title: title.into(),
            description: None,
            project: None,
            calendar_id: None,
            scheduled_at: None,
            duration_min: None,
            remote_id: None,
            remote_etag: None,
            remote_uid: None,
            remote_updated: None,
            sync_state: SyncState::Dirty,
            sync_status: SyncStatus::Pending,
            sync_attempts: 0,
            sync_error: None,
            synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this item has been linked to a remote record.
    pub fn has_remote_linkage(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Whether outbound push is allowed. Conflicted items are blocked until
    /// an explicit resolution.
    pub fn is_pushable(&self) -> bool {
        self.sync_state != SyncState::Conflict
    }

    /// Clear all remote linkage fields (after a remote cancel).
    pub fn clear_remote_linkage(&mut self) {
        self.remote_id = None;
        self.remote_etag = None;
        self.remote_uid = None;
        self.remote_updated = None;
    }

    /// Stamp a successful delivery of the latest local mutation.
    pub fn mark_sync_ok(&mut self, now: DateTime<Utc>) {
        self.sync_status = SyncStatus::Synced;
        self.sync_error = None;
        self.synced_at = Some(now);
    }

    /// Stamp a failed delivery attempt. Error text is capped at 500 chars.
    pub fn mark_sync_err(&mut self, error: &str) {
        self.sync_status = SyncStatus::Failed;
        self.sync_attempts += 1;
        self.sync_error = Some(error.chars().take(500).collect());
    }
}

//! Core types shared by the sync engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::ItemStatus;

/// Which remote channel produced a patch. Distinct channels may disagree
/// with local state independently, so conflicts are recorded per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    CalendarPull,
    TasksPull,
    SheetPull,
}

impl SyncSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSource::CalendarPull => "calendar_pull",
            SyncSource::TasksPull => "tasks_pull",
            SyncSource::SheetPull => "sheet_pull",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "calendar_pull" => Some(SyncSource::CalendarPull),
            "tasks_pull" => Some(SyncSource::TasksPull),
            "sheet_pull" => Some(SyncSource::SheetPull),
            _ => None,
        }
    }
}

/// The closed set of item fields a remote patch may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchField {
    Title,
    Description,
    ScheduledAt,
    DurationMin,
    Status,
}

impl PatchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchField::Title => "title",
            PatchField::Description => "description",
            PatchField::ScheduledAt => "scheduled_at",
            PatchField::DurationMin => "duration_min",
            PatchField::Status => "status",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "title" => Some(PatchField::Title),
            "description" => Some(PatchField::Description),
            "scheduled_at" => Some(PatchField::ScheduledAt),
            "duration_min" => Some(PatchField::DurationMin),
            "status" => Some(PatchField::Status),
            _ => None,
        }
    }
}

/// An incoming remote change as a partial field map.
///
/// The outer `Option` is field presence (absent fields are not part of the
/// patch); the inner `Option` on nullable fields is the remote value itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemotePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_min: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
}

impl RemotePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.scheduled_at.is_none()
            && self.duration_min.is_none()
            && self.status.is_none()
    }
}

/// Outcome of one inbound pull pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullStats {
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub cancelled: u64,
    pub conflicts: u64,
    /// 1 when the provider invalidated the cursor and a full resync ran.
    pub token_reset: u64,
}

/// Outcome of one outbox drain batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainStats {
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
}

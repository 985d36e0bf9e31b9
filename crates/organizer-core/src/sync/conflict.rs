//! Field-level conflict detection between a local item and a remote patch.
//!
//! Pure: no store access, no side effects. Values are compared after
//! normalization -- datetimes in UTC RFC3339, strings verbatim. Fields the
//! patch does not carry are skipped, so a patch that touches nothing an item
//! has yields no conflicts.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::item::{Item, ItemStatus};
use crate::sync::types::{PatchField, RemotePatch, SyncSource};

/// One detected field divergence, values already normalized to their stored
/// string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConflict {
    pub item_id: String,
    pub source: SyncSource,
    pub field: PatchField,
    pub local_value: Option<String>,
    pub remote_value: Option<String>,
}

fn norm_datetime(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn norm_status(value: ItemStatus) -> Option<String> {
    Some(
        match value {
            ItemStatus::Active => "active",
            ItemStatus::Done => "done",
            ItemStatus::Canceled => "canceled",
        }
        .to_string(),
    )
}

/// Compare each field present in `patch` against the item, returning the
/// subset that actually differs.
pub fn detect_conflicts(
    item: &Item,
    patch: &RemotePatch,
    source: SyncSource,
) -> Vec<FieldConflict> {
    let mut out = Vec::new();
    let mut check =
        |field: PatchField, local: Option<String>, remote: Option<String>| {
            if local != remote {
                out.push(FieldConflict {
                    item_id: item.id.clone(),
                    source,
                    field,
                    local_value: local,
                    remote_value: remote,
                });
            }
        };

    if let Some(remote) = &patch.title {
        check(
            PatchField::Title,
            Some(item.title.clone()),
            Some(remote.clone()),
        );
    }
    if let Some(remote) = &patch.description {
        check(
            PatchField::Description,
            item.description.clone(),
            remote.clone(),
        );
    }
    if let Some(remote) = &patch.scheduled_at {
        check(
            PatchField::ScheduledAt,
            norm_datetime(item.scheduled_at),
            norm_datetime(*remote),
        );
    }
    if let Some(remote) = &patch.duration_min {
        check(
            PatchField::DurationMin,
            item.duration_min.map(|v| v.to_string()),
            remote.map(|v| v.to_string()),
        );
    }
    if let Some(remote) = patch.status {
        check(PatchField::Status, norm_status(item.status), norm_status(remote));
    }

    out
}

//! Outbound synchronization: mirror one local item to the remote calendar.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::item::{Item, ItemStatus, SyncState, SyncStatus};
use crate::provider::{CalendarProvider, EventPayload, EventRecord, ProviderError};
use crate::storage::Database;

const DEFAULT_EVENT_MINUTES: i64 = 60;

/// What a push attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAction {
    Created,
    Updated,
    Cancelled,
    /// Nothing to do (already synced, blocked, or nothing to mirror).
    Skipped,
    /// Remote revision moved underneath us; item flagged for resolution.
    Conflict,
}

/// Push the current state of one item to the remote calendar.
///
/// A precondition rejection is a terminal, reportable outcome: the item is
/// flagged `SyncState::Conflict` and the call returns normally. Any other
/// provider failure is recorded on the item and propagated so the caller
/// (the outbox processor) can schedule a retry.
pub async fn push_item(
    db: &Database,
    provider: &dyn CalendarProvider,
    default_calendar_id: &str,
    item_id: &str,
) -> Result<(Item, PushAction), CoreError> {
    let mut item = db.require_item(item_id)?;
    if !item.is_pushable() {
        debug!(item_id, "push blocked: item awaiting conflict resolution");
        return Ok((item, PushAction::Skipped));
    }
    let calendar_id = item
        .calendar_id
        .clone()
        .unwrap_or_else(|| default_calendar_id.to_string());
    let now = Utc::now();

    // Cancelled or unscheduled items have no remote presence: retract the
    // remote copy if one exists, otherwise there is nothing to mirror.
    let start = match (item.status, item.scheduled_at) {
        (ItemStatus::Canceled, _) | (_, None) => {
            let Some(remote_id) = item.remote_id.clone() else {
                if item.sync_state == SyncState::Dirty {
                    item.sync_state = SyncState::Synced;
                    item.mark_sync_ok(now);
                    item.updated_at = now;
                    db.update_item(&item)?;
                }
                return Ok((item, PushAction::Skipped));
            };
            match provider.cancel_event(&calendar_id, &remote_id).await {
                // Already gone remotely: treat as cancelled.
                Ok(_) | Err(ProviderError::NotFound) => {}
                Err(err) => return fail(db, item, err),
            }
            item.clear_remote_linkage();
            item.sync_state = SyncState::Synced;
            item.mark_sync_ok(now);
            item.updated_at = now;
            db.update_item(&item)?;
            debug!(item_id, %calendar_id, "remote event cancelled");
            return Ok((item, PushAction::Cancelled));
        }
        (_, Some(start)) => start,
    };
    let payload = build_event_payload(&item, start);

    if item.remote_id.is_none() {
        match provider.create_event(&calendar_id, &payload).await {
            Ok(record) => {
                apply_record(&mut item, record);
                item.calendar_id = Some(calendar_id.clone());
                item.sync_state = SyncState::Synced;
                item.mark_sync_ok(now);
                item.updated_at = now;
                db.update_item(&item)?;
                debug!(item_id, %calendar_id, "remote event created");
                Ok((item, PushAction::Created))
            }
            Err(err) => fail(db, item, err),
        }
    } else if let Some(remote_id) = item
        .remote_id
        .clone()
        .filter(|_| item.sync_state == SyncState::Dirty || item.sync_status != SyncStatus::Synced)
    {
        match provider
            .update_event(&calendar_id, &remote_id, &payload, item.remote_etag.as_deref())
            .await
        {
            Ok(record) => {
                apply_record(&mut item, record);
                item.sync_state = SyncState::Synced;
                item.mark_sync_ok(now);
                item.updated_at = now;
                db.update_item(&item)?;
                debug!(item_id, %calendar_id, "remote event updated");
                Ok((item, PushAction::Updated))
            }
            Err(ProviderError::PreconditionFailed) => {
                item.sync_state = SyncState::Conflict;
                item.updated_at = now;
                db.update_item(&item)?;
                warn!(item_id, %remote_id, "remote revision changed, item flagged for resolution");
                Ok((item, PushAction::Conflict))
            }
            Err(err) => fail(db, item, err),
        }
    } else {
        Ok((item, PushAction::Skipped))
    }
}

fn fail(
    db: &Database,
    mut item: Item,
    err: ProviderError,
) -> Result<(Item, PushAction), CoreError> {
    item.mark_sync_err(&err.to_string());
    item.updated_at = Utc::now();
    db.update_item(&item)?;
    warn!(
        item_id = %item.id,
        attempts = item.sync_attempts,
        error = %err,
        "push failed"
    );
    Err(err.into())
}

fn apply_record(item: &mut Item, record: EventRecord) {
    if !record.id.is_empty() {
        item.remote_id = Some(record.id);
    }
    if record.etag.is_some() {
        item.remote_etag = record.etag;
    }
    if record.uid.is_some() {
        item.remote_uid = record.uid;
    }
    if record.updated.is_some() {
        item.remote_updated = record.updated;
    }
}

fn build_event_payload(item: &Item, start: DateTime<Utc>) -> EventPayload {
    let duration = item.duration_min.unwrap_or(DEFAULT_EVENT_MINUTES);
    EventPayload {
        summary: item.title.clone(),
        description: item.description.clone(),
        start,
        end: start + Duration::minutes(duration),
        item_id: item.id.clone(),
    }
}

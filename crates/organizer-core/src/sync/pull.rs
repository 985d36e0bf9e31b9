//! Inbound synchronization: walk the remote event list and reconcile it with
//! local items.
//!
//! Each calendar moves through three cursor states: no cursor (first run,
//! full windowed resync), incremental (stored continuation token), and a
//! deterministic fall back to one full resync when the provider invalidates
//! the token. The cursor is only replaced after a page sequence completes
//! with no failures, so an aborted pass re-reads the same changes on the
//! next tick instead of losing them.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::item::{Item, ItemKind, ItemStatus, SyncState, SyncStatus};
use crate::provider::{
    CalendarProvider, EventQuery, ProviderError, RemoteEvent, RemoteEventStatus,
};
use crate::storage::Database;
use crate::sync::conflict::detect_conflicts;
use crate::sync::types::{PullStats, RemotePatch, SyncSource};

const RESYNC_DAYS_BACK: i64 = 90;
const RESYNC_DAYS_FORWARD: i64 = 365;

/// Default container for items materialized from a pull.
const DEFAULT_PROJECT: &str = "Inbox";

/// Run one inbound pull pass for a calendar.
///
/// Errors are recorded on the cursor row and returned; the caller decides
/// whether to retry (the scheduler does so on its next tick, never
/// immediately).
pub async fn run_pull(
    db: &Database,
    provider: &dyn CalendarProvider,
    calendar_id: &str,
) -> Result<PullStats, CoreError> {
    let mut stats = PullStats::default();
    let cursor = db.get_or_create_cursor(calendar_id)?;
    info!(
        calendar_id,
        incremental = cursor.token.is_some(),
        "pull start"
    );

    let outcome = match cursor.token {
        Some(token) => {
            match sync_pages(db, provider, calendar_id, EventQuery::cursor(token), &mut stats)
                .await
            {
                Err(CoreError::Provider(ProviderError::CursorExpired)) => {
                    warn!(calendar_id, "cursor invalidated, falling back to full resync");
                    stats.token_reset = 1;
                    db.clear_cursor_token(calendar_id)?;
                    // A second invalidation inside full_resync propagates as a
                    // hard failure; the fallback runs at most once per pass.
                    full_resync(db, provider, calendar_id, &mut stats).await
                }
                other => other,
            }
        }
        None => full_resync(db, provider, calendar_id, &mut stats).await,
    };

    match outcome {
        Ok(next_cursor) => {
            if let Some(token) = next_cursor {
                db.store_cursor_token(calendar_id, &token)?;
            }
            db.record_sync_outcome(calendar_id, Ok(()))?;
            info!(calendar_id, ?stats, "pull done");
            Ok(stats)
        }
        Err(err) => {
            db.record_sync_outcome(calendar_id, Err(&err.to_string()))?;
            Err(err)
        }
    }
}

/// Pull a bounded time window without touching the stored cursor.
///
/// Used for explicit re-pulls of a known period; the incremental state
/// machine stays untouched.
pub async fn run_pull_window(
    db: &Database,
    provider: &dyn CalendarProvider,
    calendar_id: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Result<PullStats, CoreError> {
    let mut stats = PullStats::default();
    info!(
        calendar_id,
        window_start = %window_start,
        window_end = %window_end,
        "window pull start"
    );
    sync_pages(
        db,
        provider,
        calendar_id,
        EventQuery::window(window_start, Some(window_end)),
        &mut stats,
    )
    .await?;
    info!(calendar_id, ?stats, "window pull done");
    Ok(stats)
}

/// Full resync over the default window. When the provider hands back no
/// continuation cursor on the final page, retry once without the upper time
/// bound (some providers only issue cursors for unbounded listings).
async fn full_resync(
    db: &Database,
    provider: &dyn CalendarProvider,
    calendar_id: &str,
    stats: &mut PullStats,
) -> Result<Option<String>, CoreError> {
    let now = Utc::now();
    let time_min = now - Duration::days(RESYNC_DAYS_BACK);
    let time_max = now + Duration::days(RESYNC_DAYS_FORWARD);

    let next_cursor = sync_pages(
        db,
        provider,
        calendar_id,
        EventQuery::window(time_min, Some(time_max)),
        stats,
    )
    .await?;
    if next_cursor.is_some() {
        return Ok(next_cursor);
    }

    warn!(calendar_id, "missing continuation cursor, retrying without upper bound");
    sync_pages(
        db,
        provider,
        calendar_id,
        EventQuery::window(time_min, None),
        stats,
    )
    .await
}

/// Walk one page sequence in provider order, returning the continuation
/// cursor from the final page. Any page failure aborts the sequence.
async fn sync_pages(
    db: &Database,
    provider: &dyn CalendarProvider,
    calendar_id: &str,
    base_query: EventQuery,
    stats: &mut PullStats,
) -> Result<Option<String>, CoreError> {
    let mut page_token: Option<String> = None;
    loop {
        let query = base_query.clone().with_page_token(page_token.clone());
        let page = provider.list_events(calendar_id, query).await?;
        for event in &page.items {
            stats.processed += 1;
            process_event(db, calendar_id, event, stats)?;
        }
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => return Ok(page.next_cursor),
        }
    }
}

/// Reconcile a single remote record with local state.
fn process_event(
    db: &Database,
    calendar_id: &str,
    event: &RemoteEvent,
    stats: &mut PullStats,
) -> Result<(), CoreError> {
    // Resolve by embedded back-reference first, then by remote id.
    let mut item = match &event.item_ref {
        Some(item_ref) => db.get_item(item_ref)?,
        None => None,
    };
    if item.is_none() {
        item = db.find_item_by_remote_id(&event.id)?;
    }

    if event.status == RemoteEventStatus::Cancelled {
        if let Some(mut item) = item {
            item.status = ItemStatus::Canceled;
            item.sync_state = SyncState::Synced;
            item.remote_id = Some(event.id.clone());
            item.remote_etag = event.etag.clone().or(item.remote_etag);
            item.remote_updated = event.updated.or(item.remote_updated);
            item.updated_at = Utc::now();
            db.update_item(&item)?;
            stats.cancelled += 1;
            debug!(item_id = %item.id, event_id = %event.id, "remote cancellation applied");
        }
        // Cancellations with no matching local item are dropped.
        return Ok(());
    }

    // Records without a concrete time range carry nothing we mirror.
    let (start, end) = match (event.start, event.end) {
        (Some(start), Some(end)) => (start, end),
        _ => return Ok(()),
    };
    let duration_min = (end - start).num_minutes();
    let title = event
        .title
        .clone()
        .unwrap_or_else(|| "(no title)".to_string());
    let patch = RemotePatch {
        title: Some(title.clone()),
        description: Some(event.description.clone()),
        scheduled_at: Some(Some(start)),
        duration_min: Some(Some(duration_min)),
        status: None,
    };

    if let Some(mut item) = item {
        let remote_newer = match (item.remote_updated, event.updated) {
            (Some(known), Some(updated)) => updated > known,
            _ => false,
        };
        if item.sync_state == SyncState::Dirty && remote_newer {
            let conflicts = detect_conflicts(&item, &patch, SyncSource::CalendarPull);
            if !conflicts.is_empty() {
                db.persist_conflicts(&conflicts, &patch, Some(&event.id))?;
                item.sync_state = SyncState::Conflict;
                item.updated_at = Utc::now();
                db.update_item(&item)?;
                stats.conflicts += conflicts.len() as u64;
                debug!(
                    item_id = %item.id,
                    event_id = %event.id,
                    "divergence recorded, item content left untouched"
                );
                return Ok(());
            }
        }

        // Echo of known state: nothing to write, nothing to count.
        let metadata_current = item.remote_id.as_deref() == Some(event.id.as_str())
            && item.remote_etag == event.etag
            && item.remote_updated == event.updated;
        if metadata_current
            && detect_conflicts(&item, &patch, SyncSource::CalendarPull).is_empty()
        {
            return Ok(());
        }

        item.title = title;
        item.description = event.description.clone();
        item.scheduled_at = Some(start);
        item.duration_min = Some(duration_min);
        item.remote_id = Some(event.id.clone());
        item.remote_etag = event.etag.clone();
        item.remote_uid = event.uid.clone().or(item.remote_uid);
        item.remote_updated = event.updated;
        item.sync_state = SyncState::Synced;
        item.updated_at = Utc::now();
        db.update_item(&item)?;
        stats.updated += 1;
        return Ok(());
    }

    // No local counterpart: materialize under the default container.
    let now = Utc::now();
    let mut created = Item::new(ItemKind::Meeting, title);
    created.description = event.description.clone();
    created.project = Some(DEFAULT_PROJECT.to_string());
    created.calendar_id = Some(calendar_id.to_string());
    created.scheduled_at = Some(start);
    created.duration_min = Some(duration_min);
    created.remote_id = Some(event.id.clone());
    created.remote_etag = event.etag.clone();
    created.remote_uid = event.uid.clone();
    created.remote_updated = event.updated;
    created.sync_state = SyncState::Synced;
    created.sync_status = SyncStatus::Synced;
    created.synced_at = Some(now);
    db.insert_item(&created)?;
    stats.created += 1;
    debug!(item_id = %created.id, event_id = %event.id, "remote event materialized");
    Ok(())
}

//! End-to-end tests of the sync engine against a scripted provider.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use organizer_core::provider::{
    CalendarProvider, EventPage, EventPayload, EventQuery, EventRecord, ProviderError,
    RemoteEvent, RemoteEventStatus,
};
use organizer_core::config::SyncConfig;
use organizer_core::{
    run_pull, run_push_batch, Database, Item, ItemKind, ItemStatus, SyncState, SyncStatus,
};

/// Provider double: each call pops the next scripted response; unscripted
/// calls fall back to benign defaults.
#[derive(Default)]
struct FakeProvider {
    list_responses: Mutex<VecDeque<Result<EventPage, ProviderError>>>,
    create_responses: Mutex<VecDeque<Result<EventRecord, ProviderError>>>,
    update_responses: Mutex<VecDeque<Result<EventRecord, ProviderError>>>,
    cancel_responses: Mutex<VecDeque<Result<EventRecord, ProviderError>>>,
    list_queries: Mutex<Vec<EventQuery>>,
    update_preconditions: Mutex<Vec<Option<String>>>,
}

impl FakeProvider {
    fn push_list(&self, response: Result<EventPage, ProviderError>) {
        self.list_responses.lock().unwrap().push_back(response);
    }

    fn push_create(&self, response: Result<EventRecord, ProviderError>) {
        self.create_responses.lock().unwrap().push_back(response);
    }

    fn push_update(&self, response: Result<EventRecord, ProviderError>) {
        self.update_responses.lock().unwrap().push_back(response);
    }

    fn list_queries(&self) -> Vec<EventQuery> {
        self.list_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarProvider for FakeProvider {
    async fn list_events(
        &self,
        _calendar_id: &str,
        query: EventQuery,
    ) -> Result<EventPage, ProviderError> {
        self.list_queries.lock().unwrap().push(query);
        self.list_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(EventPage::default()))
    }

    async fn create_event(
        &self,
        _calendar_id: &str,
        payload: &EventPayload,
    ) -> Result<EventRecord, ProviderError> {
        self.create_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(EventRecord {
                    id: format!("evt-for-{}", payload.item_id),
                    etag: Some("\"r1\"".into()),
                    updated: Some(Utc::now()),
                    uid: None,
                })
            })
    }

    async fn update_event(
        &self,
        _calendar_id: &str,
        _event_id: &str,
        _payload: &EventPayload,
        precondition_etag: Option<&str>,
    ) -> Result<EventRecord, ProviderError> {
        self.update_preconditions
            .lock()
            .unwrap()
            .push(precondition_etag.map(str::to_string));
        self.update_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(EventRecord {
                    id: "evt-updated".into(),
                    etag: Some("\"r2\"".into()),
                    updated: Some(Utc::now()),
                    uid: None,
                })
            })
    }

    async fn cancel_event(
        &self,
        _calendar_id: &str,
        event_id: &str,
    ) -> Result<EventRecord, ProviderError> {
        self.cancel_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(EventRecord {
                    id: event_id.to_string(),
                    etag: None,
                    updated: Some(Utc::now()),
                    uid: None,
                })
            })
    }
}

fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
}

fn remote_event(id: &str, title: &str, updated: DateTime<Utc>) -> RemoteEvent {
    RemoteEvent {
        id: id.to_string(),
        status: RemoteEventStatus::Confirmed,
        item_ref: None,
        title: Some(title.to_string()),
        description: None,
        start: Some(ts(10, 0)),
        end: Some(ts(10, 30)),
        updated: Some(updated),
        etag: Some("\"r1\"".into()),
        uid: Some(format!("uid-{id}")),
    }
}

fn page(items: Vec<RemoteEvent>, next_cursor: Option<&str>) -> EventPage {
    EventPage {
        items,
        next_page_token: None,
        next_cursor: next_cursor.map(str::to_string),
    }
}

fn sync_config() -> SyncConfig {
    SyncConfig::default()
}

#[tokio::test]
async fn first_pull_materializes_and_stores_cursor() {
    let db = Database::open_memory().unwrap();
    let provider = FakeProvider::default();
    provider.push_list(Ok(page(
        vec![remote_event("evt-1", "Planning", ts(9, 0))],
        Some("cursor-1"),
    )));

    let stats = run_pull(&db, &provider, "primary").await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.created, 1);
    assert_eq!(stats.updated, 0);

    let item = db.find_item_by_remote_id("evt-1").unwrap().unwrap();
    assert_eq!(item.title, "Planning");
    assert_eq!(item.kind, ItemKind::Meeting);
    assert_eq!(item.project.as_deref(), Some("Inbox"));
    assert_eq!(item.sync_state, SyncState::Synced);
    assert_eq!(item.duration_min, Some(30));

    let cursor = db.get_cursor("primary").unwrap().unwrap();
    assert_eq!(cursor.token.as_deref(), Some("cursor-1"));
    assert_eq!(cursor.last_sync_status.as_deref(), Some("ok"));

    // The first pull had no cursor and used a bounded window.
    let queries = provider.list_queries();
    assert!(queries[0].cursor.is_none());
    assert!(queries[0].time_min.is_some() && queries[0].time_max.is_some());
}

#[tokio::test]
async fn pull_is_idempotent_with_stable_cursor() {
    let db = Database::open_memory().unwrap();
    let provider = FakeProvider::default();
    provider.push_list(Ok(page(
        vec![remote_event("evt-1", "Planning", ts(9, 0))],
        Some("cursor-1"),
    )));
    run_pull(&db, &provider, "primary").await.unwrap();

    // No remote changes since: incremental pull returns an empty page and
    // re-issues the same token.
    provider.push_list(Ok(page(vec![], Some("cursor-1"))));
    let stats = run_pull(&db, &provider, "primary").await.unwrap();
    assert_eq!(stats.created, 0);
    assert_eq!(stats.updated, 0);

    let cursor = db.get_cursor("primary").unwrap().unwrap();
    assert_eq!(cursor.token.as_deref(), Some("cursor-1"));

    let queries = provider.list_queries();
    assert_eq!(queries[1].cursor.as_deref(), Some("cursor-1"));
}

#[tokio::test]
async fn dirty_item_is_not_silently_overwritten() {
    let db = Database::open_memory().unwrap();
    let provider = FakeProvider::default();

    let mut item = Item::new(ItemKind::Meeting, "Local title");
    item.scheduled_at = Some(ts(10, 0));
    item.duration_min = Some(30);
    item.remote_id = Some("evt-2".into());
    item.remote_etag = Some("\"r1\"".into());
    item.remote_updated = Some(ts(8, 0));
    item.sync_state = SyncState::Dirty;
    db.insert_item(&item).unwrap();

    let mut event = remote_event("evt-2", "Remote title", ts(9, 0));
    event.etag = Some("\"r2\"".into());
    provider.push_list(Ok(page(vec![event], Some("cursor-1"))));

    let stats = run_pull(&db, &provider, "primary").await.unwrap();
    assert_eq!(stats.conflicts, 1);
    assert_eq!(stats.updated, 0);

    let after = db.get_item(&item.id).unwrap().unwrap();
    assert_eq!(after.title, "Local title");
    assert_eq!(after.sync_state, SyncState::Conflict);

    let open = db.list_open_conflicts(10).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].field.as_str(), "title");
    assert_eq!(open[0].local_value.as_deref(), Some("Local title"));
    assert_eq!(open[0].remote_value.as_deref(), Some("Remote title"));
}

#[tokio::test]
async fn repeated_conflicting_pull_does_not_duplicate_rows() {
    let db = Database::open_memory().unwrap();
    let provider = FakeProvider::default();

    let mut item = Item::new(ItemKind::Meeting, "Local title");
    item.scheduled_at = Some(ts(10, 0));
    item.duration_min = Some(30);
    item.remote_id = Some("evt-2".into());
    item.remote_updated = Some(ts(8, 0));
    item.sync_state = SyncState::Dirty;
    db.insert_item(&item).unwrap();

    for _ in 0..2 {
        provider.push_list(Ok(page(
            vec![remote_event("evt-2", "Remote title", ts(9, 0))],
            Some("cursor-1"),
        )));
        run_pull(&db, &provider, "primary").await.unwrap();
    }
    assert_eq!(db.open_conflict_count().unwrap(), 1);
}

#[tokio::test]
async fn conflict_resolution_is_idempotent_end_to_end() {
    let db = Database::open_memory().unwrap();
    let provider = FakeProvider::default();

    let mut item = Item::new(ItemKind::Meeting, "Local title");
    item.scheduled_at = Some(ts(10, 0));
    item.duration_min = Some(30);
    item.remote_id = Some("evt-2".into());
    item.remote_updated = Some(ts(8, 0));
    item.sync_state = SyncState::Dirty;
    db.insert_item(&item).unwrap();

    provider.push_list(Ok(page(
        vec![remote_event("evt-2", "Remote title", ts(9, 0))],
        Some("cursor-1"),
    )));
    run_pull(&db, &provider, "primary").await.unwrap();

    let conflict = &db.list_open_conflicts(1).unwrap()[0];
    let first = db.apply_conflict_choice(&conflict.id, "accept_remote").unwrap();
    let item_after_first = db.get_item(&item.id).unwrap().unwrap();
    let second = db.apply_conflict_choice(&conflict.id, "accept_remote").unwrap();
    let item_after_second = db.get_item(&item.id).unwrap().unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(item_after_first.title, "Remote title");
    assert_eq!(item_after_first.updated_at, item_after_second.updated_at);
    assert_eq!(item_after_first.sync_state, SyncState::Synced);
    assert!(db.list_open_conflicts(10).unwrap().is_empty());
}

#[tokio::test]
async fn expired_cursor_triggers_exactly_one_full_resync() {
    let db = Database::open_memory().unwrap();
    db.store_cursor_token("primary", "stale").unwrap();

    let provider = FakeProvider::default();
    provider.push_list(Err(ProviderError::CursorExpired));
    provider.push_list(Ok(page(
        vec![remote_event("evt-1", "Planning", ts(9, 0))],
        Some("fresh"),
    )));

    let stats = run_pull(&db, &provider, "primary").await.unwrap();
    assert_eq!(stats.token_reset, 1);
    assert_eq!(stats.created, 1);

    let cursor = db.get_cursor("primary").unwrap().unwrap();
    assert_eq!(cursor.token.as_deref(), Some("fresh"));

    let queries = provider.list_queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].cursor.as_deref(), Some("stale"));
    assert!(queries[1].cursor.is_none() && queries[1].time_min.is_some());
}

#[tokio::test]
async fn page_failure_aborts_pass_without_advancing_cursor() {
    let db = Database::open_memory().unwrap();
    db.store_cursor_token("primary", "cursor-1").unwrap();

    let provider = FakeProvider::default();
    provider.push_list(Ok(EventPage {
        items: vec![remote_event("evt-1", "Planning", ts(9, 0))],
        next_page_token: Some("page-2".into()),
        next_cursor: None,
    }));
    provider.push_list(Err(ProviderError::Api {
        status: 503,
        message: "backend".into(),
    }));

    let err = run_pull(&db, &provider, "primary").await.unwrap_err();
    assert!(err.to_string().contains("503"));

    let cursor = db.get_cursor("primary").unwrap().unwrap();
    assert_eq!(cursor.token.as_deref(), Some("cursor-1"));
    assert_eq!(cursor.last_sync_status.as_deref(), Some("error"));
}

#[tokio::test]
async fn remote_cancellation_cancels_local_item() {
    let db = Database::open_memory().unwrap();
    let provider = FakeProvider::default();

    let mut item = Item::new(ItemKind::Meeting, "Planning");
    item.remote_id = Some("evt-3".into());
    item.sync_state = SyncState::Synced;
    db.insert_item(&item).unwrap();

    let mut cancelled = remote_event("evt-3", "Planning", ts(9, 0));
    cancelled.status = RemoteEventStatus::Cancelled;
    // An unmatched cancellation rides along and must be dropped silently.
    let mut unmatched = remote_event("evt-unknown", "Ghost", ts(9, 0));
    unmatched.status = RemoteEventStatus::Cancelled;
    provider.push_list(Ok(page(vec![cancelled, unmatched], Some("cursor-1"))));

    let stats = run_pull(&db, &provider, "primary").await.unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.created, 0);

    let after = db.get_item(&item.id).unwrap().unwrap();
    assert_eq!(after.status, ItemStatus::Canceled);
    assert_eq!(after.sync_state, SyncState::Synced);
    assert!(db.find_item_by_remote_id("evt-unknown").unwrap().is_none());
}

#[tokio::test]
async fn push_then_pull_echo_is_quiet() {
    let db = Database::open_memory().unwrap();
    let provider = FakeProvider::default();

    // Item A: local, dirty, no remote linkage.
    let mut item = Item::new(ItemKind::Task, "Buy milk");
    item.scheduled_at = Some(ts(10, 0));
    item.duration_min = Some(30);
    db.insert_item(&item).unwrap();
    db.mark_item_dirty(&item.id).unwrap();

    let pushed_updated = ts(10, 5);
    provider.push_create(Ok(EventRecord {
        id: "evt-1".into(),
        etag: Some("\"r1\"".into()),
        updated: Some(pushed_updated),
        uid: Some("uid-1".into()),
    }));

    let stats = run_push_batch(&db, &provider, &sync_config(), 10).await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.success, 1);

    let after = db.get_item(&item.id).unwrap().unwrap();
    assert_eq!(after.remote_id.as_deref(), Some("evt-1"));
    assert_eq!(after.remote_etag.as_deref(), Some("\"r1\""));
    assert_eq!(after.sync_state, SyncState::Synced);
    assert_eq!(after.sync_status, SyncStatus::Synced);
    assert_eq!(db.pending_outbox_count().unwrap(), 0);

    // The same event comes back unchanged on the next pull: no conflicts,
    // no updates.
    let echo = RemoteEvent {
        id: "evt-1".into(),
        status: RemoteEventStatus::Confirmed,
        item_ref: Some(item.id.clone()),
        title: Some("Buy milk".into()),
        description: None,
        start: Some(ts(10, 0)),
        end: Some(ts(10, 30)),
        updated: Some(pushed_updated),
        etag: Some("\"r1\"".into()),
        uid: Some("uid-1".into()),
    };
    provider.push_list(Ok(page(vec![echo], Some("cursor-1"))));

    let stats = run_pull(&db, &provider, "primary").await.unwrap();
    assert_eq!(stats.conflicts, 0);
    assert_eq!(stats.updated, 0);
    assert_eq!(stats.created, 0);
}

#[tokio::test]
async fn stale_revision_push_flags_conflict_without_conflict_rows() {
    let db = Database::open_memory().unwrap();
    let provider = FakeProvider::default();

    let mut item = Item::new(ItemKind::Meeting, "Planning");
    item.scheduled_at = Some(ts(10, 0));
    item.remote_id = Some("evt-2".into());
    item.remote_etag = Some("\"r0\"".into());
    item.sync_state = SyncState::Synced;
    db.insert_item(&item).unwrap();
    db.mark_item_dirty(&item.id).unwrap();

    provider.push_update(Err(ProviderError::PreconditionFailed));

    let stats = run_push_batch(&db, &provider, &sync_config(), 10).await.unwrap();
    // A precondition rejection is terminal for the attempt, not a retryable
    // failure: the entry is consumed.
    assert_eq!(stats.success, 1);
    assert_eq!(db.pending_outbox_count().unwrap(), 0);

    let after = db.get_item(&item.id).unwrap().unwrap();
    assert_eq!(after.sync_state, SyncState::Conflict);
    assert!(db.list_open_conflicts(10).unwrap().is_empty());

    // The stale tag was actually sent as the precondition.
    let preconditions = provider.update_preconditions.lock().unwrap().clone();
    assert_eq!(preconditions, vec![Some("\"r0\"".to_string())]);
}

#[tokio::test]
async fn conflicted_item_is_never_pushed() {
    let db = Database::open_memory().unwrap();
    let provider = FakeProvider::default();

    let mut item = Item::new(ItemKind::Meeting, "Planning");
    item.scheduled_at = Some(ts(10, 0));
    item.remote_id = Some("evt-2".into());
    db.insert_item(&item).unwrap();
    db.mark_item_dirty(&item.id).unwrap();

    // Flag the conflict after enqueueing.
    let mut flagged = db.get_item(&item.id).unwrap().unwrap();
    flagged.sync_state = SyncState::Conflict;
    db.update_item(&flagged).unwrap();

    let stats = run_push_batch(&db, &provider, &sync_config(), 10).await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.success, 1);
    // No update call reached the provider.
    assert!(provider.update_preconditions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failing_entry_does_not_block_the_batch() {
    let db = Database::open_memory().unwrap();
    let provider = FakeProvider::default();

    let mut failing = Item::new(ItemKind::Task, "first");
    failing.scheduled_at = Some(ts(9, 0));
    db.insert_item(&failing).unwrap();
    db.mark_item_dirty(&failing.id).unwrap();

    let mut fine = Item::new(ItemKind::Task, "second");
    fine.scheduled_at = Some(ts(11, 0));
    db.insert_item(&fine).unwrap();
    db.mark_item_dirty(&fine.id).unwrap();

    provider.push_create(Err(ProviderError::Api {
        status: 500,
        message: "boom".into(),
    }));
    // Second create falls through to the default success response.

    let stats = run_push_batch(&db, &provider, &sync_config(), 10).await.unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.failed, 1);

    let second = db.get_item(&fine.id).unwrap().unwrap();
    assert_eq!(second.sync_state, SyncState::Synced);

    let first = db.get_item(&failing.id).unwrap().unwrap();
    assert_eq!(first.sync_status, SyncStatus::Failed);
    assert_eq!(first.sync_attempts, 1);
}

#[tokio::test]
async fn orphaned_outbox_entry_is_terminal() {
    let db = Database::open_memory().unwrap();
    let provider = FakeProvider::default();

    let entry = db
        .enqueue_outbox("item", "no-such-item", "upsert", None)
        .unwrap();

    let stats = run_push_batch(&db, &provider, &sync_config(), 10).await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 1);

    let archived = db.get_outbox_entry(&entry.id).unwrap().unwrap();
    assert!(archived.processed_at.is_some());
    assert_eq!(archived.last_error.as_deref(), Some("entity not found"));
    assert_eq!(db.pending_outbox_count().unwrap(), 0);
}

#[tokio::test]
async fn backoff_schedule_is_monotone_and_capped() {
    let db = Database::open_memory().unwrap();
    let provider = FakeProvider::default();
    let config = sync_config();

    let mut item = Item::new(ItemKind::Task, "doomed");
    item.scheduled_at = Some(ts(9, 0));
    db.insert_item(&item).unwrap();
    db.mark_item_dirty(&item.id).unwrap();

    let mut delays = Vec::new();
    for _ in 0..8 {
        provider.push_create(Err(ProviderError::Api {
            status: 503,
            message: "still down".into(),
        }));
        let before = Utc::now();
        run_push_batch(&db, &provider, &config, 10).await.unwrap();

        let entry = db
            .pending_outbox_entry("item", &item.id, "upsert")
            .unwrap()
            .unwrap();
        let delay = (entry.next_retry_at.unwrap() - before).num_seconds();
        delays.push(delay);

        // Force the entry due again so the next drain retries it.
        db.conn()
            .execute(
                "UPDATE sync_outbox SET next_retry_at = ?1 WHERE id = ?2",
                rusqlite::params![
                    (Utc::now() - Duration::seconds(1)).to_rfc3339(),
                    entry.id
                ],
            )
            .unwrap();
    }

    let cap = config.idle_poll_secs as i64;
    for pair in delays.windows(2) {
        assert!(pair[1] >= pair[0] - 2, "delays must not shrink: {delays:?}");
    }
    for delay in &delays {
        assert!(*delay <= cap + 2, "delay {delay} exceeds idle cap {cap}");
    }
    assert!(*delays.last().unwrap() >= cap - 2, "backoff should reach the cap");
}

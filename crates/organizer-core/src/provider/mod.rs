//! Remote calendar provider abstraction.
//!
//! The sync engine talks to the remote calendar/tasks service through the
//! [`CalendarProvider`] trait so the engine can be exercised against a fake
//! in tests and against the HTTP client in production. Authentication and
//! token refresh are the caller's problem -- implementations receive a
//! ready-to-use bearer token.

pub mod google;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use google::GoogleCalendarProvider;

/// Provider-side error taxonomy.
///
/// The sync layer cares about four distinguished conditions; everything else
/// is classified by [`ProviderError::is_transient`].
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The continuation cursor is expired or invalidated; a full resync is
    /// required.
    #[error("sync cursor expired or invalidated")]
    CursorExpired,

    /// Optimistic-concurrency precondition rejected: the remote revision no
    /// longer matches the supplied tag.
    #[error("precondition failed: remote revision changed")]
    PreconditionFailed,

    /// Remote record does not exist.
    #[error("remote record not found")]
    NotFound,

    /// Authentication rejected.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Rate limited.
    #[error("rate limited")]
    RateLimited,

    /// Any other API-level failure.
    #[error("provider API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Transport failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ProviderError {
    /// Whether the failure is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Network(_) | ProviderError::RateLimited => true,
            ProviderError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Listing query: either an incremental cursor or a bounded time window.
///
/// Providers reject a cursor combined with time bounds, so the two forms are
/// only constructible separately.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub cursor: Option<String>,
    pub time_min: Option<DateTime<Utc>>,
    pub time_max: Option<DateTime<Utc>>,
    pub page_token: Option<String>,
}

impl EventQuery {
    /// Incremental listing from a stored continuation cursor.
    pub fn cursor(token: impl Into<String>) -> Self {
        Self {
            cursor: Some(token.into()),
            ..Self::default()
        }
    }

    /// Windowed listing. `time_max = None` means an open-ended window.
    pub fn window(time_min: DateTime<Utc>, time_max: Option<DateTime<Utc>>) -> Self {
        Self {
            time_min: Some(time_min),
            time_max,
            ..Self::default()
        }
    }

    pub fn with_page_token(mut self, token: Option<String>) -> Self {
        self.page_token = token;
        self
    }
}

/// Status of a remote record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteEventStatus {
    Confirmed,
    Cancelled,
}

/// A remote event/task record, already parsed off the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub id: String,
    pub status: RemoteEventStatus,
    /// Back-reference to the local item id, when the record was created by
    /// this system.
    pub item_ref: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub uid: Option<String>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub items: Vec<RemoteEvent>,
    /// Present while more pages remain in the current sequence.
    pub next_page_token: Option<String>,
    /// Continuation cursor, returned on the final page only.
    pub next_cursor: Option<String>,
}

/// Outbound event content, built from a local item.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    pub summary: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Local item id embedded as a back-reference.
    pub item_id: String,
}

/// Remote-assigned identity returned by mutating calls.
#[derive(Debug, Clone, Default)]
pub struct EventRecord {
    pub id: String,
    pub etag: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub uid: Option<String>,
}

/// Capability injected into the sync engine.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// List events, incrementally (cursor) or over a time window.
    async fn list_events(
        &self,
        calendar_id: &str,
        query: EventQuery,
    ) -> Result<EventPage, ProviderError>;

    /// Create a remote event.
    async fn create_event(
        &self,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> Result<EventRecord, ProviderError>;

    /// Update a remote event. When `precondition_etag` is supplied the update
    /// must fail with [`ProviderError::PreconditionFailed`] if the remote
    /// revision no longer matches.
    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
        precondition_etag: Option<&str>,
    ) -> Result<EventRecord, ProviderError>;

    /// Cancel a remote event (status transition, not a delete).
    async fn cancel_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<EventRecord, ProviderError>;
}

//! Google Calendar implementation of [`CalendarProvider`].
//!
//! Maps the provider's HTTP status codes onto the sync error taxonomy:
//! 410 -> cursor expired, 409/412 -> precondition failed, 404 -> not found,
//! 429 -> rate limited, everything else -> generic API error.

use chrono::{DateTime, Utc};
use serde_json::json;

use super::{
    CalendarProvider, EventPage, EventPayload, EventQuery, EventRecord, ProviderError,
    RemoteEvent, RemoteEventStatus,
};

const GOOGLE_CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";
const PAGE_SIZE: u32 = 250;

/// Google Calendar API client.
pub struct GoogleCalendarProvider {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl GoogleCalendarProvider {
    /// Create a client against the production API.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, GOOGLE_CALENDAR_API)
    }

    /// Create a client against a custom endpoint (tests).
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: access_token.into(),
        }
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!("{}/calendars/{}/events", self.base_url, calendar_id)
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!("{}/{}", self.events_url(calendar_id), event_id)
    }

    async fn into_json(resp: reqwest::Response) -> Result<serde_json::Value, ProviderError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let code = status.as_u16();
        let message = resp.text().await.unwrap_or_default();
        Err(match code {
            401 | 403 => ProviderError::Auth(message),
            404 => ProviderError::NotFound,
            409 | 412 => ProviderError::PreconditionFailed,
            410 => ProviderError::CursorExpired,
            429 => ProviderError::RateLimited,
            _ => ProviderError::Api {
                status: code,
                message,
            },
        })
    }
}

#[async_trait::async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    async fn list_events(
        &self,
        calendar_id: &str,
        query: EventQuery,
    ) -> Result<EventPage, ProviderError> {
        let mut params: Vec<(&str, String)> = vec![
            ("singleEvents", "true".into()),
            ("showDeleted", "true".into()),
            ("maxResults", PAGE_SIZE.to_string()),
        ];
        if let Some(cursor) = &query.cursor {
            params.push(("syncToken", cursor.clone()));
        }
        if let Some(time_min) = &query.time_min {
            params.push(("timeMin", time_min.to_rfc3339()));
            params.push(("orderBy", "startTime".into()));
        }
        if let Some(time_max) = &query.time_max {
            params.push(("timeMax", time_max.to_rfc3339()));
        }
        if let Some(page_token) = &query.page_token {
            params.push(("pageToken", page_token.clone()));
        }

        let resp = self
            .http
            .get(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .query(&params)
            .send()
            .await?;
        let data = Self::into_json(resp).await?;

        let items = data["items"]
            .as_array()
            .map(|events| events.iter().filter_map(parse_wire_event).collect())
            .unwrap_or_default();

        Ok(EventPage {
            items,
            next_page_token: data["nextPageToken"].as_str().map(str::to_string),
            next_cursor: data["nextSyncToken"].as_str().map(str::to_string),
        })
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> Result<EventRecord, ProviderError> {
        let resp = self
            .http
            .post(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .json(&to_wire_event(payload))
            .send()
            .await?;
        let data = Self::into_json(resp).await?;
        Ok(parse_event_record(&data))
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        payload: &EventPayload,
        precondition_etag: Option<&str>,
    ) -> Result<EventRecord, ProviderError> {
        let mut req = self
            .http
            .patch(self.event_url(calendar_id, event_id))
            .bearer_auth(&self.access_token)
            .json(&to_wire_event(payload));
        if let Some(etag) = precondition_etag {
            req = req.header("If-Match", etag);
        }
        let data = Self::into_json(req.send().await?).await?;
        Ok(parse_event_record(&data))
    }

    async fn cancel_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<EventRecord, ProviderError> {
        let resp = self
            .http
            .patch(self.event_url(calendar_id, event_id))
            .bearer_auth(&self.access_token)
            .json(&json!({"status": "cancelled"}))
            .send()
            .await?;
        let data = Self::into_json(resp).await?;
        Ok(parse_event_record(&data))
    }
}

fn parse_rfc3339(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a wire event into a [`RemoteEvent`]. Records without an id are
/// dropped.
pub fn parse_wire_event(event: &serde_json::Value) -> Option<RemoteEvent> {
    let id = event["id"].as_str()?.to_string();
    let status = if event["status"].as_str() == Some("cancelled") {
        RemoteEventStatus::Cancelled
    } else {
        RemoteEventStatus::Confirmed
    };
    let item_ref = event["extendedProperties"]["private"]["item_id"]
        .as_str()
        .map(str::to_string);

    Some(RemoteEvent {
        id,
        status,
        item_ref,
        title: event["summary"].as_str().map(str::to_string),
        description: event["description"].as_str().map(str::to_string),
        start: parse_rfc3339(event["start"]["dateTime"].as_str()),
        end: parse_rfc3339(event["end"]["dateTime"].as_str()),
        updated: parse_rfc3339(event["updated"].as_str()),
        etag: event["etag"].as_str().map(str::to_string),
        uid: event["iCalUID"].as_str().map(str::to_string),
    })
}

fn parse_event_record(data: &serde_json::Value) -> EventRecord {
    EventRecord {
        id: data["id"].as_str().unwrap_or_default().to_string(),
        etag: data["etag"].as_str().map(str::to_string),
        updated: parse_rfc3339(data["updated"].as_str()),
        uid: data["iCalUID"].as_str().map(str::to_string),
    }
}

/// Build the wire representation of an outbound event.
pub fn to_wire_event(payload: &EventPayload) -> serde_json::Value {
    let mut event = json!({
        "summary": payload.summary,
        "start": {"dateTime": payload.start.to_rfc3339(), "timeZone": "UTC"},
        "end": {"dateTime": payload.end.to_rfc3339(), "timeZone": "UTC"},
        "extendedProperties": {"private": {"item_id": payload.item_id}},
        "reminders": {"useDefault": true},
    });
    if let Some(description) = &payload.description {
        event["description"] = json!(description);
    }
    event
}

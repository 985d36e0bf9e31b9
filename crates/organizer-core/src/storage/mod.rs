pub mod database;

mod conflicts;
mod cursors;
mod items;
mod outbox;

pub use conflicts::{Conflict, ConflictChoice, ConflictStatus};
pub use cursors::SyncCursor;
pub use database::Database;
pub use outbox::OutboxEntry;

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Returns `~/.config/organizer[-dev]/` based on ORGANIZER_ENV.
///
/// Set ORGANIZER_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("ORGANIZER_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("organizer-dev")
    } else {
        base_dir.join("organizer")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Format a timestamp for storage.
pub(crate) fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn fmt_ts_opt(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(fmt_ts)
}

/// Parse a stored timestamp with fallback to current time.
pub(crate) fn parse_ts(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_ts_opt(dt_str: Option<String>) -> Option<DateTime<Utc>> {
    dt_str
        .as_deref()
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

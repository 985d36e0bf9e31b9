//! Periodic JSON snapshot of the item store.
//!
//! The scheduler exports the full item list on a fixed cadence so an
//! external viewer always has a recent picture without querying the live
//! database. "Latest" mode overwrites one stable file; "timestamped" mode
//! keeps history.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::ExportMode;
use crate::error::CoreError;
use crate::item::Item;
use crate::storage::Database;

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    exported_at: DateTime<Utc>,
    item_count: usize,
    items: &'a [Item],
}

/// Write a snapshot of all items into `dir`, returning the file path.
pub fn export_snapshot(
    db: &Database,
    dir: &Path,
    mode: ExportMode,
) -> Result<PathBuf, CoreError> {
    let items = db.list_items()?;
    let now = Utc::now();
    let snapshot = Snapshot {
        exported_at: now,
        item_count: items.len(),
        items: &items,
    };

    let filename = match mode {
        ExportMode::Latest => "items_latest.json".to_string(),
        ExportMode::Timestamped => format!("items_{}.json", now.format("%Y%m%d_%H%M%S")),
    };

    std::fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    std::fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
    info!(path = %path.display(), items = items.len(), "snapshot exported");
    Ok(path)
}

//! Sync status overview.

use organizer_core::{Config, SyncState};

use super::common::open_database;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let db = open_database()?;

    println!("Items:");
    println!("  synced:   {}", db.count_items_in_state(SyncState::Synced)?);
    println!("  dirty:    {}", db.count_items_in_state(SyncState::Dirty)?);
    println!("  conflict: {}", db.count_items_in_state(SyncState::Conflict)?);

    println!("Outbox:");
    println!("  pending:  {}", db.pending_outbox_count()?);

    println!("Conflicts:");
    println!("  open:     {}", db.open_conflict_count()?);

    println!("Calendar {}:", config.sync.calendar_id);
    match db.get_cursor(&config.sync.calendar_id)? {
        Some(cursor) => {
            println!(
                "  cursor:   {}",
                if cursor.token.is_some() {
                    "incremental"
                } else {
                    "full resync pending"
                }
            );
            println!(
                "  last sync: {}",
                cursor.last_sync_status.as_deref().unwrap_or("never")
            );
            if let Some(error) = cursor.last_sync_error {
                println!("  last error: {error}");
            }
        }
        None => println!("  cursor:   none (no pull yet)"),
    }
    Ok(())
}

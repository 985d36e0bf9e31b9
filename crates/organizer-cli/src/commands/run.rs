//! Long-lived scheduler command.

use organizer_core::{Config, SyncScheduler};

use super::common::{build_provider, open_database};

/// Run the sync loop until Ctrl-C. Cancellation lands between passes; a
/// pass in flight finishes before the process exits.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let db = open_database()?;
    let provider = build_provider(&config)?;
    let scheduler = SyncScheduler::new(db, provider, config);

    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            println!("shutting down");
        }
    }
    Ok(())
}

//! Inbound pull command.

use chrono::{Duration, Utc};
use organizer_core::{run_pull, run_pull_window, Config};

use super::common::{build_provider, open_database};

pub async fn run(window_days: Option<i64>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let db = open_database()?;
    let provider = build_provider(&config)?;
    let calendar_id = &config.sync.calendar_id;

    let stats = match window_days {
        Some(days) => {
            let start = Utc::now() - Duration::days(1);
            let end = Utc::now() + Duration::days(days.max(1));
            run_pull_window(&db, &provider, calendar_id, start, end).await?
        }
        None => run_pull(&db, &provider, calendar_id).await?,
    };

    println!(
        "pull done: processed={} created={} updated={} cancelled={} conflicts={} token_reset={}",
        stats.processed,
        stats.created,
        stats.updated,
        stats.cancelled,
        stats.conflicts,
        stats.token_reset
    );
    Ok(())
}

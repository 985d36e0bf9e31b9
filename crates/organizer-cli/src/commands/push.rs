//! Outbox drain command.

use organizer_core::{run_push_batch, Config};

use super::common::{build_provider, open_database};

pub async fn run(batch_size: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let db = open_database()?;
    let provider = build_provider(&config)?;
    let batch_size = batch_size.unwrap_or(config.sync.outbox_batch_size);

    let stats = run_push_batch(&db, &provider, &config.sync, batch_size).await?;
    println!(
        "push done: processed={} success={} failed={}",
        stats.processed, stats.success, stats.failed
    );
    Ok(())
}

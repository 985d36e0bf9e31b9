//! Outbox processor: at-least-once delivery of pending outbound mutations.
//!
//! Entries drain in FIFO creation order. A failing entry never blocks the
//! rest of its batch, and a permanently failing entry retries no more often
//! than the idle poll cadence.

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::{CoreError, ValidationError};
use crate::provider::CalendarProvider;
use crate::storage::Database;
use crate::sync::push::push_item;
use crate::sync::types::DrainStats;

/// Shift cap keeping `1 << exponent` well inside i64 range.
const MAX_BACKOFF_EXPONENT: i64 = 20;

/// Retry delay after the n-th failed attempt:
/// `min(base * 2^(n-1), cap)`.
///
/// The cap is the idle poll interval, so a dead entry neither hammers the
/// provider nor stalls longer than one idle cycle.
pub fn backoff_delay(attempts: i64, base_secs: i64, cap_secs: i64) -> Duration {
    let exponent = (attempts.max(1) - 1).min(MAX_BACKOFF_EXPONENT);
    let secs = base_secs.saturating_mul(1_i64 << exponent).min(cap_secs);
    Duration::seconds(secs)
}

/// Drain one batch of due outbox entries through the outbound syncer.
pub async fn run_push_batch(
    db: &Database,
    provider: &dyn CalendarProvider,
    config: &SyncConfig,
    batch_size: usize,
) -> Result<DrainStats, CoreError> {
    let mut stats = DrainStats::default();
    let entries = db.due_outbox_entries(Utc::now(), batch_size)?;
    debug!(due = entries.len(), "outbox drain start");

    for entry in entries {
        stats.processed += 1;

        if entry.entity_type != "item" || entry.operation != "upsert" {
            // Unknown work is terminal: record it, never retry it.
            db.mark_outbox_processed(
                &entry.id,
                Utc::now(),
                Some(&format!(
                    "unsupported operation: {}/{}",
                    entry.entity_type, entry.operation
                )),
            )?;
            stats.failed += 1;
            continue;
        }

        match push_item(db, provider, &config.calendar_id, &entry.entity_id).await {
            Ok(_) => {
                db.mark_outbox_processed(&entry.id, Utc::now(), None)?;
                stats.success += 1;
            }
            Err(CoreError::Validation(ValidationError::NotFound { .. })) => {
                // Orphaned entry: the referenced entity is gone for good.
                db.mark_outbox_processed(&entry.id, Utc::now(), Some("entity not found"))?;
                stats.failed += 1;
                warn!(entity_id = %entry.entity_id, "outbox entry references missing entity");
            }
            Err(err) => {
                let attempts = entry.attempts + 1;
                let delay = backoff_delay(
                    attempts,
                    config.backoff_base_secs,
                    config.idle_poll_secs as i64,
                );
                db.mark_outbox_failed(&entry.id, Utc::now(), &err.to_string(), Utc::now() + delay)?;
                stats.failed += 1;
                warn!(
                    entity_id = %entry.entity_id,
                    attempts,
                    retry_in_secs = delay.num_seconds(),
                    error = %err,
                    "push failed, entry rescheduled"
                );
            }
        }
    }

    debug!(?stats, "outbox drain done");
    Ok(stats)
}

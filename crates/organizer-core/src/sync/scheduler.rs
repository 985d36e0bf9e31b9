//! Cooperative sync loop.
//!
//! One long-lived task runs the full pull + push + export sequence per tick,
//! guarded by a single in-process lock so passes never overlap even when one
//! overruns its nominal interval. The loop sleeps *after* a pass completes,
//! so cadence is the interval between completions, not wall-clock ticks.
//! Pass failures are logged and recorded, never raised out of the loop.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::Config;
use crate::export::export_snapshot;
use crate::provider::CalendarProvider;
use crate::storage::Database;
use crate::sync::outbox::run_push_batch;
use crate::sync::pull::run_pull;

/// Owns the sync loop state: store, provider, config, the pass lock and the
/// tick counter. Constructed once at process start, dropped at shutdown.
pub struct SyncScheduler<P: CalendarProvider> {
    db: Database,
    provider: P,
    config: Config,
    pass_lock: Mutex<()>,
    ticks: AtomicU64,
}

impl<P: CalendarProvider> SyncScheduler<P> {
    pub fn new(db: Database, provider: P, config: Config) -> Self {
        Self {
            db,
            provider,
            config,
            pass_lock: Mutex::new(()),
            ticks: AtomicU64::new(0),
        }
    }

    /// Run one full pass: inbound pull, outbox drain, periodic export.
    pub async fn tick(&self) {
        let _guard = self.pass_lock.lock().await;
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        let calendar_id = &self.config.sync.calendar_id;

        if let Err(err) = run_pull(&self.db, &self.provider, calendar_id).await {
            error!(calendar_id, error = %err, "pull pass failed");
        }

        match run_push_batch(
            &self.db,
            &self.provider,
            &self.config.sync,
            self.config.sync.outbox_batch_size,
        )
        .await
        {
            Ok(stats) if stats.processed > 0 => {
                info!(?stats, "push pass done");
            }
            Ok(_) => {}
            Err(err) => error!(error = %err, "push pass failed"),
        }

        if self.config.export.enabled && tick % self.config.export.every_ticks.max(1) == 0 {
            match self.config.export_dir() {
                Ok(dir) => {
                    if let Err(err) = export_snapshot(&self.db, &dir, self.config.export.mode) {
                        error!(error = %err, "snapshot export failed");
                    }
                }
                Err(err) => error!(error = %err, "export directory unavailable"),
            }
        }
    }

    /// Interval until the next pass: short while local activity is recent,
    /// long otherwise.
    pub fn poll_interval(&self) -> Duration {
        let active = self
            .db
            .local_activity_until()
            .ok()
            .flatten()
            .map(|until| until > Utc::now())
            .unwrap_or(false);
        if active {
            Duration::from_secs(self.config.sync.active_poll_secs)
        } else {
            Duration::from_secs(self.config.sync.idle_poll_secs)
        }
    }

    /// Run until the owning task is cancelled. Cancellation lands between
    /// passes -- the lock is held for the whole of each pass, and the sleep
    /// is the loop's long suspension point.
    pub async fn run(&self) {
        info!(
            active_secs = self.config.sync.active_poll_secs,
            idle_secs = self.config.sync.idle_poll_secs,
            "sync scheduler started"
        );
        loop {
            self.tick().await;
            tokio::time::sleep(self.poll_interval()).await;
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}

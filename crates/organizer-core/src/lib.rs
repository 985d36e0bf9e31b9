//! # Organizer Core Library
//!
//! Core business logic for Organizer, a personal task/calendar assistant.
//! The library owns the item store and the bidirectional synchronization
//! engine; front-ends (the CLI in this workspace, chat surfaces elsewhere)
//! are thin layers over it.
//!
//! ## Architecture
//!
//! - **Storage**: SQLite-backed store for items, sync cursors, conflicts
//!   and the outbound delivery queue
//! - **Provider**: injected capability for the remote calendar API
//! - **Sync engine**: incremental inbound pull, outbox-driven outbound push
//!   with backoff, field-level conflict detection with explicit resolution
//! - **Scheduler**: single cooperative loop with a two-level adaptive poll
//!   cadence and periodic snapshot export
//!
//! ## Key Components
//!
//! - [`Database`]: item/cursor/conflict/outbox persistence
//! - [`CalendarProvider`]: remote calendar capability trait
//! - [`SyncScheduler`]: the long-lived sync loop
//! - [`run_pull`] / [`run_push_batch`]: one-shot sync entry points

pub mod config;
pub mod error;
pub mod export;
pub mod item;
pub mod provider;
pub mod storage;
pub mod sync;

pub use config::{Config, ExportMode};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use export::export_snapshot;
pub use item::{Item, ItemKind, ItemStatus, SyncState, SyncStatus};
pub use provider::{CalendarProvider, GoogleCalendarProvider, ProviderError};
pub use storage::{Conflict, ConflictChoice, ConflictStatus, Database, OutboxEntry, SyncCursor};
pub use sync::{
    detect_conflicts, push_item, run_pull, run_pull_window, run_push_batch, DrainStats,
    PullStats, PushAction, RemotePatch, SyncScheduler, SyncSource,
};

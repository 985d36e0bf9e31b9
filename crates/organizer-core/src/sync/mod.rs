//! Bidirectional synchronization engine.
//!
//! Reconciles locally-owned items with a remote calendar provider: an
//! inbound pull driven by an incremental cursor, an outbound push delivered
//! through a durable outbox with backoff, field-level conflict detection in
//! between, and a cooperative scheduler tying the passes together.

pub mod conflict;
pub mod outbox;
pub mod pull;
pub mod push;
pub mod scheduler;
pub mod types;

pub use conflict::{detect_conflicts, FieldConflict};
pub use outbox::{backoff_delay, run_push_batch};
pub use pull::{run_pull, run_pull_window};
pub use push::{push_item, PushAction};
pub use scheduler::SyncScheduler;
pub use types::{DrainStats, PatchField, PullStats, RemotePatch, SyncSource};

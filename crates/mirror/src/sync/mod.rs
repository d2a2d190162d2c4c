//! Sync engine for keeping the mirror consistent with Gmail
//!
//! Two paths write to the mirror: full enumeration of the inbox, and
//! incremental reconciliation from the history API. Push notifications
//! pass through a gate before they trigger reconciliation. Both paths are
//! idempotent and can be retried after a failure.

mod context;
mod engine;
mod enumerate;
mod gate;
mod reconcile;
mod watch;
pub mod watermark;

pub use context::{SyncContext, SyncOptions};
pub use engine::{PushJob, SyncEngine};
pub use enumerate::{EnumerateStats, Enumeration, enumerate, rebuild};
pub use gate::{Admission, Decision, IgnoreReason, admit, decide, handle_push};
pub use reconcile::{ReconcileOutcome, ReconcileStats, reconcile};
pub use watch::register_watch;

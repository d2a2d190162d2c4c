//! Mirror crate - Keeps a local copy of a Gmail inbox in sync
//!
//! This crate provides:
//! - Domain models (Message, Watermark, HistoryId)
//! - Gmail API client, credential providers and push decoding
//! - Storage trait abstractions with SQLite and in-memory backends
//! - Full enumeration and incremental reconciliation
//! - A notification gate and a per-account sync engine
//!
//! All remote calls are blocking; callers choose their own threading.

pub mod config;
pub mod gmail;
pub mod models;
pub mod storage;
pub mod sync;

pub use crate::config::MirrorConfig;
pub use gmail::{
    CredentialProvider, GmailClient, GmailError, HistoryPage, MailService, PushNotification, StaticToken,
    TokenFile, api::ProfileResponse,
};
pub use models::{HistoryId, Message, MessageId, Watermark};
pub use storage::{InMemoryMailStore, LocalChange, MailStore, SqliteMailStore};
pub use sync::{
    // Sync execution
    Enumeration, EnumerateStats, ReconcileOutcome, ReconcileStats, SyncContext, SyncEngine, SyncOptions,
    enumerate, rebuild, reconcile, register_watch,
    // Push handling
    Admission, Decision, IgnoreReason, PushJob, admit, decide, handle_push,
};

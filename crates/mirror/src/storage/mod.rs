//! Storage traits and implementations
//!
//! This module defines the storage abstraction for mirrored messages and
//! watermarks. Sync code only talks to [`MailStore`], so the SQLite and
//! in-memory backends are interchangeable.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryMailStore;
pub use sqlite::SqliteMailStore;
pub use traits::{LocalChange, MailStore};

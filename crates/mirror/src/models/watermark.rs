//! Watermark tracking for incremental Gmail sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Opaque change-log position issued by Gmail (a `historyId`)
///
/// Gmail documents history IDs as increasing integers but transports them as
/// strings. Ordering is only defined when both sides are numeric or equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawHistoryId")]
pub struct HistoryId(String);

/// Gmail sends `historyId` as a string in API responses and as a number in
/// push payloads.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawHistoryId {
    Number(u64),
    Text(String),
}

impl From<RawHistoryId> for HistoryId {
    fn from(raw: RawHistoryId) -> Self {
        match raw {
            RawHistoryId::Number(n) => Self(n.to_string()),
            RawHistoryId::Text(s) => Self::new(s),
        }
    }
}

impl HistoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the position, if it is an integer
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    /// Compare two positions
    ///
    /// Returns `None` when the positions differ and at least one of them is
    /// not numeric, since no order can be derived in that case.
    pub fn compare(&self, other: &HistoryId) -> Option<Ordering> {
        if self.0 == other.0 {
            return Some(Ordering::Equal);
        }
        match (self.as_u64(), other.as_u64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }

    /// Whether this position is known to be at or before `other`
    pub fn is_at_or_before(&self, other: &HistoryId) -> bool {
        matches!(
            self.compare(other),
            Some(Ordering::Less) | Some(Ordering::Equal)
        )
    }
}

impl From<String> for HistoryId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for HistoryId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<u64> for HistoryId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl std::fmt::Display for HistoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable sync cursor for one Gmail account
///
/// Only one Watermark per account. `history_id` is `None` until the first
/// enumeration, watch registration or reconciliation page completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    /// Gmail account identifier (the mailbox email address)
    pub account_id: String,
    /// Last change-log position fully applied to the local store
    pub history_id: Option<HistoryId>,
    /// When the watermark last moved
    pub updated_at: DateTime<Utc>,
}

impl Watermark {
    /// Create a watermark for an account that has never synced
    pub fn unsynced(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            history_id: None,
            updated_at: Utc::now(),
        }
    }

    /// Create a watermark at a known position
    pub fn new(account_id: impl Into<String>, history_id: impl Into<HistoryId>) -> Self {
        Self {
            account_id: account_id.into(),
            history_id: Some(history_id.into()),
            updated_at: Utc::now(),
        }
    }

    /// Move to a new position
    pub fn advanced(mut self, history_id: HistoryId) -> Self {
        self.history_id = Some(history_id);
        self.updated_at = Utc::now();
        self
    }

    /// Whether the account has a position to resume from
    pub fn is_synced(&self) -> bool {
        self.history_id.is_some()
    }
}

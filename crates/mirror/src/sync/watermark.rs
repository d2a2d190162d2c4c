//! Monotonic watermark updates
//!
//! The stored position only moves forward. A candidate that is not newer
//! than the stored one is dropped; a candidate that cannot be ordered
//! against it is trusted, since the remote issued it.

use anyhow::Result;
use log::{debug, warn};
use std::cmp::Ordering;

use crate::models::{HistoryId, Watermark};
use crate::storage::MailStore;

/// Last applied position for an account, if any
pub fn stored_position(store: &dyn MailStore, account_id: &str) -> Result<Option<HistoryId>> {
    Ok(store
        .get_watermark(account_id)?
        .and_then(|watermark| watermark.history_id))
}

/// Whether `candidate` should replace `current`
fn supersedes(current: Option<&HistoryId>, candidate: &HistoryId) -> bool {
    let Some(current) = current else {
        return true;
    };

    match candidate.compare(current) {
        Some(Ordering::Greater) => true,
        Some(_) => false,
        None => {
            warn!(
                "History positions {} and {} are not comparable, keeping the newer report",
                current, candidate
            );
            true
        }
    }
}

/// The later of two positions, preferring `candidate` when they are unordered
pub fn later_of(current: Option<HistoryId>, candidate: HistoryId) -> HistoryId {
    match current {
        Some(current) if !supersedes(Some(&current), &candidate) => current,
        _ => candidate,
    }
}

/// Watermark to write alongside a page, or `None` if `candidate` is stale
pub(crate) fn checkpoint_for(
    store: &dyn MailStore,
    account_id: &str,
    candidate: &HistoryId,
) -> Result<Option<Watermark>> {
    let current = store.get_watermark(account_id)?;
    let position = current.as_ref().and_then(|w| w.history_id.as_ref());

    if !supersedes(position, candidate) {
        debug!(
            "[{}] keeping watermark {:?}, {} is not newer",
            account_id, position, candidate
        );
        return Ok(None);
    }

    let watermark = current.unwrap_or_else(|| Watermark::unsynced(account_id));
    Ok(Some(watermark.advanced(candidate.clone())))
}

/// Move the watermark to `candidate` if it is newer
///
/// Returns the position stored after the call.
pub fn advance(store: &dyn MailStore, account_id: &str, candidate: HistoryId) -> Result<HistoryId> {
    match checkpoint_for(store, account_id, &candidate)? {
        Some(watermark) => {
            store.save_watermark(watermark)?;
            debug!("[{}] watermark -> {}", account_id, candidate);
            Ok(candidate)
        }
        None => Ok(later_of(stored_position(store, account_id)?, candidate)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryMailStore;

    const ACCOUNT: &str = "user@gmail.com";

    #[test]
    fn test_advance_creates_watermark() {
        let store = InMemoryMailStore::new();
        let position = advance(&store, ACCOUNT, HistoryId::new("10")).unwrap();

        assert_eq!(position, HistoryId::new("10"));
        assert_eq!(
            stored_position(&store, ACCOUNT).unwrap(),
            Some(HistoryId::new("10"))
        );
    }

    #[test]
    fn test_advance_never_moves_backwards() {
        let store = InMemoryMailStore::new();
        advance(&store, ACCOUNT, HistoryId::new("100")).unwrap();

        let position = advance(&store, ACCOUNT, HistoryId::new("99")).unwrap();
        assert_eq!(position, HistoryId::new("100"));

        let position = advance(&store, ACCOUNT, HistoryId::new("100")).unwrap();
        assert_eq!(position, HistoryId::new("100"));

        let position = advance(&store, ACCOUNT, HistoryId::new("101")).unwrap();
        assert_eq!(position, HistoryId::new("101"));
        assert_eq!(
            stored_position(&store, ACCOUNT).unwrap(),
            Some(HistoryId::new("101"))
        );
    }

    #[test]
    fn test_unordered_candidate_is_trusted() {
        let store = InMemoryMailStore::new();
        advance(&store, ACCOUNT, HistoryId::new("100")).unwrap();

        let position = advance(&store, ACCOUNT, HistoryId::new("opaque-7")).unwrap();
        assert_eq!(position, HistoryId::new("opaque-7"));
    }

    #[test]
    fn test_unsynced_row_is_filled() {
        let store = InMemoryMailStore::new();
        store.save_watermark(Watermark::unsynced(ACCOUNT)).unwrap();

        let checkpoint = checkpoint_for(&store, ACCOUNT, &HistoryId::new("5")).unwrap();
        assert_eq!(checkpoint.unwrap().history_id, Some(HistoryId::new("5")));
    }

    #[test]
    fn test_later_of() {
        assert_eq!(later_of(None, HistoryId::new("3")), HistoryId::new("3"));
        assert_eq!(
            later_of(Some(HistoryId::new("9")), HistoryId::new("3")),
            HistoryId::new("9")
        );
        assert_eq!(
            later_of(Some(HistoryId::new("9")), HistoryId::new("12")),
            HistoryId::new("12")
        );
    }
}

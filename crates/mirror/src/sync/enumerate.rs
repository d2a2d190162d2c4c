//! Full inbox enumeration
//!
//! Lists every message under the inbox label and stores the ones that are
//! not mirrored yet. Each listing page is committed on its own, so an
//! aborted run keeps the pages it finished. The watermark is taken from the
//! profile after the last page.

use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::HashSet;
use std::time::Instant;

use super::context::{SyncContext, fetch_normalized};
use super::watermark;
use crate::models::{HistoryId, MessageId};
use crate::storage::LocalChange;

/// Statistics from an enumeration run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnumerateStats {
    /// Listing pages fetched
    pub pages: usize,
    /// Message references listed (including duplicates)
    pub listed: usize,
    /// Messages newly stored
    pub created: usize,
    /// Listed messages already stored, or listed twice
    pub skipped: usize,
    /// Stored messages whose star was refreshed during a rebuild
    pub refreshed: usize,
    /// Listed messages in trash or spam
    pub filtered: usize,
    /// Stored messages removed because the listing no longer has them
    pub pruned: usize,
    /// Duration of the run
    pub duration_ms: u64,
}

/// Result of a completed enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumeration {
    /// Watermark position after the run
    pub history_id: HistoryId,
    pub stats: EnumerateStats,
}

impl Enumeration {
    pub fn created(&self) -> usize {
        self.stats.created
    }
}

/// Enumerate the inbox and merge it into the mirror
///
/// Idempotent: messages already stored are neither fetched nor rewritten.
pub fn enumerate(ctx: &SyncContext<'_>) -> Result<Enumeration> {
    run_enumeration(ctx, false)
}

/// Enumerate the inbox and bring every stored message back in line with it
///
/// Used when the change log has expired. Listed messages already stored are
/// refetched: their star is reset from the current labels and they are
/// dropped if they moved to trash or spam. Stored messages the listing no
/// longer has are deleted. The result matches a mirror built from scratch.
pub fn rebuild(ctx: &SyncContext<'_>) -> Result<Enumeration> {
    run_enumeration(ctx, true)
}

fn run_enumeration(ctx: &SyncContext<'_>, full: bool) -> Result<Enumeration> {
    let start = Instant::now();
    let account_id = ctx.account_id;
    let options = ctx.options;
    let mut stats = EnumerateStats::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = ctx
            .service
            .list_messages(
                &options.inbox_label,
                options.inbox_query.as_deref(),
                options.page_size,
                page_token.as_deref(),
            )
            .context("Failed to list inbox messages")?;
        stats.pages += 1;

        let refs = page.messages.unwrap_or_default();
        stats.listed += refs.len();

        let mut changes = Vec::new();
        for msg_ref in refs {
            if !seen.insert(msg_ref.id.clone()) {
                stats.skipped += 1;
                continue;
            }

            let id = MessageId::new(msg_ref.id);
            if ctx.store.has_message(account_id, &id)? {
                if full {
                    refresh_stored(ctx, id, &mut changes, &mut stats)?;
                } else {
                    stats.skipped += 1;
                }
                continue;
            }

            match fetch_normalized(ctx, &id)? {
                Some(message) => changes.push(LocalChange::Insert(message)),
                None => stats.filtered += 1,
            }
        }

        let created = ctx.store.commit_page(account_id, changes, None)?;
        stats.created += created;
        debug!(
            "[{}] enumeration page {}: {} new",
            account_id, stats.pages, created
        );

        page_token = page.next_page_token.filter(|token| !token.is_empty());
        if page_token.is_none() {
            break;
        }
    }

    if full {
        stats.pruned = prune_unlisted(ctx, &seen)?;
    }

    let profile = ctx
        .service
        .get_profile()
        .context("Failed to fetch profile after enumeration")?;
    let history_id = watermark::advance(ctx.store, account_id, profile.history_id)?;

    stats.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "[{}] enumeration done: {} listed, {} created, {} skipped, {} refreshed, {} filtered, {} pruned in {}ms (watermark {})",
        account_id,
        stats.listed,
        stats.created,
        stats.skipped,
        stats.refreshed,
        stats.filtered,
        stats.pruned,
        stats.duration_ms,
        history_id
    );

    Ok(Enumeration { history_id, stats })
}

/// Stage the current state of a listed message that is already stored
fn refresh_stored(
    ctx: &SyncContext<'_>,
    id: MessageId,
    changes: &mut Vec<LocalChange>,
    stats: &mut EnumerateStats,
) -> Result<()> {
    match fetch_normalized(ctx, &id)? {
        Some(message) => {
            changes.push(LocalChange::SetStarred(id, message.is_starred));
            stats.refreshed += 1;
        }
        None => {
            changes.push(LocalChange::Delete(id));
            stats.filtered += 1;
        }
    }
    Ok(())
}

/// Delete stored messages that were not part of the listing
fn prune_unlisted(ctx: &SyncContext<'_>, listed: &HashSet<String>) -> Result<usize> {
    let stale: Vec<LocalChange> = ctx
        .store
        .list_message_ids(ctx.account_id)?
        .into_iter()
        .filter(|id| !listed.contains(id.as_str()))
        .map(LocalChange::Delete)
        .collect();

    let pruned = stale.len();
    if pruned > 0 {
        ctx.store.commit_page(ctx.account_id, stale, None)?;
        debug!("[{}] pruned {} unlisted messages", ctx.account_id, pruned);
    }
    Ok(pruned)
}

//! Push watch registration

use anyhow::{Context, Result};
use log::info;

use super::context::SyncContext;
use super::watermark;
use crate::gmail::api::WatchRequest;
use crate::models::HistoryId;

/// Register the mailbox for push notifications on `topic`
///
/// Gmail returns the mailbox position at registration time; the watermark
/// moves there if it is newer, creating the row for a fresh account.
pub fn register_watch(ctx: &SyncContext<'_>, topic: &str) -> Result<HistoryId> {
    let response = ctx
        .service
        .watch(&WatchRequest::new(topic))
        .with_context(|| format!("Failed to register watch on {}", topic))?;

    let history_id = watermark::advance(ctx.store, ctx.account_id, response.history_id)?;
    info!(
        "[{}] watching {} (expires {}), watermark {}",
        ctx.account_id,
        topic,
        response.expiration.as_deref().unwrap_or("never"),
        history_id
    );
    Ok(history_id)
}

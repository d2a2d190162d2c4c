//! Push notification gate
//!
//! Pub/Sub delivers at least once and in no particular order. The gate drops
//! pings, undecodable bodies and notifications the watermark already covers
//! before anything reaches the reconciler.

use anyhow::Result;
use log::debug;

use super::context::SyncContext;
use super::reconcile::{ReconcileOutcome, reconcile};
use super::watermark;
use crate::gmail::PushNotification;
use crate::models::HistoryId;

/// Why a notification did not trigger a sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Empty body (subscription ping)
    EmptyBody,
    /// Envelope without a data payload
    NoPayload,
    /// Body or payload could not be decoded
    Undecodable,
    /// The notification names a different mailbox
    OtherMailbox { email_address: String },
    /// No credential for the account
    Unauthenticated,
    /// The notified position is already covered by the watermark
    Stale { notified: HistoryId, last: HistoryId },
}

/// What the gate did with a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Ignored(IgnoreReason),
    Applied(ReconcileOutcome),
}

impl Admission {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Gate decision for a notified position
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing new since `last`
    Stale { last: HistoryId },
    /// Reconcile starting here
    ReconcileFrom(HistoryId),
}

/// Decide what to do with `notified` given the stored position
///
/// With no stored position the notification itself is the starting point.
/// Positions that cannot be ordered are never treated as stale.
pub fn decide(last: Option<&HistoryId>, notified: &HistoryId) -> Decision {
    match last {
        Some(last) if notified.is_at_or_before(last) => Decision::Stale { last: last.clone() },
        Some(last) => Decision::ReconcileFrom(last.clone()),
        None => Decision::ReconcileFrom(notified.clone()),
    }
}

/// Admit a notification carrying `notified`
pub fn admit(ctx: &SyncContext<'_>, notified: &HistoryId) -> Result<Admission> {
    if !ctx.service.has_credentials() {
        debug!("[{}] ignoring notification {}: no credential", ctx.account_id, notified);
        return Ok(Admission::Ignored(IgnoreReason::Unauthenticated));
    }

    let last = watermark::stored_position(ctx.store, ctx.account_id)?;
    let from = match decide(last.as_ref(), notified) {
        Decision::Stale { last } => {
            debug!(
                "[{}] ignoring notification {}: watermark at {}",
                ctx.account_id, notified, last
            );
            return Ok(Admission::Ignored(IgnoreReason::Stale {
                notified: notified.clone(),
                last,
            }));
        }
        Decision::ReconcileFrom(from) => from,
    };

    let outcome = reconcile(ctx, &from)?;
    watermark::advance(ctx.store, ctx.account_id, outcome.history_id().clone())?;
    Ok(Admission::Applied(outcome))
}

/// Decode a raw push body and admit it
///
/// A notification is only admitted for the account it names; one without an
/// address is taken to be for `ctx.account_id`.
pub fn handle_push(ctx: &SyncContext<'_>, body: &[u8]) -> Result<Admission> {
    let reason = match PushNotification::decode(body) {
        PushNotification::Notification {
            email_address: Some(email_address),
            ..
        } if !email_address.eq_ignore_ascii_case(ctx.account_id) => {
            IgnoreReason::OtherMailbox { email_address }
        }
        PushNotification::Notification { history_id, .. } => return admit(ctx, &history_id),
        PushNotification::Empty => IgnoreReason::EmptyBody,
        PushNotification::NoData => IgnoreReason::NoPayload,
        PushNotification::Undecodable => IgnoreReason::Undecodable,
    };

    debug!("[{}] ignoring push body: {:?}", ctx.account_id, reason);
    Ok(Admission::Ignored(reason))
}

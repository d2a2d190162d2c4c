//! Sync engine with per-account serialization
//!
//! Every run for an account holds that account's lock from start to finish,
//! so one account has a single writer. Different accounts run concurrently.

use anyhow::Result;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::context::{SyncContext, SyncOptions};
use super::enumerate::{self, Enumeration};
use super::gate::{self, Admission};
use super::reconcile::{self, ReconcileOutcome};
use super::watch;
use crate::gmail::MailService;
use crate::models::HistoryId;
use crate::storage::MailStore;

/// A push body to admit for one account
#[derive(Clone, Copy)]
pub struct PushJob<'a> {
    pub account_id: &'a str,
    pub service: &'a dyn MailService,
    pub body: &'a [u8],
}

/// Owns the store and serializes runs per account
pub struct SyncEngine {
    store: Arc<dyn MailStore>,
    options: SyncOptions,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn MailStore>, options: SyncOptions) -> Self {
        Self {
            store,
            options,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &dyn MailStore {
        self.store.as_ref()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    fn account_lock(&self, account_id: &str) -> Arc<Mutex<()>> {
        // The registry holds no invariants a panic could break
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn with_account<T>(
        &self,
        account_id: &str,
        service: &dyn MailService,
        run: impl FnOnce(&SyncContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let lock = self.account_lock(account_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let ctx = SyncContext::new(account_id, service, self.store.as_ref(), &self.options);
        run(&ctx)
    }

    /// Full enumeration, merging into the existing mirror
    pub fn enumerate(&self, account_id: &str, service: &dyn MailService) -> Result<Enumeration> {
        self.with_account(account_id, service, enumerate::enumerate)
    }

    /// Full enumeration that also drops messages no longer listed
    pub fn rebuild(&self, account_id: &str, service: &dyn MailService) -> Result<Enumeration> {
        self.with_account(account_id, service, enumerate::rebuild)
    }

    /// Replay the change log from `from`
    pub fn reconcile(
        &self,
        account_id: &str,
        service: &dyn MailService,
        from: &HistoryId,
    ) -> Result<ReconcileOutcome> {
        self.with_account(account_id, service, |ctx| reconcile::reconcile(ctx, from))
    }

    /// Run the gate for a notified position
    pub fn admit(
        &self,
        account_id: &str,
        service: &dyn MailService,
        notified: &HistoryId,
    ) -> Result<Admission> {
        self.with_account(account_id, service, |ctx| gate::admit(ctx, notified))
    }

    /// Run the gate for a raw push body
    pub fn handle_push(
        &self,
        account_id: &str,
        service: &dyn MailService,
        body: &[u8],
    ) -> Result<Admission> {
        self.with_account(account_id, service, |ctx| gate::handle_push(ctx, body))
    }

    /// Register for push notifications and seed the watermark
    pub fn register_watch(
        &self,
        account_id: &str,
        service: &dyn MailService,
        topic: &str,
    ) -> Result<HistoryId> {
        self.with_account(account_id, service, |ctx| watch::register_watch(ctx, topic))
    }

    /// Admit a batch of push bodies in parallel
    ///
    /// Results come back in job order. Jobs for the same account still run
    /// one at a time.
    pub fn admit_many(&self, jobs: &[PushJob<'_>]) -> Vec<Result<Admission>> {
        jobs.par_iter()
            .map(|job| self.handle_push(job.account_id, job.service, job.body))
            .collect()
    }
}

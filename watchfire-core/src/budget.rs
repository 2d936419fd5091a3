//! Per-organization rolling query budget.
//!
//! Every privileged read/analysis operation reserves units against the
//! organization's quota. The window resets lazily: the first reservation at
//! or after `budget_reset_at` restores the full quota before the request is
//! evaluated, so a request arriving after a long idle period still consumes
//! from a fresh budget.

use crate::error::WatchfireError;
use crate::store::{with_retry, RecordStore, RetryPolicy};
use crate::sync::{org_key, KeyedMutex};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;

/// Enforces the rolling quota. The read-reset-decrement sequence runs under
/// the organization's keyed lock, so concurrent requests from one
/// organization can never both pass a check against the same remaining unit.
pub struct BudgetLimiter {
    store: Arc<dyn RecordStore>,
    locks: Arc<KeyedMutex>,
    default_quota: u32,
    reset_window: Duration,
    retry: RetryPolicy,
}

impl BudgetLimiter {
    pub fn new(
        store: Arc<dyn RecordStore>,
        locks: Arc<KeyedMutex>,
        default_quota: u32,
        reset_window_hours: u32,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            locks,
            default_quota,
            reset_window: Duration::hours(i64::from(reset_window_hours)),
            retry,
        }
    }

    /// Atomically reserve `units` from the organization's budget.
    ///
    /// Either all `units` are consumed or none are: a multi-unit operation
    /// (the research scan costs 2) can never end up half-charged and then
    /// rejected. Fails with `QuotaExceeded` when fewer than `units` remain
    /// after any due reset.
    pub async fn reserve(&self, org_id: &str, units: u32) -> Result<(), WatchfireError> {
        let _guard = self.locks.lock(&org_key(org_id)).await;

        let mut org = with_retry(self.retry, || async {
            self.store.get_org(org_id).await
        })
        .await?
        .ok_or_else(|| WatchfireError::not_found("organization", org_id))?;

        let now = Utc::now();
        if now >= org.budget_reset_at {
            // The reset happens "before" the request: the request is then
            // evaluated against a full quota.
            org.query_budget = self.default_quota;
            org.budget_reset_at = now + self.reset_window;
            debug!(org_id, quota = self.default_quota, "query budget reset");
        }

        if org.query_budget < units {
            return Err(WatchfireError::QuotaExceeded {
                reset_at: org.budget_reset_at,
            });
        }

        org.query_budget -= units;
        debug!(org_id, units, remaining = org.query_budget, "budget reserved");
        with_retry(self.retry, || {
            let org = org.clone();
            async move { self.store.put_org(org).await }
        })
        .await?;
        Ok(())
    }
}

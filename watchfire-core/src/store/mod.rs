//! Record store collaborator interface.
//!
//! The engine persists through the narrow `RecordStore` contract: point
//! lookups and a unique-constraint upsert for incidents, filtered scans for
//! campaigns, atomic organization updates, and append-only audit/report
//! writes. Two implementations ship with the crate: `MemoryStore` for tests
//! and embedding, and `SnapshotStore` for durable single-node use.

pub mod memory;
pub mod snapshot;

pub use memory::MemoryStore;
pub use snapshot::SnapshotStore;

use crate::error::{StoreError, WatchfireError};
use crate::types::{
    AttackVector, AuditRecord, Campaign, CampaignFilters, Incident, Organization, ResearchReport,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Storage contract consumed by the engine.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_org(&self, org_id: &str) -> Result<Option<Organization>, StoreError>;

    async fn put_org(&self, org: Organization) -> Result<(), StoreError>;

    async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>, StoreError>;

    /// Point lookup by the submitter-scoped unique key.
    async fn find_incident(
        &self,
        org_id: &str,
        local_ref: &str,
    ) -> Result<Option<Incident>, StoreError>;

    /// Insert or update by `(org_id, local_ref)` in one atomic step.
    ///
    /// When a row with the same key exists, its `id`, `created_at`, and
    /// current `campaign_id` are preserved and the remaining content is
    /// replaced. Returns the stored row.
    async fn upsert_incident(&self, incident: Incident) -> Result<Incident, StoreError>;

    /// Point the incident at its assigned campaign.
    async fn set_incident_campaign(
        &self,
        incident_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<(), StoreError>;

    /// All member incidents of a campaign.
    async fn incidents_in_campaign(&self, campaign_id: Uuid) -> Result<Vec<Incident>, StoreError>;

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError>;

    /// Insert or replace the full campaign row.
    async fn put_campaign(&self, campaign: Campaign) -> Result<(), StoreError>;

    /// Campaigns with the given primary vector whose `last_seen` falls in
    /// `[from, to]`, the matcher's candidate scan.
    async fn campaigns_by_vector_window(
        &self,
        vector: AttackVector,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Campaign>, StoreError>;

    /// Filtered campaign scan for the read APIs.
    ///
    /// Sector/region filters only match campaigns that have reached the
    /// disclosure threshold; matching a suppressed campaign by its hidden
    /// sector would leak exactly what the privacy filter withholds.
    async fn scan_campaigns(&self, filters: &CampaignFilters) -> Result<Vec<Campaign>, StoreError>;

    async fn append_audit(&self, record: AuditRecord) -> Result<(), StoreError>;

    async fn get_research_report(
        &self,
        org_id: &str,
        description_hash: &str,
    ) -> Result<Option<ResearchReport>, StoreError>;

    async fn put_research_report(&self, report: ResearchReport) -> Result<(), StoreError>;
}

/// Retry policy for transient store failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 50,
        }
    }
}

/// Execute a store operation with bounded retry on transient errors.
///
/// Non-transient errors return immediately. When retries are exhausted the
/// failure surfaces as `WatchfireError::Unavailable`; the caller must not
/// have performed any earlier side effects it cannot tolerate losing.
pub async fn with_retry<F, Fut, T>(policy: RetryPolicy, operation: F) -> Result<T, WatchfireError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut backoff_ms = policy.initial_backoff_ms;
    let mut last_message = String::new();
    for attempt in 0..=policy.max_retries {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    backoff_ms,
                    error = %e,
                    "retrying transient store failure"
                );
                last_message = e.to_string();
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = backoff_ms.saturating_mul(2);
            }
            Err(e) if e.is_transient() => {
                return Err(WatchfireError::Unavailable {
                    attempts: policy.max_retries + 1,
                    message: if last_message.is_empty() {
                        e.to_string()
                    } else {
                        last_message
                    },
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
    unreachable!("retry loop returns on every branch")
}

//! JSON-snapshot record store.
//!
//! Durable single-node backing: the full table set is loaded at open and
//! re-serialized after every mutation using the write-to-tmp-then-rename
//! pattern, so a crash mid-write never leaves a corrupt snapshot.

use crate::error::StoreError;
use crate::store::memory::Tables;
use crate::store::RecordStore;
use crate::types::{
    AttackVector, AuditRecord, Campaign, CampaignFilters, Incident, Organization, ResearchReport,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Atomically write JSON data to a file.
///
/// Serializes to a `.tmp` sibling file, then renames onto the target path.
/// Creates parent directories if they don't exist.
fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json.as_bytes())?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load and deserialize JSON from a file. Returns `Ok(None)` if the file
/// doesn't exist.
fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(Some(value))
}

/// File-backed store persisting the full table set as one JSON snapshot.
pub struct SnapshotStore {
    tables: RwLock<Tables>,
    path: PathBuf,
}

impl SnapshotStore {
    /// Open the store, loading an existing snapshot if present.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tables = load_json::<Tables>(&path)?.unwrap_or_default();
        debug!(
            path = %path.display(),
            orgs = tables.orgs.len(),
            incidents = tables.incidents.len(),
            campaigns = tables.campaigns.len(),
            "opened snapshot store"
        );
        Ok(Self {
            tables: RwLock::new(tables),
            path,
        })
    }

    /// Persist while still holding the write lock, so snapshots are written
    /// in mutation order.
    fn persist(&self, tables: &Tables) -> Result<(), StoreError> {
        atomic_write_json(&self.path, tables)?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SnapshotStore {
    async fn get_org(&self, org_id: &str) -> Result<Option<Organization>, StoreError> {
        Ok(self.tables.read().await.orgs.get(org_id).cloned())
    }

    async fn put_org(&self, org: Organization) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.orgs.insert(org.id.clone(), org);
        self.persist(&tables)
    }

    async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>, StoreError> {
        Ok(self.tables.read().await.incidents.get(&id).cloned())
    }

    async fn find_incident(
        &self,
        org_id: &str,
        local_ref: &str,
    ) -> Result<Option<Incident>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .find_incident(org_id, local_ref)
            .cloned())
    }

    async fn upsert_incident(&self, incident: Incident) -> Result<Incident, StoreError> {
        let mut tables = self.tables.write().await;
        let stored = tables.upsert_incident(incident);
        self.persist(&tables)?;
        Ok(stored)
    }

    async fn set_incident_campaign(
        &self,
        incident_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.set_incident_campaign(incident_id, campaign_id)?;
        self.persist(&tables)
    }

    async fn incidents_in_campaign(&self, campaign_id: Uuid) -> Result<Vec<Incident>, StoreError> {
        Ok(self.tables.read().await.incidents_in_campaign(campaign_id))
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError> {
        Ok(self.tables.read().await.campaigns.get(&id).cloned())
    }

    async fn put_campaign(&self, campaign: Campaign) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.campaigns.insert(campaign.id, campaign);
        self.persist(&tables)
    }

    async fn campaigns_by_vector_window(
        &self,
        vector: AttackVector,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Campaign>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .campaigns_by_vector_window(vector, from, to))
    }

    async fn scan_campaigns(&self, filters: &CampaignFilters) -> Result<Vec<Campaign>, StoreError> {
        Ok(self.tables.read().await.scan_campaigns(filters))
    }

    async fn append_audit(&self, record: AuditRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.audit.push(record);
        self.persist(&tables)
    }

    async fn get_research_report(
        &self,
        org_id: &str,
        description_hash: &str,
    ) -> Result<Option<ResearchReport>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .find_research_report(org_id, description_hash)
            .cloned())
    }

    async fn put_research_report(&self, report: ResearchReport) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.put_research_report(report);
        self.persist(&tables)
    }
}

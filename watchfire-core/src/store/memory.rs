//! In-memory record store.
//!
//! Typed tables behind a single `tokio::sync::RwLock`; every trait method
//! is one lock section, which makes the upsert and scan operations atomic
//! with respect to each other. `Tables` is shared with the snapshot store.

use crate::error::StoreError;
use crate::store::RecordStore;
use crate::types::{
    AttackVector, AuditRecord, Campaign, CampaignFilters, Incident, Organization, ResearchReport,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// The persistent tables: organizations, incidents, campaigns, the audit
/// trail, and cached research reports.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct Tables {
    pub(crate) orgs: HashMap<String, Organization>,
    pub(crate) incidents: HashMap<Uuid, Incident>,
    pub(crate) campaigns: HashMap<Uuid, Campaign>,
    pub(crate) audit: Vec<AuditRecord>,
    pub(crate) research: Vec<ResearchReport>,
}

impl Tables {
    pub(crate) fn find_incident(&self, org_id: &str, local_ref: &str) -> Option<&Incident> {
        self.incidents
            .values()
            .find(|i| i.org_id == org_id && i.local_ref == local_ref)
    }

    /// Upsert by `(org_id, local_ref)`: an existing row keeps its id,
    /// creation time, and current campaign link; everything else is
    /// replaced by the new content.
    pub(crate) fn upsert_incident(&mut self, mut incident: Incident) -> Incident {
        if let Some(existing) = self.find_incident(&incident.org_id, &incident.local_ref) {
            incident.id = existing.id;
            incident.created_at = existing.created_at;
            incident.campaign_id = existing.campaign_id;
        }
        self.incidents.insert(incident.id, incident.clone());
        incident
    }

    pub(crate) fn set_incident_campaign(
        &mut self,
        incident_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<(), StoreError> {
        let incident = self
            .incidents
            .get_mut(&incident_id)
            .ok_or_else(|| StoreError::Corrupt {
                message: format!("incident {incident_id} vanished during campaign assignment"),
            })?;
        incident.campaign_id = Some(campaign_id);
        Ok(())
    }

    pub(crate) fn incidents_in_campaign(&self, campaign_id: Uuid) -> Vec<Incident> {
        self.incidents
            .values()
            .filter(|i| i.campaign_id == Some(campaign_id))
            .cloned()
            .collect()
    }

    pub(crate) fn campaigns_by_vector_window(
        &self,
        vector: AttackVector,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<Campaign> {
        self.campaigns
            .values()
            .filter(|c| {
                c.primary_attack_vector == vector && c.last_seen >= from && c.last_seen <= to
            })
            .cloned()
            .collect()
    }

    pub(crate) fn scan_campaigns(&self, filters: &CampaignFilters) -> Vec<Campaign> {
        let mut rows: Vec<Campaign> = self
            .campaigns
            .values()
            .filter(|c| {
                if let Some(vector) = filters.attack_vector {
                    if c.primary_attack_vector != vector {
                        return false;
                    }
                }
                if let Some(since) = filters.since {
                    if c.last_seen < since {
                        return false;
                    }
                }
                if let Some(until) = filters.until {
                    if c.first_seen > until {
                        return false;
                    }
                }
                // Sector/region filters never match campaigns below the
                // disclosure threshold: those fields are suppressed in the
                // output, so they must not be observable through filtering
                // either.
                let disclosed = c.num_orgs >= crate::privacy::DISCLOSURE_THRESHOLD;
                if let Some(sector) = filters.sector {
                    if !disclosed || !c.sectors.contains(&sector) {
                        return false;
                    }
                }
                if let Some(region) = filters.region {
                    if !disclosed || !c.regions.contains(&region) {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then(a.id.cmp(&b.id)));
        rows
    }

    pub(crate) fn find_research_report(
        &self,
        org_id: &str,
        description_hash: &str,
    ) -> Option<&ResearchReport> {
        self.research
            .iter()
            .find(|r| r.org_id == org_id && r.description_hash == description_hash)
    }

    pub(crate) fn put_research_report(&mut self, report: ResearchReport) {
        self.research
            .retain(|r| !(r.org_id == report.org_id && r.description_hash == report.description_hash));
        self.research.push(report);
    }
}

/// Non-durable store backed by in-process tables.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the audit trail (test observability).
    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.tables.read().await.audit.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_org(&self, org_id: &str) -> Result<Option<Organization>, StoreError> {
        Ok(self.tables.read().await.orgs.get(org_id).cloned())
    }

    async fn put_org(&self, org: Organization) -> Result<(), StoreError> {
        self.tables.write().await.orgs.insert(org.id.clone(), org);
        Ok(())
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
        Ok(self.tables.write().await.upsert_incident(incident))
    }

    async fn set_incident_campaign(
        &self,
        incident_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .set_incident_campaign(incident_id, campaign_id)
    }

    async fn incidents_in_campaign(&self, campaign_id: Uuid) -> Result<Vec<Incident>, StoreError> {
        Ok(self.tables.read().await.incidents_in_campaign(campaign_id))
    }

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError> {
        Ok(self.tables.read().await.campaigns.get(&id).cloned())
    }

    async fn put_campaign(&self, campaign: Campaign) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .campaigns
            .insert(campaign.id, campaign);
        Ok(())
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
        self.tables.write().await.audit.push(record);
        Ok(())
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
        self.tables.write().await.put_research_report(report);
        Ok(())
    }
}

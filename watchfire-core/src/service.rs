//! The Watchfire engine facade.
//!
//! Wires the fingerprinter, campaign matcher, aggregate updater, privacy
//! filter, budget limiter, enricher, and audit trail into the operations
//! the (out-of-scope) transport layer calls. Every operation receives the
//! already-authenticated `Organization` record and trusts it.

use crate::audit::AuditTrail;
use crate::budget::BudgetLimiter;
use crate::cluster;
use crate::config::EngineConfig;
use crate::enrichment::Enricher;
use crate::error::{Result, WatchfireError};
use crate::fingerprint::fingerprint;
use crate::privacy;
use crate::store::{with_retry, RecordStore, RetryPolicy};
use crate::sync::{campaign_key, vector_key, KeyedMutex};
use crate::types::{
    AloneCheck, CampaignDetail, CampaignFilters, CampaignSummary, Incident, IncidentSubmission,
    Organization, ResearchReport, SubmissionOutcome,
};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Units charged per privileged read operation.
const READ_COST: u32 = 1;
/// Units charged per threat-research scan.
const RESEARCH_COST: u32 = 2;
/// Minimum length of a research-scan organization description.
const MIN_DESCRIPTION_LEN: usize = 50;

/// The engine. Cheap to share behind an `Arc`.
pub struct Watchfire {
    store: Arc<dyn RecordStore>,
    locks: Arc<KeyedMutex>,
    budget: BudgetLimiter,
    enricher: Enricher,
    audit: AuditTrail,
    config: EngineConfig,
    retry: RetryPolicy,
}

impl Watchfire {
    pub fn new(store: Arc<dyn RecordStore>, enricher: Enricher, config: EngineConfig) -> Self {
        let locks = Arc::new(KeyedMutex::new());
        let retry = RetryPolicy {
            max_retries: config.store.max_retries,
            initial_backoff_ms: config.store.initial_backoff_ms,
        };
        let budget = BudgetLimiter::new(
            store.clone(),
            locks.clone(),
            config.budget.default_quota,
            config.budget.reset_window_hours,
            retry,
        );
        let audit = AuditTrail::new(store.clone());
        Self {
            store,
            locks,
            budget,
            enricher,
            audit,
            config,
            retry,
        }
    }

    /// Register (or refresh) an organization record supplied by the
    /// authentication collaborator. New organizations start with a full
    /// budget.
    pub async fn register_org(&self, org: Organization) -> Result<()> {
        with_retry(self.retry, || {
            let org = org.clone();
            async move { self.store.put_org(org).await }
        })
        .await
    }

    /// Submit or resubmit an incident.
    ///
    /// Resubmission with the same `(org, local_ref)` updates the stored row
    /// in place and re-evaluates its campaign assignment against the latest
    /// content. Submission is free of budget charge.
    pub async fn submit_incident(
        &self,
        org: &Organization,
        submission: IncidentSubmission,
    ) -> Result<SubmissionOutcome> {
        validate_submission(&submission)?;
        self.ensure_org_known(org).await?;

        let fp = fingerprint(
            submission.attack_vector,
            org.region,
            submission.time_start,
            &submission.iocs,
        );

        // Everything from candidate matching to aggregate recomputation
        // runs under the vector lock: two concurrent incidents destined for
        // the same new campaign serialize through the create decision.
        let vector_guard = self
            .locks
            .lock(&vector_key(submission.attack_vector))
            .await;

        let existing = with_retry(self.retry, || async {
            self.store
                .find_incident(&org.id, &submission.local_ref)
                .await
        })
        .await?;
        let previous_campaign = existing.as_ref().and_then(|i| i.campaign_id);

        let incident = Incident {
            id: existing.as_ref().map(|i| i.id).unwrap_or_else(Uuid::new_v4),
            org_id: org.id.clone(),
            local_ref: submission.local_ref,
            time_start: submission.time_start,
            time_end: submission.time_end,
            attack_vector: submission.attack_vector,
            ai_components: submission.ai_components,
            techniques: submission.techniques,
            iocs: submission.iocs,
            impact_level: submission.impact_level,
            summary: submission.summary,
            fingerprint: fp,
            campaign_id: previous_campaign,
            created_at: existing
                .as_ref()
                .map(|i| i.created_at)
                .unwrap_or_else(Utc::now),
        };

        // Match against membership as stored before this update, so a
        // resubmission is compared through its previously stored
        // fingerprint rather than trivially matching its new one.
        let matched = cluster::match_campaign(
            self.store.as_ref(),
            &incident,
            self.config.clustering.match_window_days,
        )
        .await?;

        // Incident first, campaign second: a durability failure here can
        // leave an unlinked incident behind, but never a campaign without
        // members.
        let stored = with_retry(self.retry, || {
            let incident = incident.clone();
            async move { self.store.upsert_incident(incident).await }
        })
        .await?;

        let (campaign, created) = match matched {
            Some(campaign) => (campaign, false),
            None => {
                let campaign = with_retry(self.retry, || async {
                    cluster::create_campaign(self.store.as_ref(), &incident, org).await
                })
                .await?;
                (campaign, true)
            }
        };
        with_retry(self.retry, || async {
            self.store
                .set_incident_campaign(stored.id, campaign.id)
                .await
        })
        .await?;

        self.recompute_locked(campaign.id).await?;
        if let Some(previous) = previous_campaign {
            if previous != campaign.id {
                // The old campaign lost a member; its statistics must not
                // be left describing a membership it no longer has.
                self.recompute_locked(previous).await?;
            }
        }
        drop(vector_guard);

        if created && self.enricher.has_generator() {
            self.refresh_summary(campaign.id).await;
        }

        info!(
            org_id = %org.id,
            incident_id = %stored.id,
            campaign_id = %campaign.id,
            created_campaign = created,
            "incident submitted"
        );
        self.audit
            .record(
                &org.id,
                "submit_incident",
                serde_json::json!({
                    "incident_id": stored.id,
                    "local_ref": stored.local_ref,
                    "campaign_id": campaign.id,
                }),
                None,
            )
            .await;

        Ok(SubmissionOutcome {
            incident_id: stored.id,
            campaign_id: campaign.id,
        })
    }

    /// Fetch one of the caller's own incidents.
    pub async fn get_incident(&self, org: &Organization, incident_id: Uuid) -> Result<Incident> {
        let incident = self
            .store
            .get_incident(incident_id)
            .await?
            .ok_or_else(|| WatchfireError::not_found("incident", incident_id))?;
        if incident.org_id != org.id {
            return Err(WatchfireError::forbidden(
                "incident belongs to another organization",
            ));
        }
        self.audit
            .record(
                &org.id,
                "get_incident",
                serde_json::json!({"incident_id": incident_id}),
                Some(1),
            )
            .await;
        Ok(incident)
    }

    /// List campaigns, privacy-filtered. Costs one budget unit.
    pub async fn list_campaigns(
        &self,
        org: &Organization,
        filters: &CampaignFilters,
    ) -> Result<Vec<CampaignSummary>> {
        self.budget.reserve(&org.id, READ_COST).await?;
        let campaigns = self.store.scan_campaigns(filters).await?;
        let summaries: Vec<CampaignSummary> =
            campaigns.iter().map(privacy::filtered_summary).collect();
        self.audit
            .record(
                &org.id,
                "list_campaigns",
                serde_json::to_value(filters).unwrap_or_default(),
                Some(summaries.len() as u32),
            )
            .await;
        Ok(summaries)
    }

    /// Campaign detail with a sampled indicator set, privacy-filtered.
    /// Costs one budget unit.
    pub async fn campaign_detail(
        &self,
        org: &Organization,
        campaign_id: Uuid,
    ) -> Result<CampaignDetail> {
        self.budget.reserve(&org.id, READ_COST).await?;
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| WatchfireError::not_found("campaign", campaign_id))?;
        let members = self.store.incidents_in_campaign(campaign_id).await?;
        let detail = privacy::filtered_detail(&campaign, &members);
        self.audit
            .record(
                &org.id,
                "get_campaign",
                serde_json::json!({"campaign_id": campaign_id}),
                Some(1),
            )
            .await;
        Ok(detail)
    }

    /// "Am I alone?": whether one of the caller's incidents is part of a
    /// wider campaign. Costs one budget unit.
    pub async fn am_i_alone(&self, org: &Organization, incident_id: Uuid) -> Result<AloneCheck> {
        self.budget.reserve(&org.id, READ_COST).await?;
        let incident = self
            .store
            .get_incident(incident_id)
            .await?
            .ok_or_else(|| WatchfireError::not_found("incident", incident_id))?;
        if incident.org_id != org.id {
            return Err(WatchfireError::forbidden(
                "incident belongs to another organization",
            ));
        }

        let check = match incident.campaign_id {
            None => AloneCheck {
                in_campaign: false,
                campaign: None,
            },
            Some(campaign_id) => match self.store.get_campaign(campaign_id).await? {
                None => AloneCheck {
                    in_campaign: false,
                    campaign: None,
                },
                Some(campaign) => AloneCheck {
                    in_campaign: true,
                    campaign: Some(privacy::filtered_summary(&campaign)),
                },
            },
        };
        self.audit
            .record(
                &org.id,
                "am_i_alone",
                serde_json::json!({"incident_id": incident_id}),
                Some(u32::from(check.in_campaign)),
            )
            .await;
        Ok(check)
    }

    /// Generate a defensive playbook for the caller against a campaign.
    /// Costs one budget unit; generator failure surfaces to the caller.
    pub async fn generate_playbook(
        &self,
        org: &Organization,
        campaign_id: Uuid,
    ) -> Result<String> {
        self.budget.reserve(&org.id, READ_COST).await?;
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| WatchfireError::not_found("campaign", campaign_id))?;
        let own_incidents: Vec<Incident> = self
            .store
            .incidents_in_campaign(campaign_id)
            .await?
            .into_iter()
            .filter(|i| i.org_id == org.id)
            .collect();

        let playbook = self.enricher.playbook(&campaign, org, &own_incidents).await?;
        self.audit
            .record(
                &org.id,
                "generate_playbook",
                serde_json::json!({"campaign_id": campaign_id}),
                Some(1),
            )
            .await;
        Ok(playbook)
    }

    /// Threat-research scan over a free-text organization description.
    /// Costs two budget units, reserved atomically; results are cached by
    /// description hash. Generator failure surfaces to the caller.
    pub async fn research_scan(
        &self,
        org: &Organization,
        description: &str,
    ) -> Result<ResearchReport> {
        if description.len() < MIN_DESCRIPTION_LEN {
            return Err(WatchfireError::invalid_input(format!(
                "organization description must be at least {MIN_DESCRIPTION_LEN} characters"
            )));
        }

        self.budget.reserve(&org.id, RESEARCH_COST).await?;

        let hash = description_hash(description);
        if let Some(cached) = self.store.get_research_report(&org.id, &hash).await? {
            if cached.cached_until > Utc::now() {
                debug!(org_id = %org.id, "research scan served from cache");
                self.audit
                    .record(
                        &org.id,
                        "threat_research_scan",
                        serde_json::json!({"cached": true}),
                        Some(1),
                    )
                    .await;
                return Ok(cached);
            }
        }

        let body = self.enricher.research_report(org, description).await?;
        let report = ResearchReport {
            report_id: Uuid::new_v4(),
            org_id: org.id.clone(),
            description_hash: hash,
            body,
            generated_at: Utc::now(),
            cached_until: Utc::now()
                + Duration::hours(i64::from(self.config.enrichment.research_cache_hours)),
        };
        with_retry(self.retry, || {
            let report = report.clone();
            async move { self.store.put_research_report(report).await }
        })
        .await?;
        self.audit
            .record(
                &org.id,
                "threat_research_scan",
                serde_json::json!({"cached": false, "description_length": description.len()}),
                Some(1),
            )
            .await;
        Ok(report)
    }

    /// Recompute a campaign's aggregates under its per-campaign lock.
    async fn recompute_locked(&self, campaign_id: Uuid) -> Result<()> {
        let _guard = self.locks.lock(&campaign_key(campaign_id)).await;
        cluster::recompute_aggregates(self.store.as_ref(), campaign_id).await?;
        Ok(())
    }

    /// Best-effort replacement of a campaign's canonical summary with a
    /// generated one. Keeps whatever the deterministic path wrote when the
    /// generator is unavailable.
    async fn refresh_summary(&self, campaign_id: Uuid) {
        let _guard = self.locks.lock(&campaign_key(campaign_id)).await;
        let Ok(Some(mut campaign)) = self.store.get_campaign(campaign_id).await else {
            return;
        };
        let members = match self.store.incidents_in_campaign(campaign_id).await {
            Ok(members) => members,
            Err(_) => return,
        };
        let member_summaries: Vec<String> = members.iter().map(|i| i.summary.clone()).collect();
        let summary = self
            .enricher
            .campaign_summary(&campaign, &member_summaries)
            .await;
        if campaign.canonical_summary.as_deref() == Some(summary.as_str()) {
            return;
        }
        campaign.canonical_summary = Some(summary);
        if let Err(e) = self.store.put_campaign(campaign).await {
            debug!(%campaign_id, error = %e, "failed to persist refreshed summary");
        }
    }

    /// Make sure the organization row exists so aggregate recomputation can
    /// resolve sectors and regions. Never overwrites budget state.
    async fn ensure_org_known(&self, org: &Organization) -> Result<()> {
        if self.store.get_org(&org.id).await?.is_none() {
            self.register_org(org.clone()).await?;
        }
        Ok(())
    }
}

fn validate_submission(submission: &IncidentSubmission) -> Result<()> {
    if submission.local_ref.trim().is_empty() {
        return Err(WatchfireError::invalid_input("local_ref must not be empty"));
    }
    if submission.summary.trim().is_empty() {
        return Err(WatchfireError::invalid_input("summary must not be empty"));
    }
    if let Some(end) = submission.time_end {
        if end < submission.time_start {
            return Err(WatchfireError::invalid_input(
                "time_end must not precede time_start",
            ));
        }
    }
    Ok(())
}

/// SHA-256 hash of a research-scan description, the cache key.
fn description_hash(description: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(description.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_blank_fields() {
        let mut submission = IncidentSubmission {
            local_ref: " ".into(),
            time_start: Utc::now(),
            time_end: None,
            attack_vector: crate::types::AttackVector::AiPhishing,
            ai_components: Default::default(),
            techniques: Default::default(),
            iocs: Vec::new(),
            impact_level: crate::types::ImpactLevel::Low,
            summary: "something happened".into(),
        };
        assert!(validate_submission(&submission).is_err());

        submission.local_ref = "inc-1".into();
        submission.summary = "".into();
        assert!(validate_submission(&submission).is_err());
    }

    #[test]
    fn validation_rejects_inverted_time_range() {
        let now = Utc::now();
        let submission = IncidentSubmission {
            local_ref: "inc-1".into(),
            time_start: now,
            time_end: Some(now - Duration::hours(1)),
            attack_vector: crate::types::AttackVector::Other,
            ai_components: Default::default(),
            techniques: Default::default(),
            iocs: Vec::new(),
            impact_level: crate::types::ImpactLevel::Low,
            summary: "s".into(),
        };
        let err = validate_submission(&submission).unwrap_err();
        assert!(matches!(err, WatchfireError::InvalidInput { .. }));
    }

    #[test]
    fn description_hash_is_stable() {
        let a = description_hash("a healthcare provider running LLM triage");
        let b = description_hash("a healthcare provider running LLM triage");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}

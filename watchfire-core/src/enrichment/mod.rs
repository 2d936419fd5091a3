//! Text-generation collaborator interface.
//!
//! The engine treats free-text generation (campaign summaries, defensive
//! playbooks, research briefs) as a best-effort external capability behind
//! the `TextGenerator` trait. Calls are bounded by a timeout; on the
//! consistency-critical paths every failure degrades to a deterministic
//! template, so persistence never waits on or fails from a generator.
//! Only the explicit generate operations (playbook, research scan) surface
//! `EnrichmentError` to the caller.

pub mod anthropic;

pub use anthropic::AnthropicGenerator;

use crate::error::EnrichmentError;
use crate::types::{Campaign, Incident, Organization};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate plain text for the given prompt, bounded by `max_tokens`.
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, EnrichmentError>;
}

const SUMMARY_MAX_TOKENS: u32 = 512;
const PLAYBOOK_MAX_TOKENS: u32 = 2048;
const RESEARCH_MAX_TOKENS: u32 = 1024;

/// How many member summaries are quoted in a campaign-summary prompt.
const SUMMARY_INCIDENT_LIMIT: usize = 5;
/// How many of the requester's own incidents are quoted in a playbook prompt.
const PLAYBOOK_INCIDENT_LIMIT: usize = 10;

/// Wraps an optional generator with a timeout and template fallbacks.
pub struct Enricher {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl Enricher {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, timeout_secs: u64) -> Self {
        Self {
            generator,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// An enricher that always falls back to templates.
    pub fn disabled() -> Self {
        Self::new(None, 0)
    }

    /// Whether a generator backend is configured at all.
    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    async fn call(&self, prompt: &str, max_tokens: u32) -> Result<String, EnrichmentError> {
        let generator = self
            .generator
            .as_ref()
            .ok_or(EnrichmentError::NotConfigured)?;
        let text = tokio::time::timeout(self.timeout, generator.generate(prompt, max_tokens))
            .await
            .map_err(|_| EnrichmentError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })??;
        let text = text.trim();
        if text.is_empty() {
            return Err(EnrichmentError::MalformedResponse {
                message: "generator returned empty text".into(),
            });
        }
        Ok(text.to_string())
    }

    /// Best-effort campaign summary. Never fails: any generator problem
    /// degrades to the deterministic template.
    pub async fn campaign_summary(
        &self,
        campaign: &Campaign,
        member_summaries: &[String],
    ) -> String {
        let prompt = summary_prompt(campaign, member_summaries);
        match self.call(&prompt, SUMMARY_MAX_TOKENS).await {
            Ok(text) => text,
            Err(e) => {
                if !matches!(e, EnrichmentError::NotConfigured) {
                    warn!(error = %e, campaign_id = %campaign.id, "summary enrichment degraded to template");
                }
                fallback_summary(campaign)
            }
        }
    }

    /// Defensive playbook for one organization against a campaign. This is
    /// an explicit generate operation: failures surface to the caller.
    pub async fn playbook(
        &self,
        campaign: &Campaign,
        org: &Organization,
        own_incidents: &[Incident],
    ) -> Result<String, EnrichmentError> {
        let prompt = playbook_prompt(campaign, org, own_incidents);
        self.call(&prompt, PLAYBOOK_MAX_TOKENS).await
    }

    /// Threat-research brief for an organization description. Explicit
    /// generate operation: failures surface to the caller.
    pub async fn research_report(
        &self,
        org: &Organization,
        description: &str,
    ) -> Result<String, EnrichmentError> {
        let prompt = research_prompt(org, description);
        self.call(&prompt, RESEARCH_MAX_TOKENS).await
    }
}

/// Deterministic summary used whenever generation is unavailable.
pub fn fallback_summary(campaign: &Campaign) -> String {
    let sectors = if campaign.sectors.is_empty() {
        "multiple sectors".to_string()
    } else {
        campaign
            .sectors
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let components = if campaign.ai_components.is_empty() {
        "AI components".to_string()
    } else {
        campaign
            .ai_components
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "Campaign targeting {sectors} using {components}. Attack vector: {}. Active from {} to {}.",
        campaign.primary_attack_vector,
        campaign.first_seen.date_naive(),
        campaign.last_seen.date_naive()
    )
}

fn summary_prompt(campaign: &Campaign, member_summaries: &[String]) -> String {
    let incidents_text = member_summaries
        .iter()
        .take(SUMMARY_INCIDENT_LIMIT)
        .map(|s| format!("- {s}"))
        .collect::<Vec<_>>()
        .join("\n");
    let regions = campaign
        .regions
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let sectors = campaign
        .sectors
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are a threat intelligence analyst writing a campaign brief.\n\n\
         Incidents in this campaign (organization identities protected):\n\n{incidents_text}\n\n\
         Campaign metadata:\n\
         - Attack vector: {}\n\
         - AI components: {}\n\
         - Timeframe: {} to {}\n\
         - Geographic spread: {regions}\n\
         - Sectors affected: {sectors}\n\n\
         Write a concise campaign summary (2-3 sentences, max 150 words) that \
         describes the attack pattern, highlights the AI-enabled aspects, and \
         provides actionable intelligence for defenders. Do NOT identify \
         specific victim organizations. Return ONLY the summary text.",
        campaign.primary_attack_vector,
        campaign
            .ai_components
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
        campaign.first_seen.date_naive(),
        campaign.last_seen.date_naive(),
    )
}

fn playbook_prompt(campaign: &Campaign, org: &Organization, own_incidents: &[Incident]) -> String {
    let own_text = if own_incidents.is_empty() {
        "No specific incidents yet, but the organization is at risk".to_string()
    } else {
        own_incidents
            .iter()
            .take(PLAYBOOK_INCIDENT_LIMIT)
            .map(|i| format!("- {}", i.summary))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "You are an incident response expert creating an actionable defensive playbook.\n\n\
         CAMPAIGN INTELLIGENCE:\n{}\n\n\
         Campaign details:\n\
         - Attack vector: {}\n\
         - Scale: {} organizations, {} incidents\n\
         - Timeline: {} to {}\n\n\
         OUR ORGANIZATION'S EXPOSURE:\n{own_text}\n\n\
         OUR ENVIRONMENT:\n- Sector: {}\n- Region: {}\n\n\
         Generate a prioritized defensive playbook with sections for \
         immediate actions, short-term mitigations, long-term prevention, \
         detection rules, indicators to block, and AI-specific defenses. \
         Make recommendations specific to the {} sector's risk profile.",
        campaign
            .canonical_summary
            .as_deref()
            .unwrap_or("No summary available."),
        campaign.primary_attack_vector,
        campaign.num_orgs,
        campaign.num_incidents,
        campaign.first_seen.date_naive(),
        campaign.last_seen.date_naive(),
        org.sector,
        org.region,
        org.sector,
    )
}

fn research_prompt(org: &Organization, description: &str) -> String {
    format!(
        "You are a cybersecurity threat analyst specializing in AI-enabled threats.\n\n\
         ORGANIZATION DESCRIPTION:\n\"{description}\"\n\n\
         Organization context:\n- Sector: {}\n- Region: {}\n\n\
         Identify 2-4 AI-enabled vulnerabilities this organization is likely \
         exposed to, based on recent attack patterns. For each, give a concise \
         name, a 2-3 sentence description, prerequisites, potential impact, \
         and concrete defensive recommendations. Write a short executive \
         summary first. Return plain text.",
        org.sector, org.region,
    )
}

/// Scripted generator for tests: returns queued responses in order, then
/// fails with `Request`.
pub struct MockGenerator {
    responses: std::sync::Mutex<Vec<Result<String, EnrichmentError>>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// A generator that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        let mock = Self::new();
        for _ in 0..20 {
            mock.queue(Ok(text.to_string()));
        }
        mock
    }

    /// A generator that always fails.
    pub fn failing() -> Self {
        Self::new()
    }

    pub fn queue(&self, response: Result<String, EnrichmentError>) {
        self.responses.lock().unwrap().push(response);
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String, EnrichmentError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(EnrichmentError::Request {
                message: "mock generator exhausted".into(),
            });
        }
        responses.remove(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttackVector, Region, Sector};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn campaign() -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            primary_attack_vector: AttackVector::AiPhishing,
            ai_components: BTreeSet::from(["llm_content".to_string()]),
            sectors: BTreeSet::from([Sector::Health]),
            regions: BTreeSet::from([Region::Eu]),
            first_seen: Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
            last_seen: Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap(),
            num_orgs: 2,
            num_incidents: 3,
            canonical_summary: None,
        }
    }

    fn org() -> Organization {
        Organization {
            id: "org_a".into(),
            display_name: "Org A".into(),
            sector: Sector::Health,
            region: Region::Eu,
            query_budget: 100,
            budget_reset_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn summary_uses_generator_when_available() {
        let enricher = Enricher::new(
            Some(Arc::new(MockGenerator::with_response("Generated brief."))),
            5,
        );
        let text = enricher.campaign_summary(&campaign(), &[]).await;
        assert_eq!(text, "Generated brief.");
    }

    #[tokio::test]
    async fn summary_falls_back_on_generator_failure() {
        let enricher = Enricher::new(Some(Arc::new(MockGenerator::failing())), 5);
        let text = enricher.campaign_summary(&campaign(), &[]).await;
        assert_eq!(text, fallback_summary(&campaign()));
    }

    #[tokio::test]
    async fn summary_falls_back_when_not_configured() {
        let enricher = Enricher::disabled();
        let text = enricher.campaign_summary(&campaign(), &[]).await;
        assert!(text.starts_with("Campaign targeting health"));
        assert!(text.contains("ai_phishing"));
        assert!(text.contains("2026-03-02"));
    }

    #[tokio::test]
    async fn empty_generator_output_counts_as_failure() {
        let mock = MockGenerator::new();
        mock.queue(Ok("   ".into()));
        let enricher = Enricher::new(Some(Arc::new(mock)), 5);
        let text = enricher.campaign_summary(&campaign(), &[]).await;
        assert_eq!(text, fallback_summary(&campaign()));
    }

    #[tokio::test]
    async fn playbook_surfaces_generator_failure() {
        let enricher = Enricher::new(Some(Arc::new(MockGenerator::failing())), 5);
        let err = enricher.playbook(&campaign(), &org(), &[]).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::Request { .. }));
    }

    #[tokio::test]
    async fn playbook_without_generator_is_not_configured() {
        let enricher = Enricher::disabled();
        let err = enricher.playbook(&campaign(), &org(), &[]).await.unwrap_err();
        assert!(matches!(err, EnrichmentError::NotConfigured));
    }

    #[test]
    fn fallback_summary_handles_empty_unions() {
        let mut c = campaign();
        c.sectors.clear();
        c.ai_components.clear();
        let text = fallback_summary(&c);
        assert!(text.contains("multiple sectors"));
        assert!(text.contains("AI components"));
    }
}

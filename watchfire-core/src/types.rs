//! Fundamental types shared across the Watchfire engine.
//!
//! Defines the data model (organizations, incidents, campaigns, audit
//! records), the submission/filter request shapes, and the privacy-filtered
//! views returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Economic sector an organization operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    Health,
    Energy,
    Water,
    Gov,
    Finance,
    Other,
}

impl std::fmt::Display for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Sector::Health => "health",
            Sector::Energy => "energy",
            Sector::Water => "water",
            Sector::Gov => "gov",
            Sector::Finance => "finance",
            Sector::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Geographic region an organization reports from.
///
/// Serialized with the wire values used by submitting clients
/// (`NA-East`, `NA-West`, `EU`, `APAC`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "NA-East")]
    NaEast,
    #[serde(rename = "NA-West")]
    NaWest,
    #[serde(rename = "EU")]
    Eu,
    #[serde(rename = "APAC")]
    Apac,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Region::NaEast => "NA-East",
            Region::NaWest => "NA-West",
            Region::Eu => "EU",
            Region::Apac => "APAC",
        };
        write!(f, "{s}")
    }
}

/// Primary attack vector of an incident, and of the campaign it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackVector {
    AiPhishing,
    DeepfakeVoice,
    LlmPromptInjection,
    AiMalwareDev,
    AiLateralMovement,
    Other,
}

impl std::fmt::Display for AttackVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttackVector::AiPhishing => "ai_phishing",
            AttackVector::DeepfakeVoice => "deepfake_voice",
            AttackVector::LlmPromptInjection => "llm_prompt_injection",
            AttackVector::AiMalwareDev => "ai_malware_dev",
            AttackVector::AiLateralMovement => "ai_lateral_movement",
            AttackVector::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// Self-assessed impact of an incident on the submitting organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

/// An indicator of compromise: a typed observable such as a domain, IP
/// address, email address, or file hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ioc {
    #[serde(rename = "type")]
    pub ioc_type: String,
    pub value: String,
}

impl Ioc {
    pub fn new(ioc_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            ioc_type: ioc_type.into(),
            value: value.into(),
        }
    }
}

/// A participating organization.
///
/// Identity, sector, and region come from the authentication collaborator
/// and are trusted as-is. The budget fields are mutated only by the budget
/// limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub display_name: String,
    pub sector: Sector,
    pub region: Region,
    /// Remaining privileged-query units in the current window.
    pub query_budget: u32,
    /// When the budget next resets to the default quota.
    pub budget_reset_at: DateTime<Utc>,
}

/// A single security incident reported by one organization.
///
/// `(org_id, local_ref)` is unique: resubmitting the same pair updates the
/// record in place, keeping its id. The stored fingerprint is recomputed on
/// every upsert and is what the campaign matcher compares against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub org_id: String,
    /// Submitter-local reference, unique within the organization.
    pub local_ref: String,
    pub time_start: DateTime<Utc>,
    pub time_end: Option<DateTime<Utc>>,
    pub attack_vector: AttackVector,
    pub ai_components: BTreeSet<String>,
    pub techniques: BTreeSet<String>,
    /// Ordered as submitted; order matters for fingerprinting.
    pub iocs: Vec<Ioc>,
    pub impact_level: ImpactLevel,
    pub summary: String,
    /// Clustering key, recomputed on every upsert.
    pub fingerprint: String,
    pub campaign_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A cluster of incidents sharing a primary attack vector, time window, and
/// indicator overlap.
///
/// Every derived field is recomputed from scratch from the current member
/// set whenever membership changes; nothing here is incrementally patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub primary_attack_vector: AttackVector,
    pub ai_components: BTreeSet<String>,
    /// Union of member organizations' sectors.
    pub sectors: BTreeSet<Sector>,
    /// Union of member organizations' regions.
    pub regions: BTreeSet<Region>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Count of distinct contributing organizations.
    pub num_orgs: u32,
    pub num_incidents: u32,
    pub canonical_summary: Option<String>,
}

/// Append-only audit record emitted by every core operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub org_id: String,
    pub action: String,
    pub details: serde_json::Value,
    pub result_count: Option<u32>,
    pub recorded_at: DateTime<Utc>,
}

/// Cached result of a threat-research scan, keyed by the SHA-256 of the
/// submitted organization description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub report_id: Uuid,
    pub org_id: String,
    pub description_hash: String,
    pub body: String,
    pub generated_at: DateTime<Utc>,
    pub cached_until: DateTime<Utc>,
}

/// An incident submission as consumed from the (out-of-scope) HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSubmission {
    pub local_ref: String,
    pub time_start: DateTime<Utc>,
    #[serde(default)]
    pub time_end: Option<DateTime<Utc>>,
    pub attack_vector: AttackVector,
    #[serde(default)]
    pub ai_components: BTreeSet<String>,
    #[serde(default)]
    pub techniques: BTreeSet<String>,
    #[serde(default)]
    pub iocs: Vec<Ioc>,
    pub impact_level: ImpactLevel,
    pub summary: String,
}

/// Result of an incident submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub incident_id: Uuid,
    pub campaign_id: Uuid,
}

/// Optional filters for campaign listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<Sector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_vector: Option<AttackVector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

/// A campaign as disclosed to a requester after privacy filtering.
///
/// `sectors` and `regions` are empty when the campaign has fewer than two
/// distinct contributing organizations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub id: Uuid,
    pub primary_attack_vector: AttackVector,
    pub ai_components: BTreeSet<String>,
    pub num_orgs: u32,
    pub num_incidents: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub sectors: Vec<Sector>,
    pub regions: Vec<Region>,
    pub canonical_summary: Option<String>,
}

/// Detail view: the summary plus a small, diversity-selected IOC sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignDetail {
    #[serde(flatten)]
    pub summary: CampaignSummary,
    pub sample_iocs: Vec<Ioc>,
}

/// Answer to the "am I alone?" query for one of the caller's incidents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AloneCheck {
    pub in_campaign: bool,
    pub campaign: Option<CampaignSummary>,
}

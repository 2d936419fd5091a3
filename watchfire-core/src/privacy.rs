//! k-anonymity privacy filtering of campaign aggregates.
//!
//! A campaign contributed to by fewer than two distinct organizations must
//! never disclose sector or region breakdowns: with a single contributor
//! those unions identify the contributor. Counts, timestamps, attack
//! vector, component list, and summary are always disclosable.

use crate::types::{Campaign, CampaignDetail, CampaignSummary, Incident, Ioc};

/// Minimum number of distinct contributing organizations before sector and
/// region breakdowns may be disclosed.
pub const DISCLOSURE_THRESHOLD: u32 = 2;

/// Maximum sample IOCs in a detail view.
const MAX_SAMPLE_IOCS: usize = 3;

/// Produce the disclosable summary view of a campaign.
pub fn filtered_summary(campaign: &Campaign) -> CampaignSummary {
    let disclose = campaign.num_orgs >= DISCLOSURE_THRESHOLD;
    CampaignSummary {
        id: campaign.id,
        primary_attack_vector: campaign.primary_attack_vector,
        ai_components: campaign.ai_components.clone(),
        num_orgs: campaign.num_orgs,
        num_incidents: campaign.num_incidents,
        first_seen: campaign.first_seen,
        last_seen: campaign.last_seen,
        sectors: if disclose {
            campaign.sectors.iter().copied().collect()
        } else {
            Vec::new()
        },
        regions: if disclose {
            campaign.regions.iter().copied().collect()
        } else {
            Vec::new()
        },
        canonical_summary: campaign.canonical_summary.clone(),
    }
}

/// Produce the disclosable detail view: the filtered summary plus a small
/// indicator sample chosen for diversity over volume.
pub fn filtered_detail(campaign: &Campaign, members: &[Incident]) -> CampaignDetail {
    CampaignDetail {
        summary: filtered_summary(campaign),
        sample_iocs: sample_iocs(members),
    }
}

/// Select up to 3 sample IOCs, at most one per member incident drawn from up
/// to 3 distinct incidents, deduplicated by exact (type, value) pair.
fn sample_iocs(members: &[Incident]) -> Vec<Ioc> {
    let mut samples: Vec<Ioc> = Vec::new();
    for member in members.iter().take(MAX_SAMPLE_IOCS) {
        let Some(ioc) = member.iocs.first() else {
            continue;
        };
        if !samples.contains(ioc) {
            samples.push(ioc.clone());
        }
        if samples.len() >= MAX_SAMPLE_IOCS {
            break;
        }
    }
    samples
}

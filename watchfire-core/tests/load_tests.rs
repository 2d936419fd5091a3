//! Concurrency tests: the engine must converge under simultaneous
//! submissions and never oversubscribe budgets under parallel drains.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use watchfire_core::{
    AttackVector, CampaignFilters, EngineConfig, Enricher, ImpactLevel, IncidentSubmission, Ioc,
    MemoryStore, Organization, RecordStore, Region, Sector, Watchfire,
};

fn org(id: &str) -> Organization {
    Organization {
        id: id.into(),
        display_name: format!("Org {id}"),
        sector: if id.len() % 2 == 0 {
            Sector::Health
        } else {
            Sector::Finance
        },
        region: Region::Eu,
        query_budget: 100,
        budget_reset_at: Utc::now() + Duration::hours(12),
    }
}

fn day0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn fifty_concurrent_submissions_converge_to_one_campaign() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(Watchfire::new(
        store,
        Enricher::disabled(),
        EngineConfig::default(),
    ));

    let orgs: Vec<Organization> = (0..50).map(|i| org(&format!("org_{i:02}"))).collect();
    for o in &orgs {
        engine.register_org(o.clone()).await.unwrap();
    }

    // All 50 incidents land in the same ISO week with the same indicator:
    // one fingerprint, one campaign, regardless of interleaving.
    let mut handles = Vec::new();
    for (i, o) in orgs.iter().cloned().enumerate() {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .submit_incident(
                    &o,
                    IncidentSubmission {
                        local_ref: "inc-1".into(),
                        time_start: day0() + Duration::minutes(i as i64),
                        time_end: None,
                        attack_vector: AttackVector::AiPhishing,
                        ai_components: BTreeSet::from(["llm_content".to_string()]),
                        techniques: BTreeSet::new(),
                        iocs: vec![Ioc::new("domain", "x.example.com")],
                        impact_level: ImpactLevel::Medium,
                        summary: format!("wave hit org {i}"),
                    },
                )
                .await
                .unwrap()
        }));
    }

    let mut campaign_ids = BTreeSet::new();
    for handle in handles {
        campaign_ids.insert(handle.await.unwrap().campaign_id);
    }
    assert_eq!(campaign_ids.len(), 1, "divergent campaigns were created");

    let campaigns = engine
        .list_campaigns(&orgs[0], &CampaignFilters::default())
        .await
        .unwrap();
    assert_eq!(campaigns.len(), 1);
    assert_eq!(campaigns[0].num_orgs, 50);
    assert_eq!(campaigns[0].num_incidents, 50);
    assert_eq!(campaigns[0].first_seen, day0());
    assert_eq!(campaigns[0].last_seen, day0() + Duration::minutes(49));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn parallel_reads_never_oversubscribe_a_budget() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(Watchfire::new(
        store.clone(),
        Enricher::disabled(),
        EngineConfig::default(),
    ));
    let mut org_a = org("org_budget");
    org_a.query_budget = 10;
    engine.register_org(org_a.clone()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..30 {
        let engine = engine.clone();
        let org_a = org_a.clone();
        handles.push(tokio::spawn(async move {
            engine
                .list_campaigns(&org_a, &CampaignFilters::default())
                .await
                .is_ok()
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 10);
    let remaining = store
        .get_org("org_budget")
        .await
        .unwrap()
        .unwrap()
        .query_budget;
    assert_eq!(remaining, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_resubmissions_keep_a_single_row() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(Watchfire::new(
        store.clone(),
        Enricher::disabled(),
        EngineConfig::default(),
    ));
    let org_a = org("org_upsert");
    engine.register_org(org_a.clone()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..20 {
        let engine = engine.clone();
        let org_a = org_a.clone();
        handles.push(tokio::spawn(async move {
            engine
                .submit_incident(
                    &org_a,
                    IncidentSubmission {
                        local_ref: "same-ref".into(),
                        time_start: day0(),
                        time_end: None,
                        attack_vector: AttackVector::LlmPromptInjection,
                        ai_components: BTreeSet::new(),
                        techniques: BTreeSet::new(),
                        iocs: vec![Ioc::new("domain", "inject.example.net")],
                        impact_level: ImpactLevel::Low,
                        summary: format!("revision {i}"),
                    },
                )
                .await
                .unwrap()
        }));
    }

    let mut incident_ids = BTreeSet::new();
    for handle in handles {
        incident_ids.insert(handle.await.unwrap().incident_id);
    }
    // Duplicate-key races must not create extra rows.
    assert_eq!(incident_ids.len(), 1);

    let campaigns = engine
        .list_campaigns(&org_a, &CampaignFilters::default())
        .await
        .unwrap();
    assert_eq!(campaigns.len(), 1);
    assert_eq!(campaigns[0].num_incidents, 1);
}

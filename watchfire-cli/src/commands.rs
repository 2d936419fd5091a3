//! CLI subcommand handlers.

use crate::Commands;
use anyhow::{bail, Context};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use watchfire_core::{
    load_config, AnthropicGenerator, AttackVector, CampaignFilters, Enricher, IncidentSubmission,
    Organization, RecordStore, Region, Sector, SnapshotStore, TextGenerator, Watchfire,
};

/// Demo organizations matching the hosted service's sandbox tenants.
const DEMO_ORGS: [(&str, &str, Sector, Region); 3] = [
    ("org_alice", "Alice Hospital", Sector::Health, Region::NaEast),
    ("org_bob", "Bob Energy Corp", Sector::Energy, Region::NaWest),
    (
        "org_charlie",
        "Charlie Water Utility",
        Sector::Water,
        Region::NaEast,
    ),
];

/// Handle a CLI subcommand.
pub async fn run(command: Commands, workdir: &Path, org_id: &str) -> anyhow::Result<()> {
    let config = load_config(Some(workdir)).map_err(|e| anyhow::anyhow!(e))?;

    if let Commands::Config = command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let snapshot_path = config
        .store
        .snapshot_path
        .clone()
        .unwrap_or_else(|| workdir.join(".watchfire").join("data.json"));
    let store = Arc::new(SnapshotStore::open(&snapshot_path)?);

    let generator: Option<Arc<dyn TextGenerator>> = if config.enrichment.enabled {
        match AnthropicGenerator::from_config(&config.enrichment) {
            Ok(g) => Some(Arc::new(g)),
            Err(_) => {
                info!("no generator API key configured; using template fallbacks");
                None
            }
        }
    } else {
        None
    };
    let enricher = Enricher::new(generator, config.enrichment.timeout_secs);
    let default_quota = config.budget.default_quota;
    let engine = Watchfire::new(store.clone(), enricher, config);

    match command {
        Commands::Config => unreachable!("handled above"),
        Commands::Seed => {
            for (id, name, sector, region) in DEMO_ORGS {
                engine
                    .register_org(Organization {
                        id: id.into(),
                        display_name: name.into(),
                        sector,
                        region,
                        query_budget: default_quota,
                        budget_reset_at: Utc::now() + chrono::Duration::hours(24),
                    })
                    .await?;
                println!("seeded {id} ({name}, {sector}, {region})");
            }
            Ok(())
        }
        Commands::Submit { file } => {
            let org = acting_org(store.as_ref(), org_id).await?;
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let submission: IncidentSubmission =
                serde_json::from_str(&raw).context("parsing incident submission")?;
            let outcome = engine.submit_incident(&org, submission).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Commands::Campaigns {
            attack_vector,
            sector,
            region,
        } => {
            let org = acting_org(store.as_ref(), org_id).await?;
            let filters = CampaignFilters {
                attack_vector: attack_vector
                    .map(|s| parse_enum::<AttackVector>("attack vector", &s))
                    .transpose()?,
                sector: sector
                    .map(|s| parse_enum::<Sector>("sector", &s))
                    .transpose()?,
                region: region
                    .map(|s| parse_enum::<Region>("region", &s))
                    .transpose()?,
                since: None,
                until: None,
            };
            let campaigns = engine.list_campaigns(&org, &filters).await?;
            println!("{}", serde_json::to_string_pretty(&campaigns)?);
            Ok(())
        }
        Commands::Detail { id } => {
            let org = acting_org(store.as_ref(), org_id).await?;
            let detail = engine.campaign_detail(&org, id).await?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
            Ok(())
        }
        Commands::Alone { incident } => {
            let org = acting_org(store.as_ref(), org_id).await?;
            let check = engine.am_i_alone(&org, incident).await?;
            println!("{}", serde_json::to_string_pretty(&check)?);
            Ok(())
        }
        Commands::Playbook { id } => {
            let org = acting_org(store.as_ref(), org_id).await?;
            let playbook = engine.generate_playbook(&org, id).await?;
            println!("{playbook}");
            Ok(())
        }
    }
}

/// Resolve the acting organization from the local store. In the hosted
/// service this record comes from the authentication collaborator.
async fn acting_org(store: &dyn RecordStore, org_id: &str) -> anyhow::Result<Organization> {
    match store.get_org(org_id).await? {
        Some(org) => Ok(org),
        None => bail!("unknown organization '{org_id}'; run `watchfire seed` first"),
    }
}

/// Parse an enum value from its wire representation (e.g. `ai_phishing`,
/// `health`, `EU`).
fn parse_enum<T: serde::de::DeserializeOwned>(what: &str, raw: &str) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .with_context(|| format!("invalid {what}: '{raw}'"))
}

use anyhow::Context;

use stable_common::config::EngineConfig;
use stable_sim::scenario::{Scenario, Simulation};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stable_sim=info,stable_engine=info,stable_oracle=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: stable-sim <scenario.json>")?;

    // Load configuration
    let config = EngineConfig::from_env()?;

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read scenario {path}"))?;
    let scenario: Scenario = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse scenario {path}"))?;

    tracing::info!(path = %path, steps = scenario.steps.len(), "Running scenario");

    let sim = Simulation::for_scenario(&config, &scenario)?;
    let report = sim.run(&scenario)?;

    tracing::info!(
        failed = report.steps.iter().filter(|s| !s.ok).count(),
        audit_records = report.audit.len(),
        "Scenario finished"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

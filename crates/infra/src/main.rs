//! `warden-catalog`: print the seeded module catalogs as JSON.
//!
//! Reads the `WARDEN_*` environment, installs logging and dumps every
//! module's hierarchy to stdout.

use anyhow::Context;

use warden_infra::{AuthzConfig, InMemoryEngine};

fn main() -> anyhow::Result<()> {
    let config = AuthzConfig::from_env().context("invalid WARDEN_* configuration")?;
    let deployment = InMemoryEngine::bootstrap(&config)?;

    let snapshot = deployment.engine.catalog_snapshot()?;
    tracing::info!(modules = snapshot.len(), "catalog snapshot built");

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

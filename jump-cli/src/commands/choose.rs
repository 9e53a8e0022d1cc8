//! Print the chosen host.

use anyhow::{Context, Result};
use jumpgate_host::HostPool;

use super::parse_override;

/// Run the choose command.
pub async fn run(pool: &HostPool, host: Option<&str>) -> Result<()> {
    let endpoint = pool
        .choose(parse_override(host))
        .await
        .context("Failed to choose a host")?;

    println!("{}", endpoint);
    Ok(())
}

//! Run a command on the chosen host.

use anyhow::{Context, Result};
use jumpgate_host::HostPool;
use tracing::info;

use super::{parse_override, shell_command};

/// Run the run command. Returns the remote exit code.
pub async fn run(pool: &HostPool, host: Option<&str>, command: &[String]) -> Result<i32> {
    let endpoint = pool
        .choose(parse_override(host))
        .await
        .context("Failed to choose a host")?;

    let connection = endpoint
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", endpoint))?;

    let command = shell_command(command);
    info!(host = %endpoint, %command, "running command");

    let output = connection
        .run(&command)
        .await
        .with_context(|| format!("Failed to run command on {}", endpoint))?;

    print!("{}", output.stdout);
    eprint!("{}", output.stderr);

    Ok(output.exit_code)
}

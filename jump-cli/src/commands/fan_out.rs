//! Run a command on every host concurrently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use jumpgate_host::{CommandOutput, Endpoint, HostPool};
use jumpgate_parallel::{run_async_in_parallel, FailurePolicy, Outcomes, TaskFailure};

use super::shell_command;

/// Run the fan-out command. Returns whether every host exited with 0.
///
/// With `fail_fast`, the first failing host (in configured order) fails the
/// whole command once all hosts have finished.
pub async fn run(pool: &HostPool, command: &[String], fail_fast: bool) -> Result<bool> {
    if pool.is_empty() {
        anyhow::bail!("No hosts configured. Use --hosts or a config file.");
    }

    let command = shell_command(command);
    let outcomes = dispatch(pool, &command, FailurePolicy::from_return_failures(!fail_fast))
        .await
        .map_err(|e| anyhow!("{}", e))?;

    Ok(report(pool, &outcomes))
}

type HostOutcomes = Outcomes<String, CommandOutput, anyhow::Error>;

async fn dispatch(
    pool: &HostPool,
    command: &str,
    policy: FailurePolicy,
) -> std::result::Result<HostOutcomes, TaskFailure<anyhow::Error>> {
    let by_identifier: Arc<HashMap<String, Arc<Endpoint>>> = Arc::new(
        pool.candidates()
            .iter()
            .map(|endpoint| (endpoint.identifier().to_string(), Arc::clone(endpoint)))
            .collect(),
    );
    let identifiers: Vec<String> = pool
        .candidates()
        .iter()
        .map(|endpoint| endpoint.identifier().to_string())
        .collect();
    let command = command.to_string();

    run_async_in_parallel(
        identifiers,
        move |identifier: String| {
            let endpoint = by_identifier.get(&identifier).map(Arc::clone);
            let command = command.clone();
            async move {
                let endpoint = endpoint.ok_or_else(|| anyhow!("unknown host {}", identifier))?;
                let connection = endpoint.connect().await?;
                Ok::<_, anyhow::Error>(connection.run(&command).await?)
            }
        },
        policy,
    )
    .await
}

/// Prints one line per host, in configured order.
fn report(pool: &HostPool, outcomes: &HostOutcomes) -> bool {
    let mut all_ok = true;
    let mut seen = HashSet::new();

    for endpoint in pool.candidates() {
        let identifier = endpoint.identifier();
        if !seen.insert(identifier) {
            continue;
        }
        match outcomes.get(identifier) {
            Some(Ok(output)) => {
                println!("{}: exit {}", identifier, output.exit_code);
                for line in output.stdout.lines() {
                    println!("  {}", line);
                }
                all_ok &= output.success();
            }
            Some(Err(failure)) => {
                println!("{}: FAILED: {}", identifier, failure);
                all_ok = false;
            }
            None => {
                println!("{}: no result", identifier);
                all_ok = false;
            }
        }
    }

    all_ok
}

//! Print the Docker server version of the chosen host.

use anyhow::{Context, Result};
use jumpgate_host::HostPool;

use super::parse_override;

/// Run the docker-version command.
pub async fn run(pool: &HostPool, host: Option<&str>) -> Result<()> {
    let endpoint = pool
        .choose(parse_override(host))
        .await
        .context("Failed to choose a host")?;

    let client = endpoint
        .runtime_client()
        .await
        .with_context(|| format!("Failed to reach Docker on {}", endpoint))?;
    let version = client
        .server_version()
        .await
        .with_context(|| format!("Failed to query Docker version on {}", endpoint))?;

    println!("{}: Docker {}", endpoint, version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jumpgate_host::{
        Endpoint, FailureKind, MockRuntime, RuntimeClient, RuntimeClientFactory, TransportError,
    };
    use std::sync::Arc;

    fn runtime_endpoint(host: &str, runtime: MockRuntime) -> Arc<Endpoint> {
        let factory: RuntimeClientFactory = Arc::new(
            move |_host: &str| -> Result<Arc<dyn RuntimeClient>, TransportError> {
                Ok(Arc::new(runtime.clone()))
            },
        );
        Arc::new(Endpoint::new(host).with_runtime_client_factory(factory))
    }

    #[tokio::test]
    async fn prints_version_of_indexed_host() {
        let pool = HostPool::from_endpoints(vec![runtime_endpoint(
            "build-1",
            MockRuntime::new("build-1", "24.0.7"),
        )]);

        assert!(run(&pool, Some("1")).await.is_ok());
    }

    #[tokio::test]
    async fn runtime_failure_is_reported() {
        let endpoint = Arc::new(Endpoint::new("build-1").with_runtime_client_factory(Arc::new(
            |host: &str| -> Result<Arc<dyn RuntimeClient>, TransportError> {
                Err(TransportError::Timeout {
                    host: host.to_string(),
                })
            },
        )));
        let pool = HostPool::from_endpoints(vec![endpoint]);

        let err = run(&pool, Some("1")).await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Failed to reach Docker on build-1"));
        assert!(message.contains(&FailureKind::Timeout.to_string()));
    }
}

//! Docker runtime client backed by bollard.

use std::fmt;

use async_trait::async_trait;
use bollard::{Docker, API_DEFAULT_VERSION};
use serde::Deserialize;
use tracing::debug;

use super::RuntimeClient;
use crate::endpoint::LOCALHOST;
use crate::error::TransportError;

/// How to reach the Docker daemon on a remote host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DockerOptions {
    /// TCP port the daemon listens on (default: 2375).
    #[serde(default = "default_docker_port")]
    pub port: u16,
    /// Request timeout in seconds (default: 120).
    #[serde(default = "default_docker_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_docker_port() -> u16 {
    2375
}

fn default_docker_timeout_secs() -> u64 {
    120
}

impl Default for DockerOptions {
    fn default() -> Self {
        Self {
            port: default_docker_port(),
            timeout_secs: default_docker_timeout_secs(),
        }
    }
}

enum Target {
    /// Local daemon via its default socket, connected per request.
    Local,
    Remote(Docker),
}

/// Docker client for one host.
pub struct DockerRuntime {
    host: String,
    target: Target,
}

impl DockerRuntime {
    /// Client for the local daemon. Never fails; problems surface on use.
    pub fn local() -> Self {
        Self {
            host: LOCALHOST.to_string(),
            target: Target::Local,
        }
    }

    /// Client for the daemon at `tcp://host:port`.
    pub fn connect(host: &str, options: &DockerOptions) -> Result<Self, TransportError> {
        let address = format!("tcp://{}:{}", host, options.port);
        debug!(host, %address, "creating docker client");
        let docker = Docker::connect_with_http(&address, options.timeout_secs, API_DEFAULT_VERSION)?;
        Ok(Self {
            host: host.to_string(),
            target: Target::Remote(docker),
        })
    }

    fn client(&self) -> Result<Docker, TransportError> {
        match &self.target {
            Target::Local => Ok(Docker::connect_with_local_defaults()?),
            Target::Remote(docker) => Ok(docker.clone()),
        }
    }
}

impl fmt::Debug for DockerRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self.target {
            Target::Local => "local",
            Target::Remote(_) => "remote",
        };
        f.debug_struct("DockerRuntime")
            .field("host", &self.host)
            .field("target", &target)
            .finish()
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    fn host(&self) -> &str {
        &self.host
    }

    async fn ping(&self) -> Result<(), TransportError> {
        self.client()?.ping().await?;
        Ok(())
    }

    async fn server_version(&self) -> Result<String, TransportError> {
        let version = self.client()?.version().await?;
        version.version.ok_or_else(|| {
            TransportError::ConnectionFailed(format!(
                "docker daemon on {} did not report a version",
                self.host
            ))
        })
    }
}

//! Endpoint - one jump host and its lazily created handles.
//!
//! An [`Endpoint`] owns a host identifier plus two factories: one for the
//! shell connection and one for the container runtime client. The first
//! successful handle of each kind is cached; later calls return the cached
//! handle without touching the factory again.
//!
//! # Example
//!
//! ```ignore
//! use jumpgate_host::Endpoint;
//!
//! let endpoint = Endpoint::new("build-1.example.com");
//! let connection = endpoint.connect().await?;
//! let output = connection.run_ok("uname -a").await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::error::{ConnectionError, FailureKind, TransportError};
use crate::transport::{
    DockerOptions, DockerRuntime, LocalShell, RuntimeClient, ShellConnection, SshConnection,
    SshOptions,
};

/// Identifier of the local endpoint.
pub const LOCALHOST: &str = "localhost";

/// Produces a shell connection handle for a host identifier.
pub type ConnectionFactory =
    Arc<dyn Fn(&str) -> Result<Arc<dyn ShellConnection>, TransportError> + Send + Sync>;

/// Produces a runtime client handle for a host identifier.
pub type RuntimeClientFactory =
    Arc<dyn Fn(&str) -> Result<Arc<dyn RuntimeClient>, TransportError> + Send + Sync>;

/// Factory creating [`SshConnection`]s with `options`.
pub fn ssh_connection_factory(options: SshOptions) -> ConnectionFactory {
    Arc::new(
        move |host: &str| -> Result<Arc<dyn ShellConnection>, TransportError> {
            Ok(Arc::new(SshConnection::new(host, options.clone())))
        },
    )
}

/// Factory creating [`DockerRuntime`] clients with `options`.
pub fn docker_runtime_factory(options: DockerOptions) -> RuntimeClientFactory {
    Arc::new(
        move |host: &str| -> Result<Arc<dyn RuntimeClient>, TransportError> {
            Ok(Arc::new(DockerRuntime::connect(host, &options)?))
        },
    )
}

/// A jump host.
pub struct Endpoint {
    identifier: String,
    source: Source,
}

enum Source {
    Remote(Remote),
    /// Local execution; no factories, no caching.
    Local,
}

struct Remote {
    connection_factory: ConnectionFactory,
    runtime_client_factory: RuntimeClientFactory,
    connection: Mutex<Option<Arc<dyn ShellConnection>>>,
    runtime_client: Mutex<Option<Arc<dyn RuntimeClient>>>,
    /// Deadline for the ping that vets a new runtime client.
    check_timeout: Duration,
}

impl Endpoint {
    /// Remote endpoint using the default SSH and Docker factories.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self::with_options(identifier, &SshOptions::default(), &DockerOptions::default())
    }

    /// Remote endpoint whose default factories use the given options.
    pub fn with_options(
        identifier: impl Into<String>,
        ssh: &SshOptions,
        docker: &DockerOptions,
    ) -> Self {
        Self::with_factories(
            identifier,
            ssh_connection_factory(ssh.clone()),
            docker_runtime_factory(docker.clone()),
        )
        .with_check_timeout(Duration::from_secs(docker.timeout_secs))
    }

    /// Remote endpoint with explicit factories.
    pub fn with_factories(
        identifier: impl Into<String>,
        connection_factory: ConnectionFactory,
        runtime_client_factory: RuntimeClientFactory,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            source: Source::Remote(Remote {
                connection_factory,
                runtime_client_factory,
                connection: Mutex::new(None),
                runtime_client: Mutex::new(None),
                check_timeout: Duration::from_secs(DockerOptions::default().timeout_secs),
            }),
        }
    }

    /// The local machine. `connect()` and `runtime_client()` never fail.
    pub fn local() -> Self {
        Self {
            identifier: LOCALHOST.to_string(),
            source: Source::Local,
        }
    }

    /// Replace the connection factory. Has no effect on the local endpoint.
    pub fn with_connection_factory(mut self, factory: ConnectionFactory) -> Self {
        if let Source::Remote(remote) = &mut self.source {
            remote.connection_factory = factory;
        }
        self
    }

    /// Replace the runtime client factory. Has no effect on the local endpoint.
    pub fn with_runtime_client_factory(mut self, factory: RuntimeClientFactory) -> Self {
        if let Source::Remote(remote) = &mut self.source {
            remote.runtime_client_factory = factory;
        }
        self
    }

    /// Deadline for the ping run on each new runtime client.
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        if let Source::Remote(remote) = &mut self.source {
            remote.check_timeout = timeout;
        }
        self
    }

    /// The host's identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Whether this is the local endpoint.
    pub fn is_local(&self) -> bool {
        matches!(self.source, Source::Local)
    }

    /// Shell connection to the host, created and opened on first use.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] when the factory or `open()` fails.
    /// Nothing is cached in that case, so the next call tries again.
    pub async fn connect(&self) -> Result<Arc<dyn ShellConnection>, ConnectionError> {
        let remote = match &self.source {
            Source::Local => return Ok(Arc::new(LocalShell::new())),
            Source::Remote(remote) => remote,
        };

        let mut cached = remote.connection.lock().await;
        if let Some(connection) = cached.as_ref() {
            return Ok(Arc::clone(connection));
        }

        let connection = (remote.connection_factory)(&self.identifier)
            .map_err(|e| self.connection_failed(e))?;
        connection
            .open()
            .await
            .map_err(|e| self.connection_failed(e))?;

        debug!(host = %self.identifier, "successfully connected");
        *cached = Some(Arc::clone(&connection));
        Ok(connection)
    }

    /// Container runtime client for the host, created and pinged on first use.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] when the factory fails or the daemon
    /// does not answer a ping within the check timeout. Nothing is cached
    /// in that case.
    pub async fn runtime_client(&self) -> Result<Arc<dyn RuntimeClient>, ConnectionError> {
        let remote = match &self.source {
            Source::Local => return Ok(Arc::new(DockerRuntime::local())),
            Source::Remote(remote) => remote,
        };

        let mut cached = remote.runtime_client.lock().await;
        if let Some(client) = cached.as_ref() {
            return Ok(Arc::clone(client));
        }

        let client = (remote.runtime_client_factory)(&self.identifier)
            .map_err(|e| self.connection_failed(e))?;
        match tokio::time::timeout(remote.check_timeout, client.ping()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.connection_failed(e)),
            Err(_) => {
                return Err(self.connection_failed(TransportError::Timeout {
                    host: self.identifier.clone(),
                }))
            }
        }

        debug!(host = %self.identifier, "runtime client connected");
        *cached = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Drop the cached connection so the next `connect()` builds a new one.
    pub async fn reset_connection(&self) {
        if let Source::Remote(remote) = &self.source {
            remote.connection.lock().await.take();
        }
    }

    /// Drop the cached runtime client.
    pub async fn reset_runtime_client(&self) {
        if let Source::Remote(remote) = &self.source {
            remote.runtime_client.lock().await.take();
        }
    }

    /// Whether a connection is currently cached.
    pub async fn has_cached_connection(&self) -> bool {
        match &self.source {
            Source::Remote(remote) => remote.connection.lock().await.is_some(),
            Source::Local => false,
        }
    }

    /// Whether a runtime client is currently cached.
    pub async fn has_cached_runtime_client(&self) -> bool {
        match &self.source {
            Source::Remote(remote) => remote.runtime_client.lock().await.is_some(),
            Source::Local => false,
        }
    }

    fn connection_failed(&self, source: TransportError) -> ConnectionError {
        let err = ConnectionError::new(&self.identifier, source);
        match err.kind {
            FailureKind::NameResolution => {
                error!(host = %self.identifier, "DNS lookup error when connecting to {}", self.identifier)
            }
            FailureKind::Timeout => {
                error!(host = %self.identifier, "timeout when connecting to {}", self.identifier)
            }
            FailureKind::Authentication => error!(
                host = %self.identifier,
                "authentication failed when connecting to {}", self.identifier
            ),
            FailureKind::Unclassified => error!(
                host = %self.identifier,
                "failed to connect to {}: {}", self.identifier, err.source
            ),
        }
        err
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("identifier", &self.identifier)
            .field("local", &self.is_local())
            .finish()
    }
}

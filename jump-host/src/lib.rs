//! # jumpgate-host
//!
//! Pick one of several interchangeable build/test hosts and run work on it,
//! failing over to the next host when one is unreachable.
//!
//! ## Features
//!
//! - **Lazy Endpoints**: connections and runtime clients are created on first
//!   use and cached per host
//! - **Failure Taxonomy**: name resolution, timeout, authentication, and
//!   everything else
//! - **Failover**: ordered or randomized, returning the last failure when
//!   every host is down
//! - **Transport Abstraction**: SSH, local shell, Docker, and mocks
//!
//! ## Example
//!
//! ```ignore
//! use jumpgate_host::{Config, HostOverride, HostPool};
//!
//! let config = Config::load_or_default(None)?;
//! let pool = HostPool::from_config(&config);
//!
//! // Random healthy host
//! let endpoint = pool.choose(None).await?;
//!
//! // Second configured host, no connectivity check
//! let endpoint = pool.choose(HostOverride::parse("2")).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod endpoint;
pub mod error;
pub mod selector;
pub mod transport;

pub use config::{Config, ConfigError, HostsConfig, DEFAULT_CONFIG_PATH};
pub use endpoint::{
    docker_runtime_factory, ssh_connection_factory, ConnectionFactory, Endpoint,
    RuntimeClientFactory, LOCALHOST,
};
pub use error::{
    Classify, ConnectionError, FailureKind, SelectError, TransportError, Unclassified,
};
pub use selector::{
    choose_from, choose_from_with_rng, try_connect_to_any, try_function_on_any, HostOverride,
    HostPool,
};
pub use transport::{
    CommandOutput, DockerOptions, DockerRuntime, LocalShell, MockRuntime, MockShell,
    RuntimeClient, ShellConnection, SshConnection, SshOptions,
};

//! Transport abstraction for jump hosts.
//!
//! An [`Endpoint`](crate::Endpoint) hands out two kinds of handles:
//!
//! - a [`ShellConnection`] for running commands and uploading files;
//! - a [`RuntimeClient`] for talking to the host's container runtime.
//!
//! Both are traits so tests can substitute fakes ([`MockShell`],
//! [`MockRuntime`]). The default implementations shell out to the system
//! `ssh`/`scp` binaries ([`SshConnection`]), run commands locally
//! ([`LocalShell`]), and talk to Docker through bollard ([`DockerRuntime`]).

mod docker;
mod local;
mod mock;
mod ssh;

pub use docker::{DockerOptions, DockerRuntime};
pub use local::LocalShell;
pub use mock::{MockRuntime, MockShell};
pub use ssh::{classify_ssh_failure, SshConnection, SshOptions};

use std::fmt;
use std::path::Path;
use std::process::Output;

use async_trait::async_trait;

use crate::error::TransportError;

/// Result of executing a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (0 = success).
    pub exit_code: i32,
}

impl CommandOutput {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        }
    }
}

/// A shell session on a host.
#[async_trait]
pub trait ShellConnection: Send + Sync + fmt::Debug {
    /// Host this connection targets.
    fn host(&self) -> &str;

    /// Establish the session, failing if the host is unusable.
    async fn open(&self) -> Result<(), TransportError>;

    /// Execute a command.
    ///
    /// Does NOT fail on non-zero exit; use `run_ok` for that.
    async fn run(&self, command: &str) -> Result<CommandOutput, TransportError>;

    /// Execute a command, failing on non-zero exit.
    async fn run_ok(&self, command: &str) -> Result<CommandOutput, TransportError> {
        let output = self.run(command).await?;
        if !output.success() {
            return Err(TransportError::CommandFailed {
                host: self.host().to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Copy a local file to `remote` on the host.
    async fn put(&self, local: &Path, remote: &str) -> Result<(), TransportError>;
}

/// A client for the container runtime on a host.
#[async_trait]
pub trait RuntimeClient: Send + Sync + fmt::Debug {
    /// Host this client targets.
    fn host(&self) -> &str;

    /// Check that the runtime daemon answers.
    async fn ping(&self) -> Result<(), TransportError>;

    /// Version string reported by the runtime daemon.
    async fn server_version(&self) -> Result<String, TransportError>;
}

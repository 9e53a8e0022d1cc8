//! Local execution context: commands run through `sh -c` on this machine.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{CommandOutput, ShellConnection};
use crate::endpoint::LOCALHOST;
use crate::error::TransportError;

/// Shell connection to the machine we are running on.
#[derive(Debug, Clone, Default)]
pub struct LocalShell;

impl LocalShell {
    /// Create a local shell. Never fails.
    pub fn new() -> Self {
        Self
    }
}

/// Where `put` writes: into `remote` if it names a directory, else `remote` itself.
fn upload_target(local: &Path, remote: &str) -> PathBuf {
    let remote_path = Path::new(remote);
    let into_dir = remote.is_empty() || remote.ends_with('/') || remote_path.is_dir();
    match (into_dir, local.file_name()) {
        (true, Some(name)) => {
            let dir = if remote.is_empty() { Path::new(".") } else { remote_path };
            dir.join(name)
        }
        _ => remote_path.to_path_buf(),
    }
}

#[async_trait]
impl ShellConnection for LocalShell {
    fn host(&self) -> &str {
        LOCALHOST
    }

    async fn open(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, TransportError> {
        debug!(command, "running local command");
        let output = Command::new("sh").arg("-c").arg(command).output().await?;
        Ok(CommandOutput::from(output))
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let target = upload_target(local, remote);
        tokio::fs::copy(local, &target)
            .await
            .map_err(|e| TransportError::TransferFailed {
                host: LOCALHOST.to_string(),
                detail: format!("copy {} to {}: {}", local.display(), target.display(), e),
            })?;
        Ok(())
    }
}

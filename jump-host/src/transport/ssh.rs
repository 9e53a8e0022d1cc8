//! SSH transport.
//!
//! Uses `tokio::process::Command` to shell out to `ssh` and `scp`.
//! Authentication is left to the user's SSH setup (agent, keys, config);
//! `BatchMode` keeps both tools from ever prompting.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::{CommandOutput, ShellConnection};
use crate::error::TransportError;

/// `ssh` exits with 255 when the connection itself failed.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Extra time on top of `ConnectTimeout` before we give up on `ssh` ourselves.
const OPEN_GRACE_SECS: u64 = 5;

/// Options passed to `ssh`/`scp` for every host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SshOptions {
    /// Login user (default: whatever `ssh` picks).
    #[serde(default)]
    pub user: Option<String>,
    /// SSH port (default: 22).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect timeout in seconds (default: 30).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Private key to authenticate with (`~/` is expanded).
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    /// Verify host keys against known_hosts (default: false).
    #[serde(default)]
    pub strict_host_key_checking: bool,
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            user: None,
            port: default_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            identity_file: None,
            strict_host_key_checking: false,
        }
    }
}

impl SshOptions {
    /// `user@host`, or just `host` when no user is configured.
    pub fn destination(&self, host: &str) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, host),
            None => host.to_string(),
        }
    }

    /// `-o`/`-i` arguments shared by `ssh` and `scp`.
    fn common_args(&self) -> Vec<String> {
        let strict = if self.strict_host_key_checking {
            "yes"
        } else {
            "no"
        };
        let mut args = vec![
            "-o".to_string(),
            format!("StrictHostKeyChecking={}", strict),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
        ];
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(expand_home(identity).to_string_lossy().into_owned());
        }
        args
    }
}

/// Expands a leading `~/` to the user's home directory.
fn expand_home(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(stripped);
        }
    }
    path.to_path_buf()
}

/// Maps the stderr of a failed `ssh` connection onto a transport error.
pub fn classify_ssh_failure(host: &str, stderr: &str) -> TransportError {
    let detail = stderr.trim().to_string();
    let lower = detail.to_lowercase();

    if lower.contains("could not resolve hostname")
        || lower.contains("name or service not known")
        || lower.contains("nodename nor servname")
    {
        TransportError::NameResolution {
            host: host.to_string(),
            detail,
        }
    } else if lower.contains("timed out") {
        TransportError::Timeout {
            host: host.to_string(),
        }
    } else if lower.contains("permission denied")
        || lower.contains("too many authentication failures")
        || lower.contains("authentication failed")
    {
        TransportError::Authentication {
            host: host.to_string(),
            detail,
        }
    } else {
        TransportError::ConnectionFailed(format!("ssh to {} failed: {}", host, detail))
    }
}

/// Shell connection to a remote host via the system `ssh` binary.
#[derive(Debug, Clone)]
pub struct SshConnection {
    host: String,
    options: SshOptions,
}

impl SshConnection {
    /// Create a connection handle. Nothing is contacted until `open`.
    pub fn new(host: &str, options: SshOptions) -> Self {
        Self {
            host: host.to_string(),
            options,
        }
    }

    /// Options this connection uses.
    pub fn options(&self) -> &SshOptions {
        &self.options
    }

    fn ssh_command(&self, command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(self.options.common_args())
            .arg("-p")
            .arg(self.options.port.to_string())
            .arg(self.options.destination(&self.host))
            .arg(command)
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ShellConnection for SshConnection {
    fn host(&self) -> &str {
        &self.host
    }

    async fn open(&self) -> Result<(), TransportError> {
        debug!(host = %self.host, port = self.options.port, "opening ssh session");

        let deadline = Duration::from_secs(self.options.connect_timeout_secs + OPEN_GRACE_SECS);
        let output = match tokio::time::timeout(deadline, self.ssh_command("true").output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(TransportError::Timeout {
                    host: self.host.clone(),
                })
            }
        };

        let output = CommandOutput::from(output);
        if output.exit_code == SSH_CONNECTION_FAILURE {
            return Err(classify_ssh_failure(&self.host, &output.stderr));
        }
        if !output.success() {
            return Err(TransportError::ConnectionFailed(format!(
                "ssh to {} exited with {}: {}",
                self.host,
                output.exit_code,
                output.stderr.trim()
            )));
        }

        Ok(())
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, TransportError> {
        debug!(host = %self.host, command, "running remote command");
        let output = self.ssh_command(command).output().await?;
        Ok(CommandOutput::from(output))
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let target = format!("{}:{}", self.options.destination(&self.host), remote);
        debug!(host = %self.host, local = %local.display(), remote, "copying file");

        let output = Command::new("scp")
            .args(self.options.common_args())
            .arg("-P")
            .arg(self.options.port.to_string())
            .arg(local)
            .arg(&target)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::TransferFailed {
                host: self.host.clone(),
                detail: format!("scp {} to {} failed: {}", local.display(), target, stderr.trim()),
            });
        }

        Ok(())
    }
}

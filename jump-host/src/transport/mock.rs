//! Mock transports for testing.
//!
//! Allows forcing connection failures of a given kind, queueing command
//! output, and capturing commands and uploads for verification.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{CommandOutput, RuntimeClient, ShellConnection};
use crate::error::{FailureKind, TransportError};

/// Builds a transport error of the requested kind for `host`.
fn forced_failure(host: &str, kind: FailureKind) -> TransportError {
    match kind {
        FailureKind::NameResolution => TransportError::NameResolution {
            host: host.to_string(),
            detail: "mock dns failure".into(),
        },
        FailureKind::Timeout => TransportError::Timeout {
            host: host.to_string(),
        },
        FailureKind::Authentication => TransportError::Authentication {
            host: host.to_string(),
            detail: "mock credentials rejected".into(),
        },
        FailureKind::Unclassified => {
            TransportError::ConnectionFailed(format!("mock failure on {}", host))
        }
    }
}

/// Mock shell connection.
///
/// Clones share state, so a test can keep a handle while an endpoint owns
/// another.
#[derive(Debug, Clone)]
pub struct MockShell {
    host: String,
    inner: Arc<Mutex<MockShellInner>>,
}

#[derive(Debug, Default)]
struct MockShellInner {
    open_failure: Option<FailureKind>,
    open_calls: usize,
    opened: bool,
    commands: Vec<String>,
    outputs: VecDeque<CommandOutput>,
    uploads: Vec<(PathBuf, String)>,
}

impl MockShell {
    /// Create a mock shell that opens successfully.
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            inner: Arc::new(Mutex::new(MockShellInner::default())),
        }
    }

    /// Create a mock shell whose `open()` always fails with `kind`.
    pub fn failing(host: &str, kind: FailureKind) -> Self {
        let shell = Self::new(host);
        shell.fail_open_with(kind);
        shell
    }

    /// Make every following `open()` fail with `kind`.
    pub fn fail_open_with(&self, kind: FailureKind) {
        self.inner.lock().unwrap().open_failure = Some(kind);
    }

    /// Queue output for the next `run()` call.
    pub fn queue_output(&self, output: CommandOutput) {
        self.inner.lock().unwrap().outputs.push_back(output);
    }

    /// Number of times `open()` was called.
    pub fn open_calls(&self) -> usize {
        self.inner.lock().unwrap().open_calls
    }

    /// Whether the last `open()` succeeded.
    pub fn is_open(&self) -> bool {
        self.inner.lock().unwrap().opened
    }

    /// Commands passed to `run()`, in order.
    pub fn commands(&self) -> Vec<String> {
        self.inner.lock().unwrap().commands.clone()
    }

    /// `(local, remote)` pairs passed to `put()`, in order.
    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.inner.lock().unwrap().uploads.clone()
    }
}

#[async_trait]
impl ShellConnection for MockShell {
    fn host(&self) -> &str {
        &self.host
    }

    async fn open(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.open_calls += 1;

        if let Some(kind) = inner.open_failure {
            inner.opened = false;
            return Err(forced_failure(&self.host, kind));
        }

        inner.opened = true;
        Ok(())
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.commands.push(command.to_string());
        Ok(inner.outputs.pop_front().unwrap_or_default())
    }

    async fn put(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.uploads.push((local.to_path_buf(), remote.to_string()));
        Ok(())
    }
}

/// Mock container runtime client.
#[derive(Debug, Clone)]
pub struct MockRuntime {
    host: String,
    version: String,
    ping_failure: Option<FailureKind>,
}

impl MockRuntime {
    /// Create a mock runtime reporting `version`.
    pub fn new(host: &str, version: &str) -> Self {
        Self {
            host: host.to_string(),
            version: version.to_string(),
            ping_failure: None,
        }
    }

    /// Make `ping()` fail with `kind`.
    pub fn with_ping_failure(mut self, kind: FailureKind) -> Self {
        self.ping_failure = Some(kind);
        self
    }
}

#[async_trait]
impl RuntimeClient for MockRuntime {
    fn host(&self) -> &str {
        &self.host
    }

    async fn ping(&self) -> Result<(), TransportError> {
        match self.ping_failure {
            Some(kind) => Err(forced_failure(&self.host, kind)),
            None => Ok(()),
        }
    }

    async fn server_version(&self) -> Result<String, TransportError> {
        Ok(self.version.clone())
    }
}

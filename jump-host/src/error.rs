//! Error types for jumpgate-host.
//!
//! Raw transport failures are [`TransportError`]s. When an [`Endpoint`]
//! fails to produce a connection or runtime client, the transport failure is
//! classified into a [`FailureKind`] and wrapped in a [`ConnectionError`]
//! that keeps the original as its source.
//!
//! [`Endpoint`]: crate::Endpoint

use std::fmt;

use thiserror::Error;

/// The closed set of reasons an endpoint can be unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The identifier could not be resolved to an address.
    NameResolution,
    /// The connection attempt exceeded its deadline.
    Timeout,
    /// Credentials were rejected.
    Authentication,
    /// Anything else.
    Unclassified,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::NameResolution => write!(f, "name resolution failure"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Authentication => write!(f, "authentication failure"),
            FailureKind::Unclassified => write!(f, "unclassified failure"),
        }
    }
}

/// Places an error in the failure taxonomy.
///
/// The failover engine uses this to log connectivity problems separately
/// from everything else; both still move on to the next candidate.
pub trait Classify {
    /// The taxonomy bucket this error belongs to.
    fn failure_kind(&self) -> FailureKind;
}

/// Errors raised by transports (SSH, local shell, Docker).
#[derive(Debug, Error)]
pub enum TransportError {
    /// Host name could not be resolved.
    #[error("could not resolve host {host}: {detail}")]
    NameResolution {
        /// Target host.
        host: String,
        /// Transport-provided detail.
        detail: String,
    },

    /// Connecting took too long.
    #[error("timed out connecting to {host}")]
    Timeout {
        /// Target host.
        host: String,
    },

    /// The host rejected our credentials.
    #[error("authentication rejected by {host}: {detail}")]
    Authentication {
        /// Target host.
        host: String,
        /// Transport-provided detail.
        detail: String,
    },

    /// Connection failed for a reason we do not classify.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A remote command returned a non-zero exit code.
    #[error("command failed on {host}: exit={exit_code}, stderr={stderr}")]
    CommandFailed {
        /// Target host.
        host: String,
        /// Exit code.
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// Uploading a file failed.
    #[error("transfer to {host} failed: {detail}")]
    TransferFailed {
        /// Target host.
        host: String,
        /// Transport-provided detail.
        detail: String,
    },

    /// Spawning a local process (ssh, scp, sh) failed.
    #[error("spawn error: {0}")]
    Spawn(#[from] std::io::Error),

    /// Docker API error.
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
}

impl TransportError {
    /// Classifies this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::NameResolution { .. } => FailureKind::NameResolution,
            TransportError::Timeout { .. } => FailureKind::Timeout,
            TransportError::Authentication { .. } => FailureKind::Authentication,
            TransportError::Spawn(e) => e.failure_kind(),
            TransportError::Docker(e) => docker_failure_kind(e),
            _ => FailureKind::Unclassified,
        }
    }
}

fn docker_failure_kind(err: &bollard::errors::Error) -> FailureKind {
    match err {
        bollard::errors::Error::RequestTimeoutError => FailureKind::Timeout,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 401 | 403,
            ..
        } => FailureKind::Authentication,
        other => chain_failure_kind(other),
    }
}

/// Classifies an error by walking its source chain.
///
/// HTTP clients wrap resolver and socket failures several layers deep, so
/// the chain is searched for a timed-out I/O error or a resolver message.
fn chain_failure_kind(err: &(dyn std::error::Error + 'static)) -> FailureKind {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return FailureKind::Timeout;
            }
        }
        let message = e.to_string().to_lowercase();
        if message.contains("dns error")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
            || message.contains("nodename nor servname")
        {
            return FailureKind::NameResolution;
        }
        if message.contains("timed out") {
            return FailureKind::Timeout;
        }
        current = e.source();
    }
    FailureKind::Unclassified
}

impl Classify for TransportError {
    fn failure_kind(&self) -> FailureKind {
        self.kind()
    }
}

impl Classify for std::io::Error {
    fn failure_kind(&self) -> FailureKind {
        match self.kind() {
            std::io::ErrorKind::TimedOut => FailureKind::Timeout,
            _ => FailureKind::Unclassified,
        }
    }
}

impl Classify for Box<dyn std::error::Error + Send + Sync> {
    fn failure_kind(&self) -> FailureKind {
        chain_failure_kind(&**self)
    }
}

/// Wraps an error type that does not implement [`Classify`].
///
/// Lets work functions return foreign errors (`anyhow::Error`, `String`,
/// library errors) from [`try_function_on_any`]; every failure is
/// [`FailureKind::Unclassified`] and still fails over.
///
/// ```ignore
/// try_function_on_any(
///     |endpoint| async move { deploy(&endpoint).await.map_err(Unclassified) },
///     &candidates,
/// )
/// ```
///
/// [`try_function_on_any`]: crate::try_function_on_any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unclassified<E>(pub E);

impl<E> Unclassified<E> {
    /// The wrapped error.
    pub fn into_inner(self) -> E {
        self.0
    }
}

impl<E> Classify for Unclassified<E> {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Unclassified
    }
}

impl<E: fmt::Display> fmt::Display for Unclassified<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for Unclassified<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// An endpoint could not produce a connection or runtime client.
#[derive(Debug, Error)]
#[error("{kind} when connecting to {endpoint}: {source}")]
pub struct ConnectionError {
    /// Identifier of the endpoint that failed.
    pub endpoint: String,
    /// Classification of the failure.
    pub kind: FailureKind,
    /// The transport failure that caused it.
    #[source]
    pub source: TransportError,
}

impl ConnectionError {
    /// Wraps a transport failure for `endpoint`, classifying it.
    pub fn new(endpoint: &str, source: TransportError) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            kind: source.kind(),
            source,
        }
    }
}

impl Classify for ConnectionError {
    fn failure_kind(&self) -> FailureKind {
        self.kind
    }
}

/// Errors from choosing an endpoint or running work with failover.
///
/// `E` is the error type of the unit of work. When every candidate fails,
/// the last candidate's error is returned unchanged in [`SelectError::Failed`].
#[derive(Debug, Error)]
pub enum SelectError<E = ConnectionError> {
    /// The candidate list was empty.
    #[error("no hosts provided")]
    NoHostsAvailable,

    /// A 1-based index override did not name a candidate.
    #[error("host index {index} out of range (have {len} hosts)")]
    IndexOutOfRange {
        /// The requested 1-based index.
        index: usize,
        /// Number of candidates.
        len: usize,
    },

    /// Every candidate failed; this is the last candidate's failure.
    #[error("{0}")]
    Failed(E),
}

impl<E> SelectError<E> {
    /// Returns the last candidate's failure, if that is what this holds.
    pub fn into_failure(self) -> Option<E> {
        match self {
            SelectError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

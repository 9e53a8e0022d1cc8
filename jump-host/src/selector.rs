//! Host selection and failover.
//!
//! [`try_function_on_any`] walks a candidate list in order and returns the
//! first candidate on which a unit of work succeeds. [`choose_from`] layers
//! the two selection policies on top of it:
//!
//! - an explicit [`HostOverride`] picks a candidate by 1-based index, or
//!   names a host outright, without any connectivity check;
//! - otherwise the candidates are shuffled and the first one that accepts a
//!   connection wins.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::endpoint::{Endpoint, LOCALHOST};
use crate::error::{Classify, FailureKind, SelectError};
use crate::transport::{DockerOptions, ShellConnection, SshOptions};

/// A caller's explicit host choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOverride {
    /// 1-based position in the candidate list.
    ByIndex(usize),
    /// A host identifier, used as-is.
    ByIdentifier(String),
}

impl HostOverride {
    /// Parses user input.
    ///
    /// Blank input means no override. All-digit input is an index (too large
    /// to represent means out of range); anything else is an identifier.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            Some(HostOverride::ByIndex(raw.parse().unwrap_or(usize::MAX)))
        } else {
            Some(HostOverride::ByIdentifier(raw.to_string()))
        }
    }
}

impl From<usize> for HostOverride {
    fn from(index: usize) -> Self {
        HostOverride::ByIndex(index)
    }
}

/// Runs `work` on each candidate in order until it succeeds.
///
/// Returns the winning candidate together with the work's result. Candidates
/// after the winner are never touched. When every candidate fails, the last
/// failure is returned unchanged in [`SelectError::Failed`].
///
/// # Errors
///
/// [`SelectError::NoHostsAvailable`] for an empty list, otherwise
/// [`SelectError::Failed`] with the last candidate's error.
pub async fn try_function_on_any<R, E, F, Fut>(
    mut work: F,
    candidates: &[Arc<Endpoint>],
) -> Result<(Arc<Endpoint>, R), SelectError<E>>
where
    F: FnMut(Arc<Endpoint>) -> Fut,
    Fut: Future<Output = Result<R, E>>,
    E: Classify + Display,
{
    let mut last_failure = None;

    for candidate in candidates {
        match work(Arc::clone(candidate)).await {
            Ok(result) => {
                debug!(host = %candidate, "work succeeded");
                return Ok((Arc::clone(candidate), result));
            }
            Err(e) => {
                match e.failure_kind() {
                    FailureKind::Unclassified => {
                        warn!(host = %candidate, error = %e, "unexpected failure on {}, trying next host", candidate)
                    }
                    kind => {
                        warn!(host = %candidate, %kind, "{} is unusable ({}), trying next host", candidate, e)
                    }
                }
                last_failure = Some(e);
            }
        }
    }

    match last_failure {
        Some(e) => {
            error!(error = %e, "unable to connect to any of {} jump hosts", candidates.len());
            Err(SelectError::Failed(e))
        }
        None => {
            error!("unable to connect to any jump hosts: no candidates");
            Err(SelectError::NoHostsAvailable)
        }
    }
}

/// Connects to the first candidate that accepts a connection.
pub async fn try_connect_to_any(
    candidates: &[Arc<Endpoint>],
) -> Result<(Arc<Endpoint>, Arc<dyn ShellConnection>), SelectError> {
    try_function_on_any(
        |endpoint: Arc<Endpoint>| async move { endpoint.connect().await },
        candidates,
    )
    .await
}

/// Picks an endpoint from `candidates`.
///
/// With an override, returns the indexed candidate or a fresh endpoint for
/// the named host, without checking connectivity. Without one, shuffles the
/// candidates and returns the first that accepts a connection.
pub async fn choose_from(
    candidates: &[Arc<Endpoint>],
    host_override: Option<HostOverride>,
) -> Result<Arc<Endpoint>, SelectError> {
    let mut rng = StdRng::from_entropy();
    choose_from_with_rng(candidates, host_override, &mut rng).await
}

/// [`choose_from`] with an explicit random source.
pub async fn choose_from_with_rng<G>(
    candidates: &[Arc<Endpoint>],
    host_override: Option<HostOverride>,
    rng: &mut G,
) -> Result<Arc<Endpoint>, SelectError>
where
    G: Rng + ?Sized,
{
    choose_with(candidates, host_override, rng, |identifier| Endpoint::new(identifier)).await
}

async fn choose_with<G>(
    candidates: &[Arc<Endpoint>],
    host_override: Option<HostOverride>,
    rng: &mut G,
    build: impl FnOnce(String) -> Endpoint,
) -> Result<Arc<Endpoint>, SelectError>
where
    G: Rng + ?Sized,
{
    match host_override {
        Some(HostOverride::ByIndex(index)) => {
            if index == 0 || index > candidates.len() {
                return Err(SelectError::IndexOutOfRange {
                    index,
                    len: candidates.len(),
                });
            }
            let endpoint = Arc::clone(&candidates[index - 1]);
            info!(host = %endpoint, index, "using host selected by index");
            Ok(endpoint)
        }
        Some(HostOverride::ByIdentifier(identifier)) => {
            info!(host = %identifier, "using host selected by name");
            Ok(Arc::new(build(identifier)))
        }
        None => {
            let mut shuffled = candidates.to_vec();
            shuffled.shuffle(rng);
            let (endpoint, _) = try_connect_to_any(&shuffled).await?;
            info!(host = %endpoint, "selected host");
            Ok(endpoint)
        }
    }
}

/// The configured candidate hosts and the transport options to reach them.
///
/// Hosts named through an override are built with the same options, so they
/// behave like configured ones.
pub struct HostPool {
    candidates: Vec<Arc<Endpoint>>,
    ssh: SshOptions,
    docker: DockerOptions,
}

impl HostPool {
    /// Pool over `identifiers`. The identifier `localhost` is the local machine.
    pub fn new(identifiers: &[String], ssh: SshOptions, docker: DockerOptions) -> Self {
        let mut pool = Self {
            candidates: Vec::with_capacity(identifiers.len()),
            ssh,
            docker,
        };
        pool.candidates = identifiers
            .iter()
            .map(|identifier| Arc::new(pool.endpoint(identifier)))
            .collect();
        pool
    }

    /// Pool built from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.hosts.candidates,
            config.ssh.clone(),
            config.docker.clone(),
        )
    }

    /// Pool over ready-made endpoints, with default transport options.
    pub fn from_endpoints(candidates: Vec<Arc<Endpoint>>) -> Self {
        Self {
            candidates,
            ssh: SshOptions::default(),
            docker: DockerOptions::default(),
        }
    }

    /// Candidate endpoints, in configured order.
    pub fn candidates(&self) -> &[Arc<Endpoint>] {
        &self.candidates
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether there are no candidates.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// A fresh endpoint for `identifier` using the pool's options.
    pub fn endpoint(&self, identifier: &str) -> Endpoint {
        if identifier == LOCALHOST {
            Endpoint::local()
        } else {
            Endpoint::with_options(identifier, &self.ssh, &self.docker)
        }
    }

    /// [`choose_from`] over this pool.
    pub async fn choose(
        &self,
        host_override: Option<HostOverride>,
    ) -> Result<Arc<Endpoint>, SelectError> {
        let mut rng = StdRng::from_entropy();
        self.choose_with_rng(host_override, &mut rng).await
    }

    /// [`HostPool::choose`] with an explicit random source.
    pub async fn choose_with_rng<G>(
        &self,
        host_override: Option<HostOverride>,
        rng: &mut G,
    ) -> Result<Arc<Endpoint>, SelectError>
    where
        G: Rng + ?Sized,
    {
        choose_with(&self.candidates, host_override, rng, |identifier| {
            self.endpoint(&identifier)
        })
        .await
    }
}

impl std::fmt::Debug for HostPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostPool")
            .field("candidates", &self.candidates)
            .field("ssh", &self.ssh)
            .field("docker", &self.docker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::ConnectionFactory;
    use crate::error::{TransportError, Unclassified};
    use crate::transport::MockShell;
    use std::collections::HashMap;
    use std::io;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    /// Log sink for asserting on emitted events.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn error_subscriber(logs: &CapturedLogs) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::ERROR)
            .finish()
    }

    /// Endpoint whose connections are `shell`; fails to open with `failure`.
    fn mock_endpoint(host: &str, failure: Option<FailureKind>) -> (Arc<Endpoint>, MockShell) {
        let shell = match failure {
            Some(kind) => MockShell::failing(host, kind),
            None => MockShell::new(host),
        };
        let handle = shell.clone();
        let factory: ConnectionFactory = Arc::new(
            move |_host: &str| -> Result<Arc<dyn ShellConnection>, TransportError> {
                Ok(Arc::new(handle.clone()))
            },
        );
        let endpoint = Endpoint::new(host).with_connection_factory(factory);
        (Arc::new(endpoint), shell)
    }

    fn identifiers(endpoints: &[Arc<Endpoint>]) -> Vec<String> {
        endpoints.iter().map(|e| e.identifier().to_string()).collect()
    }

    // ===========================================
    // Override Parsing
    // ===========================================

    #[test]
    fn parse_override() {
        assert_eq!(HostOverride::parse(""), None);
        assert_eq!(HostOverride::parse("   "), None);
        assert_eq!(HostOverride::parse("3"), Some(HostOverride::ByIndex(3)));
        assert_eq!(HostOverride::parse(" 007 "), Some(HostOverride::ByIndex(7)));
        assert_eq!(
            HostOverride::parse("my-host"),
            Some(HostOverride::ByIdentifier("my-host".into()))
        );
        assert_eq!(
            HostOverride::parse("-1"),
            Some(HostOverride::ByIdentifier("-1".into()))
        );
    }

    #[test]
    fn oversized_index_is_out_of_range_index() {
        let parsed = HostOverride::parse("99999999999999999999999999");
        assert_eq!(parsed, Some(HostOverride::ByIndex(usize::MAX)));
    }

    // ===========================================
    // Failover
    // ===========================================

    #[tokio::test]
    async fn first_success_wins_and_later_candidates_are_untouched() {
        let (bad, bad_shell) = mock_endpoint("bad", Some(FailureKind::NameResolution));
        let (good, good_shell) = mock_endpoint("good", None);
        let (later, later_shell) = mock_endpoint("later", None);

        let (winner, connection) = try_connect_to_any(&[bad, good, later]).await.unwrap();

        assert_eq!(winner.identifier(), "good");
        assert_eq!(connection.host(), "good");
        assert_eq!(bad_shell.open_calls(), 1);
        assert_eq!(good_shell.open_calls(), 1);
        assert_eq!(later_shell.open_calls(), 0);
    }

    #[tokio::test]
    async fn all_failing_surfaces_last_failure() {
        let (first, _) = mock_endpoint("bad-1", Some(FailureKind::Timeout));
        let (second, _) = mock_endpoint("bad-2", Some(FailureKind::Authentication));

        let err = try_connect_to_any(&[first, second]).await.unwrap_err();
        let failure = err.into_failure().expect("last failure");

        assert_eq!(failure.endpoint, "bad-2");
        assert_eq!(failure.kind, FailureKind::Authentication);
    }

    #[tokio::test]
    async fn exhausted_candidates_log_an_error() {
        let logs = CapturedLogs::default();
        let _guard = tracing::subscriber::set_default(error_subscriber(&logs));

        let (first, _) = mock_endpoint("bad-1", Some(FailureKind::Timeout));
        let (second, _) = mock_endpoint("bad-2", Some(FailureKind::NameResolution));
        try_connect_to_any(&[first, second]).await.unwrap_err();

        let output = logs.contents();
        assert!(output.contains("ERROR"), "{}", output);
        assert!(
            output.contains("unable to connect to any of 2 jump hosts"),
            "{}",
            output
        );
    }

    #[tokio::test]
    async fn empty_candidate_list_logs_an_error() {
        let logs = CapturedLogs::default();
        let _guard = tracing::subscriber::set_default(error_subscriber(&logs));

        try_connect_to_any(&[]).await.unwrap_err();

        assert!(logs
            .contents()
            .contains("unable to connect to any jump hosts: no candidates"));
    }

    #[tokio::test]
    async fn foreign_errors_fail_over_when_wrapped() {
        let candidates: Vec<_> = ["a", "b"]
            .iter()
            .map(|host| mock_endpoint(host, None).0)
            .collect();

        let (winner, value) = try_function_on_any(
            |endpoint: Arc<Endpoint>| async move {
                if endpoint.identifier() == "a" {
                    Err(Unclassified(io::Error::new(
                        io::ErrorKind::Other,
                        "rejected by a",
                    )))
                } else {
                    Ok(7)
                }
            },
            &candidates,
        )
        .await
        .unwrap();
        assert_eq!(winner.identifier(), "b");
        assert_eq!(value, 7);

        let err = try_function_on_any(
            |_endpoint: Arc<Endpoint>| async move {
                Err::<(), _>(Unclassified(String::from("nope")))
            },
            &candidates,
        )
        .await
        .unwrap_err();
        let failure = err.into_failure().unwrap();
        assert_eq!(failure.failure_kind(), FailureKind::Unclassified);
        assert_eq!(failure.to_string(), "nope");
        assert_eq!(failure.into_inner(), "nope");
    }

    #[tokio::test]
    async fn empty_candidate_list() {
        let err = try_connect_to_any(&[]).await.unwrap_err();
        assert!(matches!(err, SelectError::NoHostsAvailable));

        let err = choose_from(&[], None).await.unwrap_err();
        assert!(matches!(err, SelectError::NoHostsAvailable));
    }

    #[tokio::test]
    async fn candidates_are_tried_in_order_once_each() {
        let candidates: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|host| mock_endpoint(host, None).0)
            .collect();
        let visited = Mutex::new(Vec::new());

        let err = try_function_on_any(
            |endpoint: Arc<Endpoint>| {
                visited.lock().unwrap().push(endpoint.identifier().to_string());
                async move {
                    Err::<(), _>(TransportError::ConnectionFailed(format!(
                        "{} is busy",
                        endpoint
                    )))
                }
            },
            &candidates,
        )
        .await
        .unwrap_err();

        assert_eq!(*visited.lock().unwrap(), vec!["a", "b", "c"]);
        let failure = err.into_failure().unwrap();
        assert_eq!(failure.to_string(), "connection failed: c is busy");
    }

    #[tokio::test]
    async fn work_result_is_returned_with_winner() {
        let candidates: Vec<_> = ["a", "b"]
            .iter()
            .map(|host| mock_endpoint(host, None).0)
            .collect();

        let (winner, length) = try_function_on_any(
            |endpoint: Arc<Endpoint>| async move {
                if endpoint.identifier() == "a" {
                    Err(TransportError::Timeout {
                        host: endpoint.identifier().to_string(),
                    })
                } else {
                    Ok(endpoint.identifier().len())
                }
            },
            &candidates,
        )
        .await
        .unwrap();

        assert_eq!(winner.identifier(), "b");
        assert_eq!(length, 1);
    }

    // ===========================================
    // Selection
    // ===========================================

    #[tokio::test]
    async fn index_override_skips_connectivity_check() {
        let (broken, broken_shell) = mock_endpoint("broken", Some(FailureKind::Timeout));
        let (other, _) = mock_endpoint("other", None);
        let candidates = vec![broken, other];

        let chosen = choose_from(&candidates, Some(HostOverride::ByIndex(1))).await.unwrap();

        assert!(Arc::ptr_eq(&chosen, &candidates[0]));
        assert_eq!(broken_shell.open_calls(), 0);
    }

    #[tokio::test]
    async fn string_index_behaves_like_integer() {
        let candidates: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|host| mock_endpoint(host, None).0)
            .collect();

        let by_string = choose_from(&candidates, HostOverride::parse("3"))
            .await
            .unwrap();
        let by_int = choose_from(&candidates, Some(HostOverride::ByIndex(3))).await.unwrap();

        assert!(Arc::ptr_eq(&by_string, &candidates[2]));
        assert!(Arc::ptr_eq(&by_int, &candidates[2]));
    }

    #[tokio::test]
    async fn out_of_range_index() {
        let candidates: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|host| mock_endpoint(host, None).0)
            .collect();

        for index in [0, 4, usize::MAX] {
            let err = choose_from(&candidates, Some(index.into()))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                SelectError::IndexOutOfRange { index: i, len: 3 } if i == index
            ));
        }
    }

    #[tokio::test]
    async fn identifier_override_builds_fresh_endpoint() {
        let (a, a_shell) = mock_endpoint("a", None);

        let chosen = choose_from(&[a], HostOverride::parse("some-host"))
            .await
            .unwrap();

        assert_eq!(chosen.identifier(), "some-host");
        assert!(!chosen.is_local());
        assert_eq!(a_shell.open_calls(), 0);
    }

    #[tokio::test]
    async fn single_good_host_always_chosen() {
        let candidates = vec![
            mock_endpoint("dns", Some(FailureKind::NameResolution)).0,
            mock_endpoint("slow", Some(FailureKind::Timeout)).0,
            mock_endpoint("good", None).0,
            mock_endpoint("locked", Some(FailureKind::Authentication)).0,
            mock_endpoint("flaky", Some(FailureKind::Unclassified)).0,
        ];

        for _ in 0..100 {
            let chosen = choose_from(&candidates, None).await.unwrap();
            assert_eq!(chosen.identifier(), "good");
        }
    }

    #[tokio::test]
    async fn random_selection_spreads_over_healthy_hosts() {
        let candidates: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|host| mock_endpoint(host, None).0)
            .collect();
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts: HashMap<String, usize> = HashMap::new();

        for _ in 0..300 {
            let chosen = choose_from_with_rng(&candidates, None, &mut rng)
                .await
                .unwrap();
            *counts.entry(chosen.identifier().to_string()).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&n| n > 50), "skewed: {:?}", counts);
    }

    #[tokio::test]
    async fn shuffling_leaves_caller_list_untouched() {
        let candidates: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|host| mock_endpoint(host, None).0)
            .collect();
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..10 {
            choose_from_with_rng(&candidates, None, &mut rng)
                .await
                .unwrap();
        }

        assert_eq!(identifiers(&candidates), vec!["a", "b", "c", "d"]);
    }

    // ===========================================
    // Host Pool
    // ===========================================

    #[test]
    fn pool_maps_localhost_to_local_endpoint() {
        let pool = HostPool::new(
            &["localhost".to_string(), "build-1".to_string()],
            SshOptions::default(),
            DockerOptions::default(),
        );

        assert_eq!(pool.len(), 2);
        assert!(pool.candidates()[0].is_local());
        assert!(!pool.candidates()[1].is_local());
        assert_eq!(identifiers(pool.candidates()), vec!["localhost", "build-1"]);
    }

    #[tokio::test]
    async fn pool_identifier_override_uses_pool_rules() {
        let pool = HostPool::new(&[], SshOptions::default(), DockerOptions::default());
        assert!(pool.is_empty());

        let chosen = pool
            .choose(HostOverride::parse("localhost"))
            .await
            .unwrap();
        assert!(chosen.is_local());

        let chosen = pool.choose(HostOverride::parse("build-9")).await.unwrap();
        assert_eq!(chosen.identifier(), "build-9");
    }

    #[tokio::test]
    async fn pool_fails_over_to_local_host() {
        let (bad, _) = mock_endpoint("bad", Some(FailureKind::Timeout));
        let pool = HostPool::from_endpoints(vec![bad, Arc::new(Endpoint::local())]);

        for _ in 0..10 {
            let chosen = pool.choose(None).await.unwrap();
            assert!(chosen.is_local());
        }
    }
}

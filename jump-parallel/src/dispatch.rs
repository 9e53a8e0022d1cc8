//! Fan-out dispatcher.
//!
//! Every input gets its own worker. Blocking work runs on a dedicated OS
//! thread per input, so the fan-out is never capped by a pool size; async
//! work is spawned with `tokio::spawn`. Either way the dispatcher waits for
//! every worker before it returns.
//!
//! Outcomes are keyed by input value. Duplicate inputs collapse into one
//! entry holding the outcome of the later input position.

use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use futures_util::future::join_all;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::TaskFailure;

/// What the dispatcher does when a task fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record the failure as that input's outcome.
    #[default]
    Collect,
    /// Fail the whole dispatch with the first failure in input order.
    FailFast,
}

impl FailurePolicy {
    /// Maps a "return failures as values" flag onto a policy.
    pub fn from_return_failures(return_failures_as_values: bool) -> Self {
        if return_failures_as_values {
            FailurePolicy::Collect
        } else {
            FailurePolicy::FailFast
        }
    }
}

/// Per-input outcomes of a fan-out.
pub type Outcomes<T, R, E> = HashMap<T, Result<R, TaskFailure<E>>>;

type TaskResult<R, E> = Result<R, TaskFailure<E>>;

/// Runs blocking `work` once per input, concurrently.
///
/// Each call gets its own OS thread, so `work` may sleep, block on I/O, or
/// burn CPU without stalling the runtime, and N inputs take about as long
/// as the slowest one however large N is.
///
/// With [`FailurePolicy::Collect`] this always returns `Ok`. With
/// [`FailurePolicy::FailFast`] any failure fails the dispatch, and the
/// returned map then only ever holds successes.
pub async fn run_in_parallel<T, R, E, F>(
    inputs: impl IntoIterator<Item = T>,
    work: F,
    policy: FailurePolicy,
) -> Result<Outcomes<T, R, E>, TaskFailure<E>>
where
    T: Eq + Hash + Clone + Debug + Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let tasks = inputs
        .into_iter()
        .enumerate()
        .map(|(position, input)| {
            let task = spawn_thread(position, Arc::clone(&work), input.clone());
            (input, task)
        })
        .collect();

    gather(tasks, policy).await
}

/// Starts `work(arg)` on its own thread and returns a future for its outcome.
fn spawn_thread<T, R, E, F>(
    position: usize,
    work: Arc<F>,
    arg: T,
) -> impl Future<Output = TaskResult<R, E>>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
{
    let (tx, rx) = oneshot::channel();
    let started = thread::Builder::new()
        .name(format!("fan-out-{}", position))
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(arg)));
            // The receiver only goes away if the dispatch itself was dropped.
            let _ = tx.send(outcome);
        });

    async move {
        if let Err(e) = started {
            warn!(position, error = %e, "could not start fan-out thread");
            return Err(TaskFailure::NotStarted(e.to_string()));
        }
        match rx.await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(TaskFailure::Failed(e)),
            Ok(Err(payload)) => Err(TaskFailure::from_panic(payload)),
            Err(_) => Err(TaskFailure::Cancelled),
        }
    }
}

/// Runs async `work` once per input, concurrently.
///
/// Both the call to `work` and the future it returns run inside a separate
/// tokio task, so a panic in either is captured as that input's failure.
pub async fn run_async_in_parallel<T, R, E, F, Fut>(
    inputs: impl IntoIterator<Item = T>,
    work: F,
    policy: FailurePolicy,
) -> Result<Outcomes<T, R, E>, TaskFailure<E>>
where
    T: Eq + Hash + Clone + Debug + Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let work = Arc::new(work);
    let tasks = inputs
        .into_iter()
        .map(|input| {
            let work = Arc::clone(&work);
            let arg = input.clone();
            let handle = tokio::spawn(async move { work(arg).await });
            let task = async move {
                match handle.await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(TaskFailure::Failed(e)),
                    Err(join_error) => Err(TaskFailure::from_join_error(join_error)),
                }
            };
            (input, task)
        })
        .collect();

    gather(tasks, policy).await
}

/// Fail-fast form of [`run_in_parallel`] returning plain values.
pub async fn try_run_in_parallel<T, R, E, F>(
    inputs: impl IntoIterator<Item = T>,
    work: F,
) -> Result<HashMap<T, R>, TaskFailure<E>>
where
    T: Eq + Hash + Clone + Debug + Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
{
    let outcomes = run_in_parallel(inputs, work, FailurePolicy::FailFast).await?;
    Ok(successes(outcomes))
}

/// Fail-fast form of [`run_async_in_parallel`] returning plain values.
pub async fn try_run_async_in_parallel<T, R, E, F, Fut>(
    inputs: impl IntoIterator<Item = T>,
    work: F,
) -> Result<HashMap<T, R>, TaskFailure<E>>
where
    T: Eq + Hash + Clone + Debug + Send + 'static,
    R: Send + 'static,
    E: Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let outcomes = run_async_in_parallel(inputs, work, FailurePolicy::FailFast).await?;
    Ok(successes(outcomes))
}

fn successes<T: Eq + Hash, R, E>(outcomes: Outcomes<T, R, E>) -> HashMap<T, R> {
    outcomes
        .into_iter()
        .filter_map(|(input, outcome)| outcome.ok().map(|value| (input, value)))
        .collect()
}

/// Awaits every task, then folds the results in input order.
async fn gather<T, R, E, Fut>(
    tasks: Vec<(T, Fut)>,
    policy: FailurePolicy,
) -> Result<Outcomes<T, R, E>, TaskFailure<E>>
where
    T: Eq + Hash + Debug,
    E: Display,
    Fut: Future<Output = TaskResult<R, E>>,
{
    let (inputs, tasks): (Vec<T>, Vec<Fut>) = tasks.into_iter().unzip();
    debug!(tasks = inputs.len(), ?policy, "waiting for fan-out tasks");

    let finished = join_all(tasks).await;

    let mut outcomes = HashMap::with_capacity(inputs.len());
    let mut first_failure = None;

    for (input, outcome) in inputs.into_iter().zip(finished) {
        match outcome {
            Err(failure) if policy == FailurePolicy::FailFast => {
                warn!(input = ?input, "fan-out task failed: {}", failure);
                if first_failure.is_none() {
                    first_failure = Some(failure);
                }
            }
            outcome => {
                if let Err(failure) = &outcome {
                    warn!(input = ?input, "fan-out task failed: {}", failure);
                }
                outcomes.insert(input, outcome);
            }
        }
    }

    match first_failure {
        Some(failure) => Err(failure),
        None => Ok(outcomes),
    }
}

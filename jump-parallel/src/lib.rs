//! # jumpgate-parallel
//!
//! Run the same operation once per input, concurrently, and collect the
//! outcome for every input.
//!
//! There is one task per input (no fixed-size pool), so a fan-out over N hosts
//! takes about as long as the slowest host rather than the sum of all of them.
//!
//! ## Failure policies
//!
//! - [`FailurePolicy::Collect`]: a failing input records its failure as its
//!   outcome and the other inputs are unaffected.
//! - [`FailurePolicy::FailFast`]: the whole dispatch fails. All in-flight
//!   tasks are still awaited first, and the failure reported is the one from
//!   the lowest input position among the failed tasks.
//!
//! ## Example
//!
//! ```ignore
//! use jumpgate_parallel::{run_in_parallel, FailurePolicy};
//!
//! let squares = run_in_parallel(
//!     vec![1, 2, 4, 5],
//!     |x: i32| Ok::<_, std::convert::Infallible>(x * x),
//!     FailurePolicy::Collect,
//! )
//! .await?;
//! assert_eq!(squares[&4].as_ref().ok(), Some(&16));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatch;
pub mod error;

pub use dispatch::{
    run_async_in_parallel, run_in_parallel, try_run_async_in_parallel, try_run_in_parallel,
    FailurePolicy, Outcomes,
};
pub use error::TaskFailure;

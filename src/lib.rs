//! Eventual: a settle-once eventual value for Rust hosts
//!
//! A [`Promise`] starts pending, settles exactly once to a value or a
//! reason, and runs the reactions attached with [`Promise::then`] later,
//! in attachment order, on a microtask [`Scheduler`](event_loop::Scheduler).
//! Values with the [`HasThen`] capability are followed when a promise is
//! resolved with them, so foreign promise-like types interoperate.
//!
//! # Quick Start
//!
//! ```
//! use eventual::{Handler, Promise, Runtime, Value};
//!
//! fn main() -> eventual::Result<()> {
//!     let runtime = Runtime::new();
//!     let sum = Promise::all(vec![Promise::resolve(1), Promise::resolve(2)]).then(
//!         Some(Handler::new(|values| {
//!             let total: f64 = values
//!                 .as_array()
//!                 .unwrap_or_default()
//!                 .iter()
//!                 .filter_map(Value::as_number)
//!                 .sum();
//!             Ok(Value::from(total))
//!         })),
//!         None,
//!     );
//!     assert_eq!(runtime.block_on(&sum)?, Value::from(3));
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`runtime`] | [`Promise`], [`Value`], [`HasThen`], combinators, [`Runtime`] |
//! | [`event_loop`] | `Scheduler` contract, [`EventLoop`](event_loop::EventLoop), per-thread default |
//! | [`error`](Error) | [`Error`], [`FailureKind`], [`Result`] |

pub mod event_loop;
pub mod prelude;
pub mod runtime;

mod error;

pub use error::{Error, FailureKind, Result};
pub use event_loop::{EventLoop, EventLoopConfig, RunResult, Scheduler};
pub use runtime::{
    aggregate_error, Deferred, Handler, HasThen, Promise, PromiseState, RejectFn, ResolveFn,
    Runtime, SettledOutcome, Value,
};

/// Eventual version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Queue `task` on the current thread's scheduler
pub fn queue_microtask<F: FnOnce() + 'static>(task: F) {
    event_loop::current_scheduler().schedule(Box::new(task));
}

/// Drain the current thread's default event loop
pub fn run_microtasks() -> Result<usize> {
    event_loop::default_event_loop().run_microtasks()
}

/// Run the current thread's default event loop until it is idle
pub fn run_to_completion() -> Result<RunResult> {
    event_loop::default_event_loop().run_to_completion()
}

//! Runtime environment for eventual
//!
//! This module provides the promise state machine, the values promises
//! carry, the combinators, and a small `Runtime` host that owns an event
//! loop and drives it.

mod combinators;
mod promise;
mod value;

pub use combinators::{aggregate_error, SettledOutcome};
pub use promise::{Deferred, Promise, PromiseState, RejectFn, ResolveFn};
pub use value::{Handler, HasThen, Value};

use crate::error::{Error, Result};
use crate::event_loop::{set_scheduler, EventLoop, EventLoopConfig, RunResult, SchedulerGuard};
use std::rc::Rc;

/// A host for promises created on the current thread.
///
/// While a `Runtime` is alive its event loop is the thread's scheduler, so
/// every promise created in the meantime queues its reactions there. Drop
/// nested runtimes in reverse order of creation.
pub struct Runtime {
    event_loop: Rc<EventLoop>,
    _guard: SchedulerGuard,
}

impl Runtime {
    /// Create a new runtime with the default configuration
    pub fn new() -> Self {
        Self::with_config(EventLoopConfig::default())
    }

    /// Create a new runtime with an explicit event loop configuration
    pub fn with_config(config: EventLoopConfig) -> Self {
        let event_loop = Rc::new(EventLoop::with_config(config));
        let guard = set_scheduler(event_loop.clone());
        Self {
            event_loop,
            _guard: guard,
        }
    }

    /// The event loop reactions are queued on
    pub fn event_loop(&self) -> &Rc<EventLoop> {
        &self.event_loop
    }

    /// Run microtasks and tasks until both queues are empty
    pub fn run(&self) -> Result<RunResult> {
        self.event_loop.run_to_completion()
    }

    /// Run the loop to completion and report how `promise` settled.
    ///
    /// A rejection comes back as `Error::Thrown` carrying the reason.
    pub fn block_on(&self, promise: &Promise) -> Result<Value> {
        self.run()?;
        match (promise.state(), promise.result()) {
            (PromiseState::Fulfilled, Some(value)) => Ok(value),
            (PromiseState::Rejected, Some(reason)) => Err(Error::Thrown(reason)),
            _ => Err(Error::type_error(format!(
                "promise #{} is still pending after the event loop went idle",
                promise.id()
            ))),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

//! Prelude module for convenient imports
//!
//! This module provides the most commonly used types and traits for working
//! with eventual. Import everything from this module for quick access:
//!
//! ```
//! use eventual::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let runtime = Runtime::new();
//!     let promise = Promise::reject("oops").catch(Some(Handler::new(|_| Ok(Value::from("recovered")))));
//!     assert_eq!(runtime.block_on(&promise)?, Value::from("recovered"));
//!     Ok(())
//! }
//! ```

// Promises and values
pub use crate::runtime::{
    Deferred, Handler, HasThen, Promise, PromiseState, RejectFn, ResolveFn, Runtime,
    SettledOutcome, Value,
};

// Scheduling
pub use crate::event_loop::{
    current_scheduler, default_event_loop, set_scheduler, EventLoop, EventLoopConfig, Scheduler,
    SchedulerGuard,
};

// Error handling
pub use crate::error::{Error, FailureKind, Result};

// Version constant
pub use crate::VERSION;

//! Shared test helpers for integration tests

#![allow(dead_code)]

use eventual::event_loop::{set_scheduler, SchedulerGuard};
use eventual::{EventLoop, Handler, Value};
use std::cell::RefCell;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

/// A private event loop installed as this thread's scheduler
pub struct TestLoop {
    pub event_loop: Rc<EventLoop>,
    _guard: SchedulerGuard,
}

impl TestLoop {
    /// Run every queued microtask
    pub fn drain(&self) -> usize {
        self.event_loop
            .run_microtasks()
            .expect("microtask limit exceeded")
    }
}

/// Install a fresh event loop for the current test
pub fn test_loop() -> TestLoop {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let event_loop = Rc::new(EventLoop::new());
    let guard = set_scheduler(event_loop.clone());
    TestLoop {
        event_loop,
        _guard: guard,
    }
}

/// Ordered log of events shared between handlers
#[derive(Clone, Default)]
pub struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    /// Handler that records `name:value` and passes the value on
    pub fn tap(&self, name: &'static str) -> Handler {
        let log = self.clone();
        Handler::new(move |value| {
            log.push(format!("{}:{}", name, value));
            Ok(value)
        })
    }
}

/// Handler that maps a number through `f`
pub fn map_number(f: fn(f64) -> f64) -> Handler {
    Handler::new(move |value| Ok(Value::from(f(value.as_number().unwrap_or(f64::NAN)))))
}

/// Handler that returns a constant
pub fn constant(value: impl Into<Value>) -> Handler {
    let value = value.into();
    Handler::new(move |_| Ok(value.clone()))
}

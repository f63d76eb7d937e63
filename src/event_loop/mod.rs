//! Event Loop Implementation
//!
//! This module provides the scheduling contract promises depend on and the
//! default implementation of it: a host-driven event loop with a microtask
//! queue (promise reactions, `queue_microtask`) and a lower-priority task
//! queue. Microtasks always drain completely before the next task runs.
//!
//! Every thread has its own default loop. `set_scheduler` installs a
//! different scheduler for the current thread until the returned guard is
//! dropped, which is how tests get a private, deterministic queue.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// A unit of deferred work
pub type Microtask = Box<dyn FnOnce()>;

/// Defers callbacks until the current synchronous run has returned.
///
/// Implementations must invoke each task exactly once, in the order
/// scheduled, and before any lower-priority deferred work.
pub trait Scheduler {
    /// Queue `task` to run later
    fn schedule(&self, task: Microtask);
}

/// Event loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLoopConfig {
    /// Microtasks run by one drain pass before it yields back to the caller
    pub max_microtasks_per_tick: usize,
    /// Optional runaway guard: the most microtasks one `run_microtasks`
    /// call may run. `None` drains without limit.
    pub microtask_limit: Option<usize>,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            max_microtasks_per_tick: 10_000,
            microtask_limit: None,
        }
    }
}

impl EventLoopConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the drain pass size (at least one task per pass)
    pub fn with_microtasks_per_tick(mut self, count: usize) -> Self {
        self.max_microtasks_per_tick = count.max(1);
        self
    }

    /// Turn on the runaway guard
    pub fn with_microtask_limit(mut self, limit: usize) -> Self {
        self.microtask_limit = Some(limit.max(1));
        self
    }
}

/// Result of running the event loop to completion via `run_to_completion()`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// Total number of microtasks that were dequeued and processed
    pub microtasks_processed: usize,
    /// Total number of tasks that were dequeued and processed
    pub tasks_processed: usize,
    /// Number of loop iterations (each iteration = drain microtasks + one task)
    pub iterations: usize,
}

/// Runtime statistics for the event loop
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EventLoopStats {
    /// Total microtasks processed across all ticks
    pub total_microtasks: u64,
    /// Total tasks processed
    pub total_tasks: u64,
    /// Total number of drain passes
    pub total_ticks: u64,
    /// Maximum microtasks drained in a single pass
    pub max_microtasks_per_tick: u64,
}

#[derive(Default)]
struct Queues {
    /// Microtask queue (high priority - drains before every task)
    microtasks: VecDeque<Microtask>,
    /// Task queue (lower priority deferred work)
    tasks: VecDeque<Microtask>,
    stats: EventLoopStats,
}

/// The event loop manages task queues and execution order.
///
/// Queues are only borrowed to push or pop, never while a task runs, so
/// tasks may freely schedule more work on the same loop.
pub struct EventLoop {
    config: EventLoopConfig,
    queues: RefCell<Queues>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Create a new event loop
    pub fn new() -> Self {
        Self::with_config(EventLoopConfig::default())
    }

    /// Create a new event loop with an explicit configuration
    pub fn with_config(config: EventLoopConfig) -> Self {
        Self {
            config,
            queues: RefCell::new(Queues::default()),
        }
    }

    /// The configuration this loop was built with
    pub fn config(&self) -> &EventLoopConfig {
        &self.config
    }

    /// Enqueue a microtask
    pub fn queue_microtask<F: FnOnce() + 'static>(&self, task: F) {
        self.queues.borrow_mut().microtasks.push_back(Box::new(task));
    }

    /// Enqueue a task; it runs only once the microtask queue is empty
    pub fn enqueue_task<F: FnOnce() + 'static>(&self, task: F) {
        self.queues.borrow_mut().tasks.push_back(Box::new(task));
    }

    /// Check if there are pending microtasks
    pub fn has_pending_microtasks(&self) -> bool {
        !self.queues.borrow().microtasks.is_empty()
    }

    /// Check if there are pending tasks
    pub fn has_pending_tasks(&self) -> bool {
        !self.queues.borrow().tasks.is_empty()
    }

    /// Check if the event loop has any pending work
    pub fn has_pending_work(&self) -> bool {
        self.has_pending_microtasks() || self.has_pending_tasks()
    }

    /// Number of queued microtasks
    pub fn pending_microtasks(&self) -> usize {
        self.queues.borrow().microtasks.len()
    }

    fn pop_microtask(&self) -> Option<Microtask> {
        self.queues.borrow_mut().microtasks.pop_front()
    }

    fn pop_task(&self) -> Option<Microtask> {
        self.queues.borrow_mut().tasks.pop_front()
    }

    fn record_tick(&self, ran: usize) {
        let mut queues = self.queues.borrow_mut();
        let stats = &mut queues.stats;
        stats.total_ticks += 1;
        stats.total_microtasks += ran as u64;
        stats.max_microtasks_per_tick = stats.max_microtasks_per_tick.max(ran as u64);
    }

    /// Run the oldest microtask, if any. Returns whether one ran.
    pub fn run_next_microtask(&self) -> bool {
        match self.pop_microtask() {
            Some(task) => {
                task();
                self.queues.borrow_mut().stats.total_microtasks += 1;
                true
            }
            None => false,
        }
    }

    /// Run one drain pass of at most `max_microtasks_per_tick` microtasks.
    ///
    /// Returns how many ran. Microtasks beyond the pass size stay queued
    /// for the next pass, so a host can interleave its own work.
    pub fn drain_microtasks(&self) -> usize {
        self.drain_pass(self.config.max_microtasks_per_tick)
    }

    fn drain_pass(&self, max: usize) -> usize {
        let max = max.max(1);
        let mut ran = 0;

        while ran < max {
            let Some(task) = self.pop_microtask() else {
                break;
            };
            task();
            ran += 1;
        }

        self.record_tick(ran);
        ran
    }

    /// Drain the microtask queue, including microtasks queued while draining.
    ///
    /// Returns the number of microtasks run. Drain passes repeat until the
    /// queue is empty. With a `microtask_limit` configured, stops with
    /// `Error::MicrotaskLimitExceeded` once the limit is spent while work
    /// remains; the remainder stays queued.
    pub fn run_microtasks(&self) -> Result<usize> {
        let mut ran = 0;

        while self.has_pending_microtasks() {
            let pass = match self.config.microtask_limit {
                Some(limit) => self.config.max_microtasks_per_tick.min(limit - ran),
                None => self.config.max_microtasks_per_tick,
            };
            ran += self.drain_pass(pass);
            if let Some(limit) = self.config.microtask_limit {
                if ran >= limit && self.has_pending_microtasks() {
                    tracing::warn!(
                        limit,
                        pending = self.pending_microtasks(),
                        "microtask limit exceeded"
                    );
                    return Err(Error::MicrotaskLimitExceeded { limit });
                }
            }
        }

        if ran > 0 {
            tracing::trace!(ran, "microtask queue drained");
        }
        Ok(ran)
    }

    /// Run the event loop until no microtasks and no tasks remain.
    ///
    /// Each iteration:
    ///   1. Drain all microtasks
    ///   2. Run one task, if any
    ///   3. Repeat from step 1
    pub fn run_to_completion(&self) -> Result<RunResult> {
        let mut result = RunResult::default();

        loop {
            result.microtasks_processed += self.run_microtasks()?;

            let Some(task) = self.pop_task() else {
                break;
            };
            task();
            self.queues.borrow_mut().stats.total_tasks += 1;
            result.tasks_processed += 1;
            result.iterations += 1;
        }

        tracing::debug!(
            microtasks = result.microtasks_processed,
            tasks = result.tasks_processed,
            "event loop idle"
        );
        Ok(result)
    }

    /// Clear all pending work
    pub fn clear(&self) {
        let mut queues = self.queues.borrow_mut();
        queues.microtasks.clear();
        queues.tasks.clear();
    }

    /// Get a snapshot of the current event loop statistics.
    pub fn stats(&self) -> EventLoopStats {
        self.queues.borrow().stats.clone()
    }

    /// Reset all event loop statistics to zero.
    pub fn reset_stats(&self) {
        self.queues.borrow_mut().stats = EventLoopStats::default();
    }
}

impl Scheduler for EventLoop {
    fn schedule(&self, task: Microtask) {
        self.queues.borrow_mut().microtasks.push_back(task);
    }
}

thread_local! {
    static DEFAULT_LOOP: Rc<EventLoop> = Rc::new(EventLoop::new());
    static SCHEDULER_OVERRIDE: RefCell<Option<Rc<dyn Scheduler>>> = const { RefCell::new(None) };
}

/// The current thread's default event loop
pub fn default_event_loop() -> Rc<EventLoop> {
    DEFAULT_LOOP.with(Rc::clone)
}

/// The scheduler new promises on this thread will use
pub fn current_scheduler() -> Rc<dyn Scheduler> {
    SCHEDULER_OVERRIDE
        .with(|slot| slot.borrow().clone())
        .unwrap_or_else(|| default_event_loop() as Rc<dyn Scheduler>)
}

/// Restores the previous scheduler when dropped
#[must_use = "the scheduler override ends when the guard is dropped"]
pub struct SchedulerGuard {
    previous: Option<Rc<dyn Scheduler>>,
}

impl Drop for SchedulerGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        SCHEDULER_OVERRIDE.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Make `scheduler` the current thread's scheduler until the guard drops
pub fn set_scheduler(scheduler: Rc<dyn Scheduler>) -> SchedulerGuard {
    let previous = SCHEDULER_OVERRIDE.with(|slot| slot.borrow_mut().replace(scheduler));
    SchedulerGuard { previous }
}

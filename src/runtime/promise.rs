//! Promise implementation
//!
//! A `Promise` starts pending, settles exactly once to a value or a reason,
//! and runs the reactions attached through `then` on the scheduler it was
//! created with, in attachment order and never synchronously.

use super::value::{Handler, HasThen, Value};
use crate::error::{Error, FailureKind, Result};
use crate::event_loop::{current_scheduler, Scheduler};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// ID counter for promise tracking in log events
static PROMISE_ID: AtomicU64 = AtomicU64::new(1);

/// Promise state
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PromiseState {
    /// Not yet settled
    Pending,
    /// Settled with a value
    Fulfilled,
    /// Settled with a reason
    Rejected,
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromiseState::Pending => write!(f, "pending"),
            PromiseState::Fulfilled => write!(f, "fulfilled"),
            PromiseState::Rejected => write!(f, "rejected"),
        }
    }
}

/// The outcome of a settled promise, as handed to its reactions
#[derive(Clone)]
enum Outcome {
    Fulfilled(Value),
    Rejected(Value),
}

impl Outcome {
    fn state(&self) -> PromiseState {
        match self {
            Outcome::Fulfilled(_) => PromiseState::Fulfilled,
            Outcome::Rejected(_) => PromiseState::Rejected,
        }
    }
}

/// A reaction queued by `then`
struct Reaction {
    on_fulfilled: Option<Handler>,
    on_rejected: Option<Handler>,
    /// Settlement functions of the promise `then` returned
    resolve: ResolveFn,
    reject: RejectFn,
}

impl Reaction {
    fn run(self, outcome: Outcome) {
        // No handler: pass the outcome straight through
        let next = match outcome {
            Outcome::Fulfilled(value) => match &self.on_fulfilled {
                Some(handler) => handler.call(value),
                None => return self.resolve.call(value),
            },
            Outcome::Rejected(reason) => match &self.on_rejected {
                Some(handler) => handler.call(reason),
                None => return self.reject.call(reason),
            },
        };

        match next {
            Ok(value) => self.resolve.call(value),
            Err(err) => {
                tracing::debug!(
                    kind = %FailureKind::Handler,
                    promise = self.reject.promise.id(),
                    error = %err,
                    "reaction handler failed"
                );
                self.reject.call(err.into_reason());
            }
        }
    }
}

struct PromiseInner {
    id: u64,
    state: PromiseState,
    /// Written once, on settlement
    result: Option<Value>,
    reactions: VecDeque<Reaction>,
    scheduler: Rc<dyn Scheduler>,
}

impl PromiseInner {
    /// `None` while pending
    fn outcome(&self) -> Option<Outcome> {
        let result = self.result.clone()?;
        match self.state {
            PromiseState::Pending => None,
            PromiseState::Fulfilled => Some(Outcome::Fulfilled(result)),
            PromiseState::Rejected => Some(Outcome::Rejected(result)),
        }
    }
}

/// A settle-once eventual value.
///
/// Cloning is cheap and yields another handle to the same promise.
#[derive(Clone)]
pub struct Promise {
    inner: Rc<RefCell<PromiseInner>>,
}

/// The `resolve` function handed to an executor
#[derive(Clone)]
pub struct ResolveFn {
    promise: Promise,
}

impl ResolveFn {
    /// Resolve the bound promise. No-op once it has settled.
    pub fn call(&self, value: impl Into<Value>) {
        self.promise.resolve_value(value.into());
    }
}

impl fmt::Debug for ResolveFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ResolveFn #{}]", self.promise.id())
    }
}

impl From<ResolveFn> for Handler {
    fn from(resolve: ResolveFn) -> Self {
        Handler::new(move |value| {
            resolve.call(value);
            Ok(Value::Undefined)
        })
    }
}

/// The `reject` function handed to an executor
#[derive(Clone)]
pub struct RejectFn {
    promise: Promise,
}

impl RejectFn {
    /// Reject the bound promise. No-op once it has settled.
    pub fn call(&self, reason: impl Into<Value>) {
        self.promise.reject_value(reason.into());
    }
}

impl fmt::Debug for RejectFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[RejectFn #{}]", self.promise.id())
    }
}

impl From<RejectFn> for Handler {
    fn from(reject: RejectFn) -> Self {
        Handler::new(move |reason| {
            reject.call(reason);
            Ok(Value::Undefined)
        })
    }
}

/// A pending promise together with its settlement functions
#[derive(Debug, Clone)]
pub struct Deferred {
    pub promise: Promise,
    pub resolve: ResolveFn,
    pub reject: RejectFn,
}

impl Promise {
    /// Create a promise and run `executor` synchronously.
    ///
    /// If the executor returns `Err`, the promise is rejected with the
    /// error's reason, unless the executor already settled it.
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(ResolveFn, RejectFn) -> Result<()>,
    {
        Self::new_in(current_scheduler(), executor)
    }

    /// Create a promise whose reactions run on `scheduler`
    pub fn new_in<F>(scheduler: Rc<dyn Scheduler>, executor: F) -> Self
    where
        F: FnOnce(ResolveFn, RejectFn) -> Result<()>,
    {
        let promise = Self::pending_in(scheduler);
        let (resolve, reject) = promise.resolving_functions();
        if let Err(err) = executor(resolve, reject) {
            tracing::debug!(
                kind = %FailureKind::Executor,
                promise = promise.id(),
                error = %err,
                "executor failed"
            );
            promise.reject_value(err.into_reason());
        }
        promise
    }

    fn pending_in(scheduler: Rc<dyn Scheduler>) -> Self {
        let id = PROMISE_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Rc::new(RefCell::new(PromiseInner {
                id,
                state: PromiseState::Pending,
                result: None,
                reactions: VecDeque::new(),
                scheduler,
            })),
        }
    }

    fn resolving_functions(&self) -> (ResolveFn, RejectFn) {
        (
            ResolveFn {
                promise: self.clone(),
            },
            RejectFn {
                promise: self.clone(),
            },
        )
    }

    /// Create a promise resolved with `value`.
    ///
    /// A thenable `value` is followed, so the result may still be pending.
    pub fn resolve(value: impl Into<Value>) -> Self {
        Self::resolve_in(current_scheduler(), value)
    }

    pub(crate) fn resolve_in(scheduler: Rc<dyn Scheduler>, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new_in(scheduler, move |resolve, _reject| {
            resolve.call(value);
            Ok(())
        })
    }

    /// Create a promise rejected with `reason`
    pub fn reject(reason: impl Into<Value>) -> Self {
        let reason = reason.into();
        Self::new(move |_resolve, reject| {
            reject.call(reason);
            Ok(())
        })
    }

    /// Create a pending promise and hand back its settlement functions
    pub fn with_resolvers() -> Deferred {
        let promise = Self::pending_in(current_scheduler());
        let (resolve, reject) = promise.resolving_functions();
        Deferred {
            promise,
            resolve,
            reject,
        }
    }

    /// Attach reactions and return the promise they settle.
    ///
    /// Missing handlers pass the outcome through unchanged. A handler's
    /// `Ok` value resolves the returned promise, its `Err` rejects it.
    pub fn then(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Promise {
        self.add_reaction(on_fulfilled, on_rejected)
    }

    /// Attach a rejection handler only
    pub fn catch(&self, on_rejected: Option<Handler>) -> Promise {
        self.then(None, on_rejected)
    }

    /// Run `on_finally` on either outcome and pass the outcome through.
    ///
    /// A failing callback rejects the returned promise with its failure.
    /// A thenable returned by the callback is waited on first.
    pub fn finally<F>(&self, on_finally: F) -> Promise
    where
        F: Fn() -> Result<Value> + 'static,
    {
        let on_finally = Rc::new(on_finally);
        let scheduler = self.scheduler();

        let after_fulfilled = {
            let on_finally = on_finally.clone();
            let scheduler = scheduler.clone();
            Handler::new(move |value| {
                let settled = (*on_finally)()?;
                let pass = Handler::new(move |_| Ok(value.clone()));
                let next = Promise::resolve_in(scheduler.clone(), settled).then(Some(pass), None);
                Ok(Value::Promise(next))
            })
        };
        let after_rejected = Handler::new(move |reason| {
            let settled = (*on_finally)()?;
            let pass = Handler::new(move |_| Err(Error::Thrown(reason.clone())));
            let next = Promise::resolve_in(scheduler.clone(), settled).then(Some(pass), None);
            Ok(Value::Promise(next))
        });

        self.then(Some(after_fulfilled), Some(after_rejected))
    }

    fn add_reaction(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Promise {
        Promise::new_in(self.scheduler(), move |resolve, reject| {
            self.inner.borrow_mut().reactions.push_back(Reaction {
                on_fulfilled,
                on_rejected,
                resolve,
                reject,
            });
            self.flush();
            Ok(())
        })
    }

    pub(crate) fn resolve_value(&self, value: Value) {
        if !self.is_pending() {
            return;
        }
        match value.as_thenable() {
            Some(thenable) => self.follow(thenable),
            None => self.settle(PromiseState::Fulfilled, value),
        }
    }

    pub(crate) fn reject_value(&self, reason: Value) {
        self.settle(PromiseState::Rejected, reason);
    }

    /// Adopt the outcome of a thenable.
    ///
    /// Only the first settlement call that finds this promise pending
    /// counts; the state guard in `settle` drops the rest.
    fn follow(&self, thenable: Rc<dyn HasThen>) {
        let (resolve, reject) = self.resolving_functions();
        if let Err(err) = thenable.then(resolve.into(), reject.into()) {
            tracing::debug!(
                kind = %FailureKind::ThenableAccess,
                promise = self.id(),
                error = %err,
                "thenable `then` failed"
            );
            self.reject_value(err.into_reason());
        }
    }

    fn settle(&self, state: PromiseState, result: Value) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state != PromiseState::Pending {
                return;
            }
            inner.state = state;
            inner.result = Some(result);
            tracing::trace!(promise = inner.id, %state, "promise settled");
        }
        self.flush();
    }

    /// Schedule a drain of the reaction queue, if settled
    fn flush(&self) {
        let (scheduler, outcome) = {
            let inner = self.inner.borrow();
            let Some(outcome) = inner.outcome() else {
                return;
            };
            (inner.scheduler.clone(), outcome)
        };
        let promise = self.clone();
        scheduler.schedule(Box::new(move || promise.drain_reactions(outcome)));
    }

    /// Run queued reactions oldest first, including any added mid-drain
    fn drain_reactions(&self, outcome: Outcome) {
        loop {
            let Some(reaction) = self.inner.borrow_mut().reactions.pop_front() else {
                break;
            };
            tracing::trace!(promise = self.id(), state = %outcome.state(), "running reaction");
            reaction.run(outcome.clone());
        }
    }

    /// Current state
    pub fn state(&self) -> PromiseState {
        self.inner.borrow().state
    }

    /// The settled value or reason; `None` while pending
    pub fn result(&self) -> Option<Value> {
        self.inner.borrow().result.clone()
    }

    /// Check if the promise has not settled yet
    pub fn is_pending(&self) -> bool {
        self.state() == PromiseState::Pending
    }

    /// Check if the promise has settled either way
    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// Process-unique id, used in log events
    pub fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    /// Check if two handles refer to the same promise
    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of reactions waiting to run
    pub fn pending_reactions(&self) -> usize {
        self.inner.borrow().reactions.len()
    }

    pub(crate) fn scheduler(&self) -> Rc<dyn Scheduler> {
        self.inner.borrow().scheduler.clone()
    }
}

impl HasThen for Promise {
    fn then(&self, on_fulfilled: Handler, on_rejected: Handler) -> Result<()> {
        self.add_reaction(Some(on_fulfilled), Some(on_rejected));
        Ok(())
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("Promise")
                .field("id", &inner.id)
                .field("state", &inner.state)
                .field("result", &inner.result)
                .finish(),
            Err(_) => write!(f, "Promise {{ <borrowed> }}"),
        }
    }
}

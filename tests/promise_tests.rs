//! Integration tests for the promise state machine

mod common;
use common::{constant, map_number, test_loop, Log};
use eventual::{Error, Handler, HasThen, Promise, PromiseState, Runtime, Value};
use std::cell::Cell;
use std::rc::Rc;

/// A foreign thenable that replays a fixed script when `then` is called
struct Scripted {
    steps: Vec<Step>,
    calls: Rc<Cell<u32>>,
}

enum Step {
    Fulfill(Value),
    Reject(Value),
    Fail(Value),
}

impl Scripted {
    fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            calls: Rc::new(Cell::new(0)),
        }
    }
}

impl HasThen for Scripted {
    fn then(&self, on_fulfilled: Handler, on_rejected: Handler) -> eventual::Result<()> {
        self.calls.set(self.calls.get() + 1);
        for step in &self.steps {
            match step {
                Step::Fulfill(value) => {
                    on_fulfilled.call(value.clone())?;
                }
                Step::Reject(reason) => {
                    on_rejected.call(reason.clone())?;
                }
                Step::Fail(reason) => return Err(Error::Thrown(reason.clone())),
            }
        }
        Ok(())
    }
}

/// A foreign thenable that fulfills from a microtask
struct Later(Value);

impl HasThen for Later {
    fn then(&self, on_fulfilled: Handler, _on_rejected: Handler) -> eventual::Result<()> {
        let value = self.0.clone();
        eventual::queue_microtask(move || {
            let _ = on_fulfilled.call(value);
        });
        Ok(())
    }
}

mod settlement {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_after_fulfilled_is_ignored() {
        let tl = test_loop();
        let d = Promise::with_resolvers();
        d.resolve.call(1);
        d.resolve.call(2);
        d.reject.call("nope");
        tl.drain();
        assert_eq!(d.promise.state(), PromiseState::Fulfilled);
        assert_eq!(d.promise.result(), Some(Value::from(1)));
    }

    #[test]
    fn test_resolve_after_rejected_is_ignored() {
        let tl = test_loop();
        let d = Promise::with_resolvers();
        d.reject.call("first");
        d.resolve.call(2);
        d.reject.call("second");
        tl.drain();
        assert_eq!(d.promise.state(), PromiseState::Rejected);
        assert_eq!(d.promise.result(), Some(Value::from("first")));
    }

    #[test]
    fn test_static_constructors() {
        let _tl = test_loop();
        let ok = Promise::resolve("v");
        let err = Promise::reject("r");
        assert_eq!(ok.state(), PromiseState::Fulfilled);
        assert_eq!(err.state(), PromiseState::Rejected);
        assert_eq!(err.result(), Some(Value::from("r")));
    }

    #[test]
    fn test_executor_failure_becomes_rejection() {
        let tl = test_loop();
        let promise = Promise::new(|_, _| Err(Error::type_error("executor blew up")));
        let caught = promise.catch(Some(Handler::new(|reason| Ok(reason))));
        tl.drain();
        assert_eq!(
            caught.result(),
            Some(Value::from("TypeError: executor blew up"))
        );
    }

    #[test]
    fn test_with_resolvers_starts_pending() {
        let tl = test_loop();
        let d = Promise::with_resolvers();
        assert!(d.promise.is_pending());
        tl.drain();
        assert!(d.promise.is_pending());
        d.resolve.call("later");
        assert!(d.promise.is_settled());
    }
}

mod reactions {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_never_synchronous_when_already_settled() {
        let tl = test_loop();
        let log = Log::new();
        let promise = Promise::resolve(1);
        promise.then(Some(log.tap("a")), None);
        assert!(log.entries().is_empty());
        tl.drain();
        assert_eq!(log.entries(), vec!["a:1"]);
    }

    #[test]
    fn test_never_synchronous_when_settled_later() {
        let tl = test_loop();
        let log = Log::new();
        let d = Promise::with_resolvers();
        d.promise.then(Some(log.tap("a")), None);
        d.resolve.call(1);
        assert!(log.entries().is_empty());
        tl.drain();
        assert_eq!(log.entries(), vec!["a:1"]);
    }

    #[test]
    fn test_attachment_order_across_settlement() {
        let tl = test_loop();
        let log = Log::new();
        let d = Promise::with_resolvers();
        d.promise.then(Some(log.tap("before-1")), None);
        d.promise.then(Some(log.tap("before-2")), None);
        d.resolve.call("x");
        d.promise.then(Some(log.tap("after-1")), None);
        tl.drain();
        d.promise.then(Some(log.tap("after-2")), None);
        tl.drain();
        assert_eq!(
            log.entries(),
            vec!["before-1:x", "before-2:x", "after-1:x", "after-2:x"]
        );
    }

    #[test]
    fn test_independent_chains_interleave() {
        let tl = test_loop();
        let log = Log::new();
        Promise::resolve(1)
            .then(Some(log.tap("a")), None)
            .then(Some(log.tap("b")), None);
        Promise::resolve(2)
            .then(Some(log.tap("c")), None)
            .then(Some(log.tap("d")), None);
        tl.drain();
        assert_eq!(log.entries(), vec!["a:1", "c:2", "b:1", "d:2"]);
    }

    #[test]
    fn test_reaction_added_mid_drain_runs_in_same_pass() {
        let tl = test_loop();
        let log = Log::new();
        let d = Promise::with_resolvers();

        let promise = d.promise.clone();
        let inner_log = log.clone();
        d.promise.then(
            Some(Handler::new(move |value| {
                inner_log.push("outer");
                promise.then(Some(inner_log.tap("inner")), None);
                Ok(value)
            })),
            None,
        );
        d.resolve.call(1);

        assert!(tl.event_loop.run_next_microtask());
        assert_eq!(log.entries(), vec!["outer", "inner:1"]);
    }

    #[test]
    fn test_fulfillment_skips_rejection_handler() {
        let tl = test_loop();
        let log = Log::new();
        let next = Promise::resolve(3).then(None, Some(log.tap("rejected")));
        tl.drain();
        assert!(log.entries().is_empty());
        assert_eq!(next.result(), Some(Value::from(3)));
    }

    #[test]
    fn test_rejection_skips_fulfillment_handler() {
        let tl = test_loop();
        let log = Log::new();
        let next = Promise::reject("r").then(Some(log.tap("fulfilled")), None);
        tl.drain();
        assert!(log.entries().is_empty());
        assert_eq!(next.state(), PromiseState::Rejected);
        assert_eq!(next.result(), Some(Value::from("r")));
    }
}

mod chaining {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_handler_value_fulfills_next() {
        let tl = test_loop();
        let next = Promise::resolve(4).then(Some(map_number(|n| n * n)), None);
        tl.drain();
        assert_eq!(next.result(), Some(Value::from(16)));
    }

    #[test]
    fn test_handler_returning_promise_is_followed() {
        let tl = test_loop();
        let next = Promise::resolve(1).then(
            Some(Handler::new(|_| Ok(Value::from(Promise::resolve(10))))),
            None,
        );
        tl.drain();
        assert_eq!(next.result(), Some(Value::from(10)));
    }

    #[test]
    fn test_handler_returning_rejected_promise_rejects_next() {
        let tl = test_loop();
        let next = Promise::resolve(1).then(
            Some(Handler::new(|_| Ok(Value::from(Promise::reject("inner"))))),
            None,
        );
        tl.drain();
        assert_eq!(next.state(), PromiseState::Rejected);
        assert_eq!(next.result(), Some(Value::from("inner")));
    }

    #[test]
    fn test_long_chain_settles() {
        let runtime = Runtime::new();
        let length = runtime.event_loop().config().max_microtasks_per_tick + 1;
        let mut promise = Promise::resolve(0);
        for _ in 0..length {
            promise = promise.then(Some(map_number(|n| n + 1.0)), None);
        }
        assert_eq!(runtime.block_on(&promise).unwrap(), Value::from(length));
    }

    #[test]
    fn test_recovery_law() {
        let tl = test_loop();
        let recovered = Promise::reject("e").then(None, Some(constant("fixed")));
        let downstream = recovered.then(Some(map_number(|n| n)), None);
        tl.drain();
        assert_eq!(recovered.state(), PromiseState::Fulfilled);
        assert_eq!(recovered.result(), Some(Value::from("fixed")));
        assert_eq!(downstream.state(), PromiseState::Fulfilled);
    }

    #[test]
    fn test_handler_failure_rejects_and_propagates() {
        let tl = test_loop();
        let log = Log::new();
        let caught = Promise::resolve(1)
            .then(Some(Handler::new(|_| Err(Error::throw("handler failed")))), None)
            .then(Some(log.tap("skipped")), None)
            .catch(Some(log.tap("caught")));
        tl.drain();
        assert_eq!(log.entries(), vec!["caught:handler failed"]);
        assert_eq!(caught.result(), Some(Value::from("handler failed")));
    }

    #[test]
    fn test_rejection_handler_failure_rejects_with_new_reason() {
        let tl = test_loop();
        let next = Promise::reject("first")
            .catch(Some(Handler::new(|_| Err(Error::throw("second")))));
        tl.drain();
        assert_eq!(next.state(), PromiseState::Rejected);
        assert_eq!(next.result(), Some(Value::from("second")));
    }
}

mod thenables {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_foreign_then_is_invoked_synchronously() {
        let tl = test_loop();
        let thenable = Scripted::new(vec![Step::Fulfill(Value::from(1))]);
        let calls = thenable.calls.clone();
        let promise = Promise::resolve(Value::thenable(thenable));
        assert_eq!(calls.get(), 1);
        assert_eq!(promise.result(), Some(Value::from(1)));
        tl.drain();
        assert_eq!(promise.state(), PromiseState::Fulfilled);
    }

    #[test]
    fn test_first_settlement_wins() {
        let tl = test_loop();
        let thenable = Scripted::new(vec![
            Step::Fulfill(Value::from("first")),
            Step::Reject(Value::from("second")),
            Step::Fulfill(Value::from("third")),
        ]);
        let promise = Promise::resolve(Value::thenable(thenable));
        tl.drain();
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(promise.result(), Some(Value::from("first")));
    }

    #[test]
    fn test_then_failure_rejects() {
        let tl = test_loop();
        let thenable = Scripted::new(vec![Step::Fail(Value::from("access denied"))]);
        let promise = Promise::resolve(Value::thenable(thenable));
        tl.drain();
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(promise.result(), Some(Value::from("access denied")));
    }

    #[test]
    fn test_then_failure_after_settling_is_ignored() {
        let tl = test_loop();
        let thenable = Scripted::new(vec![
            Step::Reject(Value::from("rejected")),
            Step::Fail(Value::from("late failure")),
        ]);
        let promise = Promise::resolve(Value::thenable(thenable));
        tl.drain();
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(promise.result(), Some(Value::from("rejected")));
    }

    #[test]
    fn test_asynchronous_thenable() {
        let tl = test_loop();
        let promise = Promise::resolve(Value::thenable(Later(Value::from("eventually"))));
        assert!(promise.is_pending());
        tl.drain();
        assert_eq!(promise.result(), Some(Value::from("eventually")));
    }

    #[test]
    fn test_nested_thenables_unwrap() {
        let tl = test_loop();
        let innermost = Value::thenable(Later(Value::from(3)));
        let middle = Value::thenable(Scripted::new(vec![Step::Fulfill(innermost)]));
        let outer = Promise::resolve(Promise::resolve(middle));
        tl.drain();
        assert_eq!(outer.result(), Some(Value::from(3)));
    }

    #[test]
    fn test_following_pending_thenable_settles_once() {
        let tl = test_loop();
        let inner = Promise::with_resolvers();
        let thenable = Scripted::new(vec![Step::Fulfill(Value::from(inner.promise.clone()))]);
        let outer = Promise::resolve(Value::thenable(thenable));

        let settlements = Rc::new(Cell::new(0));
        let on_fulfilled = settlements.clone();
        let on_rejected = settlements.clone();
        outer.then(
            Some(Handler::new(move |v| {
                on_fulfilled.set(on_fulfilled.get() + 1);
                Ok(v)
            })),
            Some(Handler::new(move |r| {
                on_rejected.set(on_rejected.get() + 1);
                Ok(r)
            })),
        );

        tl.drain();
        assert!(outer.is_pending());

        inner.resolve.call(7);
        inner.resolve.call(8);
        inner.reject.call("too late");
        tl.drain();
        assert_eq!(outer.result(), Some(Value::from(7)));
        assert_eq!(settlements.get(), 1);
    }

    #[test]
    fn test_self_resolution_stays_pending() {
        let tl = test_loop();
        let d = Promise::with_resolvers();
        d.resolve.call(d.promise.clone());
        tl.drain();
        assert!(d.promise.is_pending());
        assert!(!tl.event_loop.has_pending_microtasks());
    }
}

mod finally {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_finally_passes_fulfillment_through() {
        let tl = test_loop();
        let log = Log::new();
        let cleanup_log = log.clone();
        let promise = Promise::resolve(5).finally(move || {
            cleanup_log.push("cleanup");
            Ok(Value::from("ignored"))
        });
        tl.drain();
        assert_eq!(log.entries(), vec!["cleanup"]);
        assert_eq!(promise.result(), Some(Value::from(5)));
    }

    #[test]
    fn test_finally_passes_rejection_through() {
        let tl = test_loop();
        let promise = Promise::reject("original").finally(|| Ok(Value::Undefined));
        tl.drain();
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(promise.result(), Some(Value::from("original")));
    }

    #[test]
    fn test_failing_finally_replaces_outcome() {
        let tl = test_loop();
        let promise = Promise::resolve(1).finally(|| Err(Error::throw("cleanup failed")));
        tl.drain();
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(promise.result(), Some(Value::from("cleanup failed")));
    }

    #[test]
    fn test_finally_waits_for_returned_thenable() {
        let tl = test_loop();
        let gate = Promise::with_resolvers();
        let wait_on = gate.promise.clone();
        let promise = Promise::resolve("done").finally(move || Ok(Value::from(wait_on.clone())));
        tl.drain();
        assert!(promise.is_pending());

        gate.resolve.call(Value::Undefined);
        tl.drain();
        assert_eq!(promise.result(), Some(Value::from("done")));
    }
}

mod default_loop {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_event_loop_drives_promises() {
        let log = Log::new();
        Promise::resolve("default").then(Some(log.tap("ran")), None);
        assert!(log.entries().is_empty());
        eventual::run_microtasks().unwrap();
        assert_eq!(log.entries(), vec!["ran:default"]);
    }

    #[test]
    fn test_queue_microtask_runs_after_current_code() {
        let log = Log::new();
        let inner = log.clone();
        eventual::queue_microtask(move || inner.push("microtask"));
        log.push("sync");
        let result = eventual::run_to_completion().unwrap();
        assert_eq!(log.entries(), vec!["sync", "microtask"]);
        assert_eq!(result.microtasks_processed, 1);
    }
}

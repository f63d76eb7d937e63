//! Promise combinators
//!
//! `all`, `all_settled`, `race` and `any` compose many inputs into one
//! promise. Each input is first passed through `Promise::resolve`, so plain
//! values, promises and foreign thenables are accepted alike. The
//! combinators are built only from `then` and the settlement functions;
//! the settle-once guard on the result promise discards late outcomes.

use super::promise::{Promise, RejectFn, ResolveFn};
use super::value::{Handler, Value};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

/// Outcome of one input of `Promise::all_settled`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SettledOutcome {
    Fulfilled { value: Value },
    Rejected { reason: Value },
}

impl SettledOutcome {
    /// The `{status, value}` / `{status, reason}` record form
    pub fn to_value(&self) -> Value {
        match self {
            SettledOutcome::Fulfilled { value } => Value::record([
                ("status", Value::from("fulfilled")),
                ("value", value.clone()),
            ]),
            SettledOutcome::Rejected { reason } => Value::record([
                ("status", Value::from("rejected")),
                ("reason", reason.clone()),
            ]),
        }
    }

    /// Read a record produced by `to_value`
    pub fn from_value(record: &Value) -> Option<Self> {
        match record.get("status")?.as_str()? {
            "fulfilled" => Some(SettledOutcome::Fulfilled {
                value: record.get("value").cloned().unwrap_or_default(),
            }),
            "rejected" => Some(SettledOutcome::Rejected {
                reason: record.get("reason").cloned().unwrap_or_default(),
            }),
            _ => None,
        }
    }
}

/// Build the reason `Promise::any` rejects with
pub fn aggregate_error(errors: Vec<Value>) -> Value {
    Value::record([
        ("name", Value::from("AggregateError")),
        ("message", Value::from("All promises were rejected")),
        ("errors", Value::Array(errors)),
    ])
}

/// Slots filled by index, plus how many have been filled
struct Slots {
    values: Vec<Value>,
    filled: usize,
}

impl Slots {
    fn new(len: usize) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Slots {
            values: vec![Value::Undefined; len],
            filled: 0,
        }))
    }

    /// Store `value` at `index`; returns every slot once all are filled
    fn fill(&mut self, index: usize, value: Value) -> Option<Vec<Value>> {
        self.values[index] = value;
        self.filled += 1;
        if self.filled == self.values.len() {
            Some(std::mem::take(&mut self.values))
        } else {
            None
        }
    }
}

/// Handler that records its argument at `index` and settles once every slot is filled
fn slot_handler<F>(slots: &Rc<RefCell<Slots>>, index: usize, record: F, complete: Handler) -> Handler
where
    F: Fn(Value) -> Value + 'static,
{
    let slots = slots.clone();
    Handler::new(move |value| {
        let filled = slots.borrow_mut().fill(index, record(value));
        if let Some(values) = filled {
            complete.call(Value::Array(values))?;
        }
        Ok(Value::Undefined)
    })
}

fn collect_inputs<I>(inputs: I) -> Vec<Value>
where
    I: IntoIterator,
    I::Item: Into<Value>,
{
    inputs.into_iter().map(Into::into).collect()
}

impl Promise {
    /// Fulfill with every input's value in input order, or reject with the
    /// first rejection. An empty input fulfills immediately with `[]`.
    pub fn all<I>(inputs: I) -> Promise
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let inputs = collect_inputs(inputs);
        Promise::new(move |resolve: ResolveFn, reject: RejectFn| {
            if inputs.is_empty() {
                resolve.call(Value::Array(Vec::new()));
                return Ok(());
            }

            let slots = Slots::new(inputs.len());
            let on_rejected: Handler = reject.into();
            let complete: Handler = resolve.into();
            for (index, input) in inputs.into_iter().enumerate() {
                let on_fulfilled = slot_handler(&slots, index, |value| value, complete.clone());
                Promise::resolve(input).then(Some(on_fulfilled), Some(on_rejected.clone()));
            }
            Ok(())
        })
    }

    /// Fulfill with a `{status, value|reason}` record per input, in input
    /// order, once every input has settled. Never rejects.
    pub fn all_settled<I>(inputs: I) -> Promise
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let inputs = collect_inputs(inputs);
        Promise::new(move |resolve: ResolveFn, _reject: RejectFn| {
            if inputs.is_empty() {
                resolve.call(Value::Array(Vec::new()));
                return Ok(());
            }

            let slots = Slots::new(inputs.len());
            let complete: Handler = resolve.into();
            for (index, input) in inputs.into_iter().enumerate() {
                let on_fulfilled = slot_handler(
                    &slots,
                    index,
                    |value| SettledOutcome::Fulfilled { value }.to_value(),
                    complete.clone(),
                );
                let on_rejected = slot_handler(
                    &slots,
                    index,
                    |reason| SettledOutcome::Rejected { reason }.to_value(),
                    complete.clone(),
                );
                Promise::resolve(input).then(Some(on_fulfilled), Some(on_rejected));
            }
            Ok(())
        })
    }

    /// Settle like whichever input settles first. An empty input never settles.
    pub fn race<I>(inputs: I) -> Promise
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let inputs = collect_inputs(inputs);
        Promise::new(move |resolve: ResolveFn, reject: RejectFn| {
            let on_fulfilled: Handler = resolve.into();
            let on_rejected: Handler = reject.into();
            for input in inputs {
                Promise::resolve(input).then(Some(on_fulfilled.clone()), Some(on_rejected.clone()));
            }
            Ok(())
        })
    }

    /// Fulfill with the first fulfillment, or reject with an AggregateError
    /// record listing every reason in input order once all inputs rejected.
    /// An empty input rejects immediately.
    pub fn any<I>(inputs: I) -> Promise
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let inputs = collect_inputs(inputs);
        Promise::new(move |resolve: ResolveFn, reject: RejectFn| {
            if inputs.is_empty() {
                reject.call(aggregate_error(Vec::new()));
                return Ok(());
            }

            let slots = Slots::new(inputs.len());
            let on_fulfilled: Handler = resolve.into();
            let exhausted = Handler::new(move |errors| {
                let errors = match errors {
                    Value::Array(errors) => errors,
                    other => vec![other],
                };
                reject.call(aggregate_error(errors));
                Ok(Value::Undefined)
            });
            for (index, input) in inputs.into_iter().enumerate() {
                let on_rejected = slot_handler(&slots, index, |reason| reason, exhausted.clone());
                Promise::resolve(input).then(Some(on_fulfilled.clone()), Some(on_rejected));
            }
            Ok(())
        })
    }
}

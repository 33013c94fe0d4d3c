//! # Testing
//!
//! Helpers for tests built on the weaver: [`mock`] replaces results, [`record`] keeps a history of calls.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{CallError, WeaveError};
use crate::object::{Args, Function, Value};
use crate::rollback::Rollback;
use crate::weave::{WeaveOptions, Weaver};
use crate::wrapper::mimic;

/// Decorator making functions return `return_value`, calling the original first when `call` is set
pub fn mock(return_value: impl Into<Value>, call: bool) -> Value {
    let return_value = return_value.into();
    Function::native("mock", move |args| {
        let func = first(&args, "mock")?;
        let wrapper = Value::from(Function::native("mocked", {
            let func = func.clone();
            let return_value = return_value.clone();
            move |args| {
                if call {
                    func.call(args)?;
                }
                Ok(return_value.clone())
            }
        }));
        mimic(&wrapper, &func, None);
        Ok(wrapper)
    })
    .into()
}

/// The function a decorator was applied to
fn first(args: &Args, decorator: &str) -> Result<Value, CallError> {
    args.get(0)
        .cloned()
        .ok_or_else(|| CallError::Type(format!("{} expects the function to decorate", decorator)))
}

/// One recorded call
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    /// Receiver the recorder was bound to, if any
    pub receiver: Option<Value>,
    /// Positional arguments
    pub args: Vec<Value>,
    /// Keyword arguments
    pub kwargs: Vec<(Rc<str>, Value)>,
}
impl Call {
    /// Builds an expected call, for comparisons
    pub fn new(receiver: Option<Value>, args: impl Into<Args>) -> Self {
        let args = args.into();
        Self {
            receiver,
            args: args.positional,
            kwargs: args.keywords,
        }
    }
}
impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let receiver = self.receiver.clone().unwrap_or(Value::None);
        write!(f, "({}, {}, {{", receiver, Value::tuple(self.args.iter().cloned()))?;
        for (i, (name, value)) in self.kwargs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "'{}': {}", name, value)?;
        }
        f.write_str("})")
    }
}

/// Shared list of recorded calls
#[derive(Clone, Default)]
pub struct History(Rc<RefCell<Vec<Call>>>);
impl History {
    /// Creates an empty history
    pub fn new() -> Self {
        Self::default()
    }
    /// Snapshot of the recorded calls
    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().clone()
    }
    /// Number of recorded calls
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }
    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
    /// Appends a call
    fn push(&self, call: Call) {
        self.0.borrow_mut().push(call);
    }
}
impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.borrow().iter()).finish()
    }
}

/// Settings of a recorder
#[derive(Clone, Debug, Default)]
pub struct Record {
    /// Whether the recorded function still runs
    call: bool,
    /// History shared by every recorder made from these settings
    history: Option<History>,
}
impl Record {
    /// Records without calling through, into a fresh history per recorder
    pub fn new() -> Self {
        Self::default()
    }
    /// Sets whether the recorded function still runs
    pub fn call(mut self, call: bool) -> Self {
        self.call = call;
        self
    }
    /// Records into `history`
    pub fn history(mut self, history: History) -> Self {
        self.history = Some(history);
        self
    }

    /// Creates a recorder for `func`
    pub fn wrap(&self, func: impl Into<Value>) -> Recorder {
        let wrapped = func.into();
        let calls = self.history.clone().unwrap_or_default();
        let call = self.call;
        let wrapper = Value::from(Function::receiver("record_wrapper", {
            let wrapped = wrapped.clone();
            let calls = calls.clone();
            move |receiver, args| {
                calls.push(Call {
                    receiver: receiver.clone(),
                    args: args.positional.clone(),
                    kwargs: args.keywords.clone(),
                });
                if call {
                    wrapped.call_with_receiver(receiver, args)
                } else {
                    Ok(Value::None)
                }
            }
        }));
        mimic(&wrapper, &wrapped, None);
        Recorder {
            wrapped,
            wrapper,
            calls,
        }
    }

    /// Decorator creating a recorder for every function it is applied to, usable as weave advice
    pub fn decorator(&self) -> Value {
        let record = self.clone();
        Function::native("record", move |args| {
            Ok(record.wrap(first(&args, "record")?).into())
        })
        .into()
    }
}

/// Records the calls made to a function with [`Record::new`] settings
pub fn record(func: impl Into<Value>) -> Recorder {
    Record::new().wrap(func)
}

/// A recording wrapper around a function
#[derive(Clone)]
pub struct Recorder {
    /// The recorded function
    wrapped: Value,
    /// The callable doing the recording
    wrapper: Value,
    /// Where calls are recorded
    calls: History,
}
impl Recorder {
    /// The recorded function
    pub fn wrapped(&self) -> &Value {
        &self.wrapped
    }
    /// The recording callable
    pub fn wrapper(&self) -> &Value {
        &self.wrapper
    }
    /// Recorded calls
    pub fn calls(&self) -> &History {
        &self.calls
    }
    /// Calls the recording callable
    pub fn call(&self, args: impl Into<Args>) -> Result<Value, CallError> {
        self.wrapper.call(args.into())
    }

    /// Installs the recorder wherever the recorded function lives, until the ledger is rolled back
    pub fn weave(&self, weaver: &Weaver<'_>) -> Result<Rollback, WeaveError> {
        let wrapper = self.wrapper.clone();
        let install = Function::native("install_recorder", move |_| Ok(wrapper.clone()));
        weaver.weave(self.wrapped.clone(), install, WeaveOptions::new())
    }
}
impl From<Recorder> for Value {
    fn from(recorder: Recorder) -> Self {
        recorder.wrapper
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::object::{Args, BoundMethod, Function, Value};

    use super::{mock, record, Call, History, Record};

    /// Function counting its calls and returning the sum of its arguments
    fn sum(calls: Rc<Cell<u32>>) -> Value {
        Function::native("sum", move |args| {
            calls.set(calls.get() + 1);
            Ok(Value::Int(
                args.positional
                    .iter()
                    .map(|v| match v {
                        Value::Int(i) => *i,
                        _ => 0,
                    })
                    .sum(),
            ))
        })
        .into()
    }

    #[test]
    /// Mocks return the fixed value and only call through when asked
    fn test_mock() {
        let calls = Rc::new(Cell::new(0));
        let mocked = mock("foobar", false)
            .call(Args::from([sum(calls.clone())]))
            .unwrap();
        assert_eq!(
            mocked.call(Args::from([Value::Int(1)])).unwrap(),
            Value::from("foobar")
        );
        assert_eq!(calls.get(), 0);
        assert_eq!(mocked.name().as_deref(), Some("sum"));

        let mocked = mock("foobar", true)
            .call(Args::from([sum(calls.clone())]))
            .unwrap();
        assert_eq!(
            mocked.call(Args::from([Value::Int(3)])).unwrap(),
            Value::from("foobar")
        );
        assert_eq!(calls.get(), 1);
    }

    #[test]
    /// Recorders keep arguments and call through only when asked
    fn test_record() {
        let calls = Rc::new(Cell::new(0));
        let recorder = record(sum(calls.clone()));
        assert_eq!(recorder.call([Value::Int(2), Value::Int(3)]).unwrap(), Value::None);
        recorder
            .call(Args::from([Value::Int(3)]).keyword("b", 4i64))
            .unwrap();

        assert_eq!(calls.get(), 0);
        assert_eq!(
            recorder.calls().calls(),
            vec![
                Call::new(None, [Value::Int(2), Value::Int(3)]),
                Call::new(None, Args::from([Value::Int(3)]).keyword("b", 4i64)),
            ]
        );
        assert_eq!(
            recorder.calls().calls()[1].to_string(),
            "(None, (3,), {'b': 4})"
        );

        let through = Record::new().call(true).wrap(sum(calls.clone()));
        assert_eq!(through.call([Value::Int(2), Value::Int(3)]).unwrap(), Value::Int(5));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    /// Bound recorders see their receiver, and decorators share a given history
    fn test_receiver() {
        let history = History::new();
        let decorator = Record::new().history(history.clone()).decorator();
        let recorder = decorator
            .call(Args::from([Value::from(Function::native("meth", |_| Ok(Value::None)))]))
            .unwrap();

        let bound = Value::from(BoundMethod::new(recorder, Value::from("self")));
        bound.call(Args::new()).unwrap();
        assert_eq!(
            history.calls(),
            vec![Call::new(Some(Value::from("self")), Args::new())]
        );
    }
}

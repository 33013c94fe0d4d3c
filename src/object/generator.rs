//! This module contains resumable computations (generators)
//!
//! A [`Coroutine`] is the raw state machine; a [`Generator`] drives one with the usual lifecycle
//! rules (start with `next`, no re-entry, finished generators stay finished).

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

use crate::error::CallError;

use super::Value;

/// Message sent into a coroutine when it is resumed
#[derive(Debug)]
pub enum Resume {
    /// Resume without a value
    Next,
    /// Resume with a value
    Send(Value),
    /// Resume by raising a failure at the suspension point
    Throw(CallError),
}

/// Outcome of resuming a coroutine
#[derive(Debug, Clone, PartialEq)]
pub enum GenState {
    /// The coroutine suspended itself, producing a value
    Yielded(Value),
    /// The coroutine finished with a final value
    Returned(Value),
}

/// A resumable computation.
///
/// Returning `Err` from [`Coroutine::resume`] finishes the coroutine with that failure.
pub trait Coroutine {
    /// Resumes the coroutine
    fn resume(&mut self, input: Resume) -> Result<GenState, CallError>;
    /// Releases whatever the coroutine holds. Called at most once, and only on a suspended coroutine.
    fn close(&mut self) {}
}

/// Coroutine backed by a closure, see [`from_fn`]
pub struct FromFn<F>(F);
impl<F> Coroutine for FromFn<F>
where
    F: FnMut(Resume) -> Result<GenState, CallError>,
{
    fn resume(&mut self, input: Resume) -> Result<GenState, CallError> {
        (self.0)(input)
    }
}

/// Creates a coroutine from a closure that is called on every resume
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: FnMut(Resume) -> Result<GenState, CallError>,
{
    FromFn(f)
}

/// Lifecycle of a generator
enum Slot {
    /// Not started yet
    Created(Box<dyn Coroutine>),
    /// Suspended after yielding
    Suspended(Box<dyn Coroutine>),
    /// Currently executing
    Running,
    /// Returned, failed or closed
    Finished,
}

/// A generator object
pub struct Generator {
    /// Name of the generator function that created this generator
    name: Rc<str>,
    /// Current lifecycle state
    slot: RefCell<Slot>,
}
impl Generator {
    /// Wraps a coroutine in a fresh, not yet started generator
    pub fn new(name: Rc<str>, coroutine: Box<dyn Coroutine>) -> Self {
        Self {
            name,
            slot: RefCell::new(Slot::Created(coroutine)),
        }
    }
    /// Name of the generator
    pub fn name(&self) -> Rc<str> {
        self.name.clone()
    }
    /// Whether the generator has finished
    pub fn is_finished(&self) -> bool {
        matches!(*self.slot.borrow(), Slot::Finished)
    }

    /// Resumes the generator without a value
    pub fn next(&self) -> Result<GenState, CallError> {
        self.resume(Resume::Next)
    }
    /// Resumes the generator with a value
    pub fn send(&self, value: Value) -> Result<GenState, CallError> {
        self.resume(Resume::Send(value))
    }
    /// Raises `error` inside the generator
    pub fn throw(&self, error: CallError) -> Result<GenState, CallError> {
        self.resume(Resume::Throw(error))
    }

    /// Resumes the generator
    pub fn resume(&self, input: Resume) -> Result<GenState, CallError> {
        // take the coroutine out so it can resume other generators (or fail re-entry) while running
        let slot = mem::replace(&mut *self.slot.borrow_mut(), Slot::Running);
        let (mut coroutine, input) = match (slot, input) {
            (Slot::Created(c), Resume::Send(value)) if !matches!(value, Value::None) => {
                *self.slot.borrow_mut() = Slot::Created(c);
                return Err(CallError::Type(
                    "can't send non-None value to a just-started generator".to_string(),
                ));
            }
            (Slot::Created(_), Resume::Throw(e)) => {
                *self.slot.borrow_mut() = Slot::Finished;
                return Err(e);
            }
            (Slot::Created(c), _) => (c, Resume::Next),
            (Slot::Suspended(c), input) => (c, input),
            (Slot::Running, _) => {
                *self.slot.borrow_mut() = Slot::Running;
                return Err(CallError::GeneratorRunning(self.name.to_string()));
            }
            (Slot::Finished, Resume::Throw(e)) => {
                *self.slot.borrow_mut() = Slot::Finished;
                return Err(e);
            }
            (Slot::Finished, _) => {
                *self.slot.borrow_mut() = Slot::Finished;
                return Ok(GenState::Returned(Value::None));
            }
        };
        let result = coroutine.resume(input);
        *self.slot.borrow_mut() = match result {
            Ok(GenState::Yielded(_)) => Slot::Suspended(coroutine),
            _ => Slot::Finished,
        };
        result
    }

    /// Closes the generator, releasing what a suspended coroutine holds.
    ///
    /// A generator cannot be closed from inside itself while it runs.
    pub fn close(&self) -> Result<(), CallError> {
        let slot = mem::replace(&mut *self.slot.borrow_mut(), Slot::Finished);
        match slot {
            Slot::Suspended(mut coroutine) => coroutine.close(),
            Slot::Running => {
                *self.slot.borrow_mut() = Slot::Running;
                return Err(CallError::GeneratorRunning(self.name.to_string()));
            }
            Slot::Created(_) | Slot::Finished => {}
        }
        Ok(())
    }
}

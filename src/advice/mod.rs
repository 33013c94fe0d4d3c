//! # Advice
//!
//! This module covers the advice protocol: an advising generator function is called with the
//! arguments of every intercepted call and yields instructions telling the wrapper what to do.
//!
//! - [`Advice::Proceed`] (or a bare `None`) calls the cutpoint, optionally with new arguments.
//!   The result is sent back into the advice; a failure is thrown into it.
//! - [`Advice::Return`] ends the call, with a replacement value or without one.
//!
//! When the advice finishes after a proceed, the wrapper returns the last result of the cutpoint.

pub mod function;
pub mod generator;

use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::error::{CallError, WeaveError};
use crate::object::{Args, Function, GenState, Generator, Value};

/// Instruction yielded by an advice
#[derive(Debug, Clone)]
pub enum Advice {
    /// Call the cutpoint, with replacement arguments if given
    Proceed(Option<Args>),
    /// Return from the wrapper, with a replacement value if given
    Return(Option<Value>),
}
impl Advice {
    /// Proceed with the original arguments
    pub fn proceed() -> Value {
        Advice::Proceed(None).into()
    }
    /// Proceed with replacement arguments
    pub fn proceed_with(args: Args) -> Value {
        Advice::Proceed(Some(args)).into()
    }
    /// Return without a value
    pub fn ret() -> Value {
        Advice::Return(None).into()
    }
    /// Return `value`
    pub fn returning(value: impl Into<Value>) -> Value {
        Advice::Return(Some(value.into())).into()
    }
}
impl fmt::Display for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advice::Proceed(None) => f.write_str("Proceed"),
            Advice::Proceed(Some(args)) => write!(f, "Proceed({:?})", args),
            Advice::Return(None) => f.write_str("Return"),
            Advice::Return(Some(value)) => write!(f, "Return({})", value),
        }
    }
}

/// What an advice asked for, after interpreting a yielded value
pub(crate) enum Instruction {
    /// Call the cutpoint
    Proceed(Option<Args>),
    /// Return without a value
    Return,
    /// Return a value
    ReturnValue(Value),
}
impl Instruction {
    /// Interprets a value yielded by an advice
    pub(crate) fn decode(yielded: Value, advising: &Value) -> Result<Self, CallError> {
        trace!(advice = %yielded, from = %advising, "got advice");
        match yielded {
            Value::None => Ok(Instruction::Proceed(None)),
            Value::Advice(advice) => Ok(match &*advice {
                Advice::Proceed(args) => Instruction::Proceed(args.clone()),
                Advice::Return(None) => Instruction::Return,
                Advice::Return(Some(value)) => Instruction::ReturnValue(value.clone()),
            }),
            other => Err(CallError::UnacceptableAdvice(other.to_string())),
        }
    }
}

/// Calls the advising function and checks that it produced a generator
pub(crate) fn start_advisor(advising: &Value, args: Args) -> Result<Rc<Generator>, CallError> {
    match advising.call(args)? {
        Value::Generator(generator) => Ok(generator),
        _ => Err(CallError::ExpectedGenerator(advising.to_string())),
    }
}

/// Gets the first instruction out of a fresh advisor
pub(crate) fn first_advice(advisor: &Generator, advising: &Value) -> Result<Value, CallError> {
    match advisor.next()? {
        GenState::Yielded(advice) => Ok(advice),
        GenState::Returned(_) => Err(CallError::AdviceExhausted(advising.to_string())),
    }
}

/// Closes the advisor when dropped, however the intercepted call ends
pub(crate) struct AdvisorGuard(pub(crate) Rc<Generator>);
impl Drop for AdvisorGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            warn!(error = %e, "could not close advice");
        }
    }
}

/// Decorator applying an advising generator function to cutpoints
#[derive(Clone)]
pub struct Aspect {
    /// The advising generator function
    advising: Value,
}
impl Aspect {
    /// Creates an aspect from an advising generator function
    pub fn new(advising: impl Into<Value>) -> Result<Self, WeaveError> {
        let advising = advising.into();
        if !advising.is_generator_function() {
            return Err(WeaveError::ExpectedGeneratorFunction(advising.to_string()));
        }
        Ok(Self { advising })
    }
    /// The advising generator function
    pub fn advising(&self) -> &Value {
        &self.advising
    }
    /// Wraps `cutpoint` so its calls are driven by this aspect's advice
    pub fn decorate(&self, cutpoint: &Value) -> Value {
        let wrapper = if cutpoint.is_generator_function() {
            generator::wrap(self.advising.clone(), cutpoint.clone())
        } else {
            function::wrap(self.advising.clone(), cutpoint.clone())
        };
        crate::wrapper::mimic(&wrapper, cutpoint, None);
        wrapper
    }
}
impl From<Aspect> for Value {
    fn from(aspect: Aspect) -> Self {
        let name = format!(
            "Aspect({})",
            aspect.advising.name().as_deref().unwrap_or("?")
        );
        Function::native(&name, move |args| match args.get(0) {
            Some(cutpoint) => Ok(aspect.decorate(cutpoint)),
            None => Err(CallError::Type(
                "aspect expects the function to decorate".to_string(),
            )),
        })
        .into()
    }
}

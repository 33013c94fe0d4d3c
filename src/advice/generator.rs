//! This module contains the wrapper used for generator cutpoints
//!
//! The wrapper is a generator itself: values produced by the cutpoint are relayed to the caller,
//! values and failures sent by the caller are relayed into the cutpoint, and the advice runs
//! around the opening of the cutpoint exactly as it does for plain functions.

use std::rc::Rc;

use tracing::warn;

use crate::error::CallError;
use crate::object::{Args, Coroutine, Function, GenState, Generator, Resume, Value};

use super::{first_advice, start_advisor, Instruction};

/// Creates a generator function running every call to `cutpoint` through `advising`
pub fn wrap(advising: Value, cutpoint: Value) -> Value {
    Function::generator("advising_generator_wrapper", move |args| {
        let coroutine: Box<dyn Coroutine> = Box::new(AdvisingGenerator {
            advising: advising.clone(),
            cutpoint: cutpoint.clone(),
            args,
            advisor: None,
            inner: None,
        });
        Ok(coroutine)
    })
    .into()
}

/// Next thing the state machine has to handle
enum Step {
    /// An instruction yielded by the advice
    Advice(Value),
    /// What the cutpoint generator did when it was last resumed
    Cutpoint(Result<GenState, CallError>),
}

/// State of one intercepted generator call
struct AdvisingGenerator {
    /// The advising generator function
    advising: Value,
    /// The generator function being intercepted
    cutpoint: Value,
    /// Arguments of the call, possibly replaced by the advice
    args: Args,
    /// Running advice, once started
    advisor: Option<Rc<Generator>>,
    /// Cutpoint generator currently being relayed
    inner: Option<Rc<Generator>>,
}
impl AdvisingGenerator {
    /// Runs the state machine until something has to be yielded or returned
    fn step(&mut self, input: Resume) -> Result<GenState, CallError> {
        let mut next = match (self.advisor.clone(), self.inner.clone()) {
            (None, _) => {
                let advisor = start_advisor(&self.advising, self.args.clone())?;
                self.advisor = Some(advisor.clone());
                Step::Advice(first_advice(&advisor, &self.advising)?)
            }
            (Some(_), Some(inner)) => Step::Cutpoint(inner.resume(input)),
            (Some(_), None) => return Ok(GenState::Returned(Value::None)),
        };
        let advisor = match &self.advisor {
            Some(advisor) => advisor.clone(),
            None => return Ok(GenState::Returned(Value::None)),
        };

        loop {
            next = match next {
                Step::Advice(advice) => match Instruction::decode(advice, &self.advising)? {
                    Instruction::Proceed(replacement) => {
                        if let Some(replacement) = replacement {
                            self.args = replacement;
                        }
                        match self.cutpoint.call(self.args.clone()) {
                            Ok(Value::Generator(inner)) => {
                                self.inner = Some(inner.clone());
                                Step::Cutpoint(inner.next())
                            }
                            Ok(other) => Step::Cutpoint(Ok(GenState::Returned(other))),
                            Err(error) => Step::Cutpoint(Err(error)),
                        }
                    }
                    Instruction::Return => return Ok(GenState::Returned(Value::None)),
                    Instruction::ReturnValue(value) => return Ok(GenState::Returned(value)),
                },
                Step::Cutpoint(Ok(GenState::Yielded(value))) => {
                    return Ok(GenState::Yielded(value))
                }
                Step::Cutpoint(Ok(GenState::Returned(result))) => {
                    self.inner = None;
                    match advisor.send(result.clone())? {
                        GenState::Yielded(advice) => Step::Advice(advice),
                        GenState::Returned(_) => return Ok(GenState::Returned(result)),
                    }
                }
                Step::Cutpoint(Err(error)) => {
                    self.inner = None;
                    match advisor.throw(error)? {
                        GenState::Yielded(advice) => Step::Advice(advice),
                        GenState::Returned(value) => return Ok(GenState::Returned(value)),
                    }
                }
            };
        }
    }

    /// Closes the cutpoint generator and the advice
    fn shutdown(&mut self) {
        for generator in [self.inner.take(), self.advisor.take()].into_iter().flatten() {
            if let Err(e) = generator.close() {
                warn!(error = %e, "could not close generator");
            }
        }
    }
}
impl Coroutine for AdvisingGenerator {
    fn resume(&mut self, input: Resume) -> Result<GenState, CallError> {
        let state = self.step(input);
        if !matches!(state, Ok(GenState::Yielded(_))) {
            self.shutdown();
        }
        state
    }

    fn close(&mut self) {
        self.shutdown();
    }
}

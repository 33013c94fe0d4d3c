//! This module contains the wrapper used for plain (non generator) cutpoints

use crate::error::CallError;
use crate::object::{Args, Function, GenState, Value};

use super::{first_advice, start_advisor, AdvisorGuard, Instruction};

/// Creates a function running every call to `cutpoint` through `advising`
pub fn wrap(advising: Value, cutpoint: Value) -> Value {
    Function::native("advising_function_wrapper", move |args| {
        advise(&advising, &cutpoint, args)
    })
    .into()
}

/// Drives one intercepted call
fn advise(advising: &Value, cutpoint: &Value, mut args: Args) -> Result<Value, CallError> {
    let advisor = start_advisor(advising, args.clone())?;
    let _guard = AdvisorGuard(advisor.clone());

    let mut advice = first_advice(&advisor, advising)?;
    loop {
        match Instruction::decode(advice, advising)? {
            Instruction::Proceed(replacement) => {
                if let Some(replacement) = replacement {
                    args = replacement;
                }
                let state = match cutpoint.call(args.clone()) {
                    Ok(result) => match advisor.send(result.clone())? {
                        GenState::Yielded(next) => next,
                        GenState::Returned(_) => return Ok(result),
                    },
                    Err(error) => match advisor.throw(error)? {
                        GenState::Yielded(next) => next,
                        // the advice swallowed the failure and finished
                        GenState::Returned(value) => return Ok(value),
                    },
                };
                advice = state;
            }
            Instruction::Return => return Ok(Value::None),
            Instruction::ReturnValue(value) => return Ok(value),
        }
    }
}

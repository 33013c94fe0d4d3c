//! # Errors
//!
//! Error types shared by the object model, the advice engine, the patcher and the weaver

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// A failure raised by user code running inside the object model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    /// Kind of the failure, e.g. `ValueError`
    pub kind: Rc<str>,
    /// Human readable message
    pub message: Rc<str>,
}
impl Exception {
    /// Creates a new exception of the given kind
    pub fn new(kind: impl Into<Rc<str>>, message: impl Into<Rc<str>>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}
impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Errors raised while calling a value
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// Failure raised by the called code itself
    #[error("{0}")]
    Raised(Exception),
    /// The value is not callable
    #[error("'{0}' object is not callable")]
    NotCallable(String),
    /// Bad arguments or a bad operation for a type
    #[error("TypeError: {0}")]
    Type(String),
    /// Attribute lookup failed
    #[error("{owner} has no attribute '{name}'")]
    Attribute {
        /// Repr of the object the lookup was made on
        owner: String,
        /// Name that was looked up
        name: String,
    },
    /// An advising function did not return a generator
    #[error("advising function {0} did not return a generator.")]
    ExpectedGenerator(String),
    /// An advice yielded something that is not an instruction
    #[error("Unknown advice {0}")]
    UnacceptableAdvice(String),
    /// An advice finished before yielding its first instruction
    #[error("advising function {0} finished without yielding an advice.")]
    AdviceExhausted(String),
    /// A generator was resumed while it was already running
    #[error("generator {0} already executing")]
    GeneratorRunning(String),
    /// Weaving performed at call time (lazy weaving) failed
    #[error("{0}")]
    Weave(Box<WeaveError>),
}
impl CallError {
    /// Shorthand for raising an [`Exception`]
    pub fn raise(kind: impl Into<Rc<str>>, message: impl Into<Rc<str>>) -> Self {
        Self::Raised(Exception::new(kind, message))
    }
}
impl From<WeaveError> for CallError {
    fn from(e: WeaveError) -> Self {
        Self::Weave(Box::new(e))
    }
}

/// Errors raised while weaving a target
#[derive(Debug, Clone, Error)]
pub enum WeaveError {
    /// The advice is neither callable nor a sequence of callables
    #[error("{0} must be an `Aspect` instance, a callable or an iterable of.")]
    ExpectedAdvice(String),
    /// `Aspect` was given something that is not a generator function
    #[error("advising function {0} must be a generator function.")]
    ExpectedGeneratorFunction(String),
    /// Falsy values cannot be woven
    #[error("Can't weave falsy value {0}.")]
    Falsy(String),
    /// A dotted path segment is not a valid identifier
    #[error("Could not match '{name}' to '{pattern}'. It should be a string of letters, numbers and underscore that starts with a letter or underscore.")]
    Syntax {
        /// Offending segment
        name: String,
        /// Pattern segments must match
        pattern: &'static str,
    },
    /// No prefix of a dotted path could be imported
    #[error("Could not import '{target}'. Last try was for {last}")]
    Import {
        /// Full path being woven
        target: String,
        /// Last module name that was tried
        last: String,
    },
    /// An attribute on the way to the target does not exist
    #[error("{owner} has no attribute '{name}'")]
    Attribute {
        /// Repr of the owner
        owner: String,
        /// Missing attribute
        name: String,
    },
    /// The target cannot be patched
    #[error("Can't weave object {0}")]
    UnsupportedType(String),
    /// An option was given that does not apply to the target kind
    #[error("option `{option}` is not supported when weaving {target}")]
    UnsupportedOption {
        /// Name of the option
        option: &'static str,
        /// Kind of target being woven
        target: &'static str,
    },
    /// An aspect did not produce a callable
    #[error("Aspect {aspect} did not return a callable (it return {result}).")]
    NotCallable {
        /// Repr of the aspect
        aspect: String,
        /// Repr of what it returned
        result: String,
    },
    /// The patcher found a same-named attribute that is not the original
    #[error("{location}.{name} = {found} is not {expected}.")]
    Inconsistent {
        /// Owner label
        location: String,
        /// Attribute name
        name: String,
        /// Repr of the value found
        found: String,
        /// Repr of the value expected
        expected: String,
    },
    /// An aspect raised while being applied
    #[error("{0}")]
    Call(#[from] CallError),
}

/// Errors raised while rolling back
#[derive(Debug, Clone, Error)]
pub enum RollbackError {
    /// An instance override was removed by someone else before the rollback ran
    #[error("{location} has no attribute '{name}' to remove")]
    MissingAttribute {
        /// Owner label
        location: String,
        /// Attribute name
        name: String,
    },
    /// A custom undo action failed
    #[error("{0}")]
    Failed(String),
}

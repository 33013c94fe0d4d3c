//! This module contains functions and bound methods

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::CallError;

use super::generator::{Coroutine, Generator};
use super::{Args, Value};

/// Native function body
pub type NativeFn = dyn Fn(Args) -> Result<Value, CallError>;
/// Function body that receives the bound receiver separately from the arguments
pub type ReceiverFn = dyn Fn(Option<Value>, Args) -> Result<Value, CallError>;
/// Generator function body, returning the coroutine of the new generator
pub type GeneratorFn = dyn Fn(Args) -> Result<Box<dyn Coroutine>, CallError>;

/// What runs when a function is called
#[derive(Clone)]
pub enum Body {
    /// Plain function; a bound receiver is prepended to the arguments
    Native(Rc<NativeFn>),
    /// Receiver-aware function
    Receiver(Rc<ReceiverFn>),
    /// Generator function
    Generator(Rc<GeneratorFn>),
}

/// Introspection metadata of a function
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    /// `__name__`
    pub name: Rc<str>,
    /// `__qualname__`, the dotted path from the module to the function
    pub qualname: Rc<str>,
    /// `__doc__`
    pub doc: Option<Rc<str>>,
    /// `__module__`
    pub module: Rc<str>,
}

/// A function of the object model
pub struct Function {
    /// Metadata, mutable so wrappers can take over the metadata of what they wrap
    meta: RefCell<Metadata>,
    /// Code of the function
    body: Body,
}
impl Function {
    /// Creates a function from a body
    pub fn new(name: &str, body: Body) -> Self {
        let name: Rc<str> = Rc::from(name);
        Self {
            meta: RefCell::new(Metadata {
                qualname: name.clone(),
                name,
                doc: None,
                module: Rc::from("__main__"),
            }),
            body,
        }
    }
    /// Creates a plain function
    pub fn native(name: &str, f: impl Fn(Args) -> Result<Value, CallError> + 'static) -> Self {
        Self::new(name, Body::Native(Rc::new(f)))
    }
    /// Creates a receiver-aware function
    pub fn receiver(
        name: &str,
        f: impl Fn(Option<Value>, Args) -> Result<Value, CallError> + 'static,
    ) -> Self {
        Self::new(name, Body::Receiver(Rc::new(f)))
    }
    /// Creates a generator function
    pub fn generator(
        name: &str,
        f: impl Fn(Args) -> Result<Box<dyn Coroutine>, CallError> + 'static,
    ) -> Self {
        Self::new(name, Body::Generator(Rc::new(f)))
    }
    /// Sets `__module__`
    pub fn with_module(self, module: &str) -> Self {
        self.meta.borrow_mut().module = Rc::from(module);
        self
    }
    /// Sets `__qualname__`
    pub fn with_qualname(self, qualname: &str) -> Self {
        self.meta.borrow_mut().qualname = Rc::from(qualname);
        self
    }
    /// Sets `__doc__`
    pub fn with_doc(self, doc: &str) -> Self {
        self.meta.borrow_mut().doc = Some(Rc::from(doc));
        self
    }

    /// `__name__`
    pub fn name(&self) -> Rc<str> {
        self.meta.borrow().name.clone()
    }
    /// `__qualname__`
    pub fn qualname(&self) -> Rc<str> {
        self.meta.borrow().qualname.clone()
    }
    /// `__doc__`
    pub fn doc(&self) -> Option<Rc<str>> {
        self.meta.borrow().doc.clone()
    }
    /// `__module__`
    pub fn module(&self) -> Rc<str> {
        self.meta.borrow().module.clone()
    }
    /// Snapshot of all metadata
    pub fn metadata(&self) -> Metadata {
        self.meta.borrow().clone()
    }
    /// Replaces all metadata
    pub fn set_metadata(&self, meta: Metadata) {
        *self.meta.borrow_mut() = meta;
    }
    /// Replaces `__module__`
    pub fn set_module(&self, module: Rc<str>) {
        self.meta.borrow_mut().module = module;
    }
    /// Whether the function is a generator function
    pub fn is_generator(&self) -> bool {
        matches!(self.body, Body::Generator(_))
    }

    /// Calls the function unbound
    pub fn call(&self, args: Args) -> Result<Value, CallError> {
        match &self.body {
            Body::Native(f) => f(args),
            Body::Receiver(f) => f(None, args),
            Body::Generator(f) => {
                let coroutine = f(args)?;
                Ok(Value::Generator(Rc::new(Generator::new(
                    self.name(),
                    coroutine,
                ))))
            }
        }
    }
    /// Calls the function bound to `receiver`
    pub fn call_bound(&self, receiver: Value, args: Args) -> Result<Value, CallError> {
        match &self.body {
            Body::Receiver(f) => f(Some(receiver), args),
            _ => self.call(args.with_receiver(receiver)),
        }
    }
}
impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.qualname())
    }
}

/// A callable bound to a receiver
pub struct BoundMethod {
    /// Underlying callable (`__func__`)
    function: Value,
    /// Receiver (`__self__`)
    receiver: Value,
}
impl BoundMethod {
    /// Binds `function` to `receiver`
    pub fn new(function: Value, receiver: Value) -> Self {
        Self { function, receiver }
    }
    /// Underlying callable
    pub fn function(&self) -> &Value {
        &self.function
    }
    /// Receiver
    pub fn receiver(&self) -> &Value {
        &self.receiver
    }
    /// Calls the underlying callable with the receiver
    pub fn call(&self, args: Args) -> Result<Value, CallError> {
        self.function
            .call_with_receiver(Some(self.receiver.clone()), args)
    }
    /// Whether `other` is this method or a view of the same function on the same receiver
    pub fn is_view_of(&self, other: &Value) -> bool {
        match other {
            Value::Method(m) => {
                m.function.is(&self.function) && m.receiver.is(&self.receiver)
            }
            other => other.is(&self.function),
        }
    }
}
impl From<BoundMethod> for Value {
    fn from(m: BoundMethod) -> Self {
        Value::Method(Rc::new(m))
    }
}

//! # Object
//!
//! This module covers the dynamic object model that advice is woven into.
//!
//! Rust has no runtime reflection over functions, so the weaver operates on this model instead:
//! modules, classes and instances are attribute namespaces holding [`Value`]s, and every callable
//! is reached through one of those namespaces. Replacing a namespace entry is what "patching" means.

pub mod class;
pub mod function;
pub mod generator;
pub mod module;
pub mod namespace;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::advice::Advice;
use crate::error::CallError;

pub use class::{Class, ClassBuilder, Instance, Origin};
pub use function::{BoundMethod, Function, Metadata};
pub use generator::{from_fn, Coroutine, GenState, Generator, Resume};
pub use module::{Module, Runtime};
pub use namespace::{Namespace, Owner};

/// Any value of the object model
#[derive(Clone)]
pub enum Value {
    /// The absence of a value
    None,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// String
    Str(Rc<str>),
    /// Immutable sequence
    Tuple(Rc<[Value]>),
    /// Mutable sequence
    List(Rc<RefCell<Vec<Value>>>),
    /// Plain function
    Function(Rc<Function>),
    /// Function bound to a receiver
    Method(Rc<BoundMethod>),
    /// Static method descriptor, stored in class dictionaries
    StaticMethod(Rc<Value>),
    /// Class method descriptor, stored in class dictionaries
    ClassMethod(Rc<Value>),
    /// Class
    Class(Rc<Class>),
    /// Module
    Module(Rc<Module>),
    /// Instance of a class
    Instance(Rc<Instance>),
    /// Suspended generator
    Generator(Rc<Generator>),
    /// Instruction yielded by an advice
    Advice(Rc<Advice>),
}

impl Value {
    /// Identity comparison.
    ///
    /// Objects compare by pointer, scalars by value.
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::StaticMethod(a), Value::StaticMethod(b)) => Rc::ptr_eq(a, b),
            (Value::ClassMethod(a), Value::ClassMethod(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Generator(a), Value::Generator(b)) => Rc::ptr_eq(a, b),
            (Value::Advice(a), Value::Advice(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Truthiness of the value
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            _ => true,
        }
    }

    /// Calls the value
    pub fn call(&self, args: Args) -> Result<Value, CallError> {
        match self {
            Value::Function(f) => f.call(args),
            Value::Method(m) => m.call(args),
            Value::StaticMethod(f) => f.call(args),
            Value::Class(c) => Class::instantiate(c, args),
            Value::Instance(i) => match i.class().lookup("__call__") {
                Some(call) => Class::bind(&call, self, i.class()).call(args),
                None => Err(CallError::NotCallable(i.class().name().to_string())),
            },
            other => Err(CallError::NotCallable(other.type_name().to_string())),
        }
    }

    /// Calls the value with an optional receiver.
    ///
    /// Receiver-aware functions get the receiver separately, everything else gets it prepended to `args`.
    pub fn call_with_receiver(
        &self,
        receiver: Option<Value>,
        args: Args,
    ) -> Result<Value, CallError> {
        match (self, receiver) {
            (Value::Function(f), Some(receiver)) => f.call_bound(receiver, args),
            (_, Some(receiver)) => self.call(args.with_receiver(receiver)),
            (_, None) => self.call(args),
        }
    }

    /// Whether [`Value::call`] can succeed on this value
    pub fn is_callable(&self) -> bool {
        match self {
            Value::Function(_) | Value::Method(_) | Value::StaticMethod(_) | Value::Class(_) => {
                true
            }
            Value::Instance(i) => i.class().lookup("__call__").is_some(),
            _ => false,
        }
    }

    /// Functions, bound methods and method descriptors
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Method(_) | Value::StaticMethod(_) | Value::ClassMethod(_)
        )
    }

    /// Static and class method descriptors
    pub fn is_method_descriptor(&self) -> bool {
        matches!(self, Value::StaticMethod(_) | Value::ClassMethod(_))
    }

    /// Whether calling the value produces a generator
    pub fn is_generator_function(&self) -> bool {
        match self {
            Value::Function(f) => f.is_generator(),
            Value::Method(m) => m.function().is_generator_function(),
            Value::StaticMethod(f) => f.is_generator_function(),
            _ => false,
        }
    }

    /// Reads an attribute from a module, class or instance
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        match self {
            Value::Module(m) => m.get(name),
            Value::Class(c) => c.get_attr(name),
            Value::Instance(i) => i.get_attr(name),
            _ => None,
        }
    }

    /// `__name__` of the value, if it has one
    pub fn name(&self) -> Option<Rc<str>> {
        match self {
            Value::Function(f) => Some(f.name()),
            Value::Method(m) => m.function().name(),
            Value::StaticMethod(f) | Value::ClassMethod(f) => f.name(),
            Value::Class(c) => Some(c.name()),
            Value::Module(m) => Some(m.name()),
            Value::Generator(g) => Some(g.name()),
            _ => None,
        }
    }

    /// Short name of the value's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Method(_) => "method",
            Value::StaticMethod(_) => "staticmethod",
            Value::ClassMethod(_) => "classmethod",
            Value::Class(_) => "type",
            Value::Module(_) => "module",
            Value::Instance(_) => "object",
            Value::Generator(_) => "generator",
            Value::Advice(_) => "advice",
        }
    }

    /// Builds a list value
    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    /// Builds a tuple value
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Tuple(items.into_iter().collect())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            _ => self.is(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        /// Writes a comma separated sequence
        fn seq(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", item)?;
            }
            Ok(())
        }
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Tuple(t) => {
                f.write_str("(")?;
                seq(f, t)?;
                if t.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::List(l) => {
                f.write_str("[")?;
                seq(f, &l.borrow())?;
                f.write_str("]")
            }
            Value::Function(func) => write!(f, "<function {}>", func.qualname()),
            Value::Method(m) => write!(
                f,
                "<bound method {} of {}>",
                m.function()
                    .name()
                    .unwrap_or_else(|| Rc::from("?")),
                m.receiver()
            ),
            Value::StaticMethod(inner) => write!(f, "<staticmethod({})>", inner),
            Value::ClassMethod(inner) => write!(f, "<classmethod({})>", inner),
            Value::Class(c) => write!(f, "<class '{}.{}'>", c.module(), c.qualname()),
            Value::Module(m) => write!(f, "<module '{}'>", m.name()),
            Value::Instance(i) => write!(
                f,
                "<{}.{} object>",
                i.class().module(),
                i.class().qualname()
            ),
            Value::Generator(g) => write!(f, "<generator object {}>", g.name()),
            Value::Advice(a) => write!(f, "{}", a),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}
impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(Rc::new(f))
    }
}
impl From<Rc<Function>> for Value {
    fn from(f: Rc<Function>) -> Self {
        Value::Function(f)
    }
}
impl From<Rc<Class>> for Value {
    fn from(c: Rc<Class>) -> Self {
        Value::Class(c)
    }
}
impl From<Rc<Module>> for Value {
    fn from(m: Rc<Module>) -> Self {
        Value::Module(m)
    }
}
impl From<Rc<Instance>> for Value {
    fn from(i: Rc<Instance>) -> Self {
        Value::Instance(i)
    }
}
impl From<Advice> for Value {
    fn from(a: Advice) -> Self {
        Value::Advice(Rc::new(a))
    }
}

/// Arguments of a call
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args {
    /// Positional arguments
    pub positional: Vec<Value>,
    /// Keyword arguments, in the order they were given
    pub keywords: Vec<(Rc<str>, Value)>,
}
impl Args {
    /// Creates an empty argument list
    pub fn new() -> Self {
        Self::default()
    }
    /// Creates an argument list from positional arguments
    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            keywords: Vec::new(),
        }
    }
    /// Adds a keyword argument
    pub fn keyword(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.keywords.push((Rc::from(name), value.into()));
        self
    }
    /// Gets a positional argument
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }
    /// Gets a keyword argument
    pub fn get_keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(k, _)| &**k == name)
            .map(|(_, v)| v)
    }
    /// Prepends a receiver to the positional arguments
    pub fn with_receiver(mut self, receiver: Value) -> Self {
        self.positional.insert(0, receiver);
        self
    }
    /// Splits the first positional argument off
    pub fn split_receiver(mut self) -> (Option<Value>, Self) {
        if self.positional.is_empty() {
            (None, self)
        } else {
            let receiver = self.positional.remove(0);
            (Some(receiver), self)
        }
    }
}
impl<const N: usize> From<[Value; N]> for Args {
    fn from(values: [Value; N]) -> Self {
        Self::positional(values)
    }
}

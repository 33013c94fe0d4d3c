//! # Wrapper
//!
//! This takes a callable and an aspect chain and produces the replacement that gets installed in its place.
//!
//! Replacements take over the metadata of what they replace, so anything introspecting the owner
//! (including alias discovery in the patcher) sees no difference.

use std::rc::Rc;

use tracing::debug;

use crate::advice::Aspect;
use crate::error::WeaveError;
use crate::object::{Args, Function, Value};

/// What gets applied to a cutpoint: one decorator or an ordered chain of them
#[derive(Clone, Debug)]
pub enum Aspects {
    /// A single decorator
    Single(Value),
    /// Decorators applied in order, each one decorating the output of the previous one
    Chain(Rc<[Value]>),
}
impl Aspects {
    /// Decorators in application order
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        let items: &[Value] = match self {
            Aspects::Single(aspect) => std::slice::from_ref(aspect),
            Aspects::Chain(chain) => chain,
        };
        items.iter()
    }
    /// The same decorators followed by `last`
    pub fn then(&self, last: Value) -> Aspects {
        let mut chain: Vec<Value> = self.iter().cloned().collect();
        chain.push(last);
        Aspects::Chain(chain.into())
    }
}
impl TryFrom<Value> for Aspects {
    type Error = WeaveError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if value.is_callable() {
            return Ok(Aspects::Single(value));
        }
        let items: Vec<Value> = match &value {
            Value::Tuple(items) => items.to_vec(),
            Value::List(items) => items.borrow().clone(),
            _ => return Err(WeaveError::ExpectedAdvice(value.to_string())),
        };
        if let Some(bad) = items.iter().find(|item| !item.is_callable()) {
            return Err(WeaveError::ExpectedAdvice(bad.to_string()));
        }
        Ok(Aspects::Chain(items.into()))
    }
}
impl From<Aspect> for Aspects {
    fn from(aspect: Aspect) -> Self {
        Aspects::Single(aspect.into())
    }
}
impl From<Function> for Aspects {
    fn from(function: Function) -> Self {
        Aspects::Single(function.into())
    }
}

/// Applies every decorator of `aspects` to `function`, checking each produced a callable.
///
/// The result takes over the metadata of `function`; `module` overrides its `__module__` when given.
pub fn apply(
    aspects: &Aspects,
    function: &Value,
    module: Option<Rc<str>>,
) -> Result<Value, WeaveError> {
    debug!(aspects = ?aspects, %function, "applying aspects");
    let mut wrapper = function.clone();
    for aspect in aspects.iter() {
        wrapper = aspect.call(Args::from([wrapper]))?;
        if !wrapper.is_callable() {
            return Err(WeaveError::NotCallable {
                aspect: aspect.to_string(),
                result: wrapper.to_string(),
            });
        }
    }
    mimic(&wrapper, function, module);
    Ok(wrapper)
}

/// Applies `aspects` to a raw class attribute, keeping static and class method descriptors
pub fn rewrap(raw: &Value, aspects: &Aspects) -> Result<Value, WeaveError> {
    Ok(match raw {
        Value::StaticMethod(inner) => Value::StaticMethod(Rc::new(apply(aspects, inner, None)?)),
        Value::ClassMethod(inner) => Value::ClassMethod(Rc::new(apply(aspects, inner, None)?)),
        other => apply(aspects, other, None)?,
    })
}

/// The function carrying the metadata of a callable, if any
pub(crate) fn function_of(value: &Value) -> Option<&Rc<Function>> {
    match value {
        Value::Function(f) => Some(f),
        Value::Method(m) => function_of(m.function()),
        Value::StaticMethod(inner) | Value::ClassMethod(inner) => function_of(inner),
        _ => None,
    }
}

/// Copies the name, qualified name, docstring and module of `original` onto `wrapper`
pub fn mimic(wrapper: &Value, original: &Value, module: Option<Rc<str>>) {
    let (Some(target), Some(source)) = (function_of(wrapper), function_of(original)) else {
        return;
    };
    if !Rc::ptr_eq(target, source) {
        target.set_metadata(source.metadata());
    }
    if let Some(module) = module {
        target.set_module(module);
    }
}

/// Turns a bound callable into a function that ignores the receiver it is called with.
///
/// Used to wrap methods that are already bound: the wrapper gets bound again, so the advice sees
/// the receiver as its first argument, but the original must not get it twice.
pub fn force_bind(function: Value) -> Value {
    let bound = Function::native("bound", {
        let function = function.clone();
        move |args| {
            let (_receiver, rest) = args.split_receiver();
            function.call(rest)
        }
    });
    if let Some(source) = function_of(&function) {
        let mut meta = bound.metadata();
        meta.name = source.name();
        meta.doc = source.doc();
        bound.set_metadata(meta);
    }
    bound.into()
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::error::{CallError, WeaveError};
    use crate::object::{Args, BoundMethod, Function, Value};

    use super::{apply, force_bind, rewrap, Aspects};

    /// Decorator adding `n` to the result of what it decorates
    fn adding(n: i64) -> Value {
        Function::native("adding", move |args| {
            let inner = args.get(0).cloned().unwrap_or(Value::None);
            Ok(Function::native("added", move |args| match inner.call(args)? {
                Value::Int(i) => Ok(Value::Int(i + n)),
                other => Ok(other),
            })
            .into())
        })
        .into()
    }

    /// Decorator multiplying the result of what it decorates by `n`
    fn times(n: i64) -> Value {
        Function::native("times", move |args| {
            let inner = args.get(0).cloned().unwrap_or(Value::None);
            Ok(Function::native("multiplied", move |args| match inner.call(args)? {
                Value::Int(i) => Ok(Value::Int(i * n)),
                other => Ok(other),
            })
            .into())
        })
        .into()
    }

    /// Function returning 1, with metadata
    fn one() -> Value {
        Function::native("one", |_| Ok(Value::Int(1)))
            .with_module("pkg")
            .with_qualname("Holder.one")
            .with_doc("returns one")
            .into()
    }

    #[test]
    /// Each decorator of a chain decorates the output of the previous one
    fn test_chain_order() {
        let chain = Aspects::try_from(Value::list([adding(1), times(10)])).unwrap();
        let wrapper = apply(&chain, &one(), None).unwrap();

        // times(adding(one)) = (1 + 1) * 10
        assert_eq!(wrapper.call(Args::new()).unwrap(), Value::Int(20));
    }

    #[test]
    /// Replacements look like what they replace
    fn test_metadata() {
        let wrapper = apply(&Aspects::Single(adding(1)), &one(), Some(Rc::from("other"))).unwrap();
        match wrapper {
            Value::Function(f) => {
                assert_eq!(&*f.name(), "one");
                assert_eq!(&*f.qualname(), "Holder.one");
                assert_eq!(f.doc().as_deref(), Some("returns one"));
                assert_eq!(&*f.module(), "other");
            }
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    /// Invalid advice is rejected, as are decorators that return non-callables
    fn test_validation() {
        assert!(matches!(
            Aspects::try_from(Value::Int(1)),
            Err(WeaveError::ExpectedAdvice(_))
        ));
        assert!(matches!(
            Aspects::try_from(Value::tuple([adding(1), Value::from("x")])),
            Err(WeaveError::ExpectedAdvice(ref v)) if v == "'x'"
        ));

        let broken = Value::from(Function::native("broken", |_| Ok(Value::Int(3))));
        let err = apply(&Aspects::Single(broken), &one(), None).unwrap_err();
        assert!(matches!(err, WeaveError::NotCallable { ref result, .. } if result == "3"));

        let raising = Value::from(Function::native("raising", |_| {
            Err(CallError::raise("RuntimeError", "boom"))
        }));
        assert!(matches!(
            apply(&Aspects::Single(raising), &one(), None),
            Err(WeaveError::Call(_))
        ));
    }

    #[test]
    /// Descriptors survive rewrapping
    fn test_rewrap() {
        let raw = Value::StaticMethod(Rc::new(one()));
        match rewrap(&raw, &Aspects::Single(adding(1))).unwrap() {
            Value::StaticMethod(inner) => {
                assert_eq!(inner.call(Args::new()).unwrap(), Value::Int(2))
            }
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    /// Force-bound functions drop the receiver they are called with
    fn test_force_bind() {
        let first = Value::from(Function::native("first", |args| {
            Ok(args.get(0).cloned().unwrap_or(Value::None))
        }));
        let method = Value::from(BoundMethod::new(first, Value::from("me")));
        let unbound = force_bind(method);

        assert_eq!(unbound.name().as_deref(), Some("first"));
        let result = unbound
            .call(Args::from([Value::from("ignored"), Value::Int(1)]))
            .unwrap();
        assert_eq!(result, Value::from("me"));
    }
}

//! This module contains instance weaving, for whole instances and single bound methods

use std::rc::Rc;

use tracing::{debug, info};

use crate::error::{CallError, RollbackError, WeaveError};
use crate::object::{BoundMethod, Function, Instance, Owner, Value};
use crate::patcher::AttributePatcher;
use crate::rollback::Rollback;
use crate::wrapper::{apply, Aspects};

use super::{WeaveOptions, Weaver};

impl<'rt> Weaver<'rt> {
    /// Overrides the methods of one instance with wrappers bound to it
    pub(super) fn weave_instance(
        &self,
        instance: &Rc<Instance>,
        aspects: &Aspects,
        options: &WeaveOptions,
    ) -> Result<Rollback, WeaveError> {
        options.check("instance", &["methods", "lazy", "aliases"])?;
        let methods = options.method_filter();
        let receiver = Value::Instance(instance.clone());
        debug!(
            instance = %receiver,
            methods = ?methods,
            aliases = options.patches_aliases(),
            "weaving instance"
        );
        let fixed = aspects.then(rebinding(receiver.clone()));

        let owner = Owner::Instance(instance.clone());
        let mut rollback = Rollback::new();
        for attr in instance.dir() {
            if !methods.matches(&attr) {
                continue;
            }
            let method = match instance.get_attr(&attr) {
                Some(Value::Method(method)) if method.receiver().is(&receiver) => method,
                _ => continue,
            };
            let view = Value::Method(method.clone());
            info!(%attr, method = %view, "weaving instance method");
            let patched = apply(&fixed, method.function(), None).and_then(|wrapper| {
                AttributePatcher::new()
                    .aliases(options.patches_aliases())
                    .patch(&owner, &attr, wrapper)
            });
            match patched {
                Ok(done) => rollback.merge(done),
                Err(e) => return Err(rollback.abort(e)),
            }
        }
        Ok(rollback)
    }

    /// Overrides a single bound method on its instance.
    ///
    /// Rolling back removes the override, so the class behaviour shows through again.
    pub(super) fn weave_bound_method(
        &self,
        method: &Rc<BoundMethod>,
        aspects: &Aspects,
        options: &WeaveOptions,
    ) -> Result<Rollback, WeaveError> {
        options.check("bound method", &[])?;
        let instance = match method.receiver() {
            Value::Instance(instance) => instance.clone(),
            _ => return Err(WeaveError::UnsupportedType(Value::Method(method.clone()).to_string())),
        };
        let name = method
            .function()
            .name()
            .ok_or_else(|| WeaveError::UnsupportedType(method.function().to_string()))?;
        let view = Value::Method(method.clone());
        debug!(method = %view, %name, "patching as instance method");

        let wrapper = apply(aspects, method.function(), None)?;
        let previous = instance.get_own(&name);
        instance.set_own(&name, BoundMethod::new(wrapper, method.receiver().clone()).into());

        Ok(Rollback::from_action(move || match &previous {
            Some(previous) => {
                instance.set_own(&name, previous.clone());
                Ok(())
            }
            None => match instance.remove_own(&name) {
                Some(_) => Ok(()),
                None => Err(RollbackError::MissingAttribute {
                    location: instance.class().module().to_string(),
                    name: name.to_string(),
                }),
            },
        }))
    }
}

/// Decorator binding what it decorates to `receiver`
fn rebinding(receiver: Value) -> Value {
    Function::native("fixup", move |args| match args.get(0) {
        Some(function) => Ok(BoundMethod::new(function.clone(), receiver.clone()).into()),
        None => Err(CallError::Type("fixup expects a function".to_string())),
    })
    .into()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::error::{RollbackError, WeaveError};
    use crate::object::{Args, ClassBuilder, Function, Namespace, Owner, Runtime, Value};
    use crate::weave::tests::returning;
    use crate::weave::{WeaveOptions, Weaver};

    /// Class with a method returning its receiver and one returning a constant
    fn klass() -> Rc<crate::object::Class> {
        ClassBuilder::new("Klass")
            .module("pkg")
            .method(Function::native("me", |args| {
                Ok(args.get(0).cloned().unwrap_or(Value::None))
            }))
            .method(Function::native("const", |_| Ok(Value::Int(1))))
            .classmethod(Function::native("cls", |_| Ok(Value::Int(2))))
            .build()
    }

    #[test]
    /// Only the woven instance changes, and the advice sees the receiver
    fn test_instance() {
        let runtime = Runtime::new();
        let klass = klass();
        let inst = klass.instantiate(Args::new()).unwrap();
        let other = klass.instantiate(Args::new()).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let spy = Function::native("spy", move |args| {
            let inner = args.get(0).cloned().unwrap_or(Value::None);
            let log = log.clone();
            Ok(Function::native("spied", move |args| {
                log.borrow_mut().push(args.get(0).cloned().unwrap_or(Value::None));
                inner.call(args)
            })
            .into())
        });

        let rollback = Weaver::new(&runtime)
            .weave(inst.clone(), spy, WeaveOptions::new())
            .unwrap();
        assert!(inst.get_attr("me").unwrap().call(Args::new()).unwrap().is(&inst));
        assert_eq!(
            inst.get_attr("const").unwrap().call(Args::new()).unwrap(),
            Value::Int(1)
        );
        assert!(seen.borrow().iter().all(|r| r.is(&inst)));
        assert_eq!(seen.borrow().len(), 2);

        // class methods are bound to the class, not the instance
        let owner = Owner::try_from(&inst).unwrap();
        assert!(!owner.has_own("cls"));

        other.get_attr("const").unwrap().call(Args::new()).unwrap();
        assert_eq!(seen.borrow().len(), 2);

        rollback.rollback().unwrap();
        assert!(!owner.has_own("me"));
        assert!(!owner.has_own("const"));
    }

    #[test]
    /// A bound method is overridden on its instance only
    fn test_bound_method() {
        let runtime = Runtime::new();
        let klass = klass();
        let inst = klass.instantiate(Args::new()).unwrap();
        let other = klass.instantiate(Args::new()).unwrap();
        let method = inst.get_attr("const").unwrap();

        let weaver = Weaver::new(&runtime);
        assert!(matches!(
            weaver.weave(method.clone(), returning("x"), WeaveOptions::new().aliases(true)),
            Err(WeaveError::UnsupportedOption { .. })
        ));

        let rollback = weaver
            .weave(method, returning("woven"), WeaveOptions::new())
            .unwrap();
        assert_eq!(
            inst.get_attr("const").unwrap().call(Args::new()).unwrap(),
            Value::from("woven")
        );
        assert_eq!(
            other.get_attr("const").unwrap().call(Args::new()).unwrap(),
            Value::Int(1)
        );

        rollback.rollback().unwrap();
        assert_eq!(
            inst.get_attr("const").unwrap().call(Args::new()).unwrap(),
            Value::Int(1)
        );

        // the override is gone, a second rollback has nothing to remove
        assert!(matches!(
            rollback.rollback(),
            Err(RollbackError::MissingAttribute { .. })
        ));
    }

    #[test]
    /// Class methods cannot be woven as bound methods
    fn test_class_bound() {
        let runtime = Runtime::new();
        let cls = Value::Class(klass()).get_attr("cls").unwrap();
        assert!(matches!(
            Weaver::new(&runtime).weave(cls, returning("x"), WeaveOptions::new()),
            Err(WeaveError::UnsupportedType(_))
        ));
    }
}

//! This module contains whole-module weaving

use std::rc::Rc;

use tracing::debug;

use crate::error::WeaveError;
use crate::object::{Module, Owner, Value};
use crate::rollback::Rollback;
use crate::wrapper::Aspects;

use super::{WeaveOptions, Weaver};

impl<'rt> Weaver<'rt> {
    /// Weaves every selected function and class of a module.
    ///
    /// Members are collected before anything is patched. A member that was already woven under
    /// another name is skipped when aliases are propagated, since that weave covered it.
    pub(super) fn weave_module(
        &self,
        module: &Rc<Module>,
        aspects: &Aspects,
        options: &WeaveOptions,
    ) -> Result<Rollback, WeaveError> {
        options.check("module", &["methods", "lazy", "aliases"])?;
        let methods = options.method_filter();
        debug!(
            module = %module.name(),
            methods = ?methods,
            lazy = options.is_lazy(),
            aliases = options.patches_aliases(),
            "weaving module"
        );

        let members: Vec<(Rc<str>, Value)> = module
            .names()
            .into_iter()
            .filter(|name| methods.matches(name))
            .filter_map(|name| module.get(&name).map(|value| (name, value)))
            .collect();

        let owner = Owner::Module(module.clone());
        let mut rollback = Rollback::new();
        let mut woven: Vec<Value> = Vec::new();
        for (name, member) in members {
            let covered = woven.iter().any(|done| done.is(&member));
            let result = match &member {
                Value::Class(class) => {
                    // in-place weaving already reached every name of the class
                    if covered && (options.patches_aliases() || !options.is_lazy()) {
                        continue;
                    }
                    self.weave_class(
                        class,
                        aspects,
                        &options.for_module_class(),
                        Some((owner.clone(), name.clone())),
                    )
                }
                routine if routine.is_routine() => {
                    if covered && options.patches_aliases() {
                        continue;
                    }
                    self.weave_owner_function(
                        &owner,
                        routine,
                        &name,
                        aspects,
                        &options.for_function(),
                    )
                }
                _ => continue,
            };
            match result {
                Ok(done) => rollback.merge(done),
                Err(e) => return Err(rollback.abort(e)),
            }
            woven.push(member);
        }
        Ok(rollback)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::WeaveError;
    use crate::object::{Args, ClassBuilder, Function, Module, Runtime, Value};
    use crate::weave::tests::returning;
    use crate::weave::{Methods, WeaveOptions, Weaver};

    /// Module `pkg` with two aliased functions, a dunder, a class and a constant
    fn module() -> (Runtime, std::rc::Rc<Module>) {
        let runtime = Runtime::new();
        let module = Module::new("pkg");
        let func = module.def(Function::native("func", |_| Ok(Value::from("func"))));
        module.set("alias", func);
        module.def(Function::native("__hidden__", |_| Ok(Value::from("hidden"))));
        module.set("CONSTANT", Value::Int(1));
        let klass = ClassBuilder::new("Klass")
            .module("pkg")
            .method(Function::native("meth", |_| Ok(Value::from("meth"))))
            .build();
        module.add_class(&klass);
        runtime.register(&module);
        (runtime, module)
    }

    /// Calls a module member without arguments
    fn call(module: &Module, name: &str) -> Value {
        module.get(name).unwrap().call(Args::new()).unwrap()
    }

    #[test]
    /// Selected functions and classes are woven, aliases once
    fn test_module() {
        let (runtime, module) = module();
        let func = module.get("func").unwrap();

        let rollback = Weaver::new(&runtime)
            .weave("pkg", returning("woven"), WeaveOptions::new())
            .unwrap();
        assert_eq!(call(&module, "func"), Value::from("woven"));
        assert!(module.get("alias").unwrap().is(&module.get("func").unwrap()));
        assert_eq!(call(&module, "__hidden__"), Value::from("hidden"));
        assert_eq!(module.get("CONSTANT"), Some(Value::Int(1)));

        let inst = module.get("Klass").unwrap().call(Args::new()).unwrap();
        assert_eq!(
            inst.get_attr("meth").unwrap().call(Args::new()).unwrap(),
            Value::from("woven")
        );

        rollback.rollback().unwrap();
        assert!(module.get("func").unwrap().is(&func));
        assert!(module.get("alias").unwrap().is(&func));
        assert_eq!(
            inst.get_attr("meth").unwrap().call(Args::new()).unwrap(),
            Value::from("meth")
        );
    }

    #[test]
    /// Without alias propagation each name gets its own wrapper
    fn test_no_aliases() {
        let (runtime, module) = module();
        let rollback = Weaver::new(&runtime)
            .weave(
                module.clone(),
                returning("woven"),
                WeaveOptions::new()
                    .aliases(false)
                    .methods(Methods::names(["func", "alias"])),
            )
            .unwrap();
        assert_eq!(call(&module, "func"), Value::from("woven"));
        assert_eq!(call(&module, "alias"), Value::from("woven"));
        assert!(!module.get("alias").unwrap().is(&module.get("func").unwrap()));
        rollback.rollback().unwrap();
    }

    #[test]
    /// Modules have no subclasses to fan out to
    fn test_options() {
        let (runtime, module) = module();
        assert!(matches!(
            Weaver::new(&runtime).weave(
                module,
                returning("woven"),
                WeaveOptions::new().subclasses(false)
            ),
            Err(WeaveError::UnsupportedOption {
                option: "subclasses",
                ..
            })
        ));
    }

    #[test]
    /// Lazily woven classes get one shim per alias unless aliases are propagated
    fn test_lazy_aliases() {
        let (runtime, module) = module();
        let klass = module.get("Klass").unwrap();
        module.set("Other", klass.clone());
        let weaver = Weaver::new(&runtime);
        let woven_meth = |name: &str| {
            let inst = module.get(name).unwrap().call(Args::new()).unwrap();
            inst.get_attr("meth").unwrap().call(Args::new()).unwrap()
        };

        // the alias is patched along with the first name and then skipped
        let rollback = weaver
            .weave("pkg", returning("woven"), WeaveOptions::new().lazy(true))
            .unwrap();
        let shim = module.get("Klass").unwrap();
        assert!(!shim.is(&klass));
        assert!(module.get("Other").unwrap().is(&shim));
        assert_eq!(woven_meth("Other"), Value::from("woven"));
        rollback.rollback().unwrap();
        assert!(module.get("Klass").unwrap().is(&klass));
        assert!(module.get("Other").unwrap().is(&klass));

        // without propagation the alias is woven on its own
        let rollback = weaver
            .weave(
                "pkg",
                returning("woven"),
                WeaveOptions::new().lazy(true).aliases(false),
            )
            .unwrap();
        let shim = module.get("Klass").unwrap();
        let other = module.get("Other").unwrap();
        assert!(!shim.is(&klass));
        assert!(!other.is(&klass));
        assert!(!other.is(&shim));
        assert_eq!(woven_meth("Klass"), Value::from("woven"));
        assert_eq!(woven_meth("Other"), Value::from("woven"));
        rollback.rollback().unwrap();
        assert!(module.get("Klass").unwrap().is(&klass));
        assert!(module.get("Other").unwrap().is(&klass));
    }
}

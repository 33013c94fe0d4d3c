//! This module contains class weaving, in place or through a generated subclass

use std::collections::BTreeSet;
use std::rc::Rc;

use tracing::debug;

use crate::error::{CallError, WeaveError};
use crate::object::{BoundMethod, Class, ClassBuilder, Function, Origin, Owner, Value};
use crate::patcher::AttributePatcher;
use crate::rollback::Rollback;
use crate::wrapper::{apply, force_bind, rewrap, Aspects};

use super::{Methods, WeaveOptions, Weaver};

impl<'rt> Weaver<'rt> {
    /// Weaves a class and, unless disabled, its live subclasses first.
    ///
    /// `site` is where the class was found; lazy weaving rebinds the shim there, falling back to
    /// the class's own module.
    pub(super) fn weave_class(
        &self,
        class: &Rc<Class>,
        aspects: &Aspects,
        options: &WeaveOptions,
        site: Option<(Owner, Rc<str>)>,
    ) -> Result<Rollback, WeaveError> {
        let methods = options.method_filter();
        let mut rollback = Rollback::new();

        if options.weaves_subclasses() {
            for subclass in class.subclasses() {
                if subclass.is_generated() {
                    continue;
                }
                match self.weave_class(&subclass, aspects, options, None) {
                    Ok(done) => rollback.merge(done),
                    Err(e) => return Err(rollback.abort(e)),
                }
            }
        }

        debug!(
            class = %class.qualname(),
            methods = ?methods,
            subclasses = options.weaves_subclasses(),
            lazy = options.is_lazy(),
            aliases = options.patches_aliases(),
            "weaving class"
        );
        let woven = if options.is_lazy() {
            self.weave_lazy(class, aspects, &methods, options.patches_aliases(), site)
        } else {
            weave_eager(class, aspects, &methods)
        };
        match woven {
            Ok(done) => {
                rollback.merge(done);
                Ok(rollback)
            }
            Err(e) => Err(rollback.abort(e)),
        }
    }

    /// Installs a generated subclass whose constructor wraps the methods of each new instance
    fn weave_lazy(
        &self,
        class: &Rc<Class>,
        aspects: &Aspects,
        methods: &Methods,
        aliases: bool,
        site: Option<(Owner, Rc<str>)>,
    ) -> Result<Rollback, WeaveError> {
        let (owner, name) = match site {
            Some(site) => site,
            None => {
                let module = self.runtime.import(&class.module()).ok_or_else(|| {
                    WeaveError::Import {
                        target: class.qualname().to_string(),
                        last: class.module().to_string(),
                    }
                })?;
                (Owner::Module(module), class.name())
            }
        };

        // descriptors are wrapped once, in the shim's dictionary
        let mut descriptors = Vec::new();
        for (attr, raw) in class.own_items() {
            if methods.matches(&attr) && raw.is_method_descriptor() {
                descriptors.push((attr, rewrap(&raw, aspects)?));
            }
        }
        let mut skipped: BTreeSet<Rc<str>> = descriptors.iter().map(|(a, _)| a.clone()).collect();
        skipped.insert(Rc::from("__init__"));

        let init = Value::from(
            shim_init(class.clone(), aspects.clone(), methods.clone(), skipped)
                .with_qualname(&format!("{}.__init__", class.qualname()))
                .with_module(&class.module()),
        );
        let init = if methods.matches("__init__") {
            apply(aspects, &init, None)?
        } else {
            init
        };

        let mut shim = ClassBuilder::new(&name)
            .module(&class.module())
            .qualname(&class.qualname())
            .base(class)
            .origin(Origin::Generated)
            .attr("__init__", init);
        for (attr, wrapper) in descriptors {
            shim = shim.attr(&attr, wrapper);
        }
        let shim = shim.build();
        debug!(shim = %shim.qualname(), "created subclass");

        AttributePatcher::new()
            .original(Value::Class(class.clone()))
            .aliases(aliases)
            .patch(&owner, &name, Value::Class(shim))
    }
}

/// Constructor of a lazy-weaving shim.
///
/// Runs the constructor of `class`, then overrides every selected routine of the new instance
/// with a wrapper bound to it.
fn shim_init(
    class: Rc<Class>,
    aspects: Aspects,
    methods: Methods,
    skipped: BTreeSet<Rc<str>>,
) -> Function {
    Function::native("__init__", move |args| {
        let (receiver, args) = args.split_receiver();
        let instance = match receiver {
            Some(Value::Instance(instance)) => instance,
            _ => {
                return Err(CallError::Type(
                    "__init__ must be called on an instance".to_string(),
                ))
            }
        };
        let receiver = Value::Instance(instance.clone());
        if let Some(init) = class.lookup("__init__") {
            Class::bind(&init, &receiver, &class).call(args)?;
        }

        for attr in instance.dir() {
            if !methods.matches(&attr) || skipped.contains(&attr) {
                continue;
            }
            let routine = match instance.get_attr(&attr) {
                Some(routine) if routine.is_routine() => routine,
                _ => continue,
            };
            let wrapper = apply(&aspects, &force_bind(routine), None)?;
            instance.set_own(&attr, BoundMethod::new(wrapper, receiver.clone()).into());
        }
        Ok(Value::None)
    })
}

/// Rewrites the selected routines of the class dictionary in place
fn weave_eager(
    class: &Rc<Class>,
    aspects: &Aspects,
    methods: &Methods,
) -> Result<Rollback, WeaveError> {
    let mut originals = Vec::new();
    for (attr, raw) in class.own_items() {
        if !methods.matches(&attr) || !raw.is_routine() {
            continue;
        }
        debug!(%attr, original = %raw, "patching attribute");
        match rewrap(&raw, aspects) {
            Ok(wrapper) => class.set_own(&attr, wrapper),
            Err(e) => return Err(restore(class.clone(), originals).abort(e)),
        }
        originals.push((attr, raw));
    }
    Ok(restore(class.clone(), originals))
}

/// Puts the original raw entries back in the class dictionary
fn restore(class: Rc<Class>, originals: Vec<(Rc<str>, Value)>) -> Rollback {
    Rollback::from_action(move || {
        for (attr, raw) in &originals {
            class.set_own(attr, raw.clone());
        }
        Ok(())
    })
}

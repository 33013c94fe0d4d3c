//! # Weave
//!
//! This module covers the weaver, which resolves a target to the attribute slots that have to be
//! intercepted and installs wrappers in all of them.
//!
//! Every weave returns one [`Rollback`] that undoes all of its patches. A weave that fails part way
//! undoes what it already did before reporting the failure.

mod class;
mod instance;
mod module;
pub mod options;

use std::rc::Rc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::error::WeaveError;
use crate::object::module::BUILTINS;
use crate::object::{
    BoundMethod, Class, Function, Instance, Module, Namespace, Owner, Runtime, Value,
};
use crate::patcher::AttributePatcher;
use crate::rollback::Rollback;
use crate::wrapper::{apply, rewrap, Aspects};

pub use options::{Methods, WeaveOptions};

/// Pattern every segment of a dotted path must match
const IDENTIFIER: &str = r"^[^\W\d]\w*$";

lazy_static! {
    /// Compiled [`IDENTIFIER`]
    static ref VALID_IDENTIFIER: Regex = Regex::new(IDENTIFIER).unwrap();
}

/// Anything that can be woven
#[derive(Clone)]
pub enum Target {
    /// Dotted path, resolved through the runtime's importer
    Path(Rc<str>),
    /// Several targets woven as one
    Many(Vec<Target>),
    /// Plain function, found again through its module and qualified name
    Function(Rc<Function>),
    /// Method bound to an instance
    Method(Rc<BoundMethod>),
    /// Class, with its subclasses
    Class(Rc<Class>),
    /// Whole module
    Module(Rc<Module>),
    /// Methods of a single instance
    Instance(Rc<Instance>),
    /// Any other value, which cannot be woven
    Other(Value),
}
impl From<Value> for Target {
    fn from(value: Value) -> Self {
        match value {
            Value::Str(path) => Target::Path(path),
            Value::Tuple(items) => Target::Many(items.iter().cloned().map(Target::from).collect()),
            Value::List(items) => {
                Target::Many(items.borrow().iter().cloned().map(Target::from).collect())
            }
            Value::Function(f) => Target::Function(f),
            Value::Method(m) => Target::Method(m),
            Value::Class(c) => Target::Class(c),
            Value::Module(m) => Target::Module(m),
            Value::Instance(i) => Target::Instance(i),
            other => Target::Other(other),
        }
    }
}
impl From<&Value> for Target {
    fn from(value: &Value) -> Self {
        value.clone().into()
    }
}
impl From<&str> for Target {
    fn from(path: &str) -> Self {
        Target::Path(Rc::from(path))
    }
}
impl From<Rc<Class>> for Target {
    fn from(class: Rc<Class>) -> Self {
        Target::Class(class)
    }
}
impl From<Rc<Module>> for Target {
    fn from(module: Rc<Module>) -> Self {
        Target::Module(module)
    }
}
impl From<Vec<Target>> for Target {
    fn from(targets: Vec<Target>) -> Self {
        Target::Many(targets)
    }
}

/// Weaves aspects into the objects of a runtime
pub struct Weaver<'rt> {
    /// Importer used to resolve dotted paths and owner modules
    runtime: &'rt Runtime,
}
impl<'rt> Weaver<'rt> {
    /// Creates a weaver for `runtime`
    pub fn new(runtime: &'rt Runtime) -> Self {
        Self { runtime }
    }
    /// The runtime being woven
    pub fn runtime(&self) -> &'rt Runtime {
        self.runtime
    }

    /// Weaves `aspects` into `target`.
    ///
    /// `aspects` is a decorator (usually an [`Aspect`](crate::advice::Aspect)) or a list or tuple of them.
    pub fn weave(
        &self,
        target: impl Into<Target>,
        aspects: impl Into<Value>,
        options: WeaveOptions,
    ) -> Result<Rollback, WeaveError> {
        let aspects = Aspects::try_from(aspects.into())?;
        self.weave_aspects(target.into(), &aspects, &options)
    }

    /// Weaves an already validated aspect chain into `target`
    pub fn weave_aspects(
        &self,
        target: Target,
        aspects: &Aspects,
        options: &WeaveOptions,
    ) -> Result<Rollback, WeaveError> {
        match target {
            Target::Path(path) if path.is_empty() => Err(WeaveError::Falsy("''".to_string())),
            Target::Path(path) => self.weave_path(&path, aspects, options),
            Target::Many(targets) if targets.is_empty() => {
                Err(WeaveError::Falsy("[]".to_string()))
            }
            Target::Many(targets) => {
                let mut rollback = Rollback::new();
                for target in targets {
                    match self.weave_aspects(target, aspects, options) {
                        Ok(done) => rollback.merge(done),
                        Err(e) => return Err(rollback.abort(e)),
                    }
                }
                Ok(rollback)
            }
            Target::Function(function) => {
                let value = Value::Function(function.clone());
                let builtins = self.runtime.builtins();
                match builtins.get(&function.name()) {
                    Some(builtin) if builtin.is(&value) => {
                        options.check("builtin", &["aliases"])?;
                        let owner = Owner::Module(builtins.clone());
                        let name = function.name();
                        self.weave_owner_function(&owner, &value, &name, aspects, options)
                    }
                    _ => self.weave_function(&function, aspects, options),
                }
            }
            Target::Method(method) => self.weave_bound_method(&method, aspects, options),
            Target::Class(class) => self.weave_class(&class, aspects, options, None),
            Target::Module(module) => self.weave_module(&module, aspects, options),
            Target::Instance(instance) if &*instance.class().module() == BUILTINS => {
                Err(WeaveError::UnsupportedType(Value::Instance(instance).to_string()))
            }
            Target::Instance(instance) => self.weave_instance(&instance, aspects, options),
            Target::Other(value) if !value.is_truthy() => {
                Err(WeaveError::Falsy(value.to_string()))
            }
            Target::Other(value) => Err(WeaveError::UnsupportedType(value.to_string())),
        }
    }

    /// Resolves a dotted path: the longest importable prefix is the module, the rest is attribute access
    fn weave_path(
        &self,
        path: &str,
        aspects: &Aspects,
        options: &WeaveOptions,
    ) -> Result<Rollback, WeaveError> {
        let parts: Vec<&str> = path.split('.').collect();
        for part in &parts {
            check_name(part)?;
        }

        if parts.len() == 1 {
            let module = self.runtime.import(path).ok_or_else(|| WeaveError::Import {
                target: path.to_string(),
                last: path.to_string(),
            })?;
            return self.weave_module(&module, aspects, options);
        }

        let mut last = String::new();
        let mut found = None;
        for pos in (1..parts.len()).rev() {
            let candidate = parts[..pos].join(".");
            match self.runtime.import(&candidate) {
                Some(module) => {
                    found = Some((module, pos));
                    break;
                }
                None => last = candidate,
            }
        }
        let (module, pos) = found.ok_or_else(|| WeaveError::Import {
            target: path.to_string(),
            last,
        })?;

        let (name, walk) = match parts[pos..].split_last() {
            Some(split) => split,
            None => return self.weave_module(&module, aspects, options),
        };
        let mut owner = Value::Module(module);
        for part in walk {
            owner = get_attr(&owner, part)?;
        }

        debug!(%name, %owner, "patching from path");
        let target = get_attr(&owner, name)?;
        match &target {
            Value::Class(class) => {
                debug!(class = %class.qualname(), "as a class");
                let site = Owner::try_from(&owner)
                    .map(|owner| (owner, Rc::from(*name)))
                    .ok();
                self.weave_class(class, aspects, options, site)
            }
            callable if callable.is_callable() => {
                debug!(%callable, "as a callable");
                options.check("function", &["aliases"])?;
                let owner = Owner::try_from(&owner)
                    .map_err(|()| WeaveError::UnsupportedType(owner.to_string()))?;
                self.weave_owner_function(&owner, callable, name, aspects, options)
            }
            _ => self.weave_aspects(target.clone().into(), aspects, options),
        }
    }

    /// Patches one callable held by `owner` under `name`
    fn weave_owner_function(
        &self,
        owner: &Owner,
        function: &Value,
        name: &str,
        aspects: &Aspects,
        options: &WeaveOptions,
    ) -> Result<Rollback, WeaveError> {
        debug!(owner = %owner.location(), %function, name, "weaving owner function");
        // static and class methods stay descriptors in the class dictionary
        let descriptor = match owner {
            Owner::Class(_) => owner.get_own(name).filter(Value::is_method_descriptor),
            _ => None,
        };
        let replacement = match descriptor {
            Some(raw) => rewrap(&raw, aspects)?,
            None => apply(aspects, function, Some(owner.location()))?,
        };
        AttributePatcher::new()
            .original(function.clone())
            .aliases(options.patches_aliases())
            .patch(owner, name, replacement)
    }

    /// Finds a free function again through its module and qualified name and patches its definition
    fn weave_function(
        &self,
        function: &Rc<Function>,
        aspects: &Aspects,
        options: &WeaveOptions,
    ) -> Result<Rollback, WeaveError> {
        options.check("function", &["aliases"])?;
        let module_name = function.module();
        let module = self
            .runtime
            .import(&module_name)
            .ok_or_else(|| WeaveError::Import {
                target: function.qualname().to_string(),
                last: module_name.to_string(),
            })?;

        let qualname = function.qualname();
        let mut owner = Value::Module(module);
        let path: Vec<&str> = qualname.split('.').collect();
        if let Some((_, walk)) = path.split_last() {
            for part in walk {
                owner = get_attr(&owner, part)?;
            }
        }
        let owner = Owner::try_from(&owner)
            .map_err(|()| WeaveError::UnsupportedType(owner.to_string()))?;

        let name = function.name();
        debug!(function = %qualname, %name, "patching as a property");
        let raw = owner.get_own(&name).ok_or_else(|| WeaveError::Attribute {
            owner: owner.to_value().to_string(),
            name: name.to_string(),
        })?;
        let original = owner.get_attr(&name).unwrap_or_else(|| raw.clone());
        let replacement = rewrap(&raw, aspects)?;
        AttributePatcher::new()
            .original(original)
            .aliases(options.patches_aliases())
            .patch(&owner, &name, replacement)
    }
}

/// Weaves `aspects` into `target` of `runtime`
pub fn weave(
    runtime: &Runtime,
    target: impl Into<Target>,
    aspects: impl Into<Value>,
    options: WeaveOptions,
) -> Result<Rollback, WeaveError> {
    Weaver::new(runtime).weave(target, aspects, options)
}

/// Fails unless `name` is a valid identifier
fn check_name(name: &str) -> Result<(), WeaveError> {
    if VALID_IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(WeaveError::Syntax {
            name: name.to_string(),
            pattern: IDENTIFIER,
        })
    }
}

/// Attribute access that reports what was missing
fn get_attr(owner: &Value, name: &str) -> Result<Value, WeaveError> {
    owner.get_attr(name).ok_or_else(|| WeaveError::Attribute {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

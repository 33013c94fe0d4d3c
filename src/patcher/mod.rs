//! # Patch
//!
//! This module covers the attribute patcher, which replaces the value bound to a name on a
//! module, class or instance and records how to put it back.
//!
//! Every other name of the owner currently bound to the same original value is an alias; aliases
//! are patched along with the requested name unless disabled, so all references change together.

use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::{RollbackError, WeaveError};
use crate::object::{Namespace, Value};
use crate::rollback::Rollback;
use crate::wrapper::function_of;

/// Replaces attributes and their aliases
#[derive(Clone, Debug)]
pub struct AttributePatcher {
    /// Value expected at the requested name; read from the owner when unset
    original: Option<Value>,
    /// Whether aliases of the original get patched too
    aliases: bool,
}
impl Default for AttributePatcher {
    fn default() -> Self {
        Self {
            original: None,
            aliases: true,
        }
    }
}
impl AttributePatcher {
    /// Creates a patcher that reads the original from the owner and patches aliases
    pub fn new() -> Self {
        Self::default()
    }
    /// Sets the value expected at the requested name, for owners whose attribute access is not plain
    pub fn original(mut self, original: Value) -> Self {
        self.original = Some(original);
        self
    }
    /// Sets whether aliases get patched
    pub fn aliases(mut self, aliases: bool) -> Self {
        self.aliases = aliases;
        self
    }

    /// Installs `replacement` at `name` on `owner`.
    ///
    /// A same-named attribute that is neither the original nor a bound method is reported as
    /// [`WeaveError::Inconsistent`], after undoing whatever was already patched.
    pub fn patch<N>(&self, owner: &N, name: &str, replacement: Value) -> Result<Rollback, WeaveError>
    where
        N: Namespace + Clone + 'static,
    {
        let location = owner.location();
        let original = match &self.original {
            Some(original) => original.clone(),
            None => owner.get_attr(name).ok_or_else(|| WeaveError::Attribute {
                owner: location.to_string(),
                name: name.to_string(),
            })?,
        };
        if let Some(f) = function_of(&replacement) {
            f.set_module(location.clone());
        }

        let mut rollback = Rollback::new();
        let mut seen = false;
        let mut replaced = false;
        for alias in owner.dir() {
            let Some(current) = owner.get_attr(&alias) else {
                continue;
            };
            let requested = &*alias == name;
            if current.is(&original) {
                if self.aliases || requested {
                    rollback.merge(replace(owner, &alias, &replacement));
                    replaced |= requested;
                }
                seen |= requested;
            } else if requested {
                match &current {
                    Value::Method(method) => {
                        rollback.merge(replace(owner, &alias, &replacement));
                        replaced = true;
                        seen |= method.is_view_of(&original);
                    }
                    _ => {
                        let error = WeaveError::Inconsistent {
                            location: location.to_string(),
                            name: alias.to_string(),
                            found: current.to_string(),
                            expected: original.to_string(),
                        };
                        return Err(rollback.abort(error));
                    }
                }
            }
        }

        if !seen {
            warn!(
                "Setting {}.{} to {}. There was no previous definition, probably patching the wrong module.",
                location, name, replacement
            );
            if !replaced {
                rollback.merge(replace(owner, name, &replacement));
            }
        }
        Ok(rollback)
    }
}

/// Sets `name` on `owner` and returns how to restore what its own dictionary held before.
///
/// Names that were only inherited are restored by removing the override.
fn replace<N>(owner: &N, name: &str, replacement: &Value) -> Rollback
where
    N: Namespace + Clone + 'static,
{
    debug!(location = %owner.location(), name, replacement = %replacement, "saving");
    let previous = owner.get_own(name);
    owner.set_attr(name, replacement.clone());

    let owner = owner.clone();
    let name: Rc<str> = Rc::from(name);
    Rollback::from_action(move || {
        match &previous {
            Some(previous) => owner.set_attr(&name, previous.clone()),
            None => {
                owner.del_attr(&name);
            }
        }
        Ok::<(), RollbackError>(())
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer};
    use tracing_subscriber::prelude::*;

    use crate::error::WeaveError;
    use crate::object::{
        Args, BoundMethod, ClassBuilder, Function, Module, Namespace, Owner, Value,
    };

    use super::AttributePatcher;

    /// Layer collecting the message of every event at `level`
    struct Captured {
        /// Level of the events kept
        level: Level,
        /// Messages seen so far
        messages: Arc<Mutex<Vec<String>>>,
    }
    impl<S: Subscriber> Layer<S> for Captured {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            /// Pulls the `message` field out of an event
            struct Message(String);
            impl Visit for Message {
                fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
                    if field.name() == "message" {
                        self.0 = format!("{:?}", value);
                    }
                }
            }
            if *event.metadata().level() == self.level {
                let mut message = Message(String::new());
                event.record(&mut message);
                self.messages.lock().unwrap().push(message.0);
            }
        }
    }

    /// Runs `f`, returning its result and the messages of the events at `level` it emitted
    pub(crate) fn capture<R>(level: Level, f: impl FnOnce() -> R) -> (R, Vec<String>) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(Captured {
            level,
            messages: messages.clone(),
        });
        let result = tracing::subscriber::with_default(subscriber, f);
        let messages = messages.lock().unwrap().clone();
        (result, messages)
    }

    /// Runs `f`, returning its result and the warnings it emitted
    pub(crate) fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, Vec<String>) {
        capture(Level::WARN, f)
    }

    /// Module `pkg` with `func` also bound as `alias`, and an unrelated `other`
    fn module() -> (std::rc::Rc<Module>, Value) {
        let module = Module::new("pkg");
        let func = module.def(Function::native("func", |_| Ok(Value::Int(1))));
        module.set("alias", func.clone());
        module.def(Function::native("other", |_| Ok(Value::Int(2))));
        (module, func)
    }

    #[test]
    /// Aliases follow the requested name, and rollback restores the exact originals
    fn test_aliases() {
        let (module, func) = module();
        let replacement = Value::from(Function::native("func", |_| Ok(Value::Int(3))));

        let ((), warnings) = capture_warnings(|| {
            let rollback = AttributePatcher::new()
                .patch(&module, "func", replacement.clone())
                .unwrap();
            assert!(module.get("func").unwrap().is(&replacement));
            assert!(module.get("alias").unwrap().is(&replacement));
            assert_eq!(module.get("other").unwrap().call(Args::new()).unwrap(), Value::Int(2));

            // restore the patch
            rollback.rollback().unwrap();
        });
        assert!(warnings.is_empty());
        assert!(module.get("func").unwrap().is(&func));
        assert!(module.get("alias").unwrap().is(&func));

        // replacements take the owner as their module
        match replacement {
            Value::Function(f) => assert_eq!(&*f.module(), "pkg"),
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    /// Without aliases only the requested name changes
    fn test_no_aliases() {
        let (module, func) = module();
        let replacement = Value::from(Function::native("func", |_| Ok(Value::Int(3))));
        let rollback = AttributePatcher::new()
            .aliases(false)
            .patch(&module, "func", replacement.clone())
            .unwrap();

        assert!(module.get("func").unwrap().is(&replacement));
        assert!(module.get("alias").unwrap().is(&func));
        rollback.rollback().unwrap();
        assert!(module.get("func").unwrap().is(&func));
    }

    #[test]
    /// A same-named attribute that is not the original aborts the patch
    fn test_inconsistent() {
        let (module, func) = module();
        module.set("zzz", Value::Int(4));
        let replacement = Value::from(Function::native("r", |_| Ok(Value::None)));

        // `alias` and `func` are patched before `zzz` is reached, then undone
        let err = AttributePatcher::new()
            .original(func.clone())
            .patch(&module, "zzz", replacement)
            .unwrap_err();
        assert!(matches!(err, WeaveError::Inconsistent { ref name, .. } if name == "zzz"));
        assert!(module.get("func").unwrap().is(&func));
        assert!(module.get("alias").unwrap().is(&func));
    }

    #[test]
    /// Patching a name that holds nothing related warns and sets it anyway
    fn test_wrong_module() {
        let (module, _) = module();
        let stranger = Value::from(Function::native("stranger", |_| Ok(Value::None)));
        let replacement = Value::from(Function::native("r", |_| Ok(Value::None)));

        let (rollback, warnings) = capture_warnings(|| {
            AttributePatcher::new()
                .original(stranger)
                .patch(&module, "missing", replacement.clone())
                .unwrap()
        });
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("probably patching the wrong module"));
        assert!(module.get("missing").unwrap().is(&replacement));

        rollback.rollback().unwrap();
        assert!(module.get("missing").is_none());
    }

    #[test]
    /// Bound methods at the requested name are views of the original and get overridden on the instance
    fn test_instance_method() {
        let klass = ClassBuilder::new("Klass")
            .module("pkg")
            .method(Function::native("meth", |_| Ok(Value::Int(1))))
            .build();
        let inst = klass.instantiate(Args::new()).unwrap();
        let owner = Owner::try_from(&inst).unwrap();
        let original = owner.get_attr("meth").unwrap();
        let replacement = Value::from(Function::native("meth", |_| Ok(Value::Int(2))));

        let (rollback, warnings) = capture_warnings(|| {
            AttributePatcher::new()
                .original(original)
                .patch(&owner, "meth", replacement.clone())
                .unwrap()
        });
        assert!(warnings.is_empty());
        assert!(owner.get_own("meth").unwrap().is(&replacement));
        assert!(klass.get_own("meth").is_some());

        // the override goes away, the class method is visible again
        rollback.rollback().unwrap();
        assert!(!owner.has_own("meth"));
        assert_eq!(
            inst.get_attr("meth").unwrap().call(Args::new()).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    /// Bound and descriptor replacements take the owner as their module too
    fn test_replacement_module() {
        let klass = ClassBuilder::new("Klass")
            .module("pkg")
            .method(Function::native("meth", |_| Ok(Value::Int(1))))
            .build();
        let inst = klass.instantiate(Args::new()).unwrap();
        let owner = Owner::try_from(&inst).unwrap();
        let original = owner.get_attr("meth").unwrap();

        let function = Function::native("meth", |_| Ok(Value::Int(2))).with_module("elsewhere");
        let replacement = Value::from(BoundMethod::new(function.into(), inst.clone()));
        let rollback = AttributePatcher::new()
            .original(original)
            .patch(&owner, "meth", replacement.clone())
            .unwrap();
        match &replacement {
            Value::Method(method) => match method.function() {
                Value::Function(f) => assert_eq!(&*f.module(), "pkg"),
                other => panic!("unexpected {}", other),
            },
            other => panic!("unexpected {}", other),
        }
        rollback.rollback().unwrap();
    }
}

//! This module contains the attribute-owner abstraction used by the patcher

use std::rc::Rc;

use super::class::{Class, Instance};
use super::module::Module;
use super::Value;

/// Anything holding named attribute slots that can be replaced and restored
pub trait Namespace {
    /// Label used in diagnostics: the owner's name, or its type's module for instances
    fn location(&self) -> Rc<str>;
    /// Every reachable attribute name, sorted
    fn dir(&self) -> Vec<Rc<str>>;
    /// Attribute access as user code sees it (bound where applicable)
    fn get_attr(&self, name: &str) -> Option<Value>;
    /// Raw entry of the owner's own dictionary
    fn get_own(&self, name: &str) -> Option<Value>;
    /// Whether the owner's own dictionary has `name`
    fn has_own(&self, name: &str) -> bool {
        self.get_own(name).is_some()
    }
    /// Sets an entry of the owner's own dictionary
    fn set_attr(&self, name: &str, value: Value);
    /// Removes an entry of the owner's own dictionary, returning whether it was there
    fn del_attr(&self, name: &str) -> bool;
}

impl Namespace for Rc<Module> {
    fn location(&self) -> Rc<str> {
        self.name()
    }
    fn dir(&self) -> Vec<Rc<str>> {
        self.names()
    }
    fn get_attr(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
    fn get_own(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
    fn set_attr(&self, name: &str, value: Value) {
        self.set(name, value)
    }
    fn del_attr(&self, name: &str) -> bool {
        self.remove(name).is_some()
    }
}

impl Namespace for Rc<Class> {
    fn location(&self) -> Rc<str> {
        self.name()
    }
    fn dir(&self) -> Vec<Rc<str>> {
        Class::dir(self)
    }
    fn get_attr(&self, name: &str) -> Option<Value> {
        Class::get_attr(self, name)
    }
    fn get_own(&self, name: &str) -> Option<Value> {
        Class::get_own(self, name)
    }
    fn set_attr(&self, name: &str, value: Value) {
        self.set_own(name, value)
    }
    fn del_attr(&self, name: &str) -> bool {
        self.remove_own(name).is_some()
    }
}

impl Namespace for Rc<Instance> {
    fn location(&self) -> Rc<str> {
        self.class().module()
    }
    fn dir(&self) -> Vec<Rc<str>> {
        Instance::dir(self)
    }
    fn get_attr(&self, name: &str) -> Option<Value> {
        Instance::get_attr(self, name)
    }
    fn get_own(&self, name: &str) -> Option<Value> {
        Instance::get_own(self, name)
    }
    fn set_attr(&self, name: &str, value: Value) {
        self.set_own(name, value)
    }
    fn del_attr(&self, name: &str) -> bool {
        self.remove_own(name).is_some()
    }
}

/// An attribute owner of any kind
#[derive(Clone)]
pub enum Owner {
    /// Module globals
    Module(Rc<Module>),
    /// Class dictionary
    Class(Rc<Class>),
    /// Instance dictionary
    Instance(Rc<Instance>),
}
impl Owner {
    /// The owner as a value
    pub fn to_value(&self) -> Value {
        match self {
            Owner::Module(m) => Value::Module(m.clone()),
            Owner::Class(c) => Value::Class(c.clone()),
            Owner::Instance(i) => Value::Instance(i.clone()),
        }
    }
    /// The namespace behind the owner
    fn inner(&self) -> &dyn Namespace {
        match self {
            Owner::Module(m) => m,
            Owner::Class(c) => c,
            Owner::Instance(i) => i,
        }
    }
}
impl TryFrom<&Value> for Owner {
    type Error = ();

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Module(m) => Ok(Owner::Module(m.clone())),
            Value::Class(c) => Ok(Owner::Class(c.clone())),
            Value::Instance(i) => Ok(Owner::Instance(i.clone())),
            _ => Err(()),
        }
    }
}

impl Namespace for Owner {
    fn location(&self) -> Rc<str> {
        self.inner().location()
    }
    fn dir(&self) -> Vec<Rc<str>> {
        self.inner().dir()
    }
    fn get_attr(&self, name: &str) -> Option<Value> {
        self.inner().get_attr(name)
    }
    fn get_own(&self, name: &str) -> Option<Value> {
        self.inner().get_own(name)
    }
    fn set_attr(&self, name: &str, value: Value) {
        self.inner().set_attr(name, value)
    }
    fn del_attr(&self, name: &str) -> bool {
        self.inner().del_attr(name)
    }
}

#[cfg(test)]
mod tests {
    use crate::object::{Args, ClassBuilder, Function, Module, Value};

    use super::{Namespace, Owner};

    #[test]
    /// Instance namespaces see class attributes but only own their dictionary
    fn test_instance_namespace() {
        let klass = ClassBuilder::new("Klass")
            .module("pkg")
            .method(Function::native("meth", |_| Ok(Value::None)))
            .build();
        let inst = klass.instantiate(Args::new()).unwrap();
        let owner = Owner::try_from(&inst).unwrap();

        assert_eq!(&*owner.location(), "pkg");
        assert!(owner.dir().iter().any(|n| &**n == "meth"));
        assert!(matches!(owner.get_attr("meth"), Some(Value::Method(_))));
        assert!(!owner.has_own("meth"));

        // shadow and unshadow
        owner.set_attr("meth", Value::Int(1));
        assert_eq!(owner.get_attr("meth"), Some(Value::Int(1)));
        assert!(owner.del_attr("meth"));
        assert!(!owner.del_attr("meth"));
        assert!(matches!(owner.get_attr("meth"), Some(Value::Method(_))));
    }

    #[test]
    /// Module namespaces are labelled with the module name
    fn test_module_namespace() {
        let module = Module::new("pkg.mod");
        let owner = Owner::Module(module.clone());
        owner.set_attr("x", Value::Int(1));
        assert_eq!(&*owner.location(), "pkg.mod");
        assert_eq!(module.get("x"), Some(Value::Int(1)));
        assert!(Owner::try_from(&Value::Int(1)).is_err());
    }
}

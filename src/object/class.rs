//! This module contains classes and their instances

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::error::CallError;

use super::function::{BoundMethod, Function};
use super::{Args, Value};

/// Where a class came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Declared by user code
    Declared,
    /// Generated by the weaver as a lazy-weaving shim
    Generated,
}

/// A class of the object model
pub struct Class {
    /// `__name__`
    name: Rc<str>,
    /// `__qualname__`
    qualname: Rc<str>,
    /// `__module__`
    module: Rc<str>,
    /// `__doc__`
    doc: Option<Rc<str>>,
    /// Direct base classes, in declaration order
    bases: Vec<Rc<Class>>,
    /// Own attributes (`__dict__`)
    dict: RefCell<BTreeMap<Rc<str>, Value>>,
    /// Live direct subclasses
    subclasses: RefCell<Vec<Weak<Class>>>,
    /// Who created the class
    origin: Origin,
}
impl Class {
    /// `__name__`
    pub fn name(&self) -> Rc<str> {
        self.name.clone()
    }
    /// `__qualname__`
    pub fn qualname(&self) -> Rc<str> {
        self.qualname.clone()
    }
    /// `__module__`
    pub fn module(&self) -> Rc<str> {
        self.module.clone()
    }
    /// `__doc__`
    pub fn doc(&self) -> Option<Rc<str>> {
        self.doc.clone()
    }
    /// Direct bases
    pub fn bases(&self) -> &[Rc<Class>] {
        &self.bases
    }
    /// Who created the class
    pub fn origin(&self) -> Origin {
        self.origin
    }
    /// Whether the class is a shim generated by the weaver
    pub fn is_generated(&self) -> bool {
        self.origin == Origin::Generated
    }

    /// Live direct subclasses, oldest first
    pub fn subclasses(&self) -> Vec<Rc<Class>> {
        let mut subclasses = self.subclasses.borrow_mut();
        subclasses.retain(|s| s.strong_count() > 0);
        subclasses.iter().filter_map(Weak::upgrade).collect()
    }

    /// Method resolution order: depth-first, left to right, first occurrence wins
    pub fn mro(self: &Rc<Self>) -> Vec<Rc<Class>> {
        let mut order: Vec<Rc<Class>> = vec![self.clone()];
        for base in &self.bases {
            for class in base.mro() {
                if !order.iter().any(|c| Rc::ptr_eq(c, &class)) {
                    order.push(class);
                }
            }
        }
        order
    }

    /// Whether `self` is `other` or derives from it
    pub fn is_subclass_of(self: &Rc<Self>, other: &Rc<Class>) -> bool {
        self.mro().iter().any(|c| Rc::ptr_eq(c, other))
    }

    /// Looks `name` up along the MRO, returning the raw dictionary entry
    pub fn lookup(self: &Rc<Self>, name: &str) -> Option<Value> {
        self.mro()
            .iter()
            .find_map(|class| class.dict.borrow().get(name).cloned())
    }

    /// Own dictionary entries
    pub fn own_items(&self) -> Vec<(Rc<str>, Value)> {
        self.dict
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
    /// Own dictionary entry
    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.dict.borrow().get(name).cloned()
    }
    /// Sets an own dictionary entry
    pub fn set_own(&self, name: &str, value: Value) {
        self.dict.borrow_mut().insert(Rc::from(name), value);
    }
    /// Removes an own dictionary entry
    pub fn remove_own(&self, name: &str) -> Option<Value> {
        self.dict.borrow_mut().remove(name)
    }

    /// All attribute names reachable from the class, sorted
    pub fn dir(self: &Rc<Self>) -> Vec<Rc<str>> {
        let mut names: Vec<Rc<str>> = self
            .mro()
            .iter()
            .flat_map(|class| class.dict.borrow().keys().cloned().collect::<Vec<_>>())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Attribute access on the class itself
    pub fn get_attr(self: &Rc<Self>, name: &str) -> Option<Value> {
        self.lookup(name).map(|raw| match raw {
            Value::StaticMethod(f) => (*f).clone(),
            Value::ClassMethod(f) => {
                BoundMethod::new((*f).clone(), Value::Class(self.clone())).into()
            }
            other => other,
        })
    }

    /// Binds a raw class attribute for access through `receiver`, an instance of `class`
    pub fn bind(raw: &Value, receiver: &Value, class: &Rc<Class>) -> Value {
        match raw {
            Value::Function(_) => BoundMethod::new(raw.clone(), receiver.clone()).into(),
            Value::StaticMethod(f) => (**f).clone(),
            Value::ClassMethod(f) => {
                BoundMethod::new((**f).clone(), Value::Class(class.clone())).into()
            }
            other => other.clone(),
        }
    }

    /// Creates an instance and runs `__init__` on it
    pub fn instantiate(self: &Rc<Self>, args: Args) -> Result<Value, CallError> {
        let instance = Value::Instance(Rc::new(Instance::new(self.clone())));
        if let Some(init) = self.lookup("__init__") {
            Class::bind(&init, &instance, self).call(args)?;
        }
        Ok(instance)
    }
}

/// Builder for [`Class`]
pub struct ClassBuilder {
    /// `__name__`
    name: Rc<str>,
    /// `__qualname__`, defaults to the name
    qualname: Option<Rc<str>>,
    /// `__module__`
    module: Rc<str>,
    /// `__doc__`
    doc: Option<Rc<str>>,
    /// Bases
    bases: Vec<Rc<Class>>,
    /// Class body
    dict: BTreeMap<Rc<str>, Value>,
    /// Who is creating the class
    origin: Origin,
}
impl ClassBuilder {
    /// Starts a class declaration
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            qualname: None,
            module: Rc::from("__main__"),
            doc: None,
            bases: Vec::new(),
            dict: BTreeMap::new(),
            origin: Origin::Declared,
        }
    }
    /// Sets `__module__`
    pub fn module(mut self, module: &str) -> Self {
        self.module = Rc::from(module);
        self
    }
    /// Sets `__qualname__`
    pub fn qualname(mut self, qualname: &str) -> Self {
        self.qualname = Some(Rc::from(qualname));
        self
    }
    /// Sets `__doc__`
    pub fn doc(mut self, doc: &str) -> Self {
        self.doc = Some(Rc::from(doc));
        self
    }
    /// Adds a base class
    pub fn base(mut self, base: &Rc<Class>) -> Self {
        self.bases.push(base.clone());
        self
    }
    /// Marks the class as generated by the weaver
    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
    /// Adds a raw attribute
    pub fn attr(mut self, name: &str, value: Value) -> Self {
        self.dict.insert(Rc::from(name), value);
        self
    }
    /// Adds a method, qualifying its name with the class
    pub fn method(self, function: Function) -> Self {
        let (name, value) = self.qualify(function);
        self.attr(&name, value)
    }
    /// Adds a static method
    pub fn staticmethod(self, function: Function) -> Self {
        let (name, value) = self.qualify(function);
        self.attr(&name, Value::StaticMethod(Rc::new(value)))
    }
    /// Adds a class method
    pub fn classmethod(self, function: Function) -> Self {
        let (name, value) = self.qualify(function);
        self.attr(&name, Value::ClassMethod(Rc::new(value)))
    }
    /// Gives a function declared in the class body its qualified name and module
    fn qualify(&self, function: Function) -> (Rc<str>, Value) {
        let qualname = self.qualname.as_ref().unwrap_or(&self.name);
        let name = function.name();
        let function = function
            .with_qualname(&format!("{}.{}", qualname, name))
            .with_module(&self.module);
        (name, function.into())
    }
    /// Creates the class and registers it with its bases
    pub fn build(self) -> Rc<Class> {
        let class = Rc::new(Class {
            qualname: self.qualname.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            module: self.module,
            doc: self.doc,
            bases: self.bases,
            dict: RefCell::new(self.dict),
            subclasses: RefCell::new(Vec::new()),
            origin: self.origin,
        });
        for base in &class.bases {
            base.subclasses.borrow_mut().push(Rc::downgrade(&class));
        }
        class
    }
}

/// An instance of a class
pub struct Instance {
    /// `__class__`
    class: Rc<Class>,
    /// Own attributes (`__dict__`)
    dict: RefCell<BTreeMap<Rc<str>, Value>>,
}
impl Instance {
    /// Creates an instance without running `__init__`
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            dict: RefCell::new(BTreeMap::new()),
        }
    }
    /// `__class__`
    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }
    /// Own dictionary entry
    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.dict.borrow().get(name).cloned()
    }
    /// Sets an own dictionary entry
    pub fn set_own(&self, name: &str, value: Value) {
        self.dict.borrow_mut().insert(Rc::from(name), value);
    }
    /// Removes an own dictionary entry
    pub fn remove_own(&self, name: &str) -> Option<Value> {
        self.dict.borrow_mut().remove(name)
    }
    /// All attribute names reachable from the instance, sorted
    pub fn dir(&self) -> Vec<Rc<str>> {
        let mut names: Vec<Rc<str>> = self.dict.borrow().keys().cloned().collect();
        names.extend(self.class.dir());
        names.sort();
        names.dedup();
        names
    }
    /// Attribute access, binding class functions to this instance
    pub fn get_attr(self: &Rc<Self>, name: &str) -> Option<Value> {
        if let Some(own) = self.get_own(name) {
            return Some(own);
        }
        let raw = self.class.lookup(name)?;
        Some(Class::bind(
            &raw,
            &Value::Instance(self.clone()),
            &self.class,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::object::{Args, Function, Value};

    use super::{ClassBuilder, Origin};

    /// Function returning its first positional argument
    fn identity(name: &str) -> Function {
        Function::native(name, |args| Ok(args.get(0).cloned().unwrap_or(Value::None)))
    }

    #[test]
    /// Instances bind functions, static methods are unwrapped and class methods bind the class
    fn test_binding() {
        let klass = ClassBuilder::new("Klass")
            .module("pkg")
            .method(identity("meth"))
            .staticmethod(identity("stat"))
            .classmethod(identity("cls"))
            .build();
        let inst = klass.instantiate(Args::new()).unwrap();

        let meth = inst.get_attr("meth").unwrap();
        assert!(meth.call(Args::new()).unwrap().is(&inst));

        let stat = inst.get_attr("stat").unwrap();
        assert_eq!(stat.call(Args::from([Value::Int(4)])).unwrap(), Value::Int(4));

        let cls = inst.get_attr("cls").unwrap();
        assert!(cls
            .call(Args::new())
            .unwrap()
            .is(&Value::Class(klass.clone())));

        // functions declared in the class body are qualified
        match klass.get_own("meth").unwrap() {
            Value::Function(f) => {
                assert_eq!(&*f.qualname(), "Klass.meth");
                assert_eq!(&*f.module(), "pkg");
            }
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    /// `__init__` runs on instantiation and inherited attributes are visible
    fn test_init_and_inheritance() {
        let base = ClassBuilder::new("Base")
            .method(Function::native("__init__", |args| {
                if let Some(Value::Instance(me)) = args.get(0) {
                    me.set_own("value", args.get(1).cloned().unwrap_or(Value::None));
                }
                Ok(Value::None)
            }))
            .method(identity("inherited"))
            .build();
        let sub = ClassBuilder::new("Sub").base(&base).build();

        let inst = sub.instantiate(Args::from([Value::Int(3)])).unwrap();
        assert_eq!(inst.get_attr("value"), Some(Value::Int(3)));
        assert!(inst.get_attr("inherited").is_some());

        assert!(sub.is_subclass_of(&base));
        assert!(!base.is_subclass_of(&sub));
        assert_eq!(base.subclasses().len(), 1);
        assert!(sub.dir().iter().any(|n| &**n == "inherited"));
    }

    #[test]
    /// Dropped subclasses disappear from the registry
    fn test_subclass_registry() {
        let base = ClassBuilder::new("Base").build();
        let shim = ClassBuilder::new("Base")
            .base(&base)
            .origin(Origin::Generated)
            .build();
        assert!(base.subclasses()[0].is_generated());

        drop(shim);
        assert!(base.subclasses().is_empty());
        assert_eq!(Rc::strong_count(&base), 1);
    }
}

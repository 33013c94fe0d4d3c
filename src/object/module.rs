//! This module contains modules and the runtime that imports them

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use super::class::Class;
use super::function::Function;
use super::Value;

/// Name of the builtin namespace
pub const BUILTINS: &str = "builtins";

/// A module of the object model
pub struct Module {
    /// `__name__`
    name: Rc<str>,
    /// `__doc__`
    doc: Option<Rc<str>>,
    /// Whether this is the builtin namespace
    builtin: bool,
    /// Module globals
    dict: RefCell<BTreeMap<Rc<str>, Value>>,
}
impl Module {
    /// Creates an empty module
    pub fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: Rc::from(name),
            doc: None,
            builtin: false,
            dict: RefCell::new(BTreeMap::new()),
        })
    }
    /// Creates an empty module with a docstring
    pub fn with_doc(name: &str, doc: &str) -> Rc<Self> {
        Rc::new(Self {
            name: Rc::from(name),
            doc: Some(Rc::from(doc)),
            builtin: false,
            dict: RefCell::new(BTreeMap::new()),
        })
    }
    /// `__name__`
    pub fn name(&self) -> Rc<str> {
        self.name.clone()
    }
    /// `__doc__`
    pub fn doc(&self) -> Option<Rc<str>> {
        self.doc.clone()
    }
    /// Whether this is the builtin namespace
    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    /// Defines a function in the module, taking ownership of its `__module__`
    pub fn def(&self, function: Function) -> Value {
        let function = function.with_module(&self.name);
        let name = function.name();
        let value = Value::from(function);
        self.set(&name, value.clone());
        value
    }
    /// Binds a class under its own name
    pub fn add_class(&self, class: &Rc<Class>) -> Value {
        let value = Value::Class(class.clone());
        self.set(&class.name(), value.clone());
        value
    }
    /// Reads a global
    pub fn get(&self, name: &str) -> Option<Value> {
        self.dict.borrow().get(name).cloned()
    }
    /// Sets a global
    pub fn set(&self, name: &str, value: Value) {
        self.dict.borrow_mut().insert(Rc::from(name), value);
    }
    /// Removes a global
    pub fn remove(&self, name: &str) -> Option<Value> {
        self.dict.borrow_mut().remove(name)
    }
    /// Global names, sorted
    pub fn names(&self) -> Vec<Rc<str>> {
        self.dict.borrow().keys().cloned().collect()
    }
}

/// Registry of importable modules
pub struct Runtime {
    /// Modules by dotted name
    modules: RefCell<HashMap<Rc<str>, Rc<Module>>>,
    /// The builtin namespace
    builtins: Rc<Module>,
}
impl Runtime {
    /// Creates a runtime with an empty builtin namespace
    pub fn new() -> Self {
        let builtins = Rc::new(Module {
            name: Rc::from(BUILTINS),
            doc: None,
            builtin: true,
            dict: RefCell::new(BTreeMap::new()),
        });
        let modules = RefCell::new(HashMap::from([(builtins.name(), builtins.clone())]));
        Self { modules, builtins }
    }
    /// The builtin namespace
    pub fn builtins(&self) -> &Rc<Module> {
        &self.builtins
    }
    /// Makes a module importable under its name
    pub fn register(&self, module: &Rc<Module>) {
        self.modules
            .borrow_mut()
            .insert(module.name(), module.clone());
    }
    /// Imports a module by dotted name
    pub fn import(&self, name: &str) -> Option<Rc<Module>> {
        self.modules.borrow().get(name).cloned()
    }
}
impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

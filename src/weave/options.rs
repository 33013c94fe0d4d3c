//! This module contains the options accepted by [`Weaver::weave`](super::Weaver::weave)

use std::collections::BTreeSet;

use regex::Regex;

use crate::error::WeaveError;

/// Selects which attribute names get woven
#[derive(Clone, Debug, Default)]
pub enum Methods {
    /// Every name
    AbsolutelyAll,
    /// Every name but `__getattribute__`
    All,
    /// Every name that is not a `__dunder__`
    #[default]
    Normal,
    /// Names matching a pattern at their start
    Pattern(Regex),
    /// Exactly these names
    Names(BTreeSet<String>),
}
impl Methods {
    /// Names matching `pattern` at their start, like a `match` rather than a `search`
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{})", pattern)).map(Methods::Pattern)
    }
    /// Exactly the given names
    pub fn names<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
        Methods::Names(names.into_iter().map(|n| n.as_ref().to_string()).collect())
    }
    /// Whether `name` is selected
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Methods::AbsolutelyAll => true,
            Methods::All => name != "__getattribute__",
            Methods::Normal => !is_dunder(name),
            Methods::Pattern(pattern) => pattern.is_match(name),
            Methods::Names(names) => names.contains(name),
        }
    }
}

/// `__name__`-shaped names
fn is_dunder(name: &str) -> bool {
    name.len() >= 4 && name.starts_with("__") && name.ends_with("__")
}

/// Options of a weave.
///
/// Every option is optional so that an option given for a target that does not support it can be
/// told apart from its default.
#[derive(Clone, Debug, Default)]
pub struct WeaveOptions {
    /// Which names to weave on classes, modules and instances
    methods: Option<Methods>,
    /// Whether live subclasses of a class are woven too
    subclasses: Option<bool>,
    /// Whether aliases of a patched attribute are patched too
    aliases: Option<bool>,
    /// Whether classes are woven through a generated subclass
    lazy: Option<bool>,
}
impl WeaveOptions {
    /// All defaults
    pub fn new() -> Self {
        Self::default()
    }
    /// Sets the method filter
    pub fn methods(mut self, methods: Methods) -> Self {
        self.methods = Some(methods);
        self
    }
    /// Sets subclass fan-out
    pub fn subclasses(mut self, subclasses: bool) -> Self {
        self.subclasses = Some(subclasses);
        self
    }
    /// Sets alias propagation
    pub fn aliases(mut self, aliases: bool) -> Self {
        self.aliases = Some(aliases);
        self
    }
    /// Sets lazy class weaving
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = Some(lazy);
        self
    }

    /// The method filter, [`Methods::Normal`] by default
    pub fn method_filter(&self) -> Methods {
        self.methods.clone().unwrap_or_default()
    }
    /// Subclass fan-out, on by default
    pub fn weaves_subclasses(&self) -> bool {
        self.subclasses.unwrap_or(true)
    }
    /// Alias propagation, on by default
    pub fn patches_aliases(&self) -> bool {
        self.aliases.unwrap_or(true)
    }
    /// Lazy class weaving, off by default
    pub fn is_lazy(&self) -> bool {
        self.lazy.unwrap_or(false)
    }

    /// Fails if an option outside `supported` was given for a `target` weave
    pub(crate) fn check(
        &self,
        target: &'static str,
        supported: &[&'static str],
    ) -> Result<(), WeaveError> {
        let given = [
            ("methods", self.methods.is_some()),
            ("subclasses", self.subclasses.is_some()),
            ("aliases", self.aliases.is_some()),
            ("lazy", self.lazy.is_some()),
        ];
        match given
            .iter()
            .find(|(option, set)| *set && !supported.contains(option))
        {
            Some((option, _)) => Err(WeaveError::UnsupportedOption {
                option: *option,
                target,
            }),
            None => Ok(()),
        }
    }

    /// Options passed down to a single function
    pub(crate) fn for_function(&self) -> Self {
        Self {
            aliases: self.aliases,
            ..Self::default()
        }
    }
    /// Options passed down to a class found in a module; such classes never fan out
    pub(crate) fn for_module_class(&self) -> Self {
        Self {
            subclasses: Some(false),
            ..self.clone()
        }
    }
}

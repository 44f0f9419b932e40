//! Static environments
//!
//! A [`Registry`] holds the global definitions the external loader has
//! produced (types, classes, top-level functions and values). A [`TypeEnv`]
//! layers local bindings on top of it through a borrowed parent chain, so a
//! child scope is cheap to create and disappears with the expression that
//! introduced it.

use std::collections::HashMap;
use std::sync::Arc;

use super::types::{NamedType, RecordType, Type};

/// What kind of definition a name refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    /// A value or local variable
    Value,
    /// A state component or instance variable
    State,
    /// A function, with its type parameters if polymorphic
    Function { type_params: Vec<String> },
    /// An operation
    Operation,
}

/// A name with its type and kind
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub ty: Type,
    pub kind: BindingKind,
}

impl Binding {
    pub fn value(ty: Type) -> Self {
        Self {
            ty,
            kind: BindingKind::Value,
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(&self.kind, BindingKind::Function { type_params } if !type_params.is_empty())
    }
}

/// Member visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    Private,
    Protected,
    Public,
}

/// A class member as seen by the checker
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub binding: Binding,
    pub access: Access,
    pub is_static: bool,
}

/// A class definition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassDef {
    pub name: String,
    pub supers: Vec<String>,
    pub members: Vec<Member>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.supers.push(superclass.into());
        self
    }

    pub fn member(mut self, name: &str, binding: Binding, access: Access) -> Self {
        self.members.push(Member {
            name: name.to_string(),
            binding,
            access,
            is_static: false,
        });
        self
    }

    pub fn static_member(mut self, name: &str, binding: Binding, access: Access) -> Self {
        self.members.push(Member {
            name: name.to_string(),
            binding,
            access,
            is_static: true,
        });
        self
    }
}

/// A registered type definition
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDefinition {
    Record(Arc<RecordType>),
    Named(Arc<NamedType>),
}

impl TypeDefinition {
    pub fn to_type(&self) -> Type {
        match self {
            TypeDefinition::Record(r) => Type::Record(r.clone()),
            TypeDefinition::Named(n) => Type::Named(n.clone()),
        }
    }
}

/// Global definitions
#[derive(Debug, Clone, Default)]
pub struct Registry {
    types: HashMap<String, TypeDefinition>,
    classes: HashMap<String, ClassDef>,
    globals: HashMap<String, Binding>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record type and return its shared handle
    pub fn define_record(&mut self, record: RecordType) -> Arc<RecordType> {
        let record = Arc::new(record);
        self.types
            .insert(record.name.clone(), TypeDefinition::Record(record.clone()));
        record
    }

    /// Register a named type
    pub fn define_named(&mut self, name: &str, ty: Type, invariant: bool) -> Arc<NamedType> {
        let named = Arc::new(NamedType {
            name: name.to_string(),
            ty,
            invariant,
        });
        self.types
            .insert(name.to_string(), TypeDefinition::Named(named.clone()));
        named
    }

    pub fn define_class(&mut self, class: ClassDef) {
        self.classes.insert(class.name.clone(), class);
    }

    pub fn define_value(&mut self, name: &str, ty: Type) {
        self.globals.insert(name.to_string(), Binding::value(ty));
    }

    pub fn define_state(&mut self, name: &str, ty: Type) {
        self.globals.insert(
            name.to_string(),
            Binding {
                ty,
                kind: BindingKind::State,
            },
        );
    }

    pub fn define_function(&mut self, name: &str, type_params: &[&str], ty: Type) {
        self.globals.insert(
            name.to_string(),
            Binding {
                ty,
                kind: BindingKind::Function {
                    type_params: type_params.iter().map(|s| s.to_string()).collect(),
                },
            },
        );
    }

    pub fn define_operation(&mut self, name: &str, ty: Type) {
        self.globals.insert(
            name.to_string(),
            Binding {
                ty,
                kind: BindingKind::Operation,
            },
        );
    }

    pub fn lookup_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    pub fn lookup_record(&self, name: &str) -> Option<&Arc<RecordType>> {
        match self.types.get(name) {
            Some(TypeDefinition::Record(r)) => Some(r),
            _ => None,
        }
    }

    pub fn lookup_class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn lookup_global(&self, name: &str) -> Option<&Binding> {
        self.globals.get(name)
    }

    /// True if `sub` is `sup` or inherits from it, walking the class DAG
    pub fn is_subclass(&self, sub: &str, sup: &str) -> bool {
        if sub == sup {
            return true;
        }
        match self.classes.get(sub) {
            Some(class) => class.supers.iter().any(|s| self.is_subclass(s, sup)),
            None => false,
        }
    }

    /// Find a member by name in a class or its superclasses (depth first)
    pub fn find_member(&self, class: &str, name: &str) -> Option<(&ClassDef, &Member)> {
        let def = self.classes.get(class)?;
        if let Some(member) = def.members.iter().find(|m| m.name == name) {
            return Some((def, member));
        }
        def.supers.iter().find_map(|s| self.find_member(s, name))
    }

    /// All overloads of a member name visible from a class
    pub fn find_overloads(&self, class: &str, name: &str) -> Vec<(&ClassDef, &Member)> {
        let mut out = Vec::new();
        if let Some(def) = self.classes.get(class) {
            for member in def.members.iter().filter(|m| m.name == name) {
                out.push((def, member));
            }
            if out.is_empty() {
                for sup in &def.supers {
                    out.extend(self.find_overloads(sup, name));
                }
            }
        }
        out
    }
}

/// Which names an expression may see
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameScope {
    /// Local and global names only (function bodies)
    Names,
    /// Names plus state components
    NamesAndState,
    /// Names, state and old state `x~` (postconditions)
    NamesAndAnyState,
}

impl NameScope {
    pub fn allows_state(self) -> bool {
        !matches!(self, NameScope::Names)
    }

    pub fn allows_old_state(self) -> bool {
        matches!(self, NameScope::NamesAndAnyState)
    }
}

/// A lexical type environment
#[derive(Debug, Clone)]
pub struct TypeEnv<'a> {
    registry: &'a Registry,
    parent: Option<&'a TypeEnv<'a>>,
    bindings: HashMap<String, Binding>,
    class: Option<String>,
    is_static: bool,
    functional: bool,
    pure: bool,
    type_params: Vec<String>,
}

impl<'a> TypeEnv<'a> {
    /// The outermost environment over a registry
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            parent: None,
            bindings: HashMap::new(),
            class: None,
            is_static: false,
            functional: false,
            pure: false,
            type_params: Vec::new(),
        }
    }

    /// A nested scope inheriting every flag of this one
    pub fn child(&self) -> TypeEnv<'_> {
        TypeEnv {
            registry: self.registry,
            parent: Some(self),
            bindings: HashMap::new(),
            class: self.class.clone(),
            is_static: self.is_static,
            functional: self.functional,
            pure: self.pure,
            type_params: self.type_params.clone(),
        }
    }

    /// Check inside the given class
    pub fn in_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    /// Check in a static context (no `self`)
    pub fn in_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Check inside a function body
    pub fn in_function(mut self) -> Self {
        self.functional = true;
        self
    }

    /// Check inside a pure operation
    pub fn in_pure_operation(mut self) -> Self {
        self.pure = true;
        self
    }

    /// Make type parameters visible as `@T`
    pub fn with_type_params(mut self, params: &[&str]) -> Self {
        self.type_params
            .extend(params.iter().map(|p| p.to_string()));
        self
    }

    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    pub fn define(&mut self, name: impl Into<String>, ty: Type) {
        self.bindings.insert(name.into(), Binding::value(ty));
    }

    pub fn define_binding(&mut self, name: impl Into<String>, binding: Binding) {
        self.bindings.insert(name.into(), binding);
    }

    pub fn define_all(&mut self, defs: impl IntoIterator<Item = (String, Type)>) {
        for (name, ty) in defs {
            self.define(name, ty);
        }
    }

    /// Look a name up through local scopes, then globals
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        if let Some(binding) = self.bindings.get(name) {
            return Some(binding);
        }
        match self.parent {
            Some(parent) => parent.lookup(name),
            None => {
                let member = self
                    .class
                    .as_deref()
                    .and_then(|class| self.registry.find_member(class, name))
                    .map(|(_, member)| &member.binding);
                member.or_else(|| self.registry.lookup_global(name))
            }
        }
    }

    pub fn enclosing_class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn is_functional(&self) -> bool {
        self.functional
    }

    pub fn is_pure(&self) -> bool {
        self.pure
    }

    pub fn has_type_param(&self, name: &str) -> bool {
        self.type_params.iter().any(|p| p == name)
    }
}

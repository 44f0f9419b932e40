//! Static types of the VDM notation
//!
//! Types are plain data shared by both layers: the checker computes them and
//! the evaluator reads them for dynamic type checks, invariant lookups and
//! polymorphic disambiguation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A static type
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Bool,
    /// `nat1`
    NatOne,
    Nat,
    Int,
    Rat,
    Real,
    Char,
    Token,
    /// `<NAME>`
    Quote(String),
    /// `set of T` / `set1 of T`
    Set {
        elem: Box<Type>,
        non_empty: bool,
    },
    /// `seq of T` / `seq1 of T`
    Seq {
        elem: Box<Type>,
        non_empty: bool,
    },
    /// `map D to R` / `inmap D to R`
    Map {
        from: Box<Type>,
        to: Box<Type>,
        injective: bool,
    },
    /// `T1 * T2 * ...`
    Product(Vec<Type>),
    Record(Arc<RecordType>),
    /// A named alias, possibly carrying an invariant
    Named(Arc<NamedType>),
    /// `T1 | T2 | ...`; always flattened and deduplicated
    Union(Vec<Type>),
    /// `[T]`
    Optional(Box<Type>),
    Function(FunctionType),
    Operation(OperationType),
    /// An object reference of the named class
    Class(String),
    /// A type parameter `@T`
    Param(String),
    /// A name that has not been resolved against the registry yet
    Unresolved(String),
    /// The result of an operation that returns nothing
    Void,
    /// Error recovery; compatible with everything
    Unknown,
}

/// A record type `R :: f1 : T1  f2 :- T2`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<Field>,
    /// An `inv_R` function exists for this type
    pub invariant: bool,
}

/// A record field; `:-` fields are ignored by equality
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Field {
    pub tag: String,
    pub ty: Type,
    pub eq_abstraction: bool,
}

/// `T = U inv t == ...`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NamedType {
    pub name: String,
    pub ty: Type,
    pub invariant: bool,
}

/// `T1 * T2 -> R` or `T1 * T2 +> R`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub result: Box<Type>,
    /// `->` (partial) rather than `+>` (total)
    pub partial: bool,
}

/// `T1 * T2 ==> R`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationType {
    pub params: Vec<Type>,
    pub result: Box<Type>,
    pub pure: bool,
}

impl RecordType {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            invariant: false,
        }
    }

    pub fn with_invariant(mut self) -> Self {
        self.invariant = true;
        self
    }

    pub fn field(&self, tag: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    pub fn field_index(&self, tag: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.tag == tag)
    }
}

impl Field {
    pub fn new(tag: impl Into<String>, ty: Type) -> Self {
        Self {
            tag: tag.into(),
            ty,
            eq_abstraction: false,
        }
    }

    /// A `:-` field
    pub fn abstracted(tag: impl Into<String>, ty: Type) -> Self {
        Self {
            tag: tag.into(),
            ty,
            eq_abstraction: true,
        }
    }
}

impl FunctionType {
    pub fn new(params: Vec<Type>, result: Type) -> Self {
        Self {
            params,
            result: Box::new(result),
            partial: true,
        }
    }
}

impl Type {
    pub fn set_of(elem: Type) -> Type {
        Type::Set {
            elem: Box::new(elem),
            non_empty: false,
        }
    }

    pub fn set1_of(elem: Type) -> Type {
        Type::Set {
            elem: Box::new(elem),
            non_empty: true,
        }
    }

    pub fn seq_of(elem: Type) -> Type {
        Type::Seq {
            elem: Box::new(elem),
            non_empty: false,
        }
    }

    pub fn seq1_of(elem: Type) -> Type {
        Type::Seq {
            elem: Box::new(elem),
            non_empty: true,
        }
    }

    pub fn map_of(from: Type, to: Type) -> Type {
        Type::Map {
            from: Box::new(from),
            to: Box::new(to),
            injective: false,
        }
    }

    pub fn inmap_of(from: Type, to: Type) -> Type {
        Type::Map {
            from: Box::new(from),
            to: Box::new(to),
            injective: true,
        }
    }

    pub fn optional(inner: Type) -> Type {
        match inner {
            Type::Optional(_) => inner,
            other => Type::Optional(Box::new(other)),
        }
    }

    pub fn function(params: Vec<Type>, result: Type) -> Type {
        Type::Function(FunctionType::new(params, result))
    }

    pub fn total_function(params: Vec<Type>, result: Type) -> Type {
        Type::Function(FunctionType {
            params,
            result: Box::new(result),
            partial: false,
        })
    }

    pub fn operation(params: Vec<Type>, result: Type, pure: bool) -> Type {
        Type::Operation(OperationType {
            params,
            result: Box::new(result),
            pure,
        })
    }

    pub fn record(record: RecordType) -> Type {
        Type::Record(Arc::new(record))
    }

    pub fn named(name: impl Into<String>, ty: Type) -> Type {
        Type::Named(Arc::new(NamedType {
            name: name.into(),
            ty,
            invariant: false,
        }))
    }

    /// The string type `seq of char`
    pub fn string() -> Type {
        Type::seq_of(Type::Char)
    }

    /// Build a union, flattening nested unions and dropping duplicates.
    ///
    /// A single member is returned as itself; an empty list is `Unknown`.
    pub fn union(members: impl IntoIterator<Item = Type>) -> Type {
        let mut flat: Vec<Type> = Vec::new();
        for member in members {
            match member {
                Type::Union(inner) => {
                    for t in inner {
                        if !flat.contains(&t) {
                            flat.push(t);
                        }
                    }
                }
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }
        if flat.len() > 1 && flat.contains(&Type::Unknown) {
            flat.retain(|t| *t != Type::Unknown);
        }
        match flat.len() {
            0 => Type::Unknown,
            1 => flat.remove(0),
            _ => Type::Union(flat),
        }
    }

    /// Strip named aliases
    pub fn deref_named(&self) -> &Type {
        match self {
            Type::Named(named) => named.ty.deref_named(),
            other => other,
        }
    }

    /// The non-union branches of this type, looking through aliases
    pub fn branches(&self) -> Vec<&Type> {
        match self.deref_named() {
            Type::Union(members) => members.iter().flat_map(|m| m.branches()).collect(),
            other => vec![other],
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.deref_named(), Type::Unknown | Type::Param(_) | Type::Unresolved(_))
    }

    /// Numeric weight: nat1 1, nat 2, int 3, rat 4, real 5
    pub fn numeric_weight(&self) -> Option<u8> {
        match self.deref_named() {
            Type::NatOne => Some(1),
            Type::Nat => Some(2),
            Type::Int => Some(3),
            Type::Rat => Some(4),
            Type::Real => Some(5),
            _ => None,
        }
    }

    /// The numeric type of a given weight
    pub fn numeric_of_weight(weight: u8) -> Type {
        match weight {
            1 => Type::NatOne,
            2 => Type::Nat,
            3 => Type::Int,
            4 => Type::Rat,
            _ => Type::Real,
        }
    }

    /// Numeric branches, if any branch is numeric or unknown
    pub fn numeric_branches(&self) -> Vec<Type> {
        self.branches()
            .into_iter()
            .filter_map(|t| {
                if t.is_unknown() {
                    Some(Type::Real)
                } else {
                    t.numeric_weight().map(|_| t.clone())
                }
            })
            .collect()
    }

    pub fn is_numeric(&self) -> bool {
        !self.numeric_branches().is_empty()
    }

    /// True if every branch is an integer type
    pub fn is_integral(&self) -> bool {
        let branches = self.branches();
        !branches.is_empty()
            && branches
                .iter()
                .all(|t| matches!(t.numeric_weight(), Some(w) if w <= 3))
    }

    /// True if every branch is `nat` or `nat1`
    pub fn is_natural(&self) -> bool {
        let branches = self.branches();
        !branches.is_empty()
            && branches
                .iter()
                .all(|t| matches!(t.numeric_weight(), Some(w) if w <= 2))
    }

    pub fn is_bool(&self) -> bool {
        self.branches()
            .iter()
            .any(|t| t.is_unknown() || matches!(t, Type::Bool))
    }

    pub fn is_char(&self) -> bool {
        self.branches()
            .iter()
            .any(|t| t.is_unknown() || matches!(t, Type::Char))
    }

    /// `(element, non_empty)` for each set branch
    pub fn set_branches(&self) -> Vec<(Type, bool)> {
        self.branches()
            .into_iter()
            .filter_map(|t| match t {
                Type::Set { elem, non_empty } => Some(((**elem).clone(), *non_empty)),
                t if t.is_unknown() => Some((Type::Unknown, false)),
                _ => None,
            })
            .collect()
    }

    /// The element type across all set branches
    pub fn set_elem(&self) -> Option<Type> {
        let branches = self.set_branches();
        if branches.is_empty() {
            None
        } else {
            Some(Type::union(branches.into_iter().map(|(t, _)| t)))
        }
    }

    /// `(element, non_empty)` for each sequence branch
    pub fn seq_branches(&self) -> Vec<(Type, bool)> {
        self.branches()
            .into_iter()
            .filter_map(|t| match t {
                Type::Seq { elem, non_empty } => Some(((**elem).clone(), *non_empty)),
                t if t.is_unknown() => Some((Type::Unknown, false)),
                _ => None,
            })
            .collect()
    }

    pub fn seq_elem(&self) -> Option<Type> {
        let branches = self.seq_branches();
        if branches.is_empty() {
            None
        } else {
            Some(Type::union(branches.into_iter().map(|(t, _)| t)))
        }
    }

    /// `(domain, range, injective)` for each map branch
    pub fn map_branches(&self) -> Vec<(Type, Type, bool)> {
        self.branches()
            .into_iter()
            .filter_map(|t| match t {
                Type::Map {
                    from,
                    to,
                    injective,
                } => Some(((**from).clone(), (**to).clone(), *injective)),
                t if t.is_unknown() => Some((Type::Unknown, Type::Unknown, false)),
                _ => None,
            })
            .collect()
    }

    /// Domain and range unions across all map branches
    pub fn map_parts(&self) -> Option<(Type, Type)> {
        let branches = self.map_branches();
        if branches.is_empty() {
            return None;
        }
        let from = Type::union(branches.iter().map(|(f, _, _)| f.clone()));
        let to = Type::union(branches.iter().map(|(_, t, _)| t.clone()));
        Some((from, to))
    }

    pub fn product_branches(&self) -> Vec<&Vec<Type>> {
        self.branches()
            .into_iter()
            .filter_map(|t| match t {
                Type::Product(items) => Some(items),
                _ => None,
            })
            .collect()
    }

    pub fn record_branches(&self) -> Vec<&Arc<RecordType>> {
        self.branches()
            .into_iter()
            .filter_map(|t| match t {
                Type::Record(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn function_branches(&self) -> Vec<&FunctionType> {
        self.branches()
            .into_iter()
            .filter_map(|t| match t {
                Type::Function(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    pub fn operation_branches(&self) -> Vec<&OperationType> {
        self.branches()
            .into_iter()
            .filter_map(|t| match t {
                Type::Operation(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    pub fn class_branches(&self) -> Vec<&str> {
        self.branches()
            .into_iter()
            .filter_map(|t| match t {
                Type::Class(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// True if the type mentions a type parameter anywhere
    pub fn contains_param(&self) -> bool {
        match self {
            Type::Param(_) => true,
            Type::Set { elem, .. } | Type::Seq { elem, .. } | Type::Optional(elem) => {
                elem.contains_param()
            }
            Type::Map { from, to, .. } => from.contains_param() || to.contains_param(),
            Type::Product(items) | Type::Union(items) => items.iter().any(|t| t.contains_param()),
            Type::Function(f) => {
                f.params.iter().any(|t| t.contains_param()) || f.result.contains_param()
            }
            Type::Operation(o) => {
                o.params.iter().any(|t| t.contains_param()) || o.result.contains_param()
            }
            _ => false,
        }
    }

    /// Replace type parameters by the given bindings
    pub fn substitute(&self, bindings: &HashMap<String, Type>) -> Type {
        match self {
            Type::Param(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            Type::Set { elem, non_empty } => Type::Set {
                elem: Box::new(elem.substitute(bindings)),
                non_empty: *non_empty,
            },
            Type::Seq { elem, non_empty } => Type::Seq {
                elem: Box::new(elem.substitute(bindings)),
                non_empty: *non_empty,
            },
            Type::Map {
                from,
                to,
                injective,
            } => Type::Map {
                from: Box::new(from.substitute(bindings)),
                to: Box::new(to.substitute(bindings)),
                injective: *injective,
            },
            Type::Product(items) => {
                Type::Product(items.iter().map(|t| t.substitute(bindings)).collect())
            }
            Type::Union(items) => Type::union(items.iter().map(|t| t.substitute(bindings))),
            Type::Optional(inner) => Type::optional(inner.substitute(bindings)),
            Type::Function(f) => Type::Function(FunctionType {
                params: f.params.iter().map(|t| t.substitute(bindings)).collect(),
                result: Box::new(f.result.substitute(bindings)),
                partial: f.partial,
            }),
            Type::Operation(o) => Type::Operation(OperationType {
                params: o.params.iter().map(|t| t.substitute(bindings)).collect(),
                result: Box::new(o.result.substitute(bindings)),
                pure: o.pure,
            }),
            _ => self.clone(),
        }
    }

    /// The name used to look up `inv_<name>`, if the type has an invariant
    pub fn invariant_name(&self) -> Option<&str> {
        match self {
            Type::Named(named) if named.invariant => Some(&named.name),
            Type::Record(record) if record.invariant => Some(&record.name),
            _ => None,
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Type], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        match item {
            Type::Union(_) | Type::Function(_) | Type::Operation(_) if sep != ", " => {
                write!(f, "({})", item)?
            }
            _ => write!(f, "{}", item)?,
        }
    }
    Ok(())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::NatOne => write!(f, "nat1"),
            Type::Nat => write!(f, "nat"),
            Type::Int => write!(f, "int"),
            Type::Rat => write!(f, "rat"),
            Type::Real => write!(f, "real"),
            Type::Char => write!(f, "char"),
            Type::Token => write!(f, "token"),
            Type::Quote(q) => write!(f, "<{}>", q),
            Type::Set { elem, non_empty } => {
                write!(f, "{} of {}", if *non_empty { "set1" } else { "set" }, elem)
            }
            Type::Seq { elem, non_empty } => {
                write!(f, "{} of {}", if *non_empty { "seq1" } else { "seq" }, elem)
            }
            Type::Map {
                from,
                to,
                injective,
            } => write!(
                f,
                "{} {} to {}",
                if *injective { "inmap" } else { "map" },
                from,
                to
            ),
            Type::Product(items) => {
                write!(f, "(")?;
                write_list(f, items, " * ")?;
                write!(f, ")")
            }
            Type::Record(record) => write!(f, "{}", record.name),
            Type::Named(named) => write!(f, "{}", named.name),
            Type::Union(items) => write_list(f, items, " | "),
            Type::Optional(inner) => write!(f, "[{}]", inner),
            Type::Function(func) => {
                if func.params.is_empty() {
                    write!(f, "()")?;
                } else {
                    write_list(f, &func.params, " * ")?;
                }
                write!(f, " {} {}", if func.partial { "->" } else { "+>" }, func.result)
            }
            Type::Operation(op) => {
                if op.params.is_empty() {
                    write!(f, "()")?;
                } else {
                    write_list(f, &op.params, " * ")?;
                }
                write!(f, " ==> {}", op.result)
            }
            Type::Class(name) => write!(f, "{}", name),
            Type::Param(name) => write!(f, "@{}", name),
            Type::Unresolved(name) => write!(f, "{}", name),
            Type::Void => write!(f, "()"),
            Type::Unknown => write!(f, "?"),
        }
    }
}

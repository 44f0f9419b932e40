//! Expression trees for the VDM expression core
//!
//! A single tree shape serves both layers. [`Expr<Checked>`] is what the
//! external builder produces and the type checker annotates; [`Expr<Runtime>`]
//! is produced from it by [`crate::remap::to_runtime`] and evaluated by the
//! interpreter. The phase parameter only decides what each node carries in
//! its `info` slot.

use num_bigint::BigInt;
use num_rational::BigRational;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::diagnostics::Span;
use crate::typechecker::types::Type;

pub mod builder;
pub mod visit;

/// Unique identifier for tree nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Generate a new unique node ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Marker for a tree phase.
///
/// `Info` is the per-node annotation: the checker phase starts out empty and
/// is filled in during checking, the runtime phase always has a type.
pub trait Phase: Clone + fmt::Debug {
    type Info: Clone + fmt::Debug;
}

/// The type-checked layer
#[derive(Debug, Clone)]
pub struct Checked;

impl Phase for Checked {
    type Info = Option<Type>;
}

/// The evaluated layer
#[derive(Debug, Clone)]
pub struct Runtime;

impl Phase for Runtime {
    type Info = Type;
}

pub type TcExpr = Expr<Checked>;
pub type InExpr = Expr<Runtime>;
pub type TcPattern = Pattern<Checked>;
pub type InPattern = Pattern<Runtime>;

/// A possibly module-qualified name (`M`x`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name {
    pub module: Option<String>,
    pub ident: String,
}

impl Name {
    pub fn simple(ident: impl Into<String>) -> Self {
        Self {
            module: None,
            ident: ident.into(),
        }
    }

    pub fn qualified(module: impl Into<String>, ident: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            ident: ident.into(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "{}`{}", module, self.ident),
            None => write!(f, "{}", self.ident),
        }
    }
}

/// Literal constants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Bool(bool),
    Int(BigInt),
    Real(BigRational),
    Char(char),
    Quote(String),
    Text(String),
    Nil,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Real(r) => write!(f, "{}", crate::interpreter::numeric::format_rational(r)),
            Literal::Char(c) => write!(f, "'{}'", c),
            Literal::Quote(q) => write!(f, "<{}>", q),
            Literal::Text(s) => write!(f, "\"{}\"", s),
            Literal::Nil => write!(f, "nil"),
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Minus,
    Abs,
    Floor,
    Not,
    Card,
    Power,
    DistUnion,
    DistInter,
    Len,
    Head,
    Tail,
    Elems,
    Inds,
    Reverse,
    DistConc,
    Dom,
    Rng,
    DistMerge,
    Inverse,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Abs => "abs",
            UnaryOp::Floor => "floor",
            UnaryOp::Not => "not",
            UnaryOp::Card => "card",
            UnaryOp::Power => "power",
            UnaryOp::DistUnion => "dunion",
            UnaryOp::DistInter => "dinter",
            UnaryOp::Len => "len",
            UnaryOp::Head => "hd",
            UnaryOp::Tail => "tl",
            UnaryOp::Elems => "elems",
            UnaryOp::Inds => "inds",
            UnaryOp::Reverse => "reverse",
            UnaryOp::DistConc => "conc",
            UnaryOp::Dom => "dom",
            UnaryOp::Rng => "rng",
            UnaryOp::DistMerge => "merge",
            UnaryOp::Inverse => "inverse",
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    Plus,
    Minus,
    Times,
    Divide,
    Div,
    Rem,
    Mod,
    StarStar,

    // Comparison
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Equals,
    NotEquals,

    // Logical
    And,
    Or,
    Implies,
    Equiv,

    // Sets
    InSet,
    NotInSet,
    Union,
    Inter,
    Difference,
    Subset,
    ProperSubset,

    // Sequences and maps
    Concat,
    PlusPlus,
    Munion,
    Comp,
    DomResTo,
    DomResBy,
    RngResTo,
    RngResBy,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Times => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::Mod => "mod",
            BinaryOp::StarStar => "**",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::Equals => "=",
            BinaryOp::NotEquals => "<>",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Implies => "=>",
            BinaryOp::Equiv => "<=>",
            BinaryOp::InSet => "in set",
            BinaryOp::NotInSet => "not in set",
            BinaryOp::Union => "union",
            BinaryOp::Inter => "inter",
            BinaryOp::Difference => "\\",
            BinaryOp::Subset => "subset",
            BinaryOp::ProperSubset => "psubset",
            BinaryOp::Concat => "^",
            BinaryOp::PlusPlus => "++",
            BinaryOp::Munion => "munion",
            BinaryOp::Comp => "comp",
            BinaryOp::DomResTo => "<:",
            BinaryOp::DomResBy => "<-:",
            BinaryOp::RngResTo => ":>",
            BinaryOp::RngResBy => ":->",
        }
    }

    /// `and`, `or`, `=>` evaluate their right operand only when needed
    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Implies)
    }
}

/// Operation history counters (`#act(op)` and friends)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryOp {
    Act,
    Fin,
    Active,
    Req,
    Waiting,
}

impl HistoryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            HistoryOp::Act => "#act",
            HistoryOp::Fin => "#fin",
            HistoryOp::Active => "#active",
            HistoryOp::Req => "#req",
            HistoryOp::Waiting => "#waiting",
        }
    }
}

/// An expression node
#[derive(Debug, Clone)]
pub struct Expr<P: Phase> {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind<P>,
    pub info: P::Info,
}

/// Expression forms
#[derive(Debug, Clone)]
pub enum ExprKind<P: Phase> {
    // Literals and atoms
    Literal(Literal),
    Undefined,
    Variable {
        name: Name,
        /// `x~`, only meaningful in postconditions
        old: bool,
    },
    SelfRef,
    ThreadId,
    Time,
    NotYetSpecified,

    // Operators
    Unary {
        op: UnaryOp,
        operand: Box<Expr<P>>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr<P>>,
        right: Box<Expr<P>>,
    },

    // Control
    If {
        condition: Box<Expr<P>>,
        then_branch: Box<Expr<P>>,
        elseifs: Vec<(Expr<P>, Expr<P>)>,
        else_branch: Box<Expr<P>>,
    },
    Cases {
        scrutinee: Box<Expr<P>>,
        alternatives: Vec<CaseAlternative<P>>,
        others: Option<Box<Expr<P>>>,
    },
    Let {
        defs: Vec<LocalDef<P>>,
        body: Box<Expr<P>>,
    },
    Def {
        defs: Vec<LocalDef<P>>,
        body: Box<Expr<P>>,
    },
    LetBeSt {
        bind: MultipleBind<P>,
        filter: Option<Box<Expr<P>>>,
        body: Box<Expr<P>>,
    },

    // Quantifiers
    Forall {
        binds: Vec<MultipleBind<P>>,
        predicate: Box<Expr<P>>,
    },
    Exists {
        binds: Vec<MultipleBind<P>>,
        predicate: Box<Expr<P>>,
    },
    Exists1 {
        bind: Bind<P>,
        predicate: Box<Expr<P>>,
    },
    Iota {
        bind: Bind<P>,
        predicate: Box<Expr<P>>,
    },
    Lambda {
        params: Vec<TypedParam<P>>,
        body: Arc<Expr<P>>,
    },

    // Sets
    SetEnum(Vec<Expr<P>>),
    SetRange {
        first: Box<Expr<P>>,
        last: Box<Expr<P>>,
    },
    SetComp {
        element: Box<Expr<P>>,
        binds: Vec<MultipleBind<P>>,
        predicate: Option<Box<Expr<P>>>,
    },

    // Sequences
    SeqEnum(Vec<Expr<P>>),
    SeqComp {
        element: Box<Expr<P>>,
        bind: Bind<P>,
        predicate: Option<Box<Expr<P>>>,
    },
    Subseq {
        seq: Box<Expr<P>>,
        from: Box<Expr<P>>,
        to: Box<Expr<P>>,
    },

    // Maps
    MapEnum(Vec<Maplet<P>>),
    MapComp {
        maplet: Box<Maplet<P>>,
        binds: Vec<MultipleBind<P>>,
        predicate: Option<Box<Expr<P>>>,
    },

    // Tuples and records
    Tuple(Vec<Expr<P>>),
    MkRecord {
        record: Name,
        args: Vec<Expr<P>>,
    },
    MkToken(Box<Expr<P>>),
    Mu {
        record: Box<Expr<P>>,
        modifications: Vec<(String, Expr<P>)>,
    },
    Field {
        object: Box<Expr<P>>,
        field: String,
    },
    FieldNumber {
        tuple: Box<Expr<P>>,
        index: usize,
    },

    // Application
    Apply {
        callee: Box<Expr<P>>,
        args: Vec<Expr<P>>,
    },
    Instantiate {
        function: Box<Expr<P>>,
        actuals: Vec<Type>,
    },

    // Type and class tests
    Is {
        ty: Type,
        operand: Box<Expr<P>>,
    },
    Narrow {
        ty: Type,
        operand: Box<Expr<P>>,
    },
    IsOfClass {
        class: String,
        operand: Box<Expr<P>>,
    },
    IsOfBaseClass {
        class: String,
        operand: Box<Expr<P>>,
    },
    SameClass {
        left: Box<Expr<P>>,
        right: Box<Expr<P>>,
    },
    SameBaseClass {
        left: Box<Expr<P>>,
        right: Box<Expr<P>>,
    },

    // Conditions
    Pre {
        function: Box<Expr<P>>,
        args: Vec<Expr<P>>,
    },
    PreOp {
        condition: Box<Expr<P>>,
        errors: Vec<ErrorCase<P>>,
    },
    PostOp {
        condition: Box<Expr<P>>,
        errors: Vec<ErrorCase<P>>,
    },
    History {
        op: HistoryOp,
        operations: Vec<String>,
    },
}

/// `p1, p2 -> result` inside `cases`
#[derive(Debug, Clone)]
pub struct CaseAlternative<P: Phase> {
    pub span: Span,
    pub patterns: Vec<Pattern<P>>,
    pub result: Expr<P>,
}

/// `p : T = e` inside `let` or `def`
#[derive(Debug, Clone)]
pub struct LocalDef<P: Phase> {
    pub span: Span,
    pub pattern: Pattern<P>,
    pub ty: Option<Type>,
    pub value: Expr<P>,
}

/// `key |-> value`
#[derive(Debug, Clone)]
pub struct Maplet<P: Phase> {
    pub key: Expr<P>,
    pub value: Expr<P>,
}

/// `NAME: left -> right` in an `errs` clause
#[derive(Debug, Clone)]
pub struct ErrorCase<P: Phase> {
    pub name: String,
    pub left: Expr<P>,
    pub right: Expr<P>,
}

/// A lambda parameter `p : T`
#[derive(Debug, Clone)]
pub struct TypedParam<P: Phase> {
    pub pattern: Pattern<P>,
    pub ty: Type,
}

/// A pattern node
#[derive(Debug, Clone)]
pub struct Pattern<P: Phase> {
    pub span: Span,
    pub kind: PatternKind<P>,
}

/// Pattern forms
#[derive(Debug, Clone)]
pub enum PatternKind<P: Phase> {
    Identifier(String),
    Ignore,
    Literal(Literal),
    /// `(e)` matches a value equal to `e`
    Expression(Box<Expr<P>>),
    Tuple(Vec<Pattern<P>>),
    Record {
        record: Name,
        fields: Vec<Pattern<P>>,
    },
    Set(Vec<Pattern<P>>),
    Seq(Vec<Pattern<P>>),
    Union(Box<Pattern<P>>, Box<Pattern<P>>),
    Concat(Box<Pattern<P>>, Box<Pattern<P>>),
    Map(Vec<(Pattern<P>, Pattern<P>)>),
    MapUnion(Box<Pattern<P>>, Box<Pattern<P>>),
}

/// A single binding: `p in set S`, `p in seq S` or `p : T`
#[derive(Debug, Clone)]
pub enum Bind<P: Phase> {
    Set {
        pattern: Pattern<P>,
        set: Box<Expr<P>>,
    },
    Seq {
        pattern: Pattern<P>,
        seq: Box<Expr<P>>,
    },
    Type {
        pattern: Pattern<P>,
        ty: Type,
    },
}

/// A binding of several patterns to one source: `a, b in set S`
#[derive(Debug, Clone)]
pub enum MultipleBind<P: Phase> {
    Set {
        patterns: Vec<Pattern<P>>,
        set: Box<Expr<P>>,
    },
    Seq {
        patterns: Vec<Pattern<P>>,
        seq: Box<Expr<P>>,
    },
    Type {
        patterns: Vec<Pattern<P>>,
        ty: Type,
    },
}

impl<P: Phase> Bind<P> {
    pub fn pattern(&self) -> &Pattern<P> {
        match self {
            Bind::Set { pattern, .. } | Bind::Seq { pattern, .. } | Bind::Type { pattern, .. } => {
                pattern
            }
        }
    }

    /// View the single bind as a one-pattern multiple bind
    pub fn to_multiple(&self) -> MultipleBind<P> {
        match self {
            Bind::Set { pattern, set } => MultipleBind::Set {
                patterns: vec![pattern.clone()],
                set: set.clone(),
            },
            Bind::Seq { pattern, seq } => MultipleBind::Seq {
                patterns: vec![pattern.clone()],
                seq: seq.clone(),
            },
            Bind::Type { pattern, ty } => MultipleBind::Type {
                patterns: vec![pattern.clone()],
                ty: ty.clone(),
            },
        }
    }
}

impl<P: Phase> MultipleBind<P> {
    pub fn patterns(&self) -> &[Pattern<P>] {
        match self {
            MultipleBind::Set { patterns, .. }
            | MultipleBind::Seq { patterns, .. }
            | MultipleBind::Type { patterns, .. } => patterns,
        }
    }
}

impl<P: Phase> Pattern<P> {
    pub fn new(kind: PatternKind<P>, span: Span) -> Self {
        Self { span, kind }
    }

    /// Names bound by this pattern, in order of first appearance
    pub fn names(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names(&self, out: &mut Vec<String>) {
        match &self.kind {
            PatternKind::Identifier(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            PatternKind::Ignore | PatternKind::Literal(_) | PatternKind::Expression(_) => {}
            PatternKind::Tuple(items)
            | PatternKind::Record { fields: items, .. }
            | PatternKind::Set(items)
            | PatternKind::Seq(items) => {
                for item in items {
                    item.collect_names(out);
                }
            }
            PatternKind::Union(left, right)
            | PatternKind::Concat(left, right)
            | PatternKind::MapUnion(left, right) => {
                left.collect_names(out);
                right.collect_names(out);
            }
            PatternKind::Map(maplets) => {
                for (key, value) in maplets {
                    key.collect_names(out);
                    value.collect_names(out);
                }
            }
        }
    }
}

impl<P: Phase> fmt::Display for Pattern<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<P: Phase>(f: &mut fmt::Formatter<'_>, items: &[Pattern<P>]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", item)?;
            }
            Ok(())
        }

        match &self.kind {
            PatternKind::Identifier(name) => write!(f, "{}", name),
            PatternKind::Ignore => write!(f, "-"),
            PatternKind::Literal(lit) => write!(f, "{}", lit),
            PatternKind::Expression(_) => write!(f, "(expr)"),
            PatternKind::Tuple(items) => {
                write!(f, "mk_(")?;
                list(f, items)?;
                write!(f, ")")
            }
            PatternKind::Record { record, fields } => {
                write!(f, "mk_{}(", record)?;
                list(f, fields)?;
                write!(f, ")")
            }
            PatternKind::Set(items) => {
                write!(f, "{{")?;
                list(f, items)?;
                write!(f, "}}")
            }
            PatternKind::Seq(items) => {
                write!(f, "[")?;
                list(f, items)?;
                write!(f, "]")
            }
            PatternKind::Union(l, r) => write!(f, "{} union {}", l, r),
            PatternKind::Concat(l, r) => write!(f, "{} ^ {}", l, r),
            PatternKind::Map(maplets) => {
                write!(f, "{{")?;
                for (i, (k, v)) in maplets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} |-> {}", k, v)?;
                }
                write!(f, "}}")
            }
            PatternKind::MapUnion(l, r) => write!(f, "{} munion {}", l, r),
        }
    }
}

impl TcExpr {
    /// Create an unchecked node
    pub fn new(kind: ExprKind<Checked>, span: Span) -> Self {
        Self {
            id: NodeId::new(),
            span,
            kind,
            info: None,
        }
    }

    /// The type assigned by the checker, if it has run
    pub fn checked_type(&self) -> Option<&Type> {
        self.info.as_ref()
    }
}

impl InExpr {
    /// The resolved static type of this node
    pub fn ty(&self) -> &Type {
        &self.info
    }
}

#[cfg(test)]
mod tests;

//! Constructors for checker-phase trees
//!
//! The parser is an external collaborator; these helpers are what it (and
//! the tests) use to assemble unchecked trees. Nodes get a default span
//! unless one is attached with [`At::at`].

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Zero;

use super::*;
use crate::interpreter::numeric;

/// Attach a source location to a freshly built node
pub trait At {
    fn at(self, span: Span) -> Self;
}

impl At for TcExpr {
    fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

impl At for TcPattern {
    fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

fn node(kind: ExprKind<Checked>) -> TcExpr {
    TcExpr::new(kind, Span::default())
}

fn boxed(expr: TcExpr) -> Box<TcExpr> {
    Box::new(expr)
}

// Literals

pub fn bool_lit(value: bool) -> TcExpr {
    node(ExprKind::Literal(Literal::Bool(value)))
}

pub fn int(value: i64) -> TcExpr {
    node(ExprKind::Literal(Literal::Int(BigInt::from(value))))
}

pub fn big_int(value: BigInt) -> TcExpr {
    node(ExprKind::Literal(Literal::Int(value)))
}

/// A real literal written in decimal notation, e.g. `"2.5"`
pub fn real(text: &str) -> TcExpr {
    let value = numeric::parse_decimal(text).unwrap_or_else(BigRational::zero);
    node(ExprKind::Literal(Literal::Real(value)))
}

pub fn char_lit(value: char) -> TcExpr {
    node(ExprKind::Literal(Literal::Char(value)))
}

pub fn quote(name: &str) -> TcExpr {
    node(ExprKind::Literal(Literal::Quote(name.to_string())))
}

pub fn text(value: &str) -> TcExpr {
    node(ExprKind::Literal(Literal::Text(value.to_string())))
}

pub fn nil() -> TcExpr {
    node(ExprKind::Literal(Literal::Nil))
}

pub fn undefined() -> TcExpr {
    node(ExprKind::Undefined)
}

pub fn not_yet_specified() -> TcExpr {
    node(ExprKind::NotYetSpecified)
}

// Names

pub fn var(name: &str) -> TcExpr {
    node(ExprKind::Variable {
        name: Name::simple(name),
        old: false,
    })
}

pub fn qualified_var(module: &str, name: &str) -> TcExpr {
    node(ExprKind::Variable {
        name: Name::qualified(module, name),
        old: false,
    })
}

/// `name~`
pub fn old_var(name: &str) -> TcExpr {
    node(ExprKind::Variable {
        name: Name::simple(name),
        old: true,
    })
}

pub fn self_ref() -> TcExpr {
    node(ExprKind::SelfRef)
}

pub fn thread_id() -> TcExpr {
    node(ExprKind::ThreadId)
}

pub fn time() -> TcExpr {
    node(ExprKind::Time)
}

// Operators

pub fn unary(op: UnaryOp, operand: TcExpr) -> TcExpr {
    node(ExprKind::Unary {
        op,
        operand: boxed(operand),
    })
}

pub fn binary(op: BinaryOp, left: TcExpr, right: TcExpr) -> TcExpr {
    node(ExprKind::Binary {
        op,
        left: boxed(left),
        right: boxed(right),
    })
}

// Control

pub fn if_then_else(condition: TcExpr, then_branch: TcExpr, else_branch: TcExpr) -> TcExpr {
    node(ExprKind::If {
        condition: boxed(condition),
        then_branch: boxed(then_branch),
        elseifs: Vec::new(),
        else_branch: boxed(else_branch),
    })
}

pub fn if_elseif(
    condition: TcExpr,
    then_branch: TcExpr,
    elseifs: Vec<(TcExpr, TcExpr)>,
    else_branch: TcExpr,
) -> TcExpr {
    node(ExprKind::If {
        condition: boxed(condition),
        then_branch: boxed(then_branch),
        elseifs,
        else_branch: boxed(else_branch),
    })
}

pub fn cases(
    scrutinee: TcExpr,
    alternatives: Vec<(Vec<TcPattern>, TcExpr)>,
    others: Option<TcExpr>,
) -> TcExpr {
    node(ExprKind::Cases {
        scrutinee: boxed(scrutinee),
        alternatives: alternatives
            .into_iter()
            .map(|(patterns, result)| CaseAlternative {
                span: result.span.clone(),
                patterns,
                result,
            })
            .collect(),
        others: others.map(boxed),
    })
}

pub fn local_def(pattern: TcPattern, ty: Option<Type>, value: TcExpr) -> LocalDef<Checked> {
    LocalDef {
        span: value.span.clone(),
        pattern,
        ty,
        value,
    }
}

pub fn let_in(defs: Vec<LocalDef<Checked>>, body: TcExpr) -> TcExpr {
    node(ExprKind::Let {
        defs,
        body: boxed(body),
    })
}

pub fn def_in(defs: Vec<LocalDef<Checked>>, body: TcExpr) -> TcExpr {
    node(ExprKind::Def {
        defs,
        body: boxed(body),
    })
}

pub fn let_be_st(bind: MultipleBind<Checked>, filter: Option<TcExpr>, body: TcExpr) -> TcExpr {
    node(ExprKind::LetBeSt {
        bind,
        filter: filter.map(boxed),
        body: boxed(body),
    })
}

// Quantifiers and lambda

pub fn forall(binds: Vec<MultipleBind<Checked>>, predicate: TcExpr) -> TcExpr {
    node(ExprKind::Forall {
        binds,
        predicate: boxed(predicate),
    })
}

pub fn exists(binds: Vec<MultipleBind<Checked>>, predicate: TcExpr) -> TcExpr {
    node(ExprKind::Exists {
        binds,
        predicate: boxed(predicate),
    })
}

pub fn exists1(bind: Bind<Checked>, predicate: TcExpr) -> TcExpr {
    node(ExprKind::Exists1 {
        bind,
        predicate: boxed(predicate),
    })
}

pub fn iota(bind: Bind<Checked>, predicate: TcExpr) -> TcExpr {
    node(ExprKind::Iota {
        bind,
        predicate: boxed(predicate),
    })
}

pub fn lambda(params: Vec<(TcPattern, Type)>, body: TcExpr) -> TcExpr {
    node(ExprKind::Lambda {
        params: params
            .into_iter()
            .map(|(pattern, ty)| TypedParam { pattern, ty })
            .collect(),
        body: Arc::new(body),
    })
}

// Collections

pub fn set_enum(items: Vec<TcExpr>) -> TcExpr {
    node(ExprKind::SetEnum(items))
}

pub fn set_range(first: TcExpr, last: TcExpr) -> TcExpr {
    node(ExprKind::SetRange {
        first: boxed(first),
        last: boxed(last),
    })
}

pub fn set_comp(
    element: TcExpr,
    binds: Vec<MultipleBind<Checked>>,
    predicate: Option<TcExpr>,
) -> TcExpr {
    node(ExprKind::SetComp {
        element: boxed(element),
        binds,
        predicate: predicate.map(boxed),
    })
}

pub fn seq_enum(items: Vec<TcExpr>) -> TcExpr {
    node(ExprKind::SeqEnum(items))
}

pub fn seq_comp(element: TcExpr, bind: Bind<Checked>, predicate: Option<TcExpr>) -> TcExpr {
    node(ExprKind::SeqComp {
        element: boxed(element),
        bind,
        predicate: predicate.map(boxed),
    })
}

pub fn subseq(seq: TcExpr, from: TcExpr, to: TcExpr) -> TcExpr {
    node(ExprKind::Subseq {
        seq: boxed(seq),
        from: boxed(from),
        to: boxed(to),
    })
}

pub fn map_enum(maplets: Vec<(TcExpr, TcExpr)>) -> TcExpr {
    node(ExprKind::MapEnum(
        maplets
            .into_iter()
            .map(|(key, value)| Maplet { key, value })
            .collect(),
    ))
}

pub fn map_comp(
    key: TcExpr,
    value: TcExpr,
    binds: Vec<MultipleBind<Checked>>,
    predicate: Option<TcExpr>,
) -> TcExpr {
    node(ExprKind::MapComp {
        maplet: Box::new(Maplet { key, value }),
        binds,
        predicate: predicate.map(boxed),
    })
}

// Tuples and records

pub fn tuple(items: Vec<TcExpr>) -> TcExpr {
    node(ExprKind::Tuple(items))
}

pub fn mk(record: &str, args: Vec<TcExpr>) -> TcExpr {
    node(ExprKind::MkRecord {
        record: Name::simple(record),
        args,
    })
}

pub fn mk_token(inner: TcExpr) -> TcExpr {
    node(ExprKind::MkToken(boxed(inner)))
}

pub fn mu(record: TcExpr, modifications: Vec<(&str, TcExpr)>) -> TcExpr {
    node(ExprKind::Mu {
        record: boxed(record),
        modifications: modifications
            .into_iter()
            .map(|(tag, value)| (tag.to_string(), value))
            .collect(),
    })
}

pub fn field(object: TcExpr, name: &str) -> TcExpr {
    node(ExprKind::Field {
        object: boxed(object),
        field: name.to_string(),
    })
}

pub fn field_number(tuple: TcExpr, index: usize) -> TcExpr {
    node(ExprKind::FieldNumber {
        tuple: boxed(tuple),
        index,
    })
}

// Application

pub fn apply(callee: TcExpr, args: Vec<TcExpr>) -> TcExpr {
    node(ExprKind::Apply {
        callee: boxed(callee),
        args,
    })
}

pub fn instantiate(function: TcExpr, actuals: Vec<Type>) -> TcExpr {
    node(ExprKind::Instantiate {
        function: boxed(function),
        actuals,
    })
}

// Type and class tests

pub fn is_type(operand: TcExpr, ty: Type) -> TcExpr {
    node(ExprKind::Is {
        ty,
        operand: boxed(operand),
    })
}

pub fn narrow(operand: TcExpr, ty: Type) -> TcExpr {
    node(ExprKind::Narrow {
        ty,
        operand: boxed(operand),
    })
}

pub fn is_of_class(class: &str, operand: TcExpr) -> TcExpr {
    node(ExprKind::IsOfClass {
        class: class.to_string(),
        operand: boxed(operand),
    })
}

pub fn is_of_base_class(class: &str, operand: TcExpr) -> TcExpr {
    node(ExprKind::IsOfBaseClass {
        class: class.to_string(),
        operand: boxed(operand),
    })
}

pub fn same_class(left: TcExpr, right: TcExpr) -> TcExpr {
    node(ExprKind::SameClass {
        left: boxed(left),
        right: boxed(right),
    })
}

pub fn same_base_class(left: TcExpr, right: TcExpr) -> TcExpr {
    node(ExprKind::SameBaseClass {
        left: boxed(left),
        right: boxed(right),
    })
}

// Conditions

pub fn pre(function: TcExpr, args: Vec<TcExpr>) -> TcExpr {
    node(ExprKind::Pre {
        function: boxed(function),
        args,
    })
}

pub fn pre_op(condition: TcExpr) -> TcExpr {
    node(ExprKind::PreOp {
        condition: boxed(condition),
        errors: Vec::new(),
    })
}

pub fn post_op(condition: TcExpr, errors: Vec<(&str, TcExpr, TcExpr)>) -> TcExpr {
    node(ExprKind::PostOp {
        condition: boxed(condition),
        errors: errors
            .into_iter()
            .map(|(name, left, right)| ErrorCase {
                name: name.to_string(),
                left,
                right,
            })
            .collect(),
    })
}

pub fn history(op: HistoryOp, operations: &[&str]) -> TcExpr {
    node(ExprKind::History {
        op,
        operations: operations.iter().map(|s| s.to_string()).collect(),
    })
}

// Patterns

fn pattern(kind: PatternKind<Checked>) -> TcPattern {
    Pattern::new(kind, Span::default())
}

pub fn pid(name: &str) -> TcPattern {
    pattern(PatternKind::Identifier(name.to_string()))
}

pub fn pignore() -> TcPattern {
    pattern(PatternKind::Ignore)
}

pub fn plit(lit: Literal) -> TcPattern {
    pattern(PatternKind::Literal(lit))
}

pub fn pint(value: i64) -> TcPattern {
    plit(Literal::Int(BigInt::from(value)))
}

pub fn pexpr(expr: TcExpr) -> TcPattern {
    pattern(PatternKind::Expression(boxed(expr)))
}

pub fn ptuple(items: Vec<TcPattern>) -> TcPattern {
    pattern(PatternKind::Tuple(items))
}

pub fn precord(record: &str, fields: Vec<TcPattern>) -> TcPattern {
    pattern(PatternKind::Record {
        record: Name::simple(record),
        fields,
    })
}

pub fn pset(items: Vec<TcPattern>) -> TcPattern {
    pattern(PatternKind::Set(items))
}

pub fn pseq(items: Vec<TcPattern>) -> TcPattern {
    pattern(PatternKind::Seq(items))
}

pub fn punion(left: TcPattern, right: TcPattern) -> TcPattern {
    pattern(PatternKind::Union(Box::new(left), Box::new(right)))
}

pub fn pconcat(left: TcPattern, right: TcPattern) -> TcPattern {
    pattern(PatternKind::Concat(Box::new(left), Box::new(right)))
}

pub fn pmap(maplets: Vec<(TcPattern, TcPattern)>) -> TcPattern {
    pattern(PatternKind::Map(maplets))
}

pub fn pmunion(left: TcPattern, right: TcPattern) -> TcPattern {
    pattern(PatternKind::MapUnion(Box::new(left), Box::new(right)))
}

// Binds

pub fn in_set(pattern: TcPattern, set: TcExpr) -> Bind<Checked> {
    Bind::Set {
        pattern,
        set: boxed(set),
    }
}

pub fn in_seq(pattern: TcPattern, seq: TcExpr) -> Bind<Checked> {
    Bind::Seq {
        pattern,
        seq: boxed(seq),
    }
}

pub fn of_type(pattern: TcPattern, ty: Type) -> Bind<Checked> {
    Bind::Type { pattern, ty }
}

pub fn multi_in_set(patterns: Vec<TcPattern>, set: TcExpr) -> MultipleBind<Checked> {
    MultipleBind::Set {
        patterns,
        set: boxed(set),
    }
}

pub fn multi_in_seq(patterns: Vec<TcPattern>, seq: TcExpr) -> MultipleBind<Checked> {
    MultipleBind::Seq {
        patterns,
        seq: boxed(seq),
    }
}

pub fn multi_of_type(patterns: Vec<TcPattern>, ty: Type) -> MultipleBind<Checked> {
    MultipleBind::Type { patterns, ty }
}

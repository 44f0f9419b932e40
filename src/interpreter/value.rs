//! Runtime values for the evaluator.
//!
//! Every value is immutable once built except [`UpdatableValue`] cells and
//! the member table of an object, which model shared state. Equality and
//! ordering are total so values can key sets and maps directly.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::diagnostics::error_codes::runtime as codes;
use crate::diagnostics::Span;
use crate::syntax::{InExpr, InPattern, Literal};
use crate::typechecker::types::{FunctionType, OperationType, RecordType, Type};

use super::context::Context;
use super::error::{EvalResult, RuntimeError};
use super::numeric::Numeric;
use super::pattern::Bindings;
use super::updatable::UpdatableValue;

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// Result of an inconclusive evaluation
    Undefined,
    /// The value of an optional type
    Nil,
    Bool(bool),
    Numeric(Numeric),
    Char(char),
    /// Quote literal `<NAME>`
    Quote(String),
    /// `mk_token(v)`
    Token(Box<Value>),
    Seq(Vec<Value>),
    Set(BTreeSet<Value>),
    Map(BTreeMap<Value, Value>),
    Tuple(Vec<Value>),
    Record(RecordValue),
    Object(ObjectRef),
    Function(Arc<FunctionValue>),
    Operation(Arc<OperationValue>),
    /// A type parameter bound to an actual type
    Parameter(Type),
    /// Shared mutable state
    Updatable(UpdatableValue),
}

impl Value {
    pub fn int(n: i64) -> Value {
        Value::Numeric(Numeric::from(n))
    }

    pub fn number(n: Numeric) -> Value {
        Value::Numeric(n)
    }

    /// A `seq of char`
    pub fn string(text: &str) -> Value {
        Value::Seq(text.chars().map(Value::Char).collect())
    }

    pub fn quote(name: &str) -> Value {
        Value::Quote(name.to_string())
    }

    pub fn set_of(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Set(items.into_iter().collect())
    }

    pub fn seq_of(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Seq(items.into_iter().collect())
    }

    pub fn map_of(pairs: impl IntoIterator<Item = (Value, Value)>) -> Value {
        Value::Map(pairs.into_iter().collect())
    }

    /// Read through updatable cells
    pub fn deref(&self) -> Value {
        match self {
            Value::Updatable(cell) => cell.get().deref(),
            other => other.clone(),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Short name of the value kind, used in messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Numeric(_) => "number",
            Value::Char(_) => "char",
            Value::Quote(_) => "quote",
            Value::Token(_) => "token",
            Value::Seq(_) => "seq",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Tuple(_) => "tuple",
            Value::Record(_) => "record",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Operation(_) => "operation",
            Value::Parameter(_) => "type parameter",
            Value::Updatable(_) => "updatable",
        }
    }

    pub fn as_bool(&self) -> EvalResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(RuntimeError::expected(codes::EXPECTED_BOOL, "a boolean", other)),
        }
    }

    pub fn as_numeric(&self) -> EvalResult<&Numeric> {
        match self {
            Value::Numeric(n) => Ok(n),
            other => Err(RuntimeError::expected(codes::EXPECTED_NUMERIC, "a number", other)),
        }
    }

    /// A natural number small enough to count with
    pub fn as_count(&self) -> EvalResult<u64> {
        let n = self.as_numeric()?;
        match n.to_i64().and_then(|v| u64::try_from(v).ok()) {
            Some(count) => Ok(count),
            None if n.is_integral() && !n.is_negative() => Err(RuntimeError::new(
                codes::NUMERIC_TROUBLE,
                format!("{} is too large", n),
            )),
            None => Err(RuntimeError::expected(codes::EXPECTED_NATURAL, "a natural number", n)),
        }
    }

    pub fn as_char(&self) -> EvalResult<char> {
        match self {
            Value::Char(c) => Ok(*c),
            other => Err(RuntimeError::expected(codes::EXPECTED_CHAR, "a character", other)),
        }
    }

    pub fn as_set(&self) -> EvalResult<&BTreeSet<Value>> {
        match self {
            Value::Set(items) => Ok(items),
            other => Err(RuntimeError::expected(codes::EXPECTED_SET, "a set", other)),
        }
    }

    pub fn as_seq(&self) -> EvalResult<&[Value]> {
        match self {
            Value::Seq(items) => Ok(items),
            other => Err(RuntimeError::expected(codes::EXPECTED_SEQ, "a sequence", other)),
        }
    }

    pub fn as_map(&self) -> EvalResult<&BTreeMap<Value, Value>> {
        match self {
            Value::Map(map) => Ok(map),
            other => Err(RuntimeError::expected(codes::EXPECTED_MAP, "a map", other)),
        }
    }

    pub fn as_tuple(&self) -> EvalResult<&[Value]> {
        match self {
            Value::Tuple(items) => Ok(items),
            other => Err(RuntimeError::expected(codes::EXPECTED_TUPLE, "a tuple", other)),
        }
    }

    pub fn as_record(&self) -> EvalResult<&RecordValue> {
        match self {
            Value::Record(record) => Ok(record),
            other => Err(RuntimeError::expected(codes::EXPECTED_RECORD, "a record", other)),
        }
    }

    pub fn as_object(&self) -> EvalResult<&ObjectRef> {
        match self {
            Value::Object(object) => Ok(object),
            other => Err(RuntimeError::expected(codes::EXPECTED_OBJECT, "an object", other)),
        }
    }

    /// Position in the cross-kind ordering
    fn rank(&self) -> u8 {
        match self {
            Value::Undefined => 0,
            Value::Nil => 1,
            Value::Bool(_) => 2,
            Value::Numeric(_) => 3,
            Value::Char(_) => 4,
            Value::Quote(_) => 5,
            Value::Token(_) => 6,
            Value::Seq(_) => 7,
            Value::Set(_) => 8,
            Value::Map(_) => 9,
            Value::Tuple(_) => 10,
            Value::Record(_) => 11,
            Value::Object(_) => 12,
            Value::Function(_) => 13,
            Value::Operation(_) => 14,
            Value::Parameter(_) => 15,
            Value::Updatable(_) => 16,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(n) => Value::Numeric(Numeric::from_bigint(n.clone())),
            Literal::Real(r) => Value::Numeric(Numeric::from_rational(r.clone())),
            Literal::Char(c) => Value::Char(*c),
            Literal::Quote(q) => Value::Quote(q.clone()),
            Literal::Text(s) => Value::string(s),
            Literal::Nil => Value::Nil,
        }
    }
}

impl From<Numeric> for Value {
    fn from(n: Numeric) -> Self {
        Value::Numeric(n)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Updatable(cell), _) => cell.get().cmp(other),
            (_, Value::Updatable(cell)) => self.cmp(&cell.get()),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Numeric(a), Value::Numeric(b)) => a.cmp(b),
            (Value::Char(a), Value::Char(b)) => a.cmp(b),
            (Value::Quote(a), Value::Quote(b)) => a.cmp(b),
            (Value::Token(a), Value::Token(b)) => a.cmp(b),
            (Value::Seq(a), Value::Seq(b)) | (Value::Tuple(a), Value::Tuple(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            (Value::Record(a), Value::Record(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.id.cmp(&b.id),
            (Value::Function(a), Value::Function(b)) => Arc::as_ptr(a).cmp(&Arc::as_ptr(b)),
            (Value::Operation(a), Value::Operation(b)) => Arc::as_ptr(a).cmp(&Arc::as_ptr(b)),
            (Value::Parameter(a), Value::Parameter(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Numeric(n) => write!(f, "{}", n),
            Value::Char(c) => write!(f, "'{}'", c),
            Value::Quote(q) => write!(f, "<{}>", q),
            Value::Token(inner) => write!(f, "mk_token({})", inner),
            Value::Seq(items) if !items.is_empty() && items.iter().all(|v| matches!(v, Value::Char(_))) => {
                write!(f, "\"")?;
                for item in items {
                    if let Value::Char(c) = item {
                        write!(f, "{}", c)?;
                    }
                }
                write!(f, "\"")
            }
            Value::Seq(items) => write_list(f, "[", items.iter(), "]"),
            Value::Set(items) => write_list(f, "{", items.iter(), "}"),
            Value::Map(map) if map.is_empty() => write!(f, "{{|->}}"),
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} |-> {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Tuple(items) => write_list(f, "mk_(", items.iter(), ")"),
            Value::Record(record) => {
                write_list(f, &format!("mk_{}(", record.ty.name), record.fields.iter(), ")")
            }
            Value::Object(object) => write!(f, "{}{{#{}}}", object.class, object.id),
            Value::Function(func) => write!(f, "function {}: {}", func.name, Type::Function(func.ty.clone())),
            Value::Operation(op) => write!(f, "operation {}", op.name),
            Value::Parameter(ty) => write!(f, "@{}", ty),
            Value::Updatable(cell) => write!(f, "{}", cell.get()),
        }
    }
}

fn write_list<'a>(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    items: impl Iterator<Item = &'a Value>,
    close: &str,
) -> fmt::Result {
    write!(f, "{}", open)?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "{}", close)
}

/// A record value; fields follow the declaration order of its type
#[derive(Debug, Clone)]
pub struct RecordValue {
    pub ty: Arc<RecordType>,
    pub fields: Vec<Value>,
}

impl RecordValue {
    pub fn new(ty: Arc<RecordType>, fields: Vec<Value>) -> Self {
        Self { ty, fields }
    }

    pub fn field(&self, tag: &str) -> Option<&Value> {
        self.ty.field_index(tag).and_then(|i| self.fields.get(i))
    }
}

impl PartialEq for RecordValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RecordValue {}

impl PartialOrd for RecordValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordValue {
    /// Fields marked for equality abstraction (`-:`) take no part
    fn cmp(&self, other: &Self) -> Ordering {
        self.ty.name.cmp(&other.ty.name).then_with(|| {
            for (i, field) in self.ty.fields.iter().enumerate() {
                if field.eq_abstraction {
                    continue;
                }
                let order = self.fields.get(i).cmp(&other.fields.get(i));
                if order != Ordering::Equal {
                    return order;
                }
            }
            Ordering::Equal
        })
    }
}

/// Shared handle to an object
pub type ObjectRef = Arc<ObjectValue>;

/// Per-operation history counters of an object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryCounters {
    pub req: u64,
    pub act: u64,
    pub fin: u64,
}

impl HistoryCounters {
    pub fn active(&self) -> u64 {
        self.act.saturating_sub(self.fin)
    }

    pub fn waiting(&self) -> u64 {
        self.req.saturating_sub(self.act)
    }
}

/// A class instance.
///
/// Super-objects are the instances of the direct superclasses; together
/// they form the inheritance DAG walked by member lookup and the class tests.
#[derive(Debug)]
pub struct ObjectValue {
    pub id: u64,
    pub class: String,
    pub supers: Vec<ObjectRef>,
    members: RwLock<BTreeMap<String, Value>>,
    history: Mutex<HashMap<String, HistoryCounters>>,
}

impl ObjectValue {
    pub fn new(
        class: impl Into<String>,
        supers: Vec<ObjectRef>,
        members: impl IntoIterator<Item = (String, Value)>,
    ) -> ObjectRef {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Arc::new(ObjectValue {
            id: NEXT_ID.fetch_add(1, AtomicOrdering::Relaxed),
            class: class.into(),
            supers,
            members: RwLock::new(members.into_iter().collect()),
            history: Mutex::new(HashMap::new()),
        })
    }

    /// Look a member up here, then in the super-objects depth first
    pub fn member(&self, name: &str) -> Option<Value> {
        let own = self
            .members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        own.or_else(|| self.supers.iter().find_map(|s| s.member(name)))
    }

    /// Update a member where it is declared; undeclared names are added here
    pub fn set_member(&self, name: &str, value: Value) {
        if !self.declares(name) {
            if let Some(owner) = self.supers.iter().find(|s| s.has_member(name)) {
                owner.set_member(name, value);
                return;
            }
        }
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value);
    }

    fn declares(&self, name: &str) -> bool {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.declares(name) || self.supers.iter().any(|s| s.has_member(name))
    }

    /// All visible members; a subclass member hides a superclass one
    pub fn members_snapshot(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for sup in self.supers.iter().rev() {
            out.extend(sup.members_snapshot());
        }
        out.extend(
            self.members
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        out
    }

    /// `isofclass`: this class or any class above it in the DAG
    pub fn is_of_class(&self, class: &str) -> bool {
        self.class == class || self.supers.iter().any(|s| s.is_of_class(class))
    }

    /// Classes at the roots of the inheritance DAG
    pub fn base_classes(&self) -> BTreeSet<String> {
        if self.supers.is_empty() {
            return BTreeSet::from([self.class.clone()]);
        }
        self.supers.iter().flat_map(|s| s.base_classes()).collect()
    }

    pub fn history(&self, operation: &str) -> HistoryCounters {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation)
            .copied()
            .unwrap_or_default()
    }

    fn bump(&self, operation: &str, update: impl FnOnce(&mut HistoryCounters)) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        update(history.entry(operation.to_string()).or_default());
    }

    pub fn record_request(&self, operation: &str) {
        self.bump(operation, |h| h.req += 1);
    }

    pub fn record_activation(&self, operation: &str) {
        self.bump(operation, |h| h.act += 1);
    }

    pub fn record_finish(&self, operation: &str) {
        self.bump(operation, |h| h.fin += 1);
    }
}

/// What a function value does when applied
#[derive(Debug, Clone)]
pub enum FunctionBody {
    Expr(Arc<InExpr>),
    /// `f ** n`, applied lazily
    Iterate { function: Arc<FunctionValue>, times: u64 },
    /// `outer comp inner`
    Compose {
        outer: Arc<FunctionValue>,
        inner: Arc<FunctionValue>,
    },
}

/// A function closure
#[derive(Debug, Clone)]
pub struct FunctionValue {
    pub name: String,
    pub ty: FunctionType,
    /// One parameter list per curried application
    pub params: Vec<Vec<InPattern>>,
    pub body: FunctionBody,
    pub precondition: Option<Arc<InExpr>>,
    pub postcondition: Option<Arc<InExpr>>,
    /// Variables captured where the closure was made
    pub free: Bindings,
    pub self_obj: Option<ObjectRef>,
    pub type_params: Vec<String>,
    pub type_bindings: BTreeMap<String, Type>,
    pub span: Span,
}

impl FunctionValue {
    pub fn new(
        name: impl Into<String>,
        ty: FunctionType,
        params: Vec<InPattern>,
        body: impl Into<Arc<InExpr>>,
    ) -> Self {
        let body = body.into();
        let span = body.span.clone();
        Self {
            name: name.into(),
            ty,
            params: vec![params],
            body: FunctionBody::Expr(body),
            precondition: None,
            postcondition: None,
            free: Bindings::new(),
            self_obj: None,
            type_params: Vec::new(),
            type_bindings: BTreeMap::new(),
            span,
        }
    }

    /// Add a further curried parameter list
    pub fn curried(mut self, params: Vec<InPattern>) -> Self {
        self.params.push(params);
        self
    }

    pub fn with_precondition(mut self, pre: InExpr) -> Self {
        self.precondition = Some(Arc::new(pre));
        self
    }

    pub fn with_postcondition(mut self, post: InExpr) -> Self {
        self.postcondition = Some(Arc::new(post));
        self
    }

    pub fn with_type_params(mut self, params: &[&str]) -> Self {
        self.type_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_free(mut self, free: Bindings) -> Self {
        self.free = free;
        self
    }

    pub fn with_self(mut self, object: ObjectRef) -> Self {
        self.self_obj = Some(object);
        self
    }

    /// Polymorphic and not yet instantiated
    pub fn is_polymorphic(&self) -> bool {
        !self.type_params.is_empty() && self.type_bindings.is_empty()
    }

    /// `function ** times`
    pub fn iterate(function: Arc<FunctionValue>, times: u64) -> Self {
        Self {
            name: format!("{} ** {}", function.name, times),
            ty: function.ty.clone(),
            params: Vec::new(),
            precondition: None,
            postcondition: None,
            free: Bindings::new(),
            self_obj: None,
            type_params: Vec::new(),
            type_bindings: BTreeMap::new(),
            span: function.span.clone(),
            body: FunctionBody::Iterate { function, times },
        }
    }

    /// `outer comp inner`
    pub fn compose(outer: Arc<FunctionValue>, inner: Arc<FunctionValue>) -> Self {
        Self {
            name: format!("{} comp {}", outer.name, inner.name),
            ty: FunctionType {
                params: inner.ty.params.clone(),
                result: outer.ty.result.clone(),
                partial: outer.ty.partial || inner.ty.partial,
            },
            params: Vec::new(),
            precondition: None,
            postcondition: None,
            free: Bindings::new(),
            self_obj: None,
            type_params: Vec::new(),
            type_bindings: BTreeMap::new(),
            span: outer.span.clone(),
            body: FunctionBody::Compose { outer, inner },
        }
    }
}

/// The statement part of an operation, supplied by the statement layer
pub trait OperationBody: Send + Sync + fmt::Debug {
    /// Run the body; parameters are already bound in `ctx`
    fn execute(&self, ctx: &Context<'_>) -> EvalResult<Value>;
}

/// An operation closure
#[derive(Debug, Clone)]
pub struct OperationValue {
    pub name: String,
    pub ty: OperationType,
    pub params: Vec<InPattern>,
    pub body: Arc<dyn OperationBody>,
    pub precondition: Option<Arc<InExpr>>,
    pub postcondition: Option<Arc<InExpr>>,
    pub self_obj: Option<ObjectRef>,
    pub span: Span,
}

impl OperationValue {
    pub fn new(
        name: impl Into<String>,
        ty: OperationType,
        params: Vec<InPattern>,
        body: Arc<dyn OperationBody>,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            params,
            body,
            precondition: None,
            postcondition: None,
            self_obj: None,
            span: Span::default(),
        }
    }

    pub fn with_precondition(mut self, pre: InExpr) -> Self {
        self.precondition = Some(Arc::new(pre));
        self
    }

    pub fn with_postcondition(mut self, post: InExpr) -> Self {
        self.postcondition = Some(Arc::new(post));
        self
    }

    pub fn with_self(mut self, object: ObjectRef) -> Self {
        self.self_obj = Some(object);
        self
    }
}

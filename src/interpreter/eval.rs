//! Evaluation of runtime expression trees.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::warn;

use crate::diagnostics::error_codes::runtime as codes;
use crate::settings::UndefinedLogic;
use crate::syntax::{
    BinaryOp, Bind, CaseAlternative, ErrorCase, ExprKind, HistoryOp, InExpr, LocalDef, MultipleBind,
    Runtime, TypedParam, UnaryOp,
};
use crate::typechecker::types::{FunctionType, Type};

use super::apply;
use super::context::Context;
use super::convert::{check_invariant, convert_to, is_of_type, type_extent};
use super::error::{EvalResult, MatchError, RuntimeError};
use super::numeric::Numeric;
use super::ops;
use super::quantifier::{self, accepts, search, Outcome, Quantifier, QuantifierList, Step};
use super::updatable::UpdatableValue;
use super::value::{FunctionValue, RecordValue, Value};

impl InExpr {
    /// Evaluate this node.
    ///
    /// Hooks run before the node; a failure raised below carries the span
    /// of the innermost node that saw it.
    pub fn eval(&self, ctx: &Context<'_>) -> EvalResult<Value> {
        ctx.observe(&self.span);
        self.eval_kind(ctx).map_err(|err| err.with_span(self.span.clone()))
    }

    /// The updatable cells this expression reads, without evaluating it.
    ///
    /// Discovery runs inside an atomic section so that no listener fires.
    pub fn updatable_reads(&self, ctx: &Context<'_>) -> Vec<UpdatableValue> {
        let _atomic = ctx.thread().begin_atomic();
        let mut seen = BTreeSet::new();
        let mut cells = Vec::new();
        for name in self.variable_names() {
            if let Some(Value::Updatable(cell)) = ctx.lookup(&name) {
                if seen.insert(cell.id()) {
                    cells.push(cell);
                }
            }
        }
        cells
    }

    fn eval_kind(&self, ctx: &Context<'_>) -> EvalResult<Value> {
        match &self.kind {
            ExprKind::Literal(lit) => Ok(Value::from(lit)),
            ExprKind::Undefined => Ok(Value::Undefined),
            ExprKind::Variable { name, old: true } => ctx
                .lookup_old(&name.ident)
                .ok_or_else(|| RuntimeError::name_not_found(&format!("{}~", name))),
            ExprKind::Variable { name, old: false } => ctx
                .lookup_name(name)
                .map(|v| v.deref())
                .ok_or_else(|| RuntimeError::name_not_found(&name.to_string())),
            ExprKind::SelfRef => ctx
                .self_object()
                .map(Value::Object)
                .ok_or_else(|| RuntimeError::new(codes::NO_SELF, "No object for self")),
            ExprKind::ThreadId => Ok(Value::int(i64::try_from(ctx.thread().id).unwrap_or(i64::MAX))),
            ExprKind::Time => Ok(Value::int(
                i64::try_from(ctx.thread().clock().time()).unwrap_or(i64::MAX),
            )),
            ExprKind::NotYetSpecified => Err(RuntimeError::new(
                codes::NOT_YET_SPECIFIED,
                "Body is not yet specified",
            )),

            ExprKind::Unary { op: UnaryOp::Not, operand } => {
                let value = operand.eval(ctx)?;
                match truth(operand, &value, ctx)? {
                    Some(b) => Ok(Value::Bool(!b)),
                    None => Ok(Value::Undefined),
                }
            }
            ExprKind::Unary { op, operand } => ops::unary(*op, &operand.eval(ctx)?),
            ExprKind::Binary { op, left, right } => eval_binary(*op, left, right, ctx),

            ExprKind::If {
                condition,
                then_branch,
                elseifs,
                else_branch,
            } => {
                if condition.eval(ctx)?.as_bool()? {
                    return then_branch.eval(ctx);
                }
                for (cond, branch) in elseifs {
                    if cond.eval(ctx)?.as_bool()? {
                        return branch.eval(ctx);
                    }
                }
                else_branch.eval(ctx)
            }
            ExprKind::Cases {
                scrutinee,
                alternatives,
                others,
            } => eval_cases(&scrutinee.eval(ctx)?, alternatives, others.as_deref(), ctx),
            ExprKind::Let { defs, body } => eval_local_defs("let", defs, body, ctx),
            ExprKind::Def { defs, body } => eval_local_defs("def", defs, body, ctx),
            ExprKind::LetBeSt { bind, filter, body } => {
                eval_let_be_st(bind, filter.as_deref(), body, ctx)
            }

            ExprKind::Forall { binds, predicate } => {
                Ok(quantifier::forall(binds, predicate, ctx)?.into_value())
            }
            ExprKind::Exists { binds, predicate } => {
                Ok(quantifier::exists(binds, predicate, ctx)?.into_value())
            }
            ExprKind::Exists1 { bind, predicate } => {
                Ok(quantifier::exists1(bind, predicate, ctx)?.into_value())
            }
            ExprKind::Iota { bind, predicate } => quantifier::iota(bind, predicate, ctx),
            ExprKind::Lambda { params, body } => Ok(make_lambda(&self.info, params, body, ctx)),

            ExprKind::SetEnum(items) => Ok(Value::Set(
                items.iter().map(|e| e.eval(ctx)).collect::<EvalResult<BTreeSet<_>>>()?,
            )),
            ExprKind::SetRange { first, last } => {
                let first = first.eval(ctx)?.as_numeric()?.ceil();
                let last = last.eval(ctx)?.as_numeric()?.floor();
                let one = Numeric::from(1);
                let mut out = BTreeSet::new();
                let mut current = first;
                while current <= last {
                    let next = current.plus(&one);
                    out.insert(Value::Numeric(current));
                    current = next;
                }
                Ok(Value::Set(out))
            }
            ExprKind::SetComp {
                element,
                binds,
                predicate,
            } => {
                let list = QuantifierList::from_binds(binds, ctx)?;
                let mut out = BTreeSet::new();
                let outcome = search(list, ctx, "set comprehension", |_, scope| {
                    if accepts(predicate.as_deref(), scope)? {
                        out.insert(element.eval(scope)?);
                    }
                    Ok(Step::Continue)
                })?;
                Ok(comprehension_result(outcome, Value::Set(out)))
            }

            ExprKind::SeqEnum(items) => Ok(Value::Seq(
                items.iter().map(|e| e.eval(ctx)).collect::<EvalResult<Vec<_>>>()?,
            )),
            ExprKind::SeqComp {
                element,
                bind,
                predicate,
            } => eval_seq_comp(element, bind, predicate.as_deref(), ctx),
            ExprKind::Subseq { seq, from, to } => {
                let seq = seq.eval(ctx)?;
                let items = seq.as_seq()?;
                let from = from.eval(ctx)?.as_numeric()?.ceil();
                let to = to.eval(ctx)?.as_numeric()?.floor();
                let start = if from.is_negative() || from.is_zero() {
                    1
                } else {
                    from.to_usize().unwrap_or(usize::MAX)
                };
                let end = if to.is_negative() {
                    0
                } else {
                    to.to_usize().unwrap_or(usize::MAX).min(items.len())
                };
                if start > end {
                    return Ok(Value::Seq(Vec::new()));
                }
                Ok(Value::Seq(items[start - 1..end].to_vec()))
            }

            ExprKind::MapEnum(maplets) => {
                let mut out = BTreeMap::new();
                for maplet in maplets {
                    let key = maplet.key.eval(ctx)?;
                    let value = maplet.value.eval(ctx)?;
                    insert_maplet(&mut out, key, value)?;
                }
                Ok(Value::Map(out))
            }
            ExprKind::MapComp {
                maplet,
                binds,
                predicate,
            } => {
                let list = QuantifierList::from_binds(binds, ctx)?;
                let mut out = BTreeMap::new();
                let outcome = search(list, ctx, "map comprehension", |_, scope| {
                    if accepts(predicate.as_deref(), scope)? {
                        let key = maplet.key.eval(scope)?;
                        let value = maplet.value.eval(scope)?;
                        insert_maplet(&mut out, key, value)?;
                    }
                    Ok(Step::Continue)
                })?;
                Ok(comprehension_result(outcome, Value::Map(out)))
            }

            ExprKind::Tuple(items) => Ok(Value::Tuple(
                items.iter().map(|e| e.eval(ctx)).collect::<EvalResult<Vec<_>>>()?,
            )),
            ExprKind::MkRecord { record, args } => {
                let record_type = match self.info.record_branches().first() {
                    Some(rt) => Arc::clone(rt),
                    None => {
                        return Err(RuntimeError::new(
                            codes::EXPECTED_RECORD,
                            format!("mk_{} has no record type", record),
                        ))
                    }
                };
                let fields = args.iter().map(|e| e.eval(ctx)).collect::<EvalResult<Vec<_>>>()?;
                if fields.len() != record_type.fields.len() {
                    return Err(RuntimeError::arity_mismatch(record_type.fields.len(), fields.len()));
                }
                let value = Value::Record(RecordValue::new(Arc::clone(&record_type), fields));
                checked_record(value, &Type::Record(record_type), ctx)
            }
            ExprKind::MkToken(inner) => Ok(Value::Token(Box::new(inner.eval(ctx)?))),
            ExprKind::Mu {
                record,
                modifications,
            } => {
                let value = record.eval(ctx)?;
                let original = value.as_record()?;
                let mut fields = original.fields.clone();
                for (tag, expr) in modifications {
                    let index = original.ty.field_index(tag).ok_or_else(|| {
                        RuntimeError::new(
                            codes::FIELD_NOT_FOUND,
                            format!("Record {} has no field {}", original.ty.name, tag),
                        )
                    })?;
                    fields[index] = expr.eval(ctx)?;
                }
                let updated = Value::Record(RecordValue::new(Arc::clone(&original.ty), fields));
                checked_record(updated, &Type::Record(Arc::clone(&original.ty)), ctx)
            }
            ExprKind::Field { object, field } => match object.eval(ctx)? {
                Value::Record(record) => record.field(field).cloned().ok_or_else(|| {
                    RuntimeError::new(
                        codes::FIELD_NOT_FOUND,
                        format!("Record {} has no field {}", record.ty.name, field),
                    )
                }),
                Value::Object(obj) => obj.member(field).map(|v| v.deref()).ok_or_else(|| {
                    RuntimeError::new(
                        codes::MEMBER_NOT_FOUND,
                        format!("Object of class {} has no member {}", obj.class, field),
                    )
                }),
                other => Err(RuntimeError::expected(codes::EXPECTED_RECORD, "a record or object", &other)),
            },
            ExprKind::FieldNumber { tuple, index } => {
                let value = tuple.eval(ctx)?;
                let items = match &value {
                    Value::Record(record) => record.fields.as_slice(),
                    other => other.as_tuple()?,
                };
                index
                    .checked_sub(1)
                    .and_then(|i| items.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        RuntimeError::new(
                            codes::TUPLE_INDEX,
                            format!("Tuple selector #{} out of range for {}", index, value),
                        )
                    })
            }

            ExprKind::Apply { callee, args } => {
                let callee = callee.eval(ctx)?;
                let args = args.iter().map(|e| e.eval(ctx)).collect::<EvalResult<Vec<_>>>()?;
                apply::apply(&callee, args, ctx)
            }
            ExprKind::Instantiate { function, actuals } => match function.eval(ctx)? {
                Value::Function(f) => {
                    let actuals = actuals.iter().map(|t| resolve_params(t, ctx)).collect();
                    apply::instantiate(&f, actuals)
                }
                other => Err(RuntimeError::expected(codes::EXPECTED_FUNCTION, "a polymorphic function", &other)),
            },

            ExprKind::Is { ty, operand } => {
                let ty = resolve_params(ty, ctx);
                let outcome = operand
                    .eval(ctx)
                    .and_then(|value| is_of_type(&value, &ty, ctx));
                match outcome {
                    Ok(b) => Ok(Value::Bool(b)),
                    Err(err) if err.is_invariant_failure() => Err(err),
                    Err(_) => Ok(Value::Bool(false)),
                }
            }
            ExprKind::Narrow { ty, operand } => {
                let value = operand.eval(ctx)?;
                let ty = resolve_params(ty, ctx);
                match convert_to(&value, &ty, ctx) {
                    Ok(converted) => Ok(converted),
                    Err(err) if err.is_invariant_failure() => Err(err),
                    Err(err) => {
                        warn!(code = err.code, span = %self.span, "narrow_ failed: {}", err.message);
                        Ok(value)
                    }
                }
            }
            ExprKind::IsOfClass { class, operand } => Ok(Value::Bool(match operand.eval(ctx)? {
                Value::Object(obj) => obj.is_of_class(class),
                _ => false,
            })),
            ExprKind::IsOfBaseClass { class, operand } => Ok(Value::Bool(match operand.eval(ctx)? {
                Value::Object(obj) => obj.is_of_class(class) && obj.base_classes().contains(class),
                _ => false,
            })),
            ExprKind::SameClass { left, right } => Ok(Value::Bool(
                match (left.eval(ctx)?, right.eval(ctx)?) {
                    (Value::Object(a), Value::Object(b)) => a.class == b.class,
                    _ => false,
                },
            )),
            ExprKind::SameBaseClass { left, right } => Ok(Value::Bool(
                match (left.eval(ctx)?, right.eval(ctx)?) {
                    (Value::Object(a), Value::Object(b)) => {
                        !a.base_classes().is_disjoint(&b.base_classes())
                    }
                    _ => false,
                },
            )),

            ExprKind::Pre { function, args } => {
                let callee = function.eval(ctx)?;
                let args = args.iter().map(|e| e.eval(ctx)).collect::<EvalResult<Vec<_>>>()?;
                apply::precondition_holds(&callee, args, ctx)
            }
            ExprKind::PreOp { condition, errors } => {
                if condition.eval(ctx)?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                for case in errors {
                    if case.left.eval(ctx)?.as_bool()? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            ExprKind::PostOp { condition, errors } => {
                if condition.eval(ctx)?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(error_case_applies(errors, ctx)?))
            }
            ExprKind::History { op, operations } => {
                let obj = ctx
                    .self_object()
                    .ok_or_else(|| RuntimeError::new(codes::NO_SELF, "History counters need an object"))?;
                let total: u64 = operations
                    .iter()
                    .map(|name| {
                        let counters = obj.history(name);
                        match op {
                            HistoryOp::Req => counters.req,
                            HistoryOp::Act => counters.act,
                            HistoryOp::Fin => counters.fin,
                            HistoryOp::Active => counters.active(),
                            HistoryOp::Waiting => counters.waiting(),
                        }
                    })
                    .sum();
                Ok(Value::int(i64::try_from(total).unwrap_or(i64::MAX)))
            }
        }
    }
}

/// The truth value of a connective operand; `None` for a tolerated undefined
fn truth(expr: &InExpr, value: &Value, ctx: &Context<'_>) -> EvalResult<Option<bool>> {
    match value {
        Value::Bool(b) => Ok(Some(*b)),
        Value::Undefined => match ctx.settings().undefined_logic {
            UndefinedLogic::ThreeValued => Ok(None),
            UndefinedLogic::LiteralOnly if matches!(expr.kind, ExprKind::Undefined) => Ok(None),
            UndefinedLogic::LiteralOnly => Err(RuntimeError::new(
                codes::UNDEFINED_VALUE,
                "Operand evaluated to undefined",
            )),
        },
        other => Err(RuntimeError::expected(codes::EXPECTED_BOOL, "a boolean", other)),
    }
}

fn from_truth(t: Option<bool>) -> Value {
    t.map_or(Value::Undefined, Value::Bool)
}

fn eval_binary(op: BinaryOp, left: &InExpr, right: &InExpr, ctx: &Context<'_>) -> EvalResult<Value> {
    let l = left.eval(ctx)?;
    match op {
        BinaryOp::And => match truth(left, &l, ctx)? {
            Some(false) => Ok(Value::Bool(false)),
            Some(true) => {
                let r = right.eval(ctx)?;
                Ok(from_truth(truth(right, &r, ctx)?))
            }
            None => {
                let r = right.eval(ctx)?;
                Ok(match truth(right, &r, ctx)? {
                    Some(false) => Value::Bool(false),
                    _ => Value::Undefined,
                })
            }
        },
        BinaryOp::Or => match truth(left, &l, ctx)? {
            Some(true) => Ok(Value::Bool(true)),
            Some(false) => {
                let r = right.eval(ctx)?;
                Ok(from_truth(truth(right, &r, ctx)?))
            }
            None => {
                let r = right.eval(ctx)?;
                Ok(match truth(right, &r, ctx)? {
                    Some(true) => Value::Bool(true),
                    _ => Value::Undefined,
                })
            }
        },
        BinaryOp::Implies => match truth(left, &l, ctx)? {
            Some(false) => Ok(Value::Bool(true)),
            Some(true) => {
                let r = right.eval(ctx)?;
                Ok(from_truth(truth(right, &r, ctx)?))
            }
            None => {
                let r = right.eval(ctx)?;
                Ok(match truth(right, &r, ctx)? {
                    Some(true) => Value::Bool(true),
                    _ => Value::Undefined,
                })
            }
        },
        BinaryOp::Equiv => {
            let r = right.eval(ctx)?;
            match (truth(left, &l, ctx)?, truth(right, &r, ctx)?) {
                (Some(a), Some(b)) => Ok(Value::Bool(a == b)),
                _ => Ok(Value::Undefined),
            }
        }
        _ => {
            let r = right.eval(ctx)?;
            ops::binary(op, &l, &r)
        }
    }
}

fn eval_cases(
    value: &Value,
    alternatives: &[CaseAlternative<Runtime>],
    others: Option<&InExpr>,
    ctx: &Context<'_>,
) -> EvalResult<Value> {
    for alternative in alternatives {
        for pattern in &alternative.patterns {
            let matches = pattern.match_all(value, ctx).map_err(MatchError::into_runtime)?;
            if let Some(bindings) = matches.into_iter().next() {
                let mut scope = ctx.child("cases");
                scope.define_all(bindings);
                return alternative.result.eval(&scope);
            }
        }
    }
    match others {
        Some(others) => others.eval(ctx),
        None => Err(RuntimeError::new(
            codes::NO_CASE_APPLIES,
            format!("No cases apply for {}", value),
        )),
    }
}

/// `let` and `def`: definitions are evaluated in order, each seeing the
/// ones before it
fn eval_local_defs(title: &str, defs: &[LocalDef<Runtime>], body: &InExpr, ctx: &Context<'_>) -> EvalResult<Value> {
    let mut scope = ctx.child(title);
    for def in defs {
        let mut value = def.value.eval(&scope)?;
        if let Some(ty) = &def.ty {
            if scope.settings().dynamic_type_checks {
                value = convert_to(&value, ty, &scope)?;
            }
        }
        let bindings = def
            .pattern
            .match_value(&value, &scope)
            .map_err(|err| err.into_runtime().with_span(def.span.clone()))?;
        scope.define_all(bindings);
    }
    body.eval(&scope)
}

fn eval_let_be_st(
    bind: &MultipleBind<Runtime>,
    filter: Option<&InExpr>,
    body: &InExpr,
    ctx: &Context<'_>,
) -> EvalResult<Value> {
    let list = QuantifierList::from_binds(std::slice::from_ref(bind), ctx)?;
    let mut result = None;
    let outcome = search(list, ctx, "let be st", |_, scope| {
        if accepts(filter, scope)? {
            result = Some(body.eval(scope)?);
            return Ok(Step::Stop);
        }
        Ok(Step::Continue)
    })?;
    match (result, outcome) {
        (Some(value), _) => Ok(value),
        (None, Outcome::TimedOut(_)) => Ok(Value::Undefined),
        (None, _) => Err(RuntimeError::new(
            codes::LET_BE_ST_NO_MATCH,
            "Let be st found no applicable bindings",
        )),
    }
}

/// Sequence comprehension. A set bind enumerates in ascending numeric
/// order, so its values must all be numbers.
fn eval_seq_comp(element: &InExpr, bind: &Bind<Runtime>, predicate: Option<&InExpr>, ctx: &Context<'_>) -> EvalResult<Value> {
    let values = match bind {
        Bind::Seq { seq, .. } => seq.eval(ctx)?.as_seq()?.to_vec(),
        Bind::Set { set, .. } => ordered_numbers(set.eval(ctx)?.as_set()?)?,
        Bind::Type { ty, .. } => {
            let extent: BTreeSet<Value> = type_extent(ty, ctx)?.into_iter().collect();
            ordered_numbers(&extent)?
        }
    };
    let list = QuantifierList::new(vec![Quantifier::new(bind.pattern(), &values, ctx)?]);
    let mut out = Vec::new();
    let outcome = search(list, ctx, "seq comprehension", |_, scope| {
        if accepts(predicate, scope)? {
            out.push(element.eval(scope)?);
        }
        Ok(Step::Continue)
    })?;
    Ok(comprehension_result(outcome, Value::Seq(out)))
}

fn ordered_numbers(set: &BTreeSet<Value>) -> EvalResult<Vec<Value>> {
    if let Some(bad) = set.iter().find(|v| !matches!(v, Value::Numeric(_))) {
        return Err(RuntimeError::new(
            codes::SEQ_COMP_NOT_NUMERIC,
            format!("Sequence comprehension over a set needs numeric values, found {}", bad),
        ));
    }
    Ok(set.iter().cloned().collect())
}

/// A timed out comprehension is inconclusive
fn comprehension_result(outcome: Outcome, value: Value) -> Value {
    match outcome {
        Outcome::TimedOut(_) => Value::Undefined,
        _ => value,
    }
}

fn insert_maplet(map: &mut BTreeMap<Value, Value>, key: Value, value: Value) -> EvalResult<()> {
    match map.get(&key) {
        Some(existing) if *existing != value => Err(RuntimeError::new(
            codes::DUPLICATE_MAP_KEY,
            format!("Duplicate map key {} maps to {} and {}", key, existing, value),
        )),
        _ => {
            map.insert(key, value);
            Ok(())
        }
    }
}

/// Convert a freshly built record to its type, or at least check its
/// invariant when dynamic type checks are off
fn checked_record(value: Value, ty: &Type, ctx: &Context<'_>) -> EvalResult<Value> {
    if ctx.settings().dynamic_type_checks {
        convert_to(&value, ty, ctx)
    } else {
        check_invariant(ty, &value, ctx)?;
        Ok(value)
    }
}

fn error_case_applies(errors: &[ErrorCase<Runtime>], ctx: &Context<'_>) -> EvalResult<bool> {
    for case in errors {
        if case.left.eval(ctx)?.as_bool()? && case.right.eval(ctx)?.as_bool()? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn make_lambda(info: &Type, params: &[TypedParam<Runtime>], body: &Arc<InExpr>, ctx: &Context<'_>) -> Value {
    let ty = match info.function_branches().first() {
        Some(ft) => (*ft).clone(),
        None => FunctionType::new(
            params.iter().map(|p| p.ty.clone()).collect(),
            body.info.clone(),
        ),
    };
    let mut function = FunctionValue::new(
        "lambda",
        ty,
        params.iter().map(|p| p.pattern.clone()).collect(),
        Arc::clone(body),
    )
    .with_free(ctx.flatten());
    if let Some(object) = ctx.self_object() {
        function = function.with_self(object);
    }
    Value::Function(Arc::new(function))
}

/// Replace type parameters bound in `ctx` by their actual types
fn resolve_params(ty: &Type, ctx: &Context<'_>) -> Type {
    if !ty.contains_param() {
        return ty.clone();
    }
    let mut names = Vec::new();
    collect_params(ty, &mut names);
    let bindings: HashMap<String, Type> = names
        .into_iter()
        .filter_map(|name| ctx.lookup_type_param(&name).map(|actual| (name, actual)))
        .collect();
    ty.substitute(&bindings)
}

fn collect_params(ty: &Type, out: &mut Vec<String>) {
    match ty {
        Type::Param(name) => out.push(name.clone()),
        Type::Set { elem, .. } | Type::Seq { elem, .. } | Type::Optional(elem) => collect_params(elem, out),
        Type::Map { from, to, .. } => {
            collect_params(from, out);
            collect_params(to, out);
        }
        Type::Product(items) | Type::Union(items) => items.iter().for_each(|t| collect_params(t, out)),
        Type::Function(f) => {
            f.params.iter().for_each(|t| collect_params(t, out));
            collect_params(&f.result, out);
        }
        Type::Operation(o) => {
            o.params.iter().for_each(|t| collect_params(t, out));
            collect_params(&o.result, out);
        }
        _ => {}
    }
}

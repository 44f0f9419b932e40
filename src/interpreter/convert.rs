//! Dynamic type checks: conversion of values to declared types, type
//! membership and enumeration of finite types.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::diagnostics::error_codes::runtime as codes;
use crate::typechecker::types::Type;

use super::apply;
use super::context::Context;
use super::error::{EvalResult, RuntimeError};
use super::numeric::NumericKind;
use super::value::{RecordValue, Value};

/// Largest element type whose powerset is enumerated
const MAX_POWERSET_BASE: usize = 16;

fn conversion_error(value: &Value, ty: &Type) -> RuntimeError {
    RuntimeError::new(
        codes::TYPE_CONVERSION,
        format!("Value {} is not of type {}", value, ty),
    )
}

fn numeric_fits(value: &Value, required: NumericKind) -> bool {
    match value {
        Value::Numeric(n) => n.kind() <= required,
        _ => false,
    }
}

/// Convert `value` to `ty`, checking invariants along the way.
///
/// Collections are rebuilt element by element so that a value produced for
/// a union type ends up with the structure of the branch that accepted it.
pub fn convert_to(value: &Value, ty: &Type, ctx: &Context<'_>) -> EvalResult<Value> {
    let value = value.deref();
    let fits = |ok: bool| if ok { Ok(value.clone()) } else { Err(conversion_error(&value, ty)) };
    match ty {
        Type::Unknown | Type::Unresolved(_) => Ok(value.clone()),
        Type::Param(name) => match ctx.lookup_type_param(name) {
            Some(actual) => convert_to(&value, &actual, ctx),
            None => Ok(value.clone()),
        },
        Type::Bool => fits(matches!(value, Value::Bool(_))),
        Type::NatOne => fits(numeric_fits(&value, NumericKind::NatOne)),
        Type::Nat => fits(numeric_fits(&value, NumericKind::Nat)),
        Type::Int => fits(numeric_fits(&value, NumericKind::Int)),
        Type::Rat | Type::Real => fits(numeric_fits(&value, NumericKind::Real)),
        Type::Char => fits(matches!(value, Value::Char(_))),
        Type::Token => fits(matches!(value, Value::Token(_))),
        Type::Quote(q) => fits(matches!(&value, Value::Quote(v) if v == q)),
        Type::Void => fits(matches!(value, Value::Undefined)),
        Type::Set { elem, non_empty } => match &value {
            Value::Set(items) if !(*non_empty && items.is_empty()) => items
                .iter()
                .map(|item| convert_to(item, elem, ctx))
                .collect::<EvalResult<BTreeSet<_>>>()
                .map(Value::Set),
            _ => Err(conversion_error(&value, ty)),
        },
        Type::Seq { elem, non_empty } => match &value {
            Value::Seq(items) if !(*non_empty && items.is_empty()) => items
                .iter()
                .map(|item| convert_to(item, elem, ctx))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::Seq),
            _ => Err(conversion_error(&value, ty)),
        },
        Type::Map { from, to, injective } => match &value {
            Value::Map(map) => {
                let converted = map
                    .iter()
                    .map(|(k, v)| Ok((convert_to(k, from, ctx)?, convert_to(v, to, ctx)?)))
                    .collect::<EvalResult<BTreeMap<_, _>>>()?;
                if *injective && converted.values().collect::<BTreeSet<_>>().len() != converted.len() {
                    return Err(conversion_error(&value, ty));
                }
                Ok(Value::Map(converted))
            }
            _ => Err(conversion_error(&value, ty)),
        },
        Type::Product(types) => match &value {
            Value::Tuple(items) if items.len() == types.len() => items
                .iter()
                .zip(types)
                .map(|(item, t)| convert_to(item, t, ctx))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::Tuple),
            _ => Err(conversion_error(&value, ty)),
        },
        Type::Record(record) => match &value {
            Value::Record(rec) if rec.ty.name == record.name && rec.fields.len() == record.fields.len() => {
                let fields = rec
                    .fields
                    .iter()
                    .zip(&record.fields)
                    .map(|(v, f)| convert_to(v, &f.ty, ctx))
                    .collect::<EvalResult<Vec<_>>>()?;
                let converted = Value::Record(RecordValue::new(rec.ty.clone(), fields));
                check_invariant(ty, &converted, ctx)?;
                Ok(converted)
            }
            _ => Err(conversion_error(&value, ty)),
        },
        Type::Named(named) => {
            let converted = convert_to(&value, &named.ty, ctx)?;
            check_invariant(ty, &converted, ctx)?;
            Ok(converted)
        }
        Type::Optional(inner) => match value {
            Value::Nil => Ok(Value::Nil),
            _ => convert_to(&value, inner, ctx),
        },
        Type::Union(branches) => {
            let mut invariant_failure = None;
            for branch in branches {
                match convert_to(&value, branch, ctx) {
                    Ok(converted) => return Ok(converted),
                    Err(err) if err.is_invariant_failure() => {
                        invariant_failure.get_or_insert(err);
                    }
                    Err(_) => {}
                }
            }
            Err(invariant_failure.unwrap_or_else(|| conversion_error(&value, ty)))
        }
        Type::Function(_) => fits(matches!(value, Value::Function(_))),
        Type::Operation(_) => fits(matches!(value, Value::Operation(_))),
        Type::Class(class) => fits(matches!(&value, Value::Object(o) if o.is_of_class(class))),
    }
}

/// Run `inv_<name>` for a type carrying an invariant
pub fn check_invariant(ty: &Type, value: &Value, ctx: &Context<'_>) -> EvalResult<()> {
    let Some(name) = ty.invariant_name() else {
        return Ok(());
    };
    if !ctx.settings().inv_checks {
        return Ok(());
    }
    let inv_name = format!("inv_{}", name);
    let Some(Value::Function(inv)) = ctx.lookup(&inv_name) else {
        trace!(name = %inv_name, "no invariant function in scope");
        return Ok(());
    };
    let holds = apply::call_invariant(&inv, value, ctx).map_err(|err| {
        RuntimeError::new(
            codes::INVARIANT_VIOLATION,
            format!("Invariant of {} could not be evaluated for {}", name, value),
        )
        .caused_by(err)
    })?;
    if holds.as_bool()? {
        Ok(())
    } else {
        Err(RuntimeError::new(
            codes::INVARIANT_VIOLATION,
            format!("Invariant violated for {}: {}", name, value),
        ))
    }
}

/// Membership test used by `is_` and type binds.
///
/// A failed conversion means "not of the type"; invariant violations and
/// failures raised while evaluating an invariant still propagate.
pub fn is_of_type(value: &Value, ty: &Type, ctx: &Context<'_>) -> EvalResult<bool> {
    match convert_to(value, ty, ctx) {
        Ok(_) => Ok(true),
        Err(err) if err.is_invariant_failure() => Err(err),
        Err(_) => Ok(false),
    }
}

/// Like [`is_of_type`], but a violated invariant just excludes the value.
/// An invariant that could not be evaluated still fails.
fn satisfies(value: &Value, ty: &Type, ctx: &Context<'_>) -> EvalResult<bool> {
    match convert_to(value, ty, ctx) {
        Ok(_) => Ok(true),
        Err(err) if err.cause.is_none() && (err.code == codes::INVARIANT_VIOLATION || err.code == codes::TYPE_CONVERSION) => {
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Every value of a finite type, in ascending order
pub fn type_extent(ty: &Type, ctx: &Context<'_>) -> EvalResult<Vec<Value>> {
    let not_finite = || {
        RuntimeError::new(
            codes::TYPE_NOT_FINITE,
            format!("Cannot enumerate values of type {}", ty),
        )
    };
    let values: BTreeSet<Value> = match ty {
        Type::Bool => [Value::Bool(false), Value::Bool(true)].into_iter().collect(),
        Type::Quote(q) => BTreeSet::from([Value::Quote(q.clone())]),
        Type::Param(name) => match ctx.lookup_type_param(name) {
            Some(actual) => return type_extent(&actual, ctx),
            None => return Err(not_finite()),
        },
        Type::Optional(inner) => {
            let mut values: BTreeSet<Value> = type_extent(inner, ctx)?.into_iter().collect();
            values.insert(Value::Nil);
            values
        }
        Type::Union(branches) => {
            let mut values = BTreeSet::new();
            for branch in branches {
                values.extend(type_extent(branch, ctx)?);
            }
            values
        }
        Type::Named(named) => {
            let mut values = BTreeSet::new();
            for candidate in type_extent(&named.ty, ctx)? {
                if satisfies(&candidate, ty, ctx)? {
                    values.insert(candidate);
                }
            }
            values
        }
        Type::Product(types) => product(types, ctx)?.into_iter().map(Value::Tuple).collect(),
        Type::Record(record) => {
            let field_types: Vec<Type> = record.fields.iter().map(|f| f.ty.clone()).collect();
            let mut values = BTreeSet::new();
            for fields in product(&field_types, ctx)? {
                let candidate = Value::Record(RecordValue::new(record.clone(), fields));
                if satisfies(&candidate, ty, ctx)? {
                    values.insert(candidate);
                }
            }
            values
        }
        Type::Set { elem, non_empty } => {
            let base = type_extent(elem, ctx)?;
            if base.len() > MAX_POWERSET_BASE {
                return Err(not_finite());
            }
            let base: BTreeSet<Value> = base.into_iter().collect();
            super::ops::powerset(&base)
                .into_iter()
                .filter(|s| !(*non_empty && s.is_empty()))
                .map(Value::Set)
                .collect()
        }
        _ => return Err(not_finite()),
    };
    Ok(values.into_iter().collect())
}

fn product(types: &[Type], ctx: &Context<'_>) -> EvalResult<Vec<Vec<Value>>> {
    let mut acc: Vec<Vec<Value>> = vec![Vec::new()];
    for ty in types {
        let extent = type_extent(ty, ctx)?;
        acc = acc
            .into_iter()
            .flat_map(|prefix| {
                extent.iter().map(move |v| {
                    let mut next = prefix.clone();
                    next.push(v.clone());
                    next
                })
            })
            .collect();
    }
    Ok(acc)
}

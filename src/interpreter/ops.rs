//! Operators on evaluated operands.
//!
//! `and`, `or` and `=>` are handled strictly here. The evaluator applies
//! their short-circuit, three-valued forms before both operands exist.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::diagnostics::error_codes::runtime as codes;
use crate::syntax::{BinaryOp, UnaryOp};

use super::error::{EvalResult, RuntimeError};
use super::numeric::Numeric;
use super::value::{FunctionValue, Value};

/// Largest set whose power set is built
const MAX_POWERSET_CARD: usize = 24;

/// Every subset of `items`
pub fn powerset(items: &BTreeSet<Value>) -> BTreeSet<BTreeSet<Value>> {
    let mut out = BTreeSet::from([BTreeSet::new()]);
    for item in items {
        let extended: Vec<BTreeSet<Value>> = out
            .iter()
            .map(|subset| {
                let mut with = subset.clone();
                with.insert(item.clone());
                with
            })
            .collect();
        out.extend(extended);
    }
    out
}

fn nat(n: usize) -> Value {
    Value::int(i64::try_from(n).unwrap_or(i64::MAX))
}

/// 1-based index into a sequence of length `len`
pub fn seq_index(index: &Value, len: usize) -> EvalResult<usize> {
    let n = index.as_numeric()?;
    if !n.is_integral() {
        return Err(RuntimeError::expected(codes::EXPECTED_INTEGER, "an integer index", n));
    }
    match n.to_usize() {
        Some(i) if i >= 1 && i <= len => Ok(i - 1),
        _ => Err(RuntimeError::new(
            codes::INDEX_OUT_OF_RANGE,
            format!("Sequence index {} out of range 1..{}", n, len),
        )),
    }
}

pub fn unary(op: UnaryOp, value: &Value) -> EvalResult<Value> {
    match op {
        UnaryOp::Plus => Ok(Value::Numeric(value.as_numeric()?.clone())),
        UnaryOp::Minus => Ok(Value::Numeric(value.as_numeric()?.negate())),
        UnaryOp::Abs => Ok(Value::Numeric(value.as_numeric()?.abs())),
        UnaryOp::Floor => Ok(Value::Numeric(value.as_numeric()?.floor())),
        UnaryOp::Not => Ok(Value::Bool(!value.as_bool()?)),
        UnaryOp::Card => Ok(nat(value.as_set()?.len())),
        UnaryOp::Power => {
            let set = value.as_set()?;
            if set.len() > MAX_POWERSET_CARD {
                return Err(RuntimeError::new(
                    codes::NUMERIC_TROUBLE,
                    format!("Cannot build the power set of a set of {} elements", set.len()),
                ));
            }
            Ok(Value::Set(powerset(set).into_iter().map(Value::Set).collect()))
        }
        UnaryOp::DistUnion => {
            let mut out = BTreeSet::new();
            for member in value.as_set()? {
                out.extend(member.as_set()?.iter().cloned());
            }
            Ok(Value::Set(out))
        }
        UnaryOp::DistInter => {
            let mut members = value.as_set()?.iter();
            let Some(first) = members.next() else {
                return Err(RuntimeError::new(codes::EMPTY_SET, "dinter of an empty set"));
            };
            let mut out = first.as_set()?.clone();
            for member in members {
                let member = member.as_set()?;
                out.retain(|v| member.contains(v));
            }
            Ok(Value::Set(out))
        }
        UnaryOp::Len => Ok(nat(value.as_seq()?.len())),
        UnaryOp::Head => value
            .as_seq()?
            .first()
            .cloned()
            .ok_or_else(|| RuntimeError::new(codes::EMPTY_SEQUENCE, "hd of an empty sequence")),
        UnaryOp::Tail => match value.as_seq()? {
            [] => Err(RuntimeError::new(codes::EMPTY_SEQUENCE, "tl of an empty sequence")),
            [_, rest @ ..] => Ok(Value::Seq(rest.to_vec())),
        },
        UnaryOp::Elems => Ok(Value::Set(value.as_seq()?.iter().cloned().collect())),
        UnaryOp::Inds => Ok(Value::Set((1..=value.as_seq()?.len()).map(nat).collect())),
        UnaryOp::Reverse => Ok(Value::Seq(value.as_seq()?.iter().rev().cloned().collect())),
        UnaryOp::DistConc => {
            let mut out = Vec::new();
            for member in value.as_seq()? {
                out.extend(member.as_seq()?.iter().cloned());
            }
            Ok(Value::Seq(out))
        }
        UnaryOp::Dom => Ok(Value::Set(value.as_map()?.keys().cloned().collect())),
        UnaryOp::Rng => Ok(Value::Set(value.as_map()?.values().cloned().collect())),
        UnaryOp::DistMerge => {
            let mut out = BTreeMap::new();
            for member in value.as_set()? {
                merge_into(&mut out, member.as_map()?)?;
            }
            Ok(Value::Map(out))
        }
        UnaryOp::Inverse => inverse(value.as_map()?).map(Value::Map),
    }
}

/// Add `map` to `into`; a key already present with another value conflicts
fn merge_into(into: &mut BTreeMap<Value, Value>, map: &BTreeMap<Value, Value>) -> EvalResult<()> {
    for (key, value) in map {
        match into.get(key) {
            Some(existing) if existing != value => {
                return Err(RuntimeError::new(
                    codes::INCOMPATIBLE_MERGE,
                    format!("Duplicate key {} maps to {} and {}", key, existing, value),
                ));
            }
            Some(_) => {}
            None => {
                into.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

/// Swap keys and values; two keys sharing a value make the map non-invertible
pub fn inverse(map: &BTreeMap<Value, Value>) -> EvalResult<BTreeMap<Value, Value>> {
    let mut out = BTreeMap::new();
    for (key, value) in map {
        if out.insert(value.clone(), key.clone()).is_some() {
            return Err(RuntimeError::new(
                codes::MAP_NOT_INJECTIVE,
                format!("Cannot invert a non-injective map: {} has several keys", value),
            ));
        }
    }
    Ok(out)
}

fn compare(left: &Value, right: &Value) -> EvalResult<std::cmp::Ordering> {
    Ok(left.as_numeric()?.cmp(right.as_numeric()?))
}

/// Binary operators other than the short-circuit connectives
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    use std::cmp::Ordering::*;

    let num = |f: fn(&Numeric, &Numeric) -> Numeric| -> EvalResult<Value> {
        Ok(Value::Numeric(f(left.as_numeric()?, right.as_numeric()?)))
    };
    let checked = |f: fn(&Numeric, &Numeric) -> EvalResult<Numeric>| -> EvalResult<Value> {
        Ok(Value::Numeric(f(left.as_numeric()?, right.as_numeric()?)?))
    };

    match op {
        BinaryOp::Plus => num(Numeric::plus),
        BinaryOp::Minus => num(Numeric::minus),
        BinaryOp::Times => num(Numeric::times),
        BinaryOp::Divide => checked(Numeric::divide),
        BinaryOp::Div => checked(Numeric::int_div),
        BinaryOp::Rem => checked(Numeric::int_rem),
        BinaryOp::Mod => checked(Numeric::int_mod),
        BinaryOp::StarStar => star_star(left, right),

        BinaryOp::Less => Ok(Value::Bool(compare(left, right)? == Less)),
        BinaryOp::LessEq => Ok(Value::Bool(compare(left, right)? != Greater)),
        BinaryOp::Greater => Ok(Value::Bool(compare(left, right)? == Greater)),
        BinaryOp::GreaterEq => Ok(Value::Bool(compare(left, right)? != Less)),
        BinaryOp::Equals => Ok(Value::Bool(left == right)),
        BinaryOp::NotEquals => Ok(Value::Bool(left != right)),

        BinaryOp::And => Ok(Value::Bool(left.as_bool()? && right.as_bool()?)),
        BinaryOp::Or => Ok(Value::Bool(left.as_bool()? || right.as_bool()?)),
        BinaryOp::Implies => Ok(Value::Bool(!left.as_bool()? || right.as_bool()?)),
        BinaryOp::Equiv => Ok(Value::Bool(left.as_bool()? == right.as_bool()?)),

        BinaryOp::InSet => Ok(Value::Bool(right.as_set()?.contains(left))),
        BinaryOp::NotInSet => Ok(Value::Bool(!right.as_set()?.contains(left))),
        BinaryOp::Union => Ok(Value::Set(
            left.as_set()?.union(right.as_set()?).cloned().collect(),
        )),
        BinaryOp::Inter => Ok(Value::Set(
            left.as_set()?.intersection(right.as_set()?).cloned().collect(),
        )),
        BinaryOp::Difference => Ok(Value::Set(
            left.as_set()?.difference(right.as_set()?).cloned().collect(),
        )),
        BinaryOp::Subset => Ok(Value::Bool(left.as_set()?.is_subset(right.as_set()?))),
        BinaryOp::ProperSubset => {
            let (l, r) = (left.as_set()?, right.as_set()?);
            Ok(Value::Bool(l.len() < r.len() && l.is_subset(r)))
        }

        BinaryOp::Concat => {
            let mut out = left.as_seq()?.to_vec();
            out.extend(right.as_seq()?.iter().cloned());
            Ok(Value::Seq(out))
        }
        BinaryOp::PlusPlus => plus_plus(left, right),
        BinaryOp::Munion => {
            let mut out = left.as_map()?.clone();
            merge_into(&mut out, right.as_map()?)?;
            Ok(Value::Map(out))
        }
        BinaryOp::Comp => compose(left, right),
        BinaryOp::DomResTo => {
            let set = left.as_set()?;
            Ok(Value::Map(restrict(right.as_map()?, |k, _| set.contains(k))))
        }
        BinaryOp::DomResBy => {
            let set = left.as_set()?;
            Ok(Value::Map(restrict(right.as_map()?, |k, _| !set.contains(k))))
        }
        BinaryOp::RngResTo => {
            let set = right.as_set()?;
            Ok(Value::Map(restrict(left.as_map()?, |_, v| set.contains(v))))
        }
        BinaryOp::RngResBy => {
            let set = right.as_set()?;
            Ok(Value::Map(restrict(left.as_map()?, |_, v| !set.contains(v))))
        }
    }
}

fn restrict(map: &BTreeMap<Value, Value>, keep: impl Fn(&Value, &Value) -> bool) -> BTreeMap<Value, Value> {
    map.iter()
        .filter(|(k, v)| keep(k, v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Map override or sequence modification
fn plus_plus(left: &Value, right: &Value) -> EvalResult<Value> {
    let changes = right.as_map()?;
    match left {
        Value::Seq(items) => {
            let mut out = items.clone();
            for (index, value) in changes {
                let i = seq_index(index, items.len())?;
                out[i] = value.clone();
            }
            Ok(Value::Seq(out))
        }
        Value::Map(map) => {
            let mut out = map.clone();
            out.extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(Value::Map(out))
        }
        other => Err(RuntimeError::expected(codes::EXPECTED_MAP, "a map or sequence", other)),
    }
}

/// `m1 comp m2` for maps or `f comp g` for functions
fn compose(left: &Value, right: &Value) -> EvalResult<Value> {
    match (left, right) {
        (Value::Function(outer), Value::Function(inner)) => Ok(Value::Function(Arc::new(
            FunctionValue::compose(Arc::clone(outer), Arc::clone(inner)),
        ))),
        (Value::Map(outer), Value::Map(inner)) => {
            let mut out = BTreeMap::new();
            for (key, middle) in inner {
                let Some(value) = outer.get(middle) else {
                    return Err(RuntimeError::new(
                        codes::NOT_A_SUBSET,
                        format!("Map composition: {} is not in the domain of the left map", middle),
                    ));
                };
                out.insert(key.clone(), value.clone());
            }
            Ok(Value::Map(out))
        }
        (Value::Map(_), other) | (Value::Function(_), other) => {
            Err(RuntimeError::expected(codes::INAPPLICABLE_VALUE, "a value of the same kind", other))
        }
        (other, _) => Err(RuntimeError::expected(codes::EXPECTED_FUNCTION, "a function or map", other)),
    }
}

/// `**` on numbers, maps and functions
fn star_star(left: &Value, right: &Value) -> EvalResult<Value> {
    match left {
        Value::Numeric(base) => Ok(Value::Numeric(base.power(right.as_numeric()?)?)),
        Value::Map(map) => {
            let times = right.as_count()?;
            if times == 0 {
                return Ok(Value::Map(map.keys().map(|k| (k.clone(), k.clone())).collect()));
            }
            if times > 1 && !map.values().all(|v| map.contains_key(v)) {
                return Err(RuntimeError::new(
                    codes::NOT_A_SUBSET,
                    "Map range is not a subset of its domain",
                ));
            }
            let mut out = map.clone();
            for _ in 1..times {
                let mut next = BTreeMap::new();
                for (key, value) in &out {
                    // Range is within the domain, checked above
                    if let Some(stepped) = map.get(value) {
                        next.insert(key.clone(), stepped.clone());
                    }
                }
                if next == out {
                    break;
                }
                out = next;
            }
            Ok(Value::Map(out))
        }
        Value::Function(function) => Ok(Value::Function(Arc::new(FunctionValue::iterate(
            Arc::clone(function),
            right.as_count()?,
        )))),
        other => Err(RuntimeError::expected(codes::EXPECTED_NUMERIC, "a number, map or function", other)),
    }
}

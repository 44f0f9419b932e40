//! Pattern matching against runtime values.
//!
//! Set, map, union and concatenation patterns can match one value in
//! several ways, so matching yields every consistent binding set.
//! Callers that need a single answer take the first.

use std::collections::{BTreeMap, BTreeSet};

use crate::syntax::{InPattern, PatternKind};

use super::context::Context;
use super::error::MatchError;
use super::value::Value;

/// Names bound by a successful match, in binding order
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Bindings(Vec<(String, Value)>);

impl Bindings {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn single(name: impl Into<String>, value: Value) -> Self {
        Self(vec![(name.into(), value)])
    }

    /// Append without a consistency check
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.0.push((name.into(), value));
    }

    /// Bind `name`; fails if it is already bound to a different value
    pub fn bind(&mut self, name: &str, value: Value) -> bool {
        match self.get(name) {
            Some(existing) => *existing == value,
            None => {
                self.0.push((name.to_string(), value));
                true
            }
        }
    }

    /// Combine two binding sets; `None` if they disagree on a name
    pub fn merged(&self, other: &Bindings) -> Option<Bindings> {
        let mut out = self.clone();
        for (name, value) in &other.0 {
            if !out.bind(name, value.clone()) {
                return None;
            }
        }
        Some(out)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.0.iter()
    }
}

impl IntoIterator for Bindings {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl InPattern {
    /// Every way this pattern matches `value`; empty when it does not match
    pub fn match_all(&self, value: &Value, ctx: &Context<'_>) -> Result<Vec<Bindings>, MatchError> {
        let value = value.deref();
        let mut results = match (&self.kind, &value) {
            (PatternKind::Identifier(name), _) => vec![Bindings::single(name.clone(), value.clone())],
            (PatternKind::Ignore, _) => vec![Bindings::new()],
            (PatternKind::Literal(lit), _) => accept(Value::from(lit) == value),
            (PatternKind::Expression(expr), _) => accept(expr.eval(ctx)? == value),
            (PatternKind::Tuple(items), Value::Tuple(values)) if items.len() == values.len() => {
                match_each(items, values, ctx)?
            }
            (PatternKind::Record { record, fields }, Value::Record(rec))
                if rec.ty.name == record.ident && fields.len() == rec.fields.len() =>
            {
                match_each(fields, &rec.fields, ctx)?
            }
            (PatternKind::Seq(items), Value::Seq(values)) if items.len() == values.len() => {
                match_each(items, values, ctx)?
            }
            (PatternKind::Set(items), Value::Set(values)) if items.len() == values.len() => {
                let values: Vec<Value> = values.iter().cloned().collect();
                match_permutations(items, &values, ctx)?
            }
            (PatternKind::Map(maplets), Value::Map(map)) if maplets.len() == map.len() => {
                let (keys, values): (Vec<_>, Vec<_>) = maplets.iter().cloned().unzip();
                let entries: Vec<(Value, Value)> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                match_map_permutations(&keys, &values, &entries, ctx)?
            }
            (PatternKind::Concat(left, right), Value::Seq(values)) => {
                let mut out = Vec::new();
                for split in 0..=values.len() {
                    let (prefix, suffix) = values.split_at(split);
                    out.extend(match_pair(
                        (left, &Value::Seq(prefix.to_vec())),
                        (right, &Value::Seq(suffix.to_vec())),
                        ctx,
                    )?);
                }
                out
            }
            (PatternKind::Union(left, right), Value::Set(values)) => {
                let values: Vec<Value> = values.iter().cloned().collect();
                let mut out = Vec::new();
                for (part, rest) in partitions(&values) {
                    let part = Value::Set(part.into_iter().collect());
                    let rest = Value::Set(rest.into_iter().collect());
                    out.extend(match_pair((left, &part), (right, &rest), ctx)?);
                }
                out
            }
            (PatternKind::MapUnion(left, right), Value::Map(map)) => {
                let entries: Vec<(Value, Value)> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                let mut out = Vec::new();
                for (part, rest) in partitions(&entries) {
                    let part = Value::Map(part.into_iter().collect::<BTreeMap<_, _>>());
                    let rest = Value::Map(rest.into_iter().collect::<BTreeMap<_, _>>());
                    out.extend(match_pair((left, &part), (right, &rest), ctx)?);
                }
                out
            }
            _ => Vec::new(),
        };
        results.sort();
        results.dedup();
        Ok(results)
    }

    /// The first match, or a mismatch error
    pub fn match_value(&self, value: &Value, ctx: &Context<'_>) -> Result<Bindings, MatchError> {
        self.match_all(value, ctx)?
            .into_iter()
            .next()
            .ok_or_else(|| MatchError::no_match(self, value))
    }
}

fn accept(matched: bool) -> Vec<Bindings> {
    if matched {
        vec![Bindings::new()]
    } else {
        Vec::new()
    }
}

/// Cross every match of one pattern with every match of the other
fn match_pair(
    (left, left_value): (&InPattern, &Value),
    (right, right_value): (&InPattern, &Value),
    ctx: &Context<'_>,
) -> Result<Vec<Bindings>, MatchError> {
    let lefts = left.match_all(left_value, ctx)?;
    if lefts.is_empty() {
        return Ok(Vec::new());
    }
    let rights = right.match_all(right_value, ctx)?;
    Ok(lefts
        .iter()
        .flat_map(|l| rights.iter().filter_map(move |r| l.merged(r)))
        .collect())
}

/// Match patterns and values positionally
pub(crate) fn match_each(
    patterns: &[InPattern],
    values: &[Value],
    ctx: &Context<'_>,
) -> Result<Vec<Bindings>, MatchError> {
    let mut acc = vec![Bindings::new()];
    for (pattern, value) in patterns.iter().zip(values) {
        let matches = pattern.match_all(value, ctx)?;
        acc = acc
            .iter()
            .flat_map(|a| matches.iter().filter_map(move |m| a.merged(m)))
            .collect();
        if acc.is_empty() {
            break;
        }
    }
    Ok(acc)
}

/// Assign the set elements to the patterns in every order
fn match_permutations(
    patterns: &[InPattern],
    values: &[Value],
    ctx: &Context<'_>,
) -> Result<Vec<Bindings>, MatchError> {
    let mut out = Vec::new();
    for order in permutations(values.len()) {
        let arranged: Vec<Value> = order.iter().map(|&i| values[i].clone()).collect();
        out.extend(match_each(patterns, &arranged, ctx)?);
    }
    Ok(out)
}

fn match_map_permutations(
    keys: &[InPattern],
    values: &[InPattern],
    entries: &[(Value, Value)],
    ctx: &Context<'_>,
) -> Result<Vec<Bindings>, MatchError> {
    let mut out = Vec::new();
    for order in permutations(entries.len()) {
        let arranged_keys: Vec<Value> = order.iter().map(|&i| entries[i].0.clone()).collect();
        let arranged_values: Vec<Value> = order.iter().map(|&i| entries[i].1.clone()).collect();
        for bound in match_each(keys, &arranged_keys, ctx)? {
            for rest in match_each(values, &arranged_values, ctx)? {
                if let Some(merged) = bound.merged(&rest) {
                    out.push(merged);
                }
            }
        }
    }
    Ok(out)
}

/// All orderings of `0..n`
fn permutations(n: usize) -> Vec<Vec<usize>> {
    fn extend(prefix: &mut Vec<usize>, used: &mut BTreeSet<usize>, n: usize, out: &mut Vec<Vec<usize>>) {
        if prefix.len() == n {
            out.push(prefix.clone());
            return;
        }
        for i in 0..n {
            if used.insert(i) {
                prefix.push(i);
                extend(prefix, used, n, out);
                prefix.pop();
                used.remove(&i);
            }
        }
    }
    let mut out = Vec::new();
    extend(&mut Vec::new(), &mut BTreeSet::new(), n, &mut out);
    out
}

/// Every split of `items` into two disjoint parts
fn partitions<T: Clone>(items: &[T]) -> Vec<(Vec<T>, Vec<T>)> {
    let mut out = vec![(Vec::new(), Vec::new())];
    for item in items {
        out = out
            .into_iter()
            .flat_map(|(part, rest)| {
                let mut with = part.clone();
                with.push(item.clone());
                let mut without = rest.clone();
                without.push(item.clone());
                [(with, rest), (part, without)]
            })
            .collect();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_consistency() {
        let mut b = Bindings::single("x", Value::int(1));
        assert!(b.bind("x", Value::int(1)));
        assert!(!b.bind("x", Value::int(2)));
        let other = Bindings::single("x", Value::int(3));
        assert!(b.merged(&other).is_none());
    }

    #[test]
    fn test_partitions_count() {
        assert_eq!(partitions(&[1, 2, 3]).len(), 8);
        assert_eq!(permutations(3).len(), 6);
        assert_eq!(permutations(0), vec![Vec::<usize>::new()]);
    }
}

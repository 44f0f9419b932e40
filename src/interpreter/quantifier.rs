//! The binding engine behind quantifiers, comprehensions, `let be st` and
//! `iota`.
//!
//! Each binding contributes one [`Quantifier`] per pattern: the pattern
//! paired with every way it matches each candidate value. A
//! [`QuantifierList`] walks the cross product of those candidates in
//! declaration order, skipping tuples that bind a shared name to different
//! values. The search checks the thread's deadline before every candidate
//! and stops with an inconclusive outcome once it has passed.

use tracing::debug;

use crate::diagnostics::error_codes::runtime as codes;
use crate::syntax::{Bind, InExpr, InPattern, MultipleBind, Runtime};

use super::context::Context;
use super::convert::type_extent;
use super::error::{EvalResult, MatchError, RuntimeError};
use super::pattern::Bindings;
use super::value::Value;

/// One way a pattern matched one candidate value
#[derive(Debug, Clone)]
pub struct Candidate {
    pub value: Value,
    pub bindings: Bindings,
}

/// A pattern and the candidates it accepts
#[derive(Debug, Clone)]
pub struct Quantifier {
    pub candidates: Vec<Candidate>,
}

impl Quantifier {
    /// Match `pattern` against every value; values it rejects are skipped
    pub fn new(pattern: &InPattern, values: &[Value], ctx: &Context<'_>) -> EvalResult<Self> {
        let mut candidates = Vec::new();
        for value in values {
            let matches = pattern.match_all(value, ctx).map_err(MatchError::into_runtime)?;
            candidates.extend(matches.into_iter().map(|bindings| Candidate {
                value: value.clone(),
                bindings,
            }));
        }
        Ok(Self { candidates })
    }
}

/// One element of the cross product
#[derive(Debug, Clone)]
pub struct Tuple {
    /// The candidate value chosen for each quantifier
    pub values: Vec<Value>,
    pub bindings: Bindings,
}

/// Odometer over the cross product of several quantifiers
#[derive(Debug)]
pub struct QuantifierList {
    quantifiers: Vec<Quantifier>,
    indices: Vec<usize>,
    exhausted: bool,
}

impl QuantifierList {
    pub fn new(quantifiers: Vec<Quantifier>) -> Self {
        let exhausted = quantifiers.iter().any(|q| q.candidates.is_empty());
        Self {
            indices: vec![0; quantifiers.len()],
            quantifiers,
            exhausted,
        }
    }

    /// Collect the candidate values of each binding once, then build one
    /// quantifier per pattern
    pub fn from_binds(binds: &[MultipleBind<Runtime>], ctx: &Context<'_>) -> EvalResult<Self> {
        let mut quantifiers = Vec::new();
        for bind in binds {
            let values = bind_values(bind, ctx)?;
            for pattern in bind.patterns() {
                quantifiers.push(Quantifier::new(pattern, &values, ctx)?);
            }
        }
        Ok(Self::new(quantifiers))
    }

    fn current(&self) -> Option<Tuple> {
        let mut tuple = Tuple {
            values: Vec::with_capacity(self.indices.len()),
            bindings: Bindings::new(),
        };
        for (quantifier, &index) in self.quantifiers.iter().zip(&self.indices) {
            let candidate = &quantifier.candidates[index];
            tuple.bindings = tuple.bindings.merged(&candidate.bindings)?;
            tuple.values.push(candidate.value.clone());
        }
        Some(tuple)
    }

    fn advance(&mut self) {
        for i in (0..self.indices.len()).rev() {
            self.indices[i] += 1;
            if self.indices[i] < self.quantifiers[i].candidates.len() {
                return;
            }
            self.indices[i] = 0;
        }
        self.exhausted = true;
    }
}

impl Iterator for QuantifierList {
    type Item = Tuple;

    fn next(&mut self) -> Option<Tuple> {
        while !self.exhausted {
            let tuple = self.current();
            self.advance();
            if tuple.is_some() {
                return tuple;
            }
        }
        None
    }
}

/// The candidate values of a binding, in the natural order of its source
pub fn bind_values(bind: &MultipleBind<Runtime>, ctx: &Context<'_>) -> EvalResult<Vec<Value>> {
    match bind {
        MultipleBind::Set { set, .. } => Ok(set.eval(ctx)?.as_set()?.iter().cloned().collect()),
        MultipleBind::Seq { seq, .. } => Ok(seq.eval(ctx)?.as_seq()?.to_vec()),
        MultipleBind::Type { ty, .. } => type_extent(ty, ctx),
    }
}

/// Why a search ended without a definite answer
#[derive(Debug, Clone, PartialEq)]
pub struct MaybeReason {
    pub timed_out: bool,
    /// The candidate being considered when the search gave up
    pub witness: Option<Bindings>,
}

/// Result of a boolean quantifier
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    True,
    False,
    Maybe(MaybeReason),
}

impl Verdict {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Verdict::True
        } else {
            Verdict::False
        }
    }

    pub fn is_maybe(&self) -> bool {
        matches!(self, Verdict::Maybe(_))
    }

    /// `Maybe` becomes the undefined value
    pub fn into_value(self) -> Value {
        match self {
            Verdict::True => Value::Bool(true),
            Verdict::False => Value::Bool(false),
            Verdict::Maybe(_) => Value::Undefined,
        }
    }
}

/// Whether a visitor wants more candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

/// How a search ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Finished,
    Stopped,
    TimedOut(Option<Bindings>),
}

/// Visit every consistent tuple in a child frame holding its bindings
pub fn search<F>(list: QuantifierList, ctx: &Context<'_>, title: &str, mut visit: F) -> EvalResult<Outcome>
where
    F: FnMut(&Tuple, &Context<'_>) -> EvalResult<Step>,
{
    let thread = ctx.thread();
    let _deadline = thread.start_deadline();
    let mut last: Option<Bindings> = None;
    for tuple in list {
        if thread.deadline_passed() {
            debug!(title, "quantifier search timed out");
            return Ok(Outcome::TimedOut(last));
        }
        let mut scope = ctx.child(title);
        scope.define_all(tuple.bindings.clone());
        if visit(&tuple, &scope)? == Step::Stop {
            return Ok(Outcome::Stopped);
        }
        last = Some(tuple.bindings);
    }
    Ok(Outcome::Finished)
}

/// Evaluate a comprehension filter; an absent filter accepts everything
pub fn accepts(filter: Option<&InExpr>, scope: &Context<'_>) -> EvalResult<bool> {
    match filter {
        Some(filter) => filter.eval(scope)?.as_bool(),
        None => Ok(true),
    }
}

/// `forall binds & predicate`
pub fn forall(binds: &[MultipleBind<Runtime>], predicate: &InExpr, ctx: &Context<'_>) -> EvalResult<Verdict> {
    let list = QuantifierList::from_binds(binds, ctx)?;
    let mut refuted = false;
    let mut undecided: Option<Bindings> = None;
    let outcome = search(list, ctx, "forall", |tuple, scope| match predicate.eval(scope)? {
        Value::Bool(true) => Ok(Step::Continue),
        Value::Bool(false) => {
            refuted = true;
            Ok(Step::Stop)
        }
        Value::Undefined => {
            undecided.get_or_insert_with(|| tuple.bindings.clone());
            Ok(Step::Continue)
        }
        other => Err(RuntimeError::expected(codes::EXPECTED_BOOL, "a boolean", &other)),
    })?;
    Ok(conclude(outcome, refuted, undecided, Verdict::False, Verdict::True))
}

/// `exists binds & predicate`
pub fn exists(binds: &[MultipleBind<Runtime>], predicate: &InExpr, ctx: &Context<'_>) -> EvalResult<Verdict> {
    let list = QuantifierList::from_binds(binds, ctx)?;
    let mut found = false;
    let mut undecided: Option<Bindings> = None;
    let outcome = search(list, ctx, "exists", |tuple, scope| match predicate.eval(scope)? {
        Value::Bool(true) => {
            found = true;
            Ok(Step::Stop)
        }
        Value::Bool(false) => Ok(Step::Continue),
        Value::Undefined => {
            undecided.get_or_insert_with(|| tuple.bindings.clone());
            Ok(Step::Continue)
        }
        other => Err(RuntimeError::expected(codes::EXPECTED_BOOL, "a boolean", &other)),
    })?;
    Ok(conclude(outcome, found, undecided, Verdict::True, Verdict::False))
}

/// Combine a search outcome: a decisive candidate wins, then a timeout or an
/// undefined predicate makes the answer inconclusive
fn conclude(
    outcome: Outcome,
    decided: bool,
    undecided: Option<Bindings>,
    on_decided: Verdict,
    otherwise: Verdict,
) -> Verdict {
    if decided {
        return on_decided;
    }
    match outcome {
        Outcome::TimedOut(witness) => Verdict::Maybe(MaybeReason {
            timed_out: true,
            witness,
        }),
        _ => match undecided {
            Some(witness) => Verdict::Maybe(MaybeReason {
                timed_out: false,
                witness: Some(witness),
            }),
            None => otherwise,
        },
    }
}

/// `exists1 bind & predicate`: exactly one distinct value satisfies it
pub fn exists1(bind: &Bind<Runtime>, predicate: &InExpr, ctx: &Context<'_>) -> EvalResult<Verdict> {
    let list = QuantifierList::from_binds(&[bind.to_multiple()], ctx)?;
    let mut first: Option<Value> = None;
    let mut second = false;
    let mut undecided: Option<Bindings> = None;
    let outcome = search(list, ctx, "exists1", |tuple, scope| match predicate.eval(scope)? {
        Value::Bool(true) => {
            let value = tuple.values.first().cloned().unwrap_or(Value::Undefined);
            match &first {
                None => {
                    first = Some(value);
                    Ok(Step::Continue)
                }
                Some(seen) if *seen == value => Ok(Step::Continue),
                Some(_) => {
                    second = true;
                    Ok(Step::Stop)
                }
            }
        }
        Value::Bool(false) => Ok(Step::Continue),
        Value::Undefined => {
            undecided.get_or_insert_with(|| tuple.bindings.clone());
            Ok(Step::Continue)
        }
        other => Err(RuntimeError::expected(codes::EXPECTED_BOOL, "a boolean", &other)),
    })?;
    if second {
        return Ok(Verdict::False);
    }
    Ok(conclude(outcome, false, undecided, Verdict::False, Verdict::from_bool(first.is_some())))
}

/// `iota bind & predicate`: the unique value satisfying the predicate.
///
/// A timed out search yields the undefined value.
pub fn iota(bind: &Bind<Runtime>, predicate: &InExpr, ctx: &Context<'_>) -> EvalResult<Value> {
    let list = QuantifierList::from_binds(&[bind.to_multiple()], ctx)?;
    let mut result: Option<Value> = None;
    let outcome = search(list, ctx, "iota", |tuple, scope| {
        if !predicate.eval(scope)?.as_bool()? {
            return Ok(Step::Continue);
        }
        let value = tuple.values.first().cloned().unwrap_or(Value::Undefined);
        match &result {
            Some(seen) if *seen != value => Err(RuntimeError::new(
                codes::IOTA_MULTIPLE_RESULTS,
                "Iota selects more than one result",
            )),
            _ => {
                result = Some(value);
                Ok(Step::Continue)
            }
        }
    })?;
    if let Outcome::TimedOut(_) = outcome {
        return Ok(Value::Undefined);
    }
    result.ok_or_else(|| RuntimeError::new(codes::IOTA_NO_RESULT, "Iota does not select a result"))
}

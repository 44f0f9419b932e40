//! Type rules for expression nodes
//!
//! `type_check` is the single entry point. It dispatches on the node form,
//! applies the caller's constraint and stores the resulting type in the
//! node, so the remapper can later carry it over to the runtime tree.

use std::collections::HashMap;

use crate::diagnostics::error_codes as codes;
use crate::syntax::{
    BinaryOp, Checked, ExprKind, HistoryOp, Literal, LocalDef, Name, TcExpr, UnaryOp,
};

use super::*;

/// The static type of a literal
pub fn literal_type(lit: &Literal) -> Type {
    use num_traits::Signed;
    use num_traits::Zero;

    match lit {
        Literal::Bool(_) => Type::Bool,
        Literal::Int(n) if n.is_zero() => Type::Nat,
        Literal::Int(n) if n.is_positive() => Type::NatOne,
        Literal::Int(_) => Type::Int,
        Literal::Real(_) => Type::Real,
        Literal::Char(_) => Type::Char,
        Literal::Quote(q) => Type::Quote(q.clone()),
        Literal::Text(s) if s.is_empty() => Type::seq_of(Type::Char),
        Literal::Text(_) => Type::seq1_of(Type::Char),
        Literal::Nil => Type::optional(Type::Unknown),
    }
}

fn is_zero_literal(expr: &TcExpr) -> bool {
    use num_traits::Zero;

    matches!(&expr.kind, ExprKind::Literal(Literal::Int(n)) if n.is_zero())
        || matches!(&expr.kind, ExprKind::Literal(Literal::Real(r)) if r.is_zero())
}

fn abs_type(t: &Type) -> Type {
    match t {
        Type::Int => Type::Nat,
        other => other.clone(),
    }
}

fn floor_type(t: &Type) -> Type {
    match t {
        Type::Rat | Type::Real => Type::Int,
        other => other.clone(),
    }
}

fn negate_type(t: &Type) -> Type {
    match t {
        Type::NatOne | Type::Nat | Type::Int => Type::Int,
        other => other.clone(),
    }
}

/// Result of `+` for a pair of numeric branches
fn plus_type(l: u8, r: u8) -> Type {
    if l <= 2 && r <= 2 && l.min(r) == 1 {
        Type::NatOne
    } else {
        Type::numeric_of_weight(l.max(r))
    }
}

/// Result of `-` for a pair of numeric branches
fn minus_type(l: u8, r: u8) -> Type {
    if l <= 3 && r <= 3 {
        Type::Int
    } else {
        Type::numeric_of_weight(l.max(r))
    }
}

impl TcExpr {
    /// Type-check this node and everything below it.
    ///
    /// `qualifiers` are the argument types of an enclosing application, used
    /// to choose between overloaded members. `constraint` is the type the
    /// context expects; the result is narrowed to it where possible and a
    /// mismatch is reported where it cannot hold.
    pub fn type_check(
        &mut self,
        tc: &mut TypeChecker,
        env: &TypeEnv<'_>,
        qualifiers: Option<&[Type]>,
        scope: NameScope,
        constraint: Option<&Type>,
    ) -> Type {
        let forwards = matches!(
            self.kind,
            ExprKind::If { .. }
                | ExprKind::Cases { .. }
                | ExprKind::Let { .. }
                | ExprKind::Def { .. }
                | ExprKind::LetBeSt { .. }
                | ExprKind::NotYetSpecified
        );
        let ty = self.check_kind(tc, env, qualifiers, scope, constraint);
        let ty = if forwards {
            match constraint {
                Some(expected) => tc.narrow_to(&ty, expected, env),
                None => ty,
            }
        } else {
            tc.constrain(ty, constraint, env, &self.span)
        };
        self.info = Some(ty.clone());
        ty
    }

    fn check_kind(
        &mut self,
        tc: &mut TypeChecker,
        env: &TypeEnv<'_>,
        qualifiers: Option<&[Type]>,
        scope: NameScope,
        constraint: Option<&Type>,
    ) -> Type {
        let span = self.span.clone();
        match &mut self.kind {
            ExprKind::Literal(lit) => literal_type(lit),
            ExprKind::Undefined => Type::Unknown,
            ExprKind::Variable { name, old } => {
                check_variable(tc, env, qualifiers, scope, name, *old, &span)
            }
            ExprKind::SelfRef => match env.enclosing_class() {
                Some(class) if !env.is_static() => Type::Class(class.to_string()),
                _ => {
                    tc.error(
                        codes::classes::SELF_OUTSIDE_CLASS,
                        &span,
                        "'self' is only available inside an instance context",
                    );
                    Type::Unknown
                }
            },
            ExprKind::ThreadId | ExprKind::Time => Type::Nat,
            ExprKind::NotYetSpecified => constraint.cloned().unwrap_or(Type::Unknown),

            ExprKind::Unary { op, operand } => {
                let op = *op;
                check_unary(tc, env, scope, op, operand)
            }
            ExprKind::Binary { op, left, right } => {
                let op = *op;
                check_binary(tc, env, scope, op, left, right, constraint)
            }

            ExprKind::If {
                condition,
                then_branch,
                elseifs,
                else_branch,
            } => {
                expect_bool(tc, env, scope, condition);
                let mut results = vec![then_branch.type_check(tc, env, None, scope, constraint)];
                for (cond, branch) in elseifs.iter_mut() {
                    expect_bool(tc, env, scope, cond);
                    results.push(branch.type_check(tc, env, None, scope, constraint));
                }
                results.push(else_branch.type_check(tc, env, None, scope, constraint));
                Type::union(results)
            }
            ExprKind::Cases {
                scrutinee,
                alternatives,
                others,
            } => {
                let subject = scrutinee.type_check(tc, env, None, scope, None);
                let mut results = Vec::new();
                for alt in alternatives.iter_mut() {
                    let mut local = env.child();
                    for pattern in alt.patterns.iter_mut() {
                        let defs = pattern.type_check(tc, env, &subject, scope);
                        local.define_all(defs);
                    }
                    results.push(alt.result.type_check(tc, &local, None, scope, constraint));
                }
                if let Some(others) = others {
                    results.push(others.type_check(tc, env, None, scope, constraint));
                }
                Type::union(results)
            }
            ExprKind::Let { defs, body } | ExprKind::Def { defs, body } => {
                let mut local = env.child();
                for def in defs.iter_mut() {
                    let new_defs = check_local_def(tc, &local, scope, def);
                    local.define_all(new_defs);
                }
                body.type_check(tc, &local, None, scope, constraint)
            }
            ExprKind::LetBeSt { bind, filter, body } => {
                let mut local = env.child();
                let defs = bind.type_check(tc, env, scope);
                local.define_all(defs);
                if let Some(filter) = filter {
                    expect_bool(tc, &local, scope, filter);
                }
                body.type_check(tc, &local, None, scope, constraint)
            }

            ExprKind::Forall { binds, predicate } | ExprKind::Exists { binds, predicate } => {
                let mut local = env.child();
                for bind in binds.iter_mut() {
                    let defs = bind.type_check(tc, env, scope);
                    local.define_all(defs);
                }
                expect_bool(tc, &local, scope, predicate);
                Type::Bool
            }
            ExprKind::Exists1 { bind, predicate } => {
                let mut local = env.child();
                let (defs, _) = bind.type_check(tc, env, scope);
                local.define_all(defs);
                expect_bool(tc, &local, scope, predicate);
                Type::Bool
            }
            ExprKind::Iota { bind, predicate } => {
                let mut local = env.child();
                let (defs, elem) = bind.type_check(tc, env, scope);
                local.define_all(defs);
                expect_bool(tc, &local, scope, predicate);
                elem
            }
            ExprKind::Lambda { params, body } => {
                let mut local = env.child().in_function();
                let mut param_types = Vec::new();
                for param in params.iter_mut() {
                    let resolved = tc.resolve_type(&param.ty, env, &param.pattern.span);
                    param.ty = resolved.clone();
                    let defs = param.pattern.type_check(tc, env, &resolved, scope);
                    local.define_all(defs);
                    param_types.push(resolved);
                }
                let body = std::sync::Arc::make_mut(body);
                let result = body.type_check(tc, &local, None, NameScope::Names, None);
                Type::total_function(param_types, result)
            }

            ExprKind::SetEnum(items) => {
                let elem_constraint = constraint.and_then(|c| c.set_elem());
                let elems: Vec<Type> = items
                    .iter_mut()
                    .map(|item| item.type_check(tc, env, None, scope, elem_constraint.as_ref()))
                    .collect();
                if elems.is_empty() {
                    Type::set_of(Type::Unknown)
                } else {
                    Type::set1_of(Type::union(elems))
                }
            }
            ExprKind::SetRange { first, last } => {
                let lo = expect_numeric(tc, env, scope, first);
                let hi = expect_numeric(tc, env, scope, last);
                let natural = lo.iter().chain(hi.iter()).all(|t| t.is_natural());
                Type::set_of(if natural { Type::Nat } else { Type::Int })
            }
            ExprKind::SetComp {
                element,
                binds,
                predicate,
            } => {
                let mut local = env.child();
                for bind in binds.iter_mut() {
                    let defs = bind.type_check(tc, env, scope);
                    local.define_all(defs);
                }
                if let Some(predicate) = predicate {
                    expect_bool(tc, &local, scope, predicate);
                }
                let elem_constraint = constraint.and_then(|c| c.set_elem());
                let elem = element.type_check(tc, &local, None, scope, elem_constraint.as_ref());
                Type::set_of(elem)
            }
            ExprKind::SeqEnum(items) => {
                let elem_constraint = constraint.and_then(|c| c.seq_elem());
                let elems: Vec<Type> = items
                    .iter_mut()
                    .map(|item| item.type_check(tc, env, None, scope, elem_constraint.as_ref()))
                    .collect();
                if elems.is_empty() {
                    Type::seq_of(Type::Unknown)
                } else {
                    Type::seq1_of(Type::union(elems))
                }
            }
            ExprKind::SeqComp {
                element,
                bind,
                predicate,
            } => {
                let mut local = env.child();
                let is_set_bind = matches!(bind, crate::syntax::Bind::Set { .. });
                let bind_span = bind.pattern().span.clone();
                let (defs, elem) = bind.type_check(tc, env, scope);
                if is_set_bind && !elem.is_numeric() {
                    tc.error(
                        codes::types::EXPECTED_NUMERIC,
                        &bind_span,
                        "Sequence comprehension over a set must bind numeric values",
                    );
                }
                local.define_all(defs);
                if let Some(predicate) = predicate {
                    expect_bool(tc, &local, scope, predicate);
                }
                let elem_constraint = constraint.and_then(|c| c.seq_elem());
                let result = element.type_check(tc, &local, None, scope, elem_constraint.as_ref());
                Type::seq_of(result)
            }
            ExprKind::Subseq { seq, from, to } => {
                let elem = expect_seq(tc, env, scope, seq);
                expect_numeric(tc, env, scope, from);
                expect_numeric(tc, env, scope, to);
                Type::seq_of(elem)
            }
            ExprKind::MapEnum(maplets) => {
                let parts = constraint.and_then(|c| c.map_parts());
                let (from_c, to_c) = match &parts {
                    Some((f, t)) => (Some(f), Some(t)),
                    None => (None, None),
                };
                let mut keys = Vec::new();
                let mut values = Vec::new();
                for maplet in maplets.iter_mut() {
                    keys.push(maplet.key.type_check(tc, env, None, scope, from_c));
                    values.push(maplet.value.type_check(tc, env, None, scope, to_c));
                }
                Type::map_of(Type::union(keys), Type::union(values))
            }
            ExprKind::MapComp {
                maplet,
                binds,
                predicate,
            } => {
                let mut local = env.child();
                for bind in binds.iter_mut() {
                    let defs = bind.type_check(tc, env, scope);
                    local.define_all(defs);
                }
                if let Some(predicate) = predicate {
                    expect_bool(tc, &local, scope, predicate);
                }
                let key = maplet.key.type_check(tc, &local, None, scope, None);
                let value = maplet.value.type_check(tc, &local, None, scope, None);
                Type::map_of(key, value)
            }

            ExprKind::Tuple(items) => {
                let arity = items.len();
                let products: Vec<Vec<Type>> = constraint
                    .map(|c| {
                        c.product_branches()
                            .into_iter()
                            .filter(|p| p.len() == arity)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                let types = items
                    .iter_mut()
                    .enumerate()
                    .map(|(i, item)| {
                        let item_constraint = if products.is_empty() {
                            None
                        } else {
                            Some(Type::union(products.iter().map(|p| p[i].clone())))
                        };
                        item.type_check(tc, env, None, scope, item_constraint.as_ref())
                    })
                    .collect();
                Type::Product(types)
            }
            ExprKind::MkRecord { record, args } => check_mk_record(tc, env, scope, record, args, &span),
            ExprKind::MkToken(inner) => {
                inner.type_check(tc, env, None, scope, None);
                Type::Token
            }
            ExprKind::Mu {
                record,
                modifications,
            } => {
                let ty = record.type_check(tc, env, None, scope, None);
                let records: Vec<_> = ty.record_branches().into_iter().cloned().collect();
                if records.is_empty() && !ty.is_unknown() {
                    tc.error(
                        codes::types::EXPECTED_RECORD,
                        &record.span,
                        format!("mu applied to a non-record value of type {}", ty),
                    );
                }
                for (tag, value) in modifications.iter_mut() {
                    let field_types: Vec<Type> = records
                        .iter()
                        .filter_map(|r| r.field(tag).map(|f| f.ty.clone()))
                        .collect();
                    if field_types.is_empty() && !records.is_empty() {
                        tc.error(
                            codes::types::UNKNOWN_FIELD,
                            &value.span,
                            format!("Record has no field '{}'", tag),
                        );
                    }
                    let field_constraint = if field_types.is_empty() {
                        None
                    } else {
                        Some(Type::union(field_types))
                    };
                    value.type_check(tc, env, None, scope, field_constraint.as_ref());
                }
                ty
            }
            ExprKind::Field { object, field } => {
                check_field(tc, env, qualifiers, scope, object, field, &span)
            }
            ExprKind::FieldNumber { tuple, index } => {
                let ty = tuple.type_check(tc, env, None, scope, None);
                if ty.is_unknown() {
                    return Type::Unknown;
                }
                // Records are selectable by field position as well
                let positions: Vec<Vec<Type>> = ty
                    .product_branches()
                    .into_iter()
                    .cloned()
                    .chain(
                        ty.record_branches()
                            .into_iter()
                            .map(|r| r.fields.iter().map(|f| f.ty.clone()).collect()),
                    )
                    .collect();
                if positions.is_empty() {
                    tc.error(
                        codes::types::EXPECTED_TUPLE,
                        &span,
                        format!("Tuple selector applied to a value of type {}", ty),
                    );
                    return Type::Unknown;
                }
                let index = *index;
                let items: Vec<Type> = positions
                    .iter()
                    .filter(|p| index >= 1 && p.len() >= index)
                    .map(|p| p[index - 1].clone())
                    .collect();
                if items.is_empty() {
                    tc.error(
                        codes::types::TUPLE_INDEX_RANGE,
                        &span,
                        format!("Tuple selector #{} is out of range for {}", index, ty),
                    );
                    return Type::Unknown;
                }
                Type::union(items)
            }

            ExprKind::Apply { callee, args } => check_apply(tc, env, scope, callee, args, &span),
            ExprKind::Instantiate { function, actuals } => {
                check_instantiate(tc, env, scope, function, actuals, &span)
            }

            ExprKind::Is { ty, operand } => {
                let resolved = tc.resolve_type(ty, env, &span);
                *ty = resolved;
                operand.type_check(tc, env, None, scope, None);
                Type::Bool
            }
            ExprKind::Narrow { ty, operand } => {
                let resolved = tc.resolve_type(ty, env, &span);
                *ty = resolved.clone();
                let actual = operand.type_check(tc, env, None, scope, None);
                if !tc.compatible(&actual, &resolved, env) {
                    tc.mismatch(&span, &resolved, &actual, "narrow_ can never succeed");
                } else if tc.is_subtype(&actual, &resolved, env) && !actual.is_unknown() {
                    tc.warning(
                        codes::warnings::REDUNDANT_NARROW,
                        &span,
                        format!("narrow_ to {} is redundant", resolved),
                    );
                }
                resolved
            }
            ExprKind::IsOfClass { class, operand } | ExprKind::IsOfBaseClass { class, operand } => {
                if env.registry().lookup_class(class).is_none() {
                    tc.error(
                        codes::types::UNKNOWN_CLASS,
                        &span,
                        format!("Undefined class '{}'", class),
                    );
                }
                expect_object(tc, env, scope, operand);
                Type::Bool
            }
            ExprKind::SameClass { left, right } | ExprKind::SameBaseClass { left, right } => {
                expect_object(tc, env, scope, left);
                expect_object(tc, env, scope, right);
                Type::Bool
            }

            ExprKind::Pre { function, args } => {
                let ty = function.type_check(tc, env, None, scope, None);
                if ty.function_branches().is_empty() && !ty.is_unknown() {
                    tc.error(
                        codes::types::EXPECTED_FUNCTION,
                        &function.span,
                        format!("pre_ requires a function, found {}", ty),
                    );
                }
                for arg in args.iter_mut() {
                    arg.type_check(tc, env, None, scope, None);
                }
                // A curried function's condition is itself curried; the
                // parameter lists are only known to the function value
                let curried = ty
                    .function_branches()
                    .iter()
                    .any(|f| matches!(f.result.as_ref(), Type::Function(_)));
                if curried {
                    Type::Unknown
                } else {
                    Type::Bool
                }
            }
            ExprKind::PreOp { condition, errors } => {
                expect_bool(tc, env, scope, condition);
                for err in errors.iter_mut() {
                    expect_bool(tc, env, scope, &mut err.left);
                    expect_bool(tc, env, scope, &mut err.right);
                }
                Type::Bool
            }
            ExprKind::PostOp { condition, errors } => {
                let post_scope = NameScope::NamesAndAnyState;
                expect_bool(tc, env, post_scope, condition);
                for err in errors.iter_mut() {
                    expect_bool(tc, env, post_scope, &mut err.left);
                    expect_bool(tc, env, post_scope, &mut err.right);
                }
                Type::Bool
            }
            ExprKind::History { op, operations } => {
                let op = *op;
                check_history(tc, env, op, operations, &span)
            }
        }
    }
}

fn check_variable(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    qualifiers: Option<&[Type]>,
    scope: NameScope,
    name: &Name,
    old: bool,
    span: &Span,
) -> Type {
    if let (Some(quals), Some(class)) = (qualifiers, env.enclosing_class()) {
        let overloads = env.registry().find_overloads(class, &name.ident);
        if overloads.len() > 1 {
            let members: Vec<&Member> = overloads.into_iter().map(|(_, m)| m).collect();
            return select_overload(tc, env, &members, quals, &name.ident, span);
        }
    }

    let binding = env
        .lookup(&name.to_string())
        .or_else(|| {
            if name.module.is_some() {
                env.lookup(&name.ident)
            } else {
                None
            }
        })
        .cloned();

    let Some(binding) = binding else {
        tc.error(
            codes::types::UNKNOWN_IDENTIFIER,
            span,
            format!("Name '{}' is not in scope", name),
        );
        return Type::Unknown;
    };

    if old && !scope.allows_old_state() {
        tc.error(
            codes::classes::OLD_NAME_OUTSIDE_POST,
            span,
            format!("Old name '{}~' is only allowed in postconditions", name),
        );
    }
    if binding.kind == BindingKind::State && !scope.allows_state() {
        tc.error(
            codes::types::STATE_NOT_ACCESSIBLE,
            span,
            format!("State component '{}' cannot be read here", name),
        );
    }
    if binding.is_polymorphic() {
        tc.error(
            codes::types::UNINSTANTIATED_POLYMORPHIC,
            span,
            format!("Polymorphic function '{}' used without instantiation", name),
        );
    }
    binding.ty
}

/// Pick the overload whose parameters accept the qualifier types
fn select_overload(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    members: &[&Member],
    qualifiers: &[Type],
    name: &str,
    span: &Span,
) -> Type {
    let accepts = |params: &[Type]| {
        params.len() == qualifiers.len()
            && params
                .iter()
                .zip(qualifiers.iter())
                .all(|(p, q)| tc.compatible(q, p, env))
    };
    let chosen = members.iter().find(|m| match &m.binding.ty {
        Type::Function(f) => accepts(&f.params),
        Type::Operation(o) => accepts(&o.params),
        _ => false,
    });
    match chosen {
        Some(member) => member.binding.ty.clone(),
        None => {
            tc.error(
                codes::classes::NO_MATCHING_OVERLOAD,
                span,
                format!("No overload of '{}' accepts these arguments", name),
            );
            Type::Unknown
        }
    }
}

fn expect_bool(tc: &mut TypeChecker, env: &TypeEnv<'_>, scope: NameScope, expr: &mut TcExpr) {
    let ty = expr.type_check(tc, env, None, scope, None);
    if !ty.is_bool() {
        tc.error(
            codes::types::EXPECTED_BOOL,
            &expr.span,
            format!("Expecting a boolean expression, found {}", ty),
        );
    }
}

/// Check a numeric operand and return its numeric branches
fn expect_numeric(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    scope: NameScope,
    expr: &mut TcExpr,
) -> Vec<Type> {
    let ty = expr.type_check(tc, env, None, scope, None);
    let branches = ty.numeric_branches();
    if branches.is_empty() {
        tc.error(
            codes::types::EXPECTED_NUMERIC,
            &expr.span,
            format!("Expecting a numeric expression, found {}", ty),
        );
    }
    branches
}

/// Check a set operand and return its element type and non-emptiness
fn expect_set(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    scope: NameScope,
    expr: &mut TcExpr,
) -> (Type, bool) {
    let ty = expr.type_check(tc, env, None, scope, None);
    let branches = ty.set_branches();
    if branches.is_empty() {
        tc.error(
            codes::types::EXPECTED_SET,
            &expr.span,
            format!("Expecting a set, found {}", ty),
        );
        return (Type::Unknown, false);
    }
    let non_empty = branches.iter().all(|(_, ne)| *ne);
    (Type::union(branches.into_iter().map(|(t, _)| t)), non_empty)
}

fn expect_seq(tc: &mut TypeChecker, env: &TypeEnv<'_>, scope: NameScope, expr: &mut TcExpr) -> Type {
    expect_seq_ne(tc, env, scope, expr).0
}

fn expect_seq_ne(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    scope: NameScope,
    expr: &mut TcExpr,
) -> (Type, bool) {
    let ty = expr.type_check(tc, env, None, scope, None);
    let branches = ty.seq_branches();
    if branches.is_empty() {
        tc.error(
            codes::types::EXPECTED_SEQ,
            &expr.span,
            format!("Expecting a sequence, found {}", ty),
        );
        return (Type::Unknown, false);
    }
    let non_empty = branches.iter().all(|(_, ne)| *ne);
    (Type::union(branches.into_iter().map(|(t, _)| t)), non_empty)
}

/// Check a map operand and return domain, range and injectivity
fn expect_map(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    scope: NameScope,
    expr: &mut TcExpr,
) -> (Type, Type, bool) {
    let ty = expr.type_check(tc, env, None, scope, None);
    let branches = ty.map_branches();
    if branches.is_empty() {
        tc.error(
            codes::types::EXPECTED_MAP,
            &expr.span,
            format!("Expecting a map, found {}", ty),
        );
        return (Type::Unknown, Type::Unknown, false);
    }
    let injective = branches.iter().all(|(_, _, inj)| *inj);
    let from = Type::union(branches.iter().map(|(f, _, _)| f.clone()));
    let to = Type::union(branches.iter().map(|(_, t, _)| t.clone()));
    (from, to, injective)
}

fn expect_object(tc: &mut TypeChecker, env: &TypeEnv<'_>, scope: NameScope, expr: &mut TcExpr) {
    let ty = expr.type_check(tc, env, None, scope, None);
    if ty.class_branches().is_empty() && !ty.is_unknown() {
        tc.error(
            codes::types::EXPECTED_OBJECT,
            &expr.span,
            format!("Expecting an object reference, found {}", ty),
        );
    }
}

fn check_unary(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    scope: NameScope,
    op: UnaryOp,
    operand: &mut TcExpr,
) -> Type {
    match op {
        UnaryOp::Plus | UnaryOp::Minus | UnaryOp::Abs | UnaryOp::Floor => {
            let branches = expect_numeric(tc, env, scope, operand);
            if branches.is_empty() {
                return Type::Unknown;
            }
            Type::union(branches.iter().map(|b| match op {
                UnaryOp::Abs => abs_type(b),
                UnaryOp::Floor => floor_type(b),
                UnaryOp::Minus => negate_type(b),
                _ => b.clone(),
            }))
        }
        UnaryOp::Not => {
            expect_bool(tc, env, scope, operand);
            Type::Bool
        }
        UnaryOp::Card => {
            expect_set(tc, env, scope, operand);
            Type::Nat
        }
        UnaryOp::Power => {
            let (elem, _) = expect_set(tc, env, scope, operand);
            Type::set1_of(Type::set_of(elem))
        }
        UnaryOp::DistUnion | UnaryOp::DistInter => {
            let (elem, _) = expect_set(tc, env, scope, operand);
            match elem.set_elem() {
                Some(inner) => Type::set_of(inner),
                None => {
                    tc.error(
                        codes::types::EXPECTED_SET,
                        &operand.span,
                        format!("'{}' requires a set of sets", op.symbol()),
                    );
                    Type::Unknown
                }
            }
        }
        UnaryOp::Len => {
            expect_seq(tc, env, scope, operand);
            Type::Nat
        }
        UnaryOp::Head => {
            let (elem, non_empty) = expect_seq_ne(tc, env, scope, operand);
            if !non_empty && !elem.is_unknown() {
                tc.warning(
                    codes::warnings::MAY_FAIL,
                    &operand.span,
                    "hd applied to a sequence that may be empty",
                );
            }
            elem
        }
        UnaryOp::Tail => {
            let elem = expect_seq(tc, env, scope, operand);
            Type::seq_of(elem)
        }
        UnaryOp::Elems => {
            let (elem, non_empty) = expect_seq_ne(tc, env, scope, operand);
            Type::Set {
                elem: Box::new(elem),
                non_empty,
            }
        }
        UnaryOp::Inds => {
            let (_, non_empty) = expect_seq_ne(tc, env, scope, operand);
            Type::Set {
                elem: Box::new(Type::NatOne),
                non_empty,
            }
        }
        UnaryOp::Reverse => {
            let (elem, non_empty) = expect_seq_ne(tc, env, scope, operand);
            Type::Seq {
                elem: Box::new(elem),
                non_empty,
            }
        }
        UnaryOp::DistConc => {
            let elem = expect_seq(tc, env, scope, operand);
            match elem.seq_elem() {
                Some(inner) => Type::seq_of(inner),
                None => {
                    tc.error(
                        codes::types::EXPECTED_SEQ,
                        &operand.span,
                        "'conc' requires a sequence of sequences",
                    );
                    Type::Unknown
                }
            }
        }
        UnaryOp::Dom => {
            let (from, _, _) = expect_map(tc, env, scope, operand);
            Type::set_of(from)
        }
        UnaryOp::Rng => {
            let (_, to, _) = expect_map(tc, env, scope, operand);
            Type::set_of(to)
        }
        UnaryOp::DistMerge => {
            let (elem, _) = expect_set(tc, env, scope, operand);
            match elem.map_parts() {
                Some((from, to)) => Type::map_of(from, to),
                None => {
                    tc.error(
                        codes::types::EXPECTED_MAP,
                        &operand.span,
                        "'merge' requires a set of maps",
                    );
                    Type::Unknown
                }
            }
        }
        UnaryOp::Inverse => {
            let (from, to, injective) = expect_map(tc, env, scope, operand);
            if !injective && !(from.is_unknown() && to.is_unknown()) {
                tc.warning(
                    codes::warnings::MAY_FAIL,
                    &operand.span,
                    "inverse applied to a map that may not be injective",
                );
            }
            Type::inmap_of(to, from)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn check_binary(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    scope: NameScope,
    op: BinaryOp,
    left: &mut TcExpr,
    right: &mut TcExpr,
    constraint: Option<&Type>,
) -> Type {
    match op {
        BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Times => {
            let ls = expect_numeric(tc, env, scope, left);
            let rs = expect_numeric(tc, env, scope, right);
            if ls.is_empty() || rs.is_empty() {
                return Type::Unknown;
            }
            let mut results = Vec::new();
            for l in &ls {
                for r in &rs {
                    let (lw, rw) = (l.numeric_weight().unwrap_or(5), r.numeric_weight().unwrap_or(5));
                    results.push(match op {
                        BinaryOp::Plus => plus_type(lw, rw),
                        BinaryOp::Minus => minus_type(lw, rw),
                        _ => Type::numeric_of_weight(lw.max(rw)),
                    });
                }
            }
            prefer_constraint(tc, env, Type::union(results), constraint)
        }
        BinaryOp::Divide | BinaryOp::Div | BinaryOp::Rem | BinaryOp::Mod => {
            expect_numeric(tc, env, scope, left);
            expect_numeric(tc, env, scope, right);
            if is_zero_literal(right) {
                tc.error(
                    codes::types::DIVISION_BY_ZERO,
                    &right.span,
                    format!("Division by zero in '{}'", op.symbol()),
                );
            }
            if op == BinaryOp::Divide {
                Type::Real
            } else {
                Type::Int
            }
        }
        BinaryOp::StarStar => {
            let lt = left.type_check(tc, env, None, scope, None);
            let rt = right.type_check(tc, env, None, scope, None);
            let mut results = Vec::new();
            if !lt.map_branches().is_empty() && !lt.is_unknown() {
                results.push(lt.clone());
            }
            for f in lt.function_branches() {
                results.push(Type::Function(f.clone()));
            }
            let numeric = lt.numeric_branches();
            if !numeric.is_empty() && !lt.is_unknown() {
                results.push(if rt.is_natural() && lt.is_natural() {
                    Type::Nat
                } else if rt.is_natural() && lt.is_integral() {
                    Type::Int
                } else {
                    Type::Real
                });
            }
            if lt.is_unknown() {
                return Type::Unknown;
            }
            if results.is_empty() {
                tc.error(
                    codes::types::INCOMPATIBLE_OPERANDS,
                    &left.span,
                    format!("'**' cannot be applied to {}", lt),
                );
                return Type::Unknown;
            }
            if rt.numeric_branches().is_empty() {
                tc.error(
                    codes::types::EXPECTED_NUMERIC,
                    &right.span,
                    format!("Right operand of '**' must be numeric, found {}", rt),
                );
            }
            Type::union(results)
        }
        BinaryOp::Less | BinaryOp::LessEq | BinaryOp::Greater | BinaryOp::GreaterEq => {
            expect_numeric(tc, env, scope, left);
            expect_numeric(tc, env, scope, right);
            Type::Bool
        }
        BinaryOp::Equals | BinaryOp::NotEquals => {
            let lt = left.type_check(tc, env, None, scope, None);
            let rt = right.type_check(tc, env, None, scope, None);
            if !tc.compatible(&lt, &rt, env) {
                tc.error(
                    codes::types::INCOMPATIBLE_OPERANDS,
                    &right.span,
                    format!("Operands of '{}' have incompatible types {} and {}", op.symbol(), lt, rt),
                );
            }
            Type::Bool
        }
        BinaryOp::And | BinaryOp::Or | BinaryOp::Implies | BinaryOp::Equiv => {
            expect_bool(tc, env, scope, left);
            expect_bool(tc, env, scope, right);
            Type::Bool
        }
        BinaryOp::InSet | BinaryOp::NotInSet => {
            let lt = left.type_check(tc, env, None, scope, None);
            let (elem, _) = expect_set(tc, env, scope, right);
            if !tc.compatible(&lt, &elem, env) {
                tc.error(
                    codes::types::INCOMPATIBLE_OPERANDS,
                    &left.span,
                    format!("Element of type {} can never be in a set of {}", lt, elem),
                );
            }
            Type::Bool
        }
        BinaryOp::Union | BinaryOp::Inter | BinaryOp::Difference => {
            let (le, lne) = expect_set(tc, env, scope, left);
            let (re, rne) = expect_set(tc, env, scope, right);
            if !tc.compatible(&le, &re, env) {
                tc.error(
                    codes::types::INCOMPATIBLE_OPERANDS,
                    &right.span,
                    format!("Sets of {} and {} cannot be combined", le, re),
                );
            }
            match op {
                BinaryOp::Union => Type::Set {
                    elem: Box::new(Type::union([le, re])),
                    non_empty: lne || rne,
                },
                BinaryOp::Inter => Type::set_of(le),
                _ => Type::set_of(le),
            }
        }
        BinaryOp::Subset | BinaryOp::ProperSubset => {
            expect_set(tc, env, scope, left);
            expect_set(tc, env, scope, right);
            Type::Bool
        }
        BinaryOp::Concat => {
            let (le, lne) = expect_seq_ne(tc, env, scope, left);
            let (re, rne) = expect_seq_ne(tc, env, scope, right);
            Type::Seq {
                elem: Box::new(Type::union([le, re])),
                non_empty: lne || rne,
            }
        }
        BinaryOp::PlusPlus => {
            let lt = left.type_check(tc, env, None, scope, None);
            let (rf, rt, _) = expect_map(tc, env, scope, right);
            if lt.is_unknown() {
                return Type::Unknown;
            }
            let mut results = Vec::new();
            if let Some((lf, ltt)) = lt.map_parts() {
                results.push(Type::map_of(Type::union([lf, rf.clone()]), Type::union([ltt, rt.clone()])));
            }
            if let Some(elem) = lt.seq_elem() {
                if !rf.is_numeric() {
                    tc.error(
                        codes::types::EXPECTED_NUMERIC,
                        &right.span,
                        "Sequence modification needs a map with numeric keys",
                    );
                }
                results.push(Type::seq_of(Type::union([elem, rt])));
            }
            if results.is_empty() {
                tc.error(
                    codes::types::EXPECTED_MAP,
                    &left.span,
                    format!("'++' requires a map or sequence, found {}", lt),
                );
                return Type::Unknown;
            }
            Type::union(results)
        }
        BinaryOp::Munion => {
            let (lf, lt, _) = expect_map(tc, env, scope, left);
            let (rf, rt, _) = expect_map(tc, env, scope, right);
            Type::map_of(Type::union([lf, rf]), Type::union([lt, rt]))
        }
        BinaryOp::Comp => {
            let lt = left.type_check(tc, env, None, scope, None);
            let rt = right.type_check(tc, env, None, scope, None);
            if lt.is_unknown() || rt.is_unknown() {
                return Type::Unknown;
            }
            if let (Some((_, outer_to)), Some((inner_from, inner_to))) =
                (lt.map_parts(), rt.map_parts())
            {
                if let Some((outer_from, _)) = lt.map_parts() {
                    if !tc.compatible(&inner_to, &outer_from, env) {
                        tc.error(
                            codes::types::INCOMPATIBLE_OPERANDS,
                            &right.span,
                            "Range of the right map does not fit the domain of the left map",
                        );
                    }
                }
                return Type::map_of(inner_from, outer_to);
            }
            let outer = lt.function_branches().first().map(|f| (*f).clone());
            let inner = rt.function_branches().first().map(|f| (*f).clone());
            match (outer, inner) {
                (Some(outer), Some(inner)) => {
                    if outer.params.len() != 1 {
                        tc.error(
                            codes::types::WRONG_ARGUMENT_COUNT,
                            &left.span,
                            "The left function of 'comp' must take one argument",
                        );
                    } else if !tc.compatible(&inner.result, &outer.params[0], env) {
                        tc.error(
                            codes::types::INCOMPATIBLE_OPERANDS,
                            &right.span,
                            "Result of the right function does not fit the left function",
                        );
                    }
                    Type::Function(FunctionType {
                        params: inner.params,
                        result: outer.result,
                        partial: outer.partial || inner.partial,
                    })
                }
                _ => {
                    tc.error(
                        codes::types::INCOMPATIBLE_OPERANDS,
                        &left.span,
                        format!("'comp' requires two maps or two functions, found {} and {}", lt, rt),
                    );
                    Type::Unknown
                }
            }
        }
        BinaryOp::DomResTo | BinaryOp::DomResBy => {
            let (elem, _) = expect_set(tc, env, scope, left);
            let (from, to, injective) = expect_map(tc, env, scope, right);
            if !tc.compatible(&elem, &from, env) {
                tc.error(
                    codes::types::INCOMPATIBLE_OPERANDS,
                    &left.span,
                    format!("Set of {} cannot restrict a map from {}", elem, from),
                );
            }
            Type::Map {
                from: Box::new(from),
                to: Box::new(to),
                injective,
            }
        }
        BinaryOp::RngResTo | BinaryOp::RngResBy => {
            let (from, to, injective) = expect_map(tc, env, scope, left);
            let (elem, _) = expect_set(tc, env, scope, right);
            if !tc.compatible(&elem, &to, env) {
                tc.error(
                    codes::types::INCOMPATIBLE_OPERANDS,
                    &right.span,
                    format!("Set of {} cannot restrict a map to {}", elem, to),
                );
            }
            Type::Map {
                from: Box::new(from),
                to: Box::new(to),
                injective,
            }
        }
    }
}

/// Prefer the numeric result branches that fit inside the constraint
fn prefer_constraint(
    tc: &TypeChecker,
    env: &TypeEnv<'_>,
    ty: Type,
    constraint: Option<&Type>,
) -> Type {
    let Some(expected) = constraint else {
        return ty;
    };
    let fitting: Vec<Type> = ty
        .branches()
        .into_iter()
        .filter(|b| tc.is_subtype(b, expected, env))
        .cloned()
        .collect();
    if fitting.is_empty() {
        ty
    } else {
        Type::union(fitting)
    }
}

fn check_local_def(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    scope: NameScope,
    def: &mut LocalDef<Checked>,
) -> patterns::Definitions {
    let declared = def
        .ty
        .as_ref()
        .map(|ty| tc.resolve_type(ty, env, &def.span));
    if let Some(declared) = &declared {
        def.ty = Some(declared.clone());
    }
    let actual = def
        .value
        .type_check(tc, env, None, scope, declared.as_ref());
    let bound = declared.unwrap_or(actual);
    def.pattern.type_check(tc, env, &bound, scope)
}

fn check_mk_record(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    scope: NameScope,
    record: &Name,
    args: &mut [TcExpr],
    span: &Span,
) -> Type {
    let found = env
        .registry()
        .lookup_record(&record.to_string())
        .or_else(|| env.registry().lookup_record(&record.ident))
        .cloned();
    let Some(rt) = found else {
        tc.error(
            codes::types::UNKNOWN_TYPE,
            span,
            format!("Record type {} is not defined", record),
        );
        for arg in args.iter_mut() {
            arg.type_check(tc, env, None, scope, None);
        }
        return Type::Unknown;
    };
    if args.len() != rt.fields.len() {
        tc.error(
            codes::types::WRONG_ARGUMENT_COUNT,
            span,
            format!(
                "mk_{} expects {} arguments, found {}",
                record,
                rt.fields.len(),
                args.len()
            ),
        );
    }
    for (i, arg) in args.iter_mut().enumerate() {
        let field_ty = rt.fields.get(i).map(|f| f.ty.clone());
        arg.type_check(tc, env, None, scope, field_ty.as_ref());
    }
    Type::Record(rt)
}

fn check_field(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    qualifiers: Option<&[Type]>,
    scope: NameScope,
    object: &mut TcExpr,
    field: &str,
    span: &Span,
) -> Type {
    let ty = object.type_check(tc, env, None, scope, None);
    if ty.is_unknown() {
        return Type::Unknown;
    }
    let mut results = Vec::new();
    let records = ty.record_branches();
    for record in &records {
        if let Some(f) = record.field(field) {
            results.push(f.ty.clone());
        }
    }
    let classes: Vec<String> = ty.class_branches().iter().map(|c| c.to_string()).collect();
    for class in &classes {
        let registry = env.registry();
        let overloads = registry.find_overloads(class, field);
        if overloads.is_empty() {
            continue;
        }
        for (owner, member) in &overloads {
            if !member_visible(env, &owner.name, member.access) {
                tc.error(
                    codes::classes::MEMBER_NOT_VISIBLE,
                    span,
                    format!("Member {}`{} is not visible here", owner.name, field),
                );
            }
        }
        match qualifiers {
            Some(quals) if overloads.len() > 1 => {
                let members: Vec<&Member> = overloads.iter().map(|(_, m)| *m).collect();
                results.push(select_overload(tc, env, &members, quals, field, span));
            }
            _ => results.push(overloads[0].1.binding.ty.clone()),
        }
    }

    if results.is_empty() {
        if records.is_empty() && classes.is_empty() {
            tc.error(
                codes::types::EXPECTED_RECORD,
                span,
                format!("Field '{}' selected from a value of type {}", field, ty),
            );
        } else if classes.is_empty() {
            tc.error(
                codes::types::UNKNOWN_FIELD,
                span,
                format!("Type {} has no field '{}'", ty, field),
            );
        } else {
            tc.error(
                codes::classes::UNKNOWN_MEMBER,
                span,
                format!("Class {} has no member '{}'", ty, field),
            );
        }
        return Type::Unknown;
    }
    Type::union(results)
}

/// Access rules: public always, protected from subclasses, private from the owner
fn member_visible(env: &TypeEnv<'_>, owner: &str, access: Access) -> bool {
    match access {
        Access::Public => true,
        Access::Protected => env
            .enclosing_class()
            .map(|c| env.registry().is_subclass(c, owner))
            .unwrap_or(false),
        Access::Private => env.enclosing_class() == Some(owner),
    }
}

fn check_apply(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    scope: NameScope,
    callee: &mut TcExpr,
    args: &mut [TcExpr],
    span: &Span,
) -> Type {
    let arg_types: Vec<Type> = args
        .iter_mut()
        .map(|arg| arg.type_check(tc, env, None, scope, None))
        .collect();
    let ty = callee.type_check(tc, env, Some(&arg_types), scope, None);
    if ty.is_unknown() {
        return Type::Unknown;
    }

    let check_args = |tc: &mut TypeChecker, params: &[Type], args: &[TcExpr]| {
        if params.len() != args.len() {
            tc.error(
                codes::types::WRONG_ARGUMENT_COUNT,
                span,
                format!("Expecting {} arguments, found {}", params.len(), args.len()),
            );
            return;
        }
        for ((param, arg), arg_ty) in params.iter().zip(args.iter()).zip(arg_types.iter()) {
            if !tc.compatible(arg_ty, param, env) {
                tc.mismatch(&arg.span, param, arg_ty, "argument does not match the parameter type");
            }
        }
    };

    let mut results = Vec::new();
    for f in ty.function_branches() {
        check_args(tc, f.params.as_slice(), &*args);
        results.push((*f.result).clone());
    }
    for o in ty.operation_branches() {
        check_args(tc, o.params.as_slice(), &*args);
        tc.check_purity(env, o.pure, span);
        results.push((*o.result).clone());
    }
    for (elem, _) in ty.seq_branches() {
        if args.len() != 1 {
            tc.error(
                codes::types::WRONG_ARGUMENT_COUNT,
                span,
                "Sequence application takes exactly one index",
            );
        } else if !arg_types[0].is_numeric() {
            tc.error(
                codes::types::EXPECTED_NUMERIC,
                &args[0].span,
                format!("Sequence index must be numeric, found {}", arg_types[0]),
            );
        }
        results.push(elem);
    }
    for (from, to, _) in ty.map_branches() {
        if args.len() != 1 {
            tc.error(
                codes::types::WRONG_ARGUMENT_COUNT,
                span,
                "Map application takes exactly one key",
            );
        } else if !tc.compatible(&arg_types[0], &from, env) {
            tc.mismatch(&args[0].span, &from, &arg_types[0], "key does not match the map domain");
        }
        results.push(to);
    }

    if results.is_empty() {
        tc.error(
            codes::types::EXPECTED_FUNCTION,
            &callee.span,
            format!("Value of type {} cannot be applied", ty),
        );
        return Type::Unknown;
    }
    Type::union(results)
}

fn check_instantiate(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    scope: NameScope,
    function: &mut TcExpr,
    actuals: &mut [Type],
    span: &Span,
) -> Type {
    let binding = match &function.kind {
        ExprKind::Variable { name, .. } => env.lookup(&name.to_string()).cloned(),
        _ => None,
    };
    let Some(binding) = binding else {
        let ty = function.type_check(tc, env, None, scope, None);
        if !ty.is_unknown() {
            tc.error(
                codes::types::NOT_POLYMORPHIC,
                span,
                format!("Value of type {} is not a polymorphic function", ty),
            );
        }
        return Type::Unknown;
    };

    function.info = Some(binding.ty.clone());
    let type_params = match &binding.kind {
        BindingKind::Function { type_params } if !type_params.is_empty() => type_params.clone(),
        _ => {
            tc.error(
                codes::types::NOT_POLYMORPHIC,
                span,
                "Function is not polymorphic",
            );
            return binding.ty;
        }
    };
    if type_params.len() != actuals.len() {
        tc.error(
            codes::types::WRONG_TYPE_PARAM_COUNT,
            span,
            format!(
                "Expecting {} type parameters, found {}",
                type_params.len(),
                actuals.len()
            ),
        );
        return Type::Unknown;
    }

    let mut bindings = HashMap::new();
    for (param, actual) in type_params.iter().zip(actuals.iter_mut()) {
        let resolved = tc.resolve_type(actual, env, span);
        *actual = resolved.clone();
        bindings.insert(param.clone(), resolved);
    }
    binding.ty.substitute(&bindings)
}

fn check_history(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    op: HistoryOp,
    operations: &[String],
    span: &Span,
) -> Type {
    let Some(class) = env.enclosing_class() else {
        tc.error(
            codes::classes::SELF_OUTSIDE_CLASS,
            span,
            format!("{} is only available inside a class", op.symbol()),
        );
        return Type::Nat;
    };
    for name in operations {
        let is_operation = env
            .registry()
            .find_member(class, name)
            .map(|(_, m)| m.binding.kind == BindingKind::Operation)
            .unwrap_or(false);
        if !is_operation {
            tc.error(
                codes::classes::UNKNOWN_MEMBER,
                span,
                format!("{} is not an operation of class {}", name, class),
            );
        }
    }
    Type::Nat
}

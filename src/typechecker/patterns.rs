//! Static checking of patterns and binds
//!
//! A pattern is checked against the type of the values it will be matched
//! with and yields the names it defines. Binds additionally check their value
//! source and report the element type the pattern ranges over.

use crate::diagnostics::error_codes as codes;
use crate::syntax::{Bind, Checked, MultipleBind, PatternKind, TcPattern};

use super::expr::literal_type;
use super::*;

/// Names introduced by a pattern, with their types
pub type Definitions = Vec<(String, Type)>;

impl TcPattern {
    /// Check the pattern against the type of the matched value
    pub fn type_check(
        &mut self,
        tc: &mut TypeChecker,
        env: &TypeEnv<'_>,
        expected: &Type,
        scope: NameScope,
    ) -> Definitions {
        let mut defs = Definitions::new();
        self.check_into(tc, env, expected, scope, &mut defs);
        defs
    }

    fn check_into(
        &mut self,
        tc: &mut TypeChecker,
        env: &TypeEnv<'_>,
        expected: &Type,
        scope: NameScope,
        defs: &mut Definitions,
    ) {
        let span = self.span.clone();
        match &mut self.kind {
            PatternKind::Identifier(name) => defs.push((name.clone(), expected.clone())),
            PatternKind::Ignore => {}
            PatternKind::Literal(lit) => {
                let ty = literal_type(lit);
                if !tc.compatible(&ty, expected, env) {
                    tc.error(
                        codes::types::PATTERN_TYPE_MISMATCH,
                        &span,
                        format!("Pattern of type {} cannot match a value of type {}", ty, expected),
                    );
                }
            }
            PatternKind::Expression(expr) => {
                let ty = expr.type_check(tc, env, None, scope, None);
                if !tc.compatible(&ty, expected, env) {
                    tc.error(
                        codes::types::PATTERN_TYPE_MISMATCH,
                        &span,
                        format!("Pattern of type {} cannot match a value of type {}", ty, expected),
                    );
                }
            }
            PatternKind::Tuple(items) => {
                let arity = items.len();
                let products: Vec<Vec<Type>> = expected
                    .product_branches()
                    .into_iter()
                    .filter(|p| p.len() == arity)
                    .cloned()
                    .collect();
                if products.is_empty() && !expected.is_unknown() {
                    tc.error(
                        codes::types::PATTERN_TYPE_MISMATCH,
                        &span,
                        format!("Tuple pattern of {} items cannot match {}", arity, expected),
                    );
                }
                for (i, item) in items.iter_mut().enumerate() {
                    let item_ty = if products.is_empty() {
                        Type::Unknown
                    } else {
                        Type::union(products.iter().map(|p| p[i].clone()))
                    };
                    item.check_into(tc, env, &item_ty, scope, defs);
                }
            }
            PatternKind::Record { record, fields } => {
                let Some(rt) = env.registry().lookup_record(&record.ident).cloned() else {
                    tc.error(
                        codes::types::UNKNOWN_TYPE,
                        &span,
                        format!("Record type {} is not defined", record),
                    );
                    for field in fields.iter_mut() {
                        field.check_into(tc, env, &Type::Unknown, scope, defs);
                    }
                    return;
                };
                let record_ty = Type::Record(rt.clone());
                if !tc.compatible(&record_ty, expected, env) {
                    tc.error(
                        codes::types::PATTERN_TYPE_MISMATCH,
                        &span,
                        format!("Record pattern {} cannot match {}", record, expected),
                    );
                }
                if fields.len() != rt.fields.len() {
                    tc.error(
                        codes::types::WRONG_ARGUMENT_COUNT,
                        &span,
                        format!(
                            "Record pattern {} has {} fields, expected {}",
                            record,
                            fields.len(),
                            rt.fields.len()
                        ),
                    );
                }
                for (i, field) in fields.iter_mut().enumerate() {
                    let field_ty = rt
                        .fields
                        .get(i)
                        .map(|f| f.ty.clone())
                        .unwrap_or(Type::Unknown);
                    field.check_into(tc, env, &field_ty, scope, defs);
                }
            }
            PatternKind::Set(items) => {
                let elem = collection_elem(tc, &span, expected.set_elem(), "set", expected);
                for item in items.iter_mut() {
                    item.check_into(tc, env, &elem, scope, defs);
                }
            }
            PatternKind::Seq(items) => {
                let elem = collection_elem(tc, &span, expected.seq_elem(), "sequence", expected);
                for item in items.iter_mut() {
                    item.check_into(tc, env, &elem, scope, defs);
                }
            }
            PatternKind::Union(left, right) => {
                let elem = collection_elem(tc, &span, expected.set_elem(), "set", expected);
                let set_ty = Type::set_of(elem);
                left.check_into(tc, env, &set_ty, scope, defs);
                right.check_into(tc, env, &set_ty, scope, defs);
            }
            PatternKind::Concat(left, right) => {
                let elem = collection_elem(tc, &span, expected.seq_elem(), "sequence", expected);
                let seq_ty = Type::seq_of(elem);
                left.check_into(tc, env, &seq_ty, scope, defs);
                right.check_into(tc, env, &seq_ty, scope, defs);
            }
            PatternKind::Map(maplets) => {
                let (from, to) = map_parts(tc, &span, expected);
                for (key, value) in maplets.iter_mut() {
                    key.check_into(tc, env, &from, scope, defs);
                    value.check_into(tc, env, &to, scope, defs);
                }
            }
            PatternKind::MapUnion(left, right) => {
                let (from, to) = map_parts(tc, &span, expected);
                let map_ty = Type::map_of(from, to);
                left.check_into(tc, env, &map_ty, scope, defs);
                right.check_into(tc, env, &map_ty, scope, defs);
            }
        }
    }
}

fn collection_elem(
    tc: &mut TypeChecker,
    span: &crate::diagnostics::Span,
    elem: Option<Type>,
    what: &str,
    expected: &Type,
) -> Type {
    match elem {
        Some(elem) => elem,
        None => {
            tc.error(
                codes::types::PATTERN_TYPE_MISMATCH,
                span,
                format!("{} pattern cannot match {}", capitalize(what), expected),
            );
            Type::Unknown
        }
    }
}

fn map_parts(tc: &mut TypeChecker, span: &crate::diagnostics::Span, expected: &Type) -> (Type, Type) {
    match expected.map_parts() {
        Some(parts) => parts,
        None => {
            tc.error(
                codes::types::PATTERN_TYPE_MISMATCH,
                span,
                format!("Map pattern cannot match {}", expected),
            );
            (Type::Unknown, Type::Unknown)
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Check a bind's value source, returning the element type it ranges over
fn check_source(
    tc: &mut TypeChecker,
    env: &TypeEnv<'_>,
    scope: NameScope,
    source: BindSource<'_>,
) -> Type {
    match source {
        BindSource::Set(set) => {
            let ty = set.type_check(tc, env, None, scope, None);
            match ty.set_elem() {
                Some(elem) => elem,
                None => {
                    tc.error(
                        codes::types::EXPECTED_SET,
                        &set.span,
                        format!("Bind source must be a set, found {}", ty),
                    );
                    Type::Unknown
                }
            }
        }
        BindSource::Seq(seq) => {
            let ty = seq.type_check(tc, env, None, scope, None);
            match ty.seq_elem() {
                Some(elem) => elem,
                None => {
                    tc.error(
                        codes::types::EXPECTED_SEQ,
                        &seq.span,
                        format!("Bind source must be a sequence, found {}", ty),
                    );
                    Type::Unknown
                }
            }
        }
        BindSource::Type(ty, span) => {
            let resolved = tc.resolve_type(ty, env, span);
            *ty = resolved.clone();
            resolved
        }
    }
}

enum BindSource<'a> {
    Set(&'a mut crate::syntax::TcExpr),
    Seq(&'a mut crate::syntax::TcExpr),
    Type(&'a mut Type, &'a crate::diagnostics::Span),
}

impl Bind<Checked> {
    /// Check the bind; returns the definitions and the element type
    pub fn type_check(
        &mut self,
        tc: &mut TypeChecker,
        env: &TypeEnv<'_>,
        scope: NameScope,
    ) -> (Definitions, Type) {
        let (pattern, elem) = match self {
            Bind::Set { pattern, set } => {
                let elem = check_source(tc, env, scope, BindSource::Set(set));
                (pattern, elem)
            }
            Bind::Seq { pattern, seq } => {
                let elem = check_source(tc, env, scope, BindSource::Seq(seq));
                (pattern, elem)
            }
            Bind::Type { pattern, ty } => {
                let span = pattern.span.clone();
                let elem = check_source(tc, env, scope, BindSource::Type(ty, &span));
                (pattern, elem)
            }
        };
        let defs = pattern.type_check(tc, env, &elem, scope);
        (defs, elem)
    }
}

impl MultipleBind<Checked> {
    /// Check the bind; returns the definitions of every pattern
    pub fn type_check(
        &mut self,
        tc: &mut TypeChecker,
        env: &TypeEnv<'_>,
        scope: NameScope,
    ) -> Definitions {
        let (patterns, elem) = match self {
            MultipleBind::Set { patterns, set } => {
                let elem = check_source(tc, env, scope, BindSource::Set(set));
                (patterns, elem)
            }
            MultipleBind::Seq { patterns, seq } => {
                let elem = check_source(tc, env, scope, BindSource::Seq(seq));
                (patterns, elem)
            }
            MultipleBind::Type { patterns, ty } => {
                let span = patterns
                    .first()
                    .map(|p| p.span.clone())
                    .unwrap_or_default();
                let elem = check_source(tc, env, scope, BindSource::Type(ty, &span));
                (patterns, elem)
            }
        };
        let mut defs = Definitions::new();
        for pattern in patterns.iter_mut() {
            defs.extend(pattern.type_check(tc, env, &elem, scope));
        }
        defs
    }
}

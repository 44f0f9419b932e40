//! Type manipulation operations for the type checker.
//!
//! Contains `resolve_type`, `compatible`, `is_subtype` and `narrow_to`.
//! Compatibility is the "could some value belong to both" relation used for
//! operands and constraints; subtyping is the stricter relation used where a
//! value must fit a declared type.

use super::*;

/// Methods on `TypeChecker` for type resolution and comparison
impl TypeChecker {
    /// Resolve names written in source types against the environment
    pub fn resolve_type(&mut self, ty: &Type, env: &TypeEnv<'_>, span: &Span) -> Type {
        match ty {
            Type::Unresolved(name) => {
                if env.has_type_param(name) {
                    return Type::Param(name.clone());
                }
                if let Some(def) = env.registry().lookup_type(name) {
                    return def.to_type();
                }
                if env.registry().lookup_class(name).is_some() {
                    return Type::Class(name.clone());
                }
                self.error(
                    codes::types::UNKNOWN_TYPE,
                    span,
                    format!("Undefined type '{}'", name),
                );
                Type::Unknown
            }
            Type::Set { elem, non_empty } => Type::Set {
                elem: Box::new(self.resolve_type(elem, env, span)),
                non_empty: *non_empty,
            },
            Type::Seq { elem, non_empty } => Type::Seq {
                elem: Box::new(self.resolve_type(elem, env, span)),
                non_empty: *non_empty,
            },
            Type::Map {
                from,
                to,
                injective,
            } => Type::Map {
                from: Box::new(self.resolve_type(from, env, span)),
                to: Box::new(self.resolve_type(to, env, span)),
                injective: *injective,
            },
            Type::Product(items) => {
                Type::Product(items.iter().map(|t| self.resolve_type(t, env, span)).collect())
            }
            Type::Union(items) => {
                let resolved: Vec<Type> =
                    items.iter().map(|t| self.resolve_type(t, env, span)).collect();
                Type::union(resolved)
            }
            Type::Optional(inner) => Type::optional(self.resolve_type(inner, env, span)),
            Type::Function(f) => Type::Function(FunctionType {
                params: f
                    .params
                    .iter()
                    .map(|t| self.resolve_type(t, env, span))
                    .collect(),
                result: Box::new(self.resolve_type(&f.result, env, span)),
                partial: f.partial,
            }),
            Type::Operation(o) => Type::Operation(OperationType {
                params: o
                    .params
                    .iter()
                    .map(|t| self.resolve_type(t, env, span))
                    .collect(),
                result: Box::new(self.resolve_type(&o.result, env, span)),
                pure: o.pure,
            }),
            Type::Class(name) => {
                if env.registry().lookup_class(name).is_none() {
                    self.error(
                        codes::types::UNKNOWN_CLASS,
                        span,
                        format!("Undefined class '{}'", name),
                    );
                }
                ty.clone()
            }
            _ => ty.clone(),
        }
    }

    /// True if some value could belong to both types
    pub fn compatible(&self, a: &Type, b: &Type, env: &TypeEnv<'_>) -> bool {
        let a = a.deref_named();
        let b = b.deref_named();

        if a.is_unknown() || b.is_unknown() {
            return true;
        }
        if let Type::Union(members) = a {
            return members.iter().any(|m| self.compatible(m, b, env));
        }
        if let Type::Union(members) = b {
            return members.iter().any(|m| self.compatible(a, m, env));
        }

        match (a, b) {
            (Type::Optional(x), Type::Optional(y)) => self.compatible(x, y, env),
            (Type::Optional(x), other) | (other, Type::Optional(x)) => {
                self.compatible(x, other, env)
            }
            (x, y) if x.numeric_weight().is_some() && y.numeric_weight().is_some() => true,
            (Type::Set { elem: x, .. }, Type::Set { elem: y, .. })
            | (Type::Seq { elem: x, .. }, Type::Seq { elem: y, .. }) => self.compatible(x, y, env),
            (
                Type::Map {
                    from: f1, to: t1, ..
                },
                Type::Map {
                    from: f2, to: t2, ..
                },
            ) => self.compatible(f1, f2, env) && self.compatible(t1, t2, env),
            (Type::Product(xs), Type::Product(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys.iter())
                        .all(|(x, y)| self.compatible(x, y, env))
            }
            (Type::Record(x), Type::Record(y)) => x.name == y.name,
            (Type::Function(f), Type::Function(g)) => {
                f.params.len() == g.params.len()
                    && f
                        .params
                        .iter()
                        .zip(g.params.iter())
                        .all(|(x, y)| self.compatible(x, y, env))
                    && self.compatible(&f.result, &g.result, env)
            }
            (Type::Operation(f), Type::Operation(g)) => {
                f.params.len() == g.params.len()
                    && f
                        .params
                        .iter()
                        .zip(g.params.iter())
                        .all(|(x, y)| self.compatible(x, y, env))
                    && self.compatible(&f.result, &g.result, env)
            }
            (Type::Class(x), Type::Class(y)) => {
                let registry = env.registry();
                registry.is_subclass(x, y) || registry.is_subclass(y, x)
            }
            (x, y) => x == y,
        }
    }

    /// True if every value of `sub` is a value of `sup`
    pub fn is_subtype(&self, sub: &Type, sup: &Type, env: &TypeEnv<'_>) -> bool {
        let sub = sub.deref_named();
        let sup = sup.deref_named();

        if sub.is_unknown() || sup.is_unknown() {
            return true;
        }
        if let Type::Union(members) = sub {
            return members.iter().all(|m| self.is_subtype(m, sup, env));
        }
        if let Type::Union(members) = sup {
            return members.iter().any(|m| self.is_subtype(sub, m, env));
        }

        match (sub, sup) {
            (Type::Optional(x), Type::Optional(y)) => self.is_subtype(x, y, env),
            (x, Type::Optional(y)) => self.is_subtype(x, y, env),
            (Type::Optional(_), _) => false,
            (x, y) if x.numeric_weight().is_some() && y.numeric_weight().is_some() => {
                x.numeric_weight() <= y.numeric_weight()
            }
            (
                Type::Set {
                    elem: x,
                    non_empty: n1,
                },
                Type::Set {
                    elem: y,
                    non_empty: n2,
                },
            )
            | (
                Type::Seq {
                    elem: x,
                    non_empty: n1,
                },
                Type::Seq {
                    elem: y,
                    non_empty: n2,
                },
            ) => (*n1 || !*n2) && self.is_subtype(x, y, env),
            (
                Type::Map {
                    from: f1,
                    to: t1,
                    injective: i1,
                },
                Type::Map {
                    from: f2,
                    to: t2,
                    injective: i2,
                },
            ) => (*i1 || !*i2) && self.is_subtype(f1, f2, env) && self.is_subtype(t1, t2, env),
            (Type::Product(xs), Type::Product(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys.iter())
                        .all(|(x, y)| self.is_subtype(x, y, env))
            }
            (Type::Record(x), Type::Record(y)) => x.name == y.name,
            (Type::Class(x), Type::Class(y)) => env.registry().is_subclass(x, y),
            (Type::Function(_), Type::Function(_)) | (Type::Operation(_), Type::Operation(_)) => {
                self.compatible(sub, sup, env)
            }
            (x, y) => x == y,
        }
    }

    /// Keep only the branches of `ty` compatible with `constraint`.
    ///
    /// Falls back to `ty` itself when no branch survives, so the caller can
    /// still report the mismatch against the original type.
    pub fn narrow_to(&self, ty: &Type, constraint: &Type, env: &TypeEnv<'_>) -> Type {
        let branches = ty.branches();
        if branches.len() < 2 {
            return ty.clone();
        }
        let kept: Vec<Type> = branches
            .into_iter()
            .filter(|b| self.compatible(b, constraint, env))
            .cloned()
            .collect();
        if kept.is_empty() {
            ty.clone()
        } else {
            Type::union(kept)
        }
    }
}

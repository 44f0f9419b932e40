//! Type checker for VDM expressions
//!
//! Each node of an [`Expr<Checked>`](crate::syntax::TcExpr) computes its type
//! from a [`TypeEnv`], an optional expected-type constraint and optional
//! qualifiers (argument types used to pick between overloads). Findings are
//! recorded in the checker's [`DiagnosticBag`]; checking always runs to the
//! end of the tree so that one pass reports every problem.

use crate::diagnostics::error_codes as codes;
use crate::diagnostics::{Diagnostic, DiagnosticBag, Note, Span};
use crate::settings::CheckerSettings;
use crate::syntax::TcExpr;

pub mod env;
pub mod expr;
pub mod patterns;
pub mod type_ops;
pub mod types;

pub use env::{
    Access, Binding, BindingKind, ClassDef, Member, NameScope, Registry, TypeDefinition, TypeEnv,
};
pub use types::{Field, FunctionType, NamedType, OperationType, RecordType, Type};

/// Type checker
#[derive(Debug, Default)]
pub struct TypeChecker {
    /// Diagnostics collected during checking
    diagnostics: DiagnosticBag,
    /// Checker options
    settings: CheckerSettings,
}

impl TypeChecker {
    /// Create a new type checker with default (lenient) settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a type checker with explicit settings
    pub fn with_settings(settings: CheckerSettings) -> Self {
        Self {
            diagnostics: DiagnosticBag::new(),
            settings,
        }
    }

    /// Check a top-level expression with state visible and no constraint
    pub fn check(&mut self, expr: &mut TcExpr, env: &TypeEnv<'_>) -> Type {
        expr.type_check(self, env, None, NameScope::NamesAndState, None)
    }

    /// Check an expression against an expected type
    pub fn check_against(&mut self, expr: &mut TcExpr, env: &TypeEnv<'_>, expected: &Type) -> Type {
        expr.type_check(self, env, None, NameScope::NamesAndState, Some(expected))
    }

    /// Check an expression, returning the diagnostics if any error was found
    pub fn check_expr(
        &mut self,
        expr: &mut TcExpr,
        env: &TypeEnv<'_>,
    ) -> Result<Type, DiagnosticBag> {
        let ty = self.check(expr, env);
        if self.diagnostics.has_errors() {
            Err(self.diagnostics.clone())
        } else {
            Ok(ty)
        }
    }

    /// Get diagnostics (including non-error diagnostics like warnings)
    pub fn diagnostics(&self) -> &DiagnosticBag {
        &self.diagnostics
    }

    /// Consume the checker, keeping its diagnostics
    pub fn into_diagnostics(self) -> DiagnosticBag {
        self.diagnostics
    }

    pub fn is_strict(&self) -> bool {
        self.settings.strict
    }

    pub(crate) fn error(&mut self, code: &str, span: &Span, message: impl Into<String>) {
        self.diagnostics.push(
            Diagnostic::error(code)
                .message(message)
                .span(span.clone())
                .build(),
        );
    }

    pub(crate) fn warning(&mut self, code: &str, span: &Span, message: impl Into<String>) {
        self.diagnostics.push(
            Diagnostic::warning(code)
                .message(message)
                .span(span.clone())
                .build(),
        );
    }

    /// Report a type mismatch between an expected and an actual type
    pub(crate) fn mismatch(&mut self, span: &Span, expected: &Type, actual: &Type, note: &str) {
        self.diagnostics.push(
            Diagnostic::error(codes::types::TYPE_MISMATCH)
                .message(format!("Expected {}, found {}", expected, actual))
                .span(span.clone())
                .note(Note::new(note))
                .build(),
        );
    }

    /// Apply the expected-type constraint to a computed type.
    ///
    /// Compatible results are narrowed to the constraint's branches;
    /// incompatible ones are reported and returned unchanged.
    pub(crate) fn constrain(
        &mut self,
        ty: Type,
        constraint: Option<&Type>,
        env: &TypeEnv<'_>,
        span: &Span,
    ) -> Type {
        match constraint {
            Some(expected) if !self.compatible(&ty, expected, env) => {
                self.mismatch(span, expected, &ty, "required by the enclosing expression");
                ty
            }
            Some(expected) => self.narrow_to(&ty, expected, env),
            None => ty,
        }
    }

    /// A call to an impure operation from a function or pure operation
    pub(crate) fn check_purity(&mut self, env: &TypeEnv<'_>, pure_callee: bool, span: &Span) {
        if env.is_functional() {
            self.error(
                codes::classes::OPERATION_IN_FUNCTION,
                span,
                "Cannot call an operation from a function",
            );
        } else if env.is_pure() && !pure_callee {
            if self.settings.strict {
                self.error(
                    codes::classes::IMPURE_IN_PURE,
                    span,
                    "Pure operation cannot call an impure operation",
                );
            } else {
                self.warning(
                    codes::warnings::IMPURE_IN_PURE,
                    span,
                    "Pure operation calls an impure operation",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests;

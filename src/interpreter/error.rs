//! Runtime error types for the evaluator.

use std::fmt;

use thiserror::Error;

use crate::diagnostics::error_codes::runtime as codes;
use crate::diagnostics::Span;

/// Runtime error with error code and message
#[derive(Debug, Clone, Error)]
#[error("[{code}] {message}{}", location(.span))]
pub struct RuntimeError {
    /// Error code (4xxx series)
    pub code: u32,
    /// Human-readable error message
    pub message: String,
    /// Location of the node that failed
    pub span: Option<Span>,
    /// The failure this one was raised in response to
    #[source]
    pub cause: Option<Box<RuntimeError>>,
}

fn location(span: &Option<Span>) -> String {
    match span {
        Some(span) => format!("\n  --> {}", span),
        None => String::new(),
    }
}

/// Result of evaluating a node
pub type EvalResult<T> = Result<T, RuntimeError>;

impl RuntimeError {
    /// Create a new runtime error
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            span: None,
            cause: None,
        }
    }

    /// Attach a source location, keeping the innermost one if already set
    pub fn with_span(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    /// Record the failure that led to this one
    pub fn caused_by(mut self, cause: RuntimeError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The innermost failure of a cause chain
    pub fn root_cause(&self) -> &RuntimeError {
        match &self.cause {
            Some(cause) => cause.root_cause(),
            None => self,
        }
    }

    pub fn division_by_zero() -> Self {
        Self::new(codes::DIVISION_BY_ZERO, "Division by zero")
    }

    /// A value of the wrong kind reached an operator
    pub fn expected(code: u32, what: &str, found: &impl fmt::Display) -> Self {
        Self::new(code, format!("Expecting {}, found {}", what, found))
    }

    pub fn name_not_found(name: &str) -> Self {
        Self::new(codes::NAME_NOT_FOUND, format!("Name '{}' not found", name))
    }

    pub fn arity_mismatch(expected: usize, got: usize) -> Self {
        Self::new(
            codes::ARITY_MISMATCH,
            format!("Expecting {} arguments, found {}", expected, got),
        )
    }

    pub fn is_invariant_failure(&self) -> bool {
        crate::diagnostics::error_codes::is_invariant_code(self.code)
    }
}

impl miette::Diagnostic for RuntimeError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("vdmx::runtime::{}", self.code)))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.cause
            .as_ref()
            .map(|cause| -> Box<dyn fmt::Display + 'a> { Box::new(format!("caused by: {}", cause)) })
    }
}

/// Check that `args` has exactly `expected` elements, returning an arity error if not.
pub fn check_arity<T>(args: &[T], expected: usize) -> EvalResult<()> {
    if args.len() != expected {
        Err(RuntimeError::arity_mismatch(expected, args.len()))
    } else {
        Ok(())
    }
}

/// A value did not have the shape a pattern requires.
///
/// This is control flow: `cases`, quantifiers and comprehensions skip the
/// alternative instead of failing.
#[derive(Debug, Clone, Error)]
#[error("{value} does not match pattern {pattern}")]
pub struct PatternMatchError {
    pub pattern: String,
    pub value: String,
}

/// Outcome of a failed match
#[derive(Debug, Clone, Error)]
pub enum MatchError {
    #[error(transparent)]
    NoMatch(#[from] PatternMatchError),
    /// Evaluating an expression pattern failed
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl MatchError {
    pub fn no_match(pattern: &impl fmt::Display, value: &impl fmt::Display) -> Self {
        MatchError::NoMatch(PatternMatchError {
            pattern: pattern.to_string(),
            value: value.to_string(),
        })
    }

    /// Where a match must succeed, a mismatch becomes a runtime failure
    pub fn into_runtime(self) -> RuntimeError {
        match self {
            MatchError::NoMatch(err) => RuntimeError::new(codes::PATTERN_MISMATCH, err.to_string()),
            MatchError::Runtime(err) => err,
        }
    }
}

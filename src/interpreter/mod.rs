//! Evaluator for runtime expression trees
//!
//! Values, contexts and the quantifier engine live in submodules; this
//! module provides the [`Interpreter`] entry point that sets up a root
//! context holding the global definitions and evaluates trees in it.

use std::sync::Arc;

use thiserror::Error;

use crate::remap::{self, RemapError};
use crate::settings::Settings;
use crate::syntax::{InExpr, TcExpr};

pub mod apply;
pub mod context;
pub mod convert;
pub mod error;
pub mod eval;
pub mod numeric;
pub mod ops;
pub mod pattern;
pub mod quantifier;
pub mod updatable;
pub mod value;

pub use context::{Clock, Context, ContextKind, EvalHooks, SystemClock, ThreadState};
pub use error::{EvalResult, MatchError, PatternMatchError, RuntimeError};
pub use numeric::{Numeric, NumericKind};
pub use pattern::Bindings;
pub use quantifier::{MaybeReason, Verdict};
pub use updatable::{UpdatableValue, ValueListener};
pub use value::{
    FunctionBody, FunctionValue, HistoryCounters, ObjectRef, ObjectValue, OperationBody,
    OperationValue, RecordValue, Value,
};

/// Failure of [`Interpreter::run`]
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Remap(#[from] RemapError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Evaluates expressions against a set of global definitions
#[derive(Debug)]
pub struct Interpreter {
    settings: Settings,
    globals: Bindings,
    hooks: Option<Arc<dyn EvalHooks>>,
    clock: Option<Arc<dyn Clock>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Interpreter {
    /// Create an interpreter. The arithmetic precision is not taken from
    /// `settings`; see [`Settings::apply`].
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            globals: Bindings::new(),
            hooks: None,
            clock: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn EvalHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Add a global definition; later definitions hide earlier ones
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.globals.push(name, value);
    }

    /// Fresh per-thread state for one top-level evaluation
    pub fn thread(&self) -> Arc<ThreadState> {
        let mut thread = ThreadState::new(&self.settings);
        if let Some(hooks) = &self.hooks {
            thread = thread.with_hooks(Arc::clone(hooks));
        }
        if let Some(clock) = &self.clock {
            thread = thread.with_clock(Arc::clone(clock));
        }
        Arc::new(thread)
    }

    /// The root context with every global defined
    pub fn root_context(&self) -> Context<'static> {
        let mut root = Context::new("global", self.thread());
        root.define_all(self.globals.clone());
        root
    }

    /// Evaluate a runtime tree
    pub fn evaluate(&self, expr: &InExpr) -> EvalResult<Value> {
        let root = self.root_context();
        expr.eval(&root)
    }

    /// Lower a checked tree and evaluate it
    pub fn run(&self, expr: &TcExpr) -> Result<Value, EvaluationError> {
        let runtime = remap::to_runtime(expr)?;
        Ok(self.evaluate(&runtime)?)
    }
}

#[cfg(test)]
mod tests;

//! VDM expression core
//!
//! Type checking and evaluation of expressions of the VDM specification
//! notation. A tree is built with [`syntax`], annotated by the
//! [`typechecker`], lowered by [`remap`] and evaluated by the
//! [`interpreter`].

pub mod diagnostics;
pub mod interpreter;
pub mod remap;
pub mod settings;
pub mod syntax;
pub mod typechecker;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::diagnostics::{Diagnostic, DiagnosticBag, Severity, Span};
    pub use crate::interpreter::{Context, Interpreter, RuntimeError, Value, Verdict};
    pub use crate::remap::to_runtime;
    pub use crate::settings::Settings;
    pub use crate::syntax::*;
    pub use crate::typechecker::{Registry, Type, TypeChecker, TypeEnv};
}

//! Lowering of checked trees to runtime trees.
//!
//! Every runtime node corresponds to exactly one checked node and keeps its
//! id, span and resolved type. A node the checker never annotated means the
//! checker did not run over the whole tree; lowering refuses such trees.

use thiserror::Error;
use tracing::debug;

use crate::diagnostics::Span;
use crate::syntax::{InExpr, Runtime, TcExpr};
use crate::typechecker::types::Type;

/// A checked tree could not be lowered
#[derive(Debug, Clone, Error)]
#[error("{kind} node at {span} has no resolved type")]
pub struct RemapError {
    /// Kind of the offending node
    pub kind: &'static str,
    pub span: Span,
}

/// Build the runtime tree for a type-checked expression
pub fn to_runtime(expr: &TcExpr) -> Result<InExpr, RemapError> {
    let mut nodes = 0usize;
    let runtime = expr.map_phase::<Runtime, RemapError, _>(&mut |node: &TcExpr| {
        nodes += 1;
        node.info.clone().ok_or_else(|| RemapError {
            kind: node.kind_name(),
            span: node.span.clone(),
        })
    });
    match &runtime {
        Ok(_) => debug!(nodes, "lowered checked tree"),
        Err(err) => debug!(%err, "lowering failed"),
    }
    runtime
}

/// Lower a tree, substituting `Unknown` for unannotated nodes.
///
/// Only for trees whose diagnostics have already been reported.
pub fn to_runtime_lenient(expr: &TcExpr) -> InExpr {
    let lowered: Result<InExpr, std::convert::Infallible> =
        expr.map_phase::<Runtime, _, _>(&mut |node: &TcExpr| Ok(node.info.clone().unwrap_or(Type::Unknown)));
    match lowered {
        Ok(tree) => tree,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::builder::*;
    use crate::syntax::BinaryOp;
    use crate::typechecker::{Registry, TypeChecker, TypeEnv};

    #[test]
    fn test_unchecked_tree_is_rejected() {
        let expr = binary(BinaryOp::Plus, int(1), int(2));
        let err = to_runtime(&expr).unwrap_err();
        assert_eq!(err.kind, "binary expression");
    }

    #[test]
    fn test_checked_tree_keeps_ids_and_types() {
        let mut expr = binary(BinaryOp::Plus, int(1), int(2));
        let registry = Registry::new();
        let env = TypeEnv::new(&registry);
        let mut tc = TypeChecker::new();
        tc.check(&mut expr, &env);
        let runtime = to_runtime(&expr).unwrap();
        assert_eq!(runtime.id, expr.id);
        assert_eq!(runtime.ty(), &Type::NatOne);
    }
}

//! End-to-end scenarios: build, check, lower and evaluate small expressions

use vdmx::diagnostics::error_codes::runtime as codes;
use vdmx::prelude::*;
use vdmx::syntax::builder::*;
use vdmx::typechecker::{Field, RecordType};

use pretty_assertions::assert_eq;
use std::path::PathBuf;

fn evaluate(registry: &Registry, mut expr: TcExpr) -> Result<Value, RuntimeError> {
    let env = TypeEnv::new(registry);
    let mut checker = TypeChecker::new();
    let ty = checker.check_expr(&mut expr, &env);
    assert!(ty.is_ok(), "unexpected diagnostics: {:?}", checker.diagnostics());
    let runtime = to_runtime(&expr).expect("every node is annotated");
    Interpreter::default().evaluate(&runtime)
}

fn ints(items: &[i64]) -> Vec<TcExpr> {
    items.iter().map(|&n| int(n)).collect()
}

#[test]
fn record_selected_by_position() {
    let mut registry = Registry::new();
    registry.define_record(RecordType::new(
        "Pair",
        vec![Field::new("a", Type::Nat), Field::new("b", Type::Nat)],
    ));
    let expr = field_number(mk("Pair", ints(&[1, 2])), 1);
    assert_eq!(evaluate(&registry, expr).unwrap(), Value::int(1));
}

#[test]
fn set_intersection() {
    let expr = binary(
        BinaryOp::Inter,
        set_enum(ints(&[1, 2, 3])),
        set_enum(ints(&[2, 3, 4])),
    );
    let expected = Value::set_of([Value::int(2), Value::int(3)]);
    assert_eq!(evaluate(&Registry::new(), expr).unwrap(), expected);
}

#[test]
fn universal_quantifier_holds() {
    let expr = forall(
        vec![multi_in_set(vec![pid("x")], set_enum(ints(&[1, 2, 3])))],
        binary(BinaryOp::Greater, var("x"), int(0)),
    );
    assert_eq!(evaluate(&Registry::new(), expr).unwrap(), Value::Bool(true));
}

#[test]
fn iota_selects_the_unique_value() {
    let expr = iota(in_set(pid("x"), set_enum(ints(&[1]))), bool_lit(true));
    assert_eq!(evaluate(&Registry::new(), expr).unwrap(), Value::int(1));
}

#[test]
fn iota_rejects_several_values() {
    let expr = iota(in_set(pid("x"), set_enum(ints(&[1, 2]))), bool_lit(true));
    let err = evaluate(&Registry::new(), expr).unwrap_err();
    assert_eq!(err.code, codes::IOTA_MULTIPLE_RESULTS);
    assert!(err.message.contains("more than one result"), "{}", err.message);
}

#[test]
fn sequence_index_out_of_range() {
    let expr = apply(seq_enum(ints(&[1, 2, 3])), vec![int(10)]);
    let err = evaluate(&Registry::new(), expr).unwrap_err();
    assert_eq!(err.code, codes::INDEX_OUT_OF_RANGE);
}

#[test]
fn failures_carry_the_failing_node_span() {
    let span = Span::new(PathBuf::from("scenario.vdmsl"), 4, 13, 1, 5, 1, 14);
    let failing = apply(seq_enum(ints(&[1, 2, 3])), vec![int(10)]).at(span.clone());
    let expr = binary(BinaryOp::Plus, int(1), failing);
    let err = evaluate(&Registry::new(), expr).unwrap_err();
    assert_eq!(err.span, Some(span));
}

#[test]
fn settings_file_drives_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vdmx.toml");
    std::fs::write(
        &path,
        "[evaluation]\nundefined_logic = \"literal-only\"\npre_checks = false\n",
    )
    .unwrap();

    let settings = Settings::load(&path).unwrap();
    assert!(!settings.evaluation.pre_checks);
    assert!(settings.evaluation.post_checks);

    let interpreter = Interpreter::new(settings);
    let mut expr = let_in(
        vec![local_def(pid("x"), None, undefined())],
        binary(BinaryOp::And, var("x"), bool_lit(true)),
    );
    let registry = Registry::new();
    let env = TypeEnv::new(&registry);
    TypeChecker::new().check(&mut expr, &env);
    let err = interpreter.run(&expr).unwrap_err();
    assert!(err.to_string().contains("undefined"), "{}", err);
}

use super::*;
use crate::syntax::builder::*;
use crate::syntax::{BinaryOp, UnaryOp};
use pretty_assertions::assert_eq;

fn check_with(registry: &Registry, expr: &mut TcExpr) -> (Type, DiagnosticBag) {
    let env = TypeEnv::new(registry);
    let mut checker = TypeChecker::new();
    let ty = checker.check(expr, &env);
    (ty, checker.into_diagnostics())
}

fn check_in(env: &TypeEnv<'_>, expr: &mut TcExpr) -> (Type, DiagnosticBag) {
    let mut checker = TypeChecker::new();
    let ty = checker.check(expr, env);
    (ty, checker.into_diagnostics())
}

fn check_clean(expr: &mut TcExpr) -> Type {
    let registry = Registry::new();
    let (ty, diags) = check_with(&registry, expr);
    assert!(!diags.has_errors(), "unexpected errors: {:?}", diags);
    ty
}

fn point_registry() -> Registry {
    let mut registry = Registry::new();
    registry.define_record(RecordType::new(
        "Point",
        vec![Field::new("x", Type::Int), Field::new("y", Type::Int)],
    ));
    registry
}

#[test]
fn test_type_env() {
    let registry = Registry::new();
    let mut env = TypeEnv::new(&registry);
    env.define("x", Type::Int);

    assert_eq!(env.lookup("x").map(|b| &b.ty), Some(&Type::Int));
    assert!(env.lookup("y").is_none());
}

#[test]
fn test_child_env() {
    let registry = Registry::new();
    let mut parent = TypeEnv::new(&registry).in_class("C");
    parent.define("x", Type::Int);

    let mut child = parent.child();
    child.define("y", Type::Bool);

    assert_eq!(child.lookup("x").map(|b| &b.ty), Some(&Type::Int));
    assert_eq!(child.lookup("y").map(|b| &b.ty), Some(&Type::Bool));
    assert_eq!(child.enclosing_class(), Some("C"));
}

#[test]
fn test_literal_types() {
    assert_eq!(check_clean(&mut int(3)), Type::NatOne);
    assert_eq!(check_clean(&mut int(0)), Type::Nat);
    assert_eq!(check_clean(&mut int(-2)), Type::Int);
    assert_eq!(check_clean(&mut real("2.5")), Type::Real);
    assert_eq!(check_clean(&mut text("ab")), Type::seq1_of(Type::Char));
}

#[test]
fn test_arithmetic_result_types() {
    assert_eq!(
        check_clean(&mut binary(BinaryOp::Plus, int(1), int(2))),
        Type::NatOne
    );
    assert_eq!(
        check_clean(&mut binary(BinaryOp::Minus, int(1), int(2))),
        Type::Int
    );
    assert_eq!(
        check_clean(&mut binary(BinaryOp::Divide, int(1), int(2))),
        Type::Real
    );
    assert_eq!(check_clean(&mut unary(UnaryOp::Abs, int(-4))), Type::Nat);
    assert_eq!(check_clean(&mut unary(UnaryOp::Floor, real("1.5"))), Type::Int);
}

#[test]
fn test_division_by_literal_zero() {
    let registry = Registry::new();
    let (_, diags) = check_with(&registry, &mut binary(BinaryOp::Div, int(4), int(0)));
    assert!(diags.contains_code(codes::types::DIVISION_BY_ZERO));
}

#[test]
fn test_unknown_identifier() {
    let registry = Registry::new();
    let (ty, diags) = check_with(&registry, &mut var("missing"));
    assert_eq!(ty, Type::Unknown);
    assert!(diags.contains_code(codes::types::UNKNOWN_IDENTIFIER));
}

#[test]
fn test_if_condition_must_be_bool() {
    let registry = Registry::new();
    let (ty, diags) = check_with(&registry, &mut if_then_else(int(1), int(2), int(3)));
    assert_eq!(ty, Type::NatOne);
    assert!(diags.contains_code(codes::types::EXPECTED_BOOL));
}

#[test]
fn test_let_defines_names_for_body() {
    let mut expr = let_in(
        vec![local_def(pid("x"), None, int(5))],
        binary(BinaryOp::Plus, var("x"), int(1)),
    );
    assert_eq!(check_clean(&mut expr), Type::NatOne);
}

#[test]
fn test_let_declared_type_is_checked() {
    let registry = Registry::new();
    let mut expr = let_in(
        vec![local_def(pid("x"), Some(Type::Nat), bool_lit(true))],
        var("x"),
    );
    let (ty, diags) = check_with(&registry, &mut expr);
    assert_eq!(ty, Type::Nat);
    assert!(diags.contains_code(codes::types::TYPE_MISMATCH));
}

#[test]
fn test_set_comprehension_type() {
    let mut expr = set_comp(
        binary(BinaryOp::Times, var("x"), int(2)),
        vec![multi_in_set(
            vec![pid("x")],
            set_enum(vec![int(1), int(2), int(3)]),
        )],
        None,
    );
    assert_eq!(check_clean(&mut expr), Type::set_of(Type::NatOne));
}

#[test]
fn test_quantifier_predicate_must_be_bool() {
    let registry = Registry::new();
    let mut expr = forall(
        vec![multi_in_set(vec![pid("x")], set_enum(vec![int(1)]))],
        var("x"),
    );
    let (ty, diags) = check_with(&registry, &mut expr);
    assert_eq!(ty, Type::Bool);
    assert!(diags.contains_code(codes::types::EXPECTED_BOOL));
}

#[test]
fn test_seq_comprehension_over_set_needs_numbers() {
    let registry = Registry::new();
    let mut expr = seq_comp(
        var("x"),
        in_set(pid("x"), set_enum(vec![bool_lit(true)])),
        None,
    );
    let (_, diags) = check_with(&registry, &mut expr);
    assert!(diags.contains_code(codes::types::EXPECTED_NUMERIC));
}

#[test]
fn test_record_construction_and_field_access() {
    let registry = point_registry();

    let (ty, diags) = check_with(&registry, &mut field(mk("Point", vec![int(1), int(2)]), "x"));
    assert_eq!(ty, Type::Int);
    assert!(!diags.has_errors());

    let (_, diags) = check_with(&registry, &mut field(mk("Point", vec![int(1), int(2)]), "z"));
    assert!(diags.contains_code(codes::types::UNKNOWN_FIELD));

    let (_, diags) = check_with(&registry, &mut mk("Point", vec![int(1)]));
    assert!(diags.contains_code(codes::types::WRONG_ARGUMENT_COUNT));
}

#[test]
fn test_field_of_non_record() {
    let registry = Registry::new();
    let (_, diags) = check_with(&registry, &mut field(int(1), "x"));
    assert!(diags.contains_code(codes::types::EXPECTED_RECORD));
}

#[test]
fn test_tuple_selectors() {
    let registry = Registry::new();
    let (ty, _) = check_with(
        &registry,
        &mut field_number(tuple(vec![int(1), bool_lit(true)]), 2),
    );
    assert_eq!(ty, Type::Bool);

    let (_, diags) = check_with(
        &registry,
        &mut field_number(tuple(vec![int(1), bool_lit(true)]), 3),
    );
    assert!(diags.contains_code(codes::types::TUPLE_INDEX_RANGE));
}

#[test]
fn test_function_application() {
    let mut registry = Registry::new();
    registry.define_function("f", &[], Type::function(vec![Type::Nat], Type::Bool));

    let (ty, diags) = check_with(&registry, &mut apply(var("f"), vec![int(1)]));
    assert_eq!(ty, Type::Bool);
    assert!(!diags.has_errors());

    let (_, diags) = check_with(&registry, &mut apply(var("f"), vec![bool_lit(true)]));
    assert!(diags.contains_code(codes::types::TYPE_MISMATCH));

    let (_, diags) = check_with(&registry, &mut apply(var("f"), vec![int(1), int(2)]));
    assert!(diags.contains_code(codes::types::WRONG_ARGUMENT_COUNT));
}

#[test]
fn test_apply_non_function() {
    let registry = Registry::new();
    let (_, diags) = check_with(&registry, &mut apply(bool_lit(true), vec![int(1)]));
    assert!(diags.contains_code(codes::types::EXPECTED_FUNCTION));
}

#[test]
fn test_polymorphic_instantiation() {
    let mut registry = Registry::new();
    registry.define_function(
        "id",
        &["T"],
        Type::function(vec![Type::Param("T".into())], Type::Param("T".into())),
    );

    let (ty, diags) = check_with(&registry, &mut instantiate(var("id"), vec![Type::Nat]));
    assert_eq!(ty, Type::function(vec![Type::Nat], Type::Nat));
    assert!(!diags.has_errors());

    let (_, diags) = check_with(&registry, &mut var("id"));
    assert!(diags.contains_code(codes::types::UNINSTANTIATED_POLYMORPHIC));

    let (_, diags) = check_with(
        &registry,
        &mut instantiate(var("id"), vec![Type::Nat, Type::Int]),
    );
    assert!(diags.contains_code(codes::types::WRONG_TYPE_PARAM_COUNT));
}

#[test]
fn test_instantiate_monomorphic_function() {
    let mut registry = Registry::new();
    registry.define_function("f", &[], Type::function(vec![Type::Nat], Type::Nat));
    let (_, diags) = check_with(&registry, &mut instantiate(var("f"), vec![Type::Nat]));
    assert!(diags.contains_code(codes::types::NOT_POLYMORPHIC));
}

#[test]
fn test_state_not_visible_in_lambda_body() {
    let mut registry = Registry::new();
    registry.define_state("counter", Type::Nat);
    let mut expr = lambda(
        vec![(pid("n"), Type::Nat)],
        binary(BinaryOp::Plus, var("n"), var("counter")),
    );
    let (ty, diags) = check_with(&registry, &mut expr);
    assert!(matches!(ty, Type::Function(ref f) if !f.partial));
    assert!(diags.contains_code(codes::types::STATE_NOT_ACCESSIBLE));
}

#[test]
fn test_old_names_only_in_postconditions() {
    let mut registry = Registry::new();
    registry.define_state("counter", Type::Nat);

    let (_, diags) = check_with(&registry, &mut old_var("counter"));
    assert!(diags.contains_code(codes::classes::OLD_NAME_OUTSIDE_POST));

    let mut post = post_op(
        binary(BinaryOp::Equals, var("counter"), old_var("counter")),
        vec![],
    );
    let (ty, diags) = check_with(&registry, &mut post);
    assert_eq!(ty, Type::Bool);
    assert!(!diags.has_errors(), "{:?}", diags);
}

#[test]
fn test_self_requires_instance_context() {
    let mut registry = Registry::new();
    registry.define_class(ClassDef::new("Account"));

    let (_, diags) = check_with(&registry, &mut self_ref());
    assert!(diags.contains_code(codes::classes::SELF_OUTSIDE_CLASS));

    let env = TypeEnv::new(&registry).in_class("Account");
    let (ty, diags) = check_in(&env, &mut self_ref());
    assert_eq!(ty, Type::Class("Account".into()));
    assert!(!diags.has_errors());

    let env = TypeEnv::new(&registry).in_class("Account").in_static();
    let (_, diags) = check_in(&env, &mut self_ref());
    assert!(diags.contains_code(codes::classes::SELF_OUTSIDE_CLASS));
}

#[test]
fn test_operation_call_from_function() {
    let mut registry = Registry::new();
    registry.define_operation("step", Type::operation(vec![], Type::Nat, false));

    let env = TypeEnv::new(&registry).in_function();
    let (_, diags) = check_in(&env, &mut apply(var("step"), vec![]));
    assert!(diags.contains_code(codes::classes::OPERATION_IN_FUNCTION));
}

#[test]
fn test_impure_call_from_pure_operation() {
    let mut registry = Registry::new();
    registry.define_operation("step", Type::operation(vec![], Type::Nat, false));
    let env = TypeEnv::new(&registry).in_pure_operation();

    let mut lenient = TypeChecker::new();
    lenient.check(&mut apply(var("step"), vec![]), &env);
    assert!(!lenient.diagnostics().has_errors());
    assert!(lenient
        .diagnostics()
        .contains_code(codes::warnings::IMPURE_IN_PURE));

    let mut strict = TypeChecker::with_settings(CheckerSettings { strict: true });
    strict.check(&mut apply(var("step"), vec![]), &env);
    assert!(strict
        .diagnostics()
        .contains_code(codes::classes::IMPURE_IN_PURE));
}

#[test]
fn test_overload_selected_by_argument_types() {
    let mut registry = Registry::new();
    registry.define_class(
        ClassDef::new("C")
            .member(
                "f",
                Binding::value(Type::function(vec![Type::Nat], Type::Bool)),
                Access::Public,
            )
            .member(
                "f",
                Binding::value(Type::function(vec![Type::Char], Type::Nat)),
                Access::Public,
            ),
    );
    let env = TypeEnv::new(&registry).in_class("C");

    let (ty, diags) = check_in(&env, &mut apply(var("f"), vec![char_lit('a')]));
    assert_eq!(ty, Type::Nat);
    assert!(!diags.has_errors());

    let (_, diags) = check_in(&env, &mut apply(var("f"), vec![bool_lit(true)]));
    assert!(diags.contains_code(codes::classes::NO_MATCHING_OVERLOAD));
}

#[test]
fn test_member_visibility() {
    let mut registry = Registry::new();
    registry.define_class(
        ClassDef::new("A")
            .member("secret", Binding::value(Type::Nat), Access::Private)
            .member("shown", Binding::value(Type::Nat), Access::Public),
    );
    registry.define_class(ClassDef::new("B").extends("A"));
    registry.define_value("a", Type::Class("A".into()));

    let (_, diags) = check_with(&registry, &mut field(var("a"), "secret"));
    assert!(diags.contains_code(codes::classes::MEMBER_NOT_VISIBLE));

    let (ty, diags) = check_with(&registry, &mut field(var("a"), "shown"));
    assert_eq!(ty, Type::Nat);
    assert!(!diags.has_errors());

    let env = TypeEnv::new(&registry).in_class("A");
    let (_, diags) = check_in(&env, &mut field(var("a"), "secret"));
    assert!(!diags.has_errors());

    let (_, diags) = check_with(&registry, &mut field(var("a"), "nothing"));
    assert!(diags.contains_code(codes::classes::UNKNOWN_MEMBER));
}

#[test]
fn test_narrow_and_is() {
    let registry = Registry::new();
    let (_, diags) = check_with(&registry, &mut narrow(bool_lit(true), Type::Nat));
    assert!(diags.contains_code(codes::types::TYPE_MISMATCH));

    let (ty, diags) = check_with(
        &registry,
        &mut is_type(int(1), Type::Unresolved("Missing".into())),
    );
    assert_eq!(ty, Type::Bool);
    assert!(diags.contains_code(codes::types::UNKNOWN_TYPE));
}

#[test]
fn test_constraint_mismatch_and_narrowing() {
    let mut registry = Registry::new();
    registry.define_value("v", Type::union([Type::Nat, Type::Bool]));
    let env = TypeEnv::new(&registry);

    let mut checker = TypeChecker::new();
    let ty = checker.check_against(&mut var("v"), &env, &Type::Nat);
    assert_eq!(ty, Type::Nat);
    assert!(!checker.diagnostics().has_errors());

    let mut checker = TypeChecker::new();
    checker.check_against(&mut bool_lit(true), &env, &Type::Nat);
    assert!(checker
        .diagnostics()
        .contains_code(codes::types::TYPE_MISMATCH));
}

#[test]
fn test_inverse_of_plain_map_warns() {
    let registry = Registry::new();
    let (ty, diags) = check_with(
        &registry,
        &mut unary(UnaryOp::Inverse, map_enum(vec![(int(1), bool_lit(true))])),
    );
    assert_eq!(ty, Type::inmap_of(Type::Bool, Type::NatOne));
    assert!(diags.contains_code(codes::warnings::MAY_FAIL));
    assert!(!diags.has_errors());
}

#[test]
fn test_cases_alternatives_unite() {
    let mut expr = cases(
        int(1),
        vec![(vec![pint(1)], bool_lit(true))],
        Some(text("no")),
    );
    assert_eq!(
        check_clean(&mut expr),
        Type::union([Type::Bool, Type::seq1_of(Type::Char)])
    );
}

#[test]
fn test_check_expr_reports_errors() {
    let registry = Registry::new();
    let env = TypeEnv::new(&registry);
    let mut checker = TypeChecker::new();
    let result = checker.check_expr(&mut var("nope"), &env);
    assert!(result.is_err());
}

#[test]
fn test_every_node_is_annotated() {
    let mut expr = let_in(
        vec![local_def(pid("n"), None, int(5))],
        set_comp(
            var("y"),
            vec![multi_in_set(vec![pid("y")], set_range(int(1), var("n")))],
            Some(binary(BinaryOp::Greater, var("y"), int(2))),
        ),
    );
    assert_eq!(check_clean(&mut expr), Type::set_of(Type::Nat));
    assert!(expr.find(&|e| e.info.is_none()).is_none());
}

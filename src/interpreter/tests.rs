use super::*;
use crate::diagnostics::error_codes::runtime as codes;
use crate::diagnostics::Span;
use crate::settings::UndefinedLogic;
use crate::syntax::builder::*;
use crate::syntax::{BinaryOp, HistoryOp, InPattern, PatternKind, UnaryOp};
use crate::typechecker::{
    Access, Binding, ClassDef, Field, FunctionType, OperationType, RecordType, Registry, Type, TypeChecker,
    TypeEnv,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

fn lower(registry: &Registry, mut expr: TcExpr) -> InExpr {
    let env = TypeEnv::new(registry);
    let mut checker = TypeChecker::new();
    checker.check(&mut expr, &env);
    remap::to_runtime(&expr).expect("checked tree lowers")
}

fn eval_with(interpreter: &Interpreter, registry: &Registry, expr: TcExpr) -> EvalResult<Value> {
    interpreter.evaluate(&lower(registry, expr))
}

fn eval(expr: TcExpr) -> Value {
    eval_with(&Interpreter::default(), &Registry::new(), expr).expect("evaluation succeeds")
}

/// Code of the innermost failure
fn failure(expr: TcExpr) -> u32 {
    let err = eval_with(&Interpreter::default(), &Registry::new(), expr).expect_err("evaluation fails");
    err.root_cause().code
}

fn ints(items: &[i64]) -> Vec<TcExpr> {
    items.iter().map(|&n| int(n)).collect()
}

fn int_set(items: &[i64]) -> Value {
    Value::set_of(items.iter().map(|&n| Value::int(n)))
}

fn int_seq(items: &[i64]) -> Value {
    Value::seq_of(items.iter().map(|&n| Value::int(n)))
}

fn function_of(value: Value) -> Arc<FunctionValue> {
    match value {
        Value::Function(function) => function,
        other => panic!("expected a function, got {}", other),
    }
}

// Arithmetic

#[test]
fn test_arithmetic() {
    let expr = binary(BinaryOp::Plus, int(1), binary(BinaryOp::Times, int(2), int(3)));
    assert_eq!(eval(expr), Value::int(7));
    assert_eq!(eval(binary(BinaryOp::Divide, int(1), int(4))), eval(real("0.25")));
    assert_eq!(eval(binary(BinaryOp::StarStar, int(2), int(10))), Value::int(1024));
    assert_eq!(eval(unary(UnaryOp::Abs, int(-3))), Value::int(3));
    assert_eq!(eval(unary(UnaryOp::Floor, real("2.5"))), Value::int(2));
}

#[test]
fn test_integer_division_signs() {
    let minus_seven = || unary(UnaryOp::Minus, int(7));
    assert_eq!(eval(binary(BinaryOp::Div, minus_seven(), int(2))), Value::int(-3));
    assert_eq!(eval(binary(BinaryOp::Rem, minus_seven(), int(2))), Value::int(-1));
    assert_eq!(eval(binary(BinaryOp::Mod, minus_seven(), int(2))), Value::int(1));
}

#[test]
fn test_division_by_zero() {
    assert_eq!(failure(binary(BinaryOp::Divide, int(1), int(0))), codes::DIVISION_BY_ZERO);
    assert_eq!(failure(binary(BinaryOp::Div, int(1), int(0))), codes::DIVISION_BY_ZERO);
}

#[test]
fn test_comparisons() {
    assert_eq!(eval(binary(BinaryOp::Less, int(1), int(2))), Value::Bool(true));
    assert_eq!(eval(binary(BinaryOp::GreaterEq, int(1), int(2))), Value::Bool(false));
    assert_eq!(eval(binary(BinaryOp::Equals, real("2.0"), int(2))), Value::Bool(true));
}

// Logic

#[test]
fn test_three_valued_connectives() {
    assert_eq!(eval(binary(BinaryOp::Or, undefined(), bool_lit(true))), Value::Bool(true));
    assert_eq!(eval(binary(BinaryOp::And, undefined(), bool_lit(false))), Value::Bool(false));
    assert_eq!(eval(binary(BinaryOp::And, undefined(), bool_lit(true))), Value::Undefined);
    assert_eq!(eval(binary(BinaryOp::Implies, bool_lit(false), undefined())), Value::Bool(true));
    assert_eq!(eval(unary(UnaryOp::Not, undefined())), Value::Undefined);
}

#[test]
fn test_connectives_short_circuit() {
    let guarded = binary(
        BinaryOp::And,
        bool_lit(false),
        binary(BinaryOp::Equals, binary(BinaryOp::Div, int(1), int(0)), int(1)),
    );
    assert_eq!(eval(guarded), Value::Bool(false));
}

#[test]
fn test_literal_only_undefined() {
    let mut settings = Settings::default();
    settings.evaluation.undefined_logic = UndefinedLogic::LiteralOnly;
    let interpreter = Interpreter::new(settings);
    let registry = Registry::new();

    let literal = binary(BinaryOp::Or, undefined(), bool_lit(true));
    assert_eq!(eval_with(&interpreter, &registry, literal).unwrap(), Value::Bool(true));

    let computed = let_in(
        vec![local_def(pid("x"), None, undefined())],
        binary(BinaryOp::Or, var("x"), bool_lit(true)),
    );
    let err = eval_with(&interpreter, &registry, computed).unwrap_err();
    assert_eq!(err.code, codes::UNDEFINED_VALUE);
}

#[test]
fn test_boolean_operand_required() {
    assert_eq!(failure(binary(BinaryOp::And, int(1), bool_lit(true))), codes::EXPECTED_BOOL);
}

// Collections

#[test]
fn test_set_operators() {
    let a = || set_enum(ints(&[1, 2, 3]));
    let b = || set_enum(ints(&[2, 3, 4]));
    assert_eq!(eval(binary(BinaryOp::Union, a(), b())), int_set(&[1, 2, 3, 4]));
    assert_eq!(eval(binary(BinaryOp::Inter, a(), b())), int_set(&[2, 3]));
    assert_eq!(eval(binary(BinaryOp::Difference, a(), b())), int_set(&[1]));
    assert_eq!(eval(binary(BinaryOp::Subset, set_enum(ints(&[2])), a())), Value::Bool(true));
    assert_eq!(eval(binary(BinaryOp::ProperSubset, a(), a())), Value::Bool(false));
    assert_eq!(eval(binary(BinaryOp::InSet, int(2), a())), Value::Bool(true));
    assert_eq!(eval(unary(UnaryOp::Card, a())), Value::int(3));
    assert_eq!(eval(set_range(int(2), int(5))), int_set(&[2, 3, 4, 5]));
    assert_eq!(eval(set_range(int(5), int(2))), int_set(&[]));
}

#[test]
fn test_power_set() {
    let value = eval(unary(UnaryOp::Power, set_enum(ints(&[1, 2]))));
    let expected = Value::set_of([int_set(&[]), int_set(&[1]), int_set(&[2]), int_set(&[1, 2])]);
    assert_eq!(value, expected);
}

#[test]
fn test_distributed_set_operators() {
    let sets = || set_enum(vec![set_enum(ints(&[1, 2])), set_enum(ints(&[2, 3]))]);
    assert_eq!(eval(unary(UnaryOp::DistUnion, sets())), int_set(&[1, 2, 3]));
    assert_eq!(eval(unary(UnaryOp::DistInter, sets())), int_set(&[2]));
    assert_eq!(failure(unary(UnaryOp::DistInter, set_enum(vec![]))), codes::EMPTY_SET);
}

#[test]
fn test_sequence_operators() {
    let s = || seq_enum(ints(&[3, 1, 2]));
    assert_eq!(eval(unary(UnaryOp::Len, s())), Value::int(3));
    assert_eq!(eval(unary(UnaryOp::Head, s())), Value::int(3));
    assert_eq!(eval(unary(UnaryOp::Tail, s())), int_seq(&[1, 2]));
    assert_eq!(eval(unary(UnaryOp::Elems, s())), int_set(&[1, 2, 3]));
    assert_eq!(eval(unary(UnaryOp::Inds, s())), int_set(&[1, 2, 3]));
    assert_eq!(eval(unary(UnaryOp::Reverse, s())), int_seq(&[2, 1, 3]));
    assert_eq!(
        eval(binary(BinaryOp::Concat, s(), seq_enum(ints(&[4])))),
        int_seq(&[3, 1, 2, 4])
    );
    assert_eq!(
        eval(unary(UnaryOp::DistConc, seq_enum(vec![s(), seq_enum(ints(&[9]))]))),
        int_seq(&[3, 1, 2, 9])
    );
}

#[test]
fn test_empty_sequence_failures() {
    assert_eq!(failure(unary(UnaryOp::Head, seq_enum(vec![]))), codes::EMPTY_SEQUENCE);
    assert_eq!(failure(unary(UnaryOp::Tail, seq_enum(vec![]))), codes::EMPTY_SEQUENCE);
}

#[test]
fn test_sequence_indexing() {
    let s = || seq_enum(ints(&[10, 20, 30]));
    assert_eq!(eval(apply(s(), vec![int(2)])), Value::int(20));
    assert_eq!(failure(apply(s(), vec![int(4)])), codes::INDEX_OUT_OF_RANGE);
    assert_eq!(failure(apply(s(), vec![int(0)])), codes::INDEX_OUT_OF_RANGE);
}

#[test]
fn test_subsequence_clamps() {
    let s = || seq_enum(ints(&[1, 2, 3]));
    assert_eq!(eval(subseq(s(), int(2), int(10))), int_seq(&[2, 3]));
    assert_eq!(eval(subseq(s(), int(3), int(1))), int_seq(&[]));
}

#[test]
fn test_text_is_a_char_sequence() {
    assert_eq!(eval(text("ab")), Value::string("ab"));
    assert_eq!(eval(unary(UnaryOp::Len, text("abc"))), Value::int(3));
}

#[test]
fn test_map_operators() {
    let m = || map_enum(vec![(int(1), text("a")), (int(2), text("b"))]);
    assert_eq!(eval(unary(UnaryOp::Dom, m())), int_set(&[1, 2]));
    assert_eq!(
        eval(unary(UnaryOp::Rng, m())),
        Value::set_of([Value::string("a"), Value::string("b")])
    );
    assert_eq!(eval(apply(m(), vec![int(2)])), Value::string("b"));
    assert_eq!(failure(apply(m(), vec![int(3)])), codes::KEY_NOT_IN_DOMAIN);

    let overridden = eval(binary(BinaryOp::PlusPlus, m(), map_enum(vec![(int(1), text("z"))])));
    assert_eq!(
        overridden,
        Value::map_of([(Value::int(1), Value::string("z")), (Value::int(2), Value::string("b"))])
    );

    let restricted = eval(binary(BinaryOp::DomResTo, set_enum(ints(&[2])), m()));
    assert_eq!(restricted, Value::map_of([(Value::int(2), Value::string("b"))]));
}

#[test]
fn test_map_enumeration_duplicates() {
    let same = map_enum(vec![(int(1), int(2)), (int(1), int(2))]);
    assert_eq!(eval(same), Value::map_of([(Value::int(1), Value::int(2))]));

    let clash = map_enum(vec![(int(1), int(2)), (int(1), int(3))]);
    assert_eq!(failure(clash), codes::DUPLICATE_MAP_KEY);
}

#[test]
fn test_munion_conflict() {
    let clash = binary(
        BinaryOp::Munion,
        map_enum(vec![(int(1), int(2))]),
        map_enum(vec![(int(1), int(3))]),
    );
    assert_eq!(failure(clash), codes::INCOMPATIBLE_MERGE);
}

#[test]
fn test_comprehensions() {
    let squares = set_comp(
        binary(BinaryOp::Times, var("x"), var("x")),
        vec![multi_in_set(vec![pid("x")], set_enum(ints(&[1, 2, 3])))],
        Some(binary(BinaryOp::Greater, var("x"), int(1))),
    );
    assert_eq!(eval(squares), int_set(&[4, 9]));

    let shifted = seq_comp(
        binary(BinaryOp::Plus, var("x"), int(1)),
        in_set(pid("x"), set_enum(ints(&[3, 1, 2]))),
        None,
    );
    assert_eq!(eval(shifted), int_seq(&[2, 3, 4]));

    let doubled = map_comp(
        var("x"),
        binary(BinaryOp::Times, var("x"), int(2)),
        vec![multi_in_set(vec![pid("x")], set_enum(ints(&[1, 2])))],
        None,
    );
    assert_eq!(
        eval(doubled),
        Value::map_of([(Value::int(1), Value::int(2)), (Value::int(2), Value::int(4))])
    );
}

#[test]
fn test_tuples() {
    let pair = || tuple(vec![int(1), text("x")]);
    assert_eq!(eval(field_number(pair(), 2)), Value::string("x"));
    assert_eq!(failure(field_number(pair(), 3)), codes::TUPLE_INDEX);
}

// Records

fn point_registry() -> (Registry, Arc<RecordType>) {
    let mut registry = Registry::new();
    let point = registry.define_record(RecordType::new(
        "Point",
        vec![
            Field::new("x", Type::Int),
            Field::new("y", Type::Int),
            Field::abstracted("label", Type::string()),
        ],
    ));
    (registry, point)
}

#[test]
fn test_record_construction_and_fields() {
    let (registry, _) = point_registry();
    let interpreter = Interpreter::default();
    let make = || mk("Point", vec![int(1), int(2), text("p")]);

    let y = eval_with(&interpreter, &registry, field(make(), "y")).unwrap();
    assert_eq!(y, Value::int(2));

    let moved = eval_with(&interpreter, &registry, mu(make(), vec![("x", int(5))])).unwrap();
    assert_eq!(moved.as_record().unwrap().field("x"), Some(&Value::int(5)));
    assert_eq!(moved.as_record().unwrap().field("y"), Some(&Value::int(2)));
}

#[test]
fn test_record_equality_ignores_abstracted_fields() {
    let (registry, _) = point_registry();
    let expr = binary(
        BinaryOp::Equals,
        mk("Point", vec![int(1), int(2), text("a")]),
        mk("Point", vec![int(1), int(2), text("b")]),
    );
    let value = eval_with(&Interpreter::default(), &registry, expr).unwrap();
    assert_eq!(value, Value::Bool(true));
}

#[test]
fn test_record_pattern() {
    let (registry, _) = point_registry();
    let expr = cases(
        mk("Point", vec![int(1), int(2), text("p")]),
        vec![(
            vec![precord("Point", vec![pint(1), pid("y"), pignore()])],
            var("y"),
        )],
        None,
    );
    let value = eval_with(&Interpreter::default(), &registry, expr).unwrap();
    assert_eq!(value, Value::int(2));
}

fn positive_registry() -> Registry {
    let mut registry = Registry::new();
    registry.define_record(
        RecordType::new("Pos", vec![Field::new("n", Type::Int)]).with_invariant(),
    );
    registry
}

fn positive_interpreter(settings: Settings, registry: &Registry) -> Interpreter {
    let pos = Type::Record(Arc::clone(registry.lookup_record("Pos").unwrap()));
    let mut interpreter = Interpreter::new(settings);
    let inv = lambda(
        vec![(pid("p"), pos)],
        binary(BinaryOp::Greater, field(var("p"), "n"), int(0)),
    );
    let inv = eval_with(&interpreter, registry, inv).unwrap();
    interpreter.define("inv_Pos", inv);
    interpreter
}

#[test]
fn test_record_invariant() {
    let registry = positive_registry();
    let interpreter = positive_interpreter(Settings::default(), &registry);

    let good = eval_with(&interpreter, &registry, mk("Pos", vec![int(3)])).unwrap();
    assert_eq!(good.as_record().unwrap().field("n"), Some(&Value::int(3)));

    let err = eval_with(&interpreter, &registry, mk("Pos", vec![int(-3)])).unwrap_err();
    assert_eq!(err.root_cause().code, codes::INVARIANT_VIOLATION);
}

#[test]
fn test_invariant_checks_can_be_disabled() {
    let registry = positive_registry();
    let mut settings = Settings::default();
    settings.evaluation.inv_checks = false;
    let interpreter = positive_interpreter(settings, &registry);

    assert!(eval_with(&interpreter, &registry, mk("Pos", vec![int(-3)])).is_ok());
}

// Control

#[test]
fn test_if_elseif() {
    let expr = if_elseif(
        bool_lit(false),
        int(1),
        vec![(bool_lit(true), int(2))],
        int(3),
    );
    assert_eq!(eval(expr), Value::int(2));
}

#[test]
fn test_cases() {
    let choose = |n: i64, others: Option<TcExpr>| {
        cases(
            int(n),
            vec![
                (vec![pint(1)], text("one")),
                (vec![pint(2), pint(3)], text("two or three")),
            ],
            others,
        )
    };
    assert_eq!(eval(choose(3, None)), Value::string("two or three"));
    assert_eq!(eval(choose(7, Some(text("other")))), Value::string("other"));
    assert_eq!(failure(choose(7, None)), codes::NO_CASE_APPLIES);
}

#[test]
fn test_let_with_patterns() {
    let expr = let_in(
        vec![local_def(
            ptuple(vec![pid("a"), pid("b")]),
            None,
            tuple(vec![int(1), int(2)]),
        )],
        binary(BinaryOp::Plus, var("a"), var("b")),
    );
    assert_eq!(eval(expr), Value::int(3));
}

#[test]
fn test_let_pattern_mismatch() {
    let expr = let_in(
        vec![local_def(pseq(vec![pid("a")]), None, seq_enum(ints(&[1, 2])))],
        var("a"),
    );
    assert_eq!(failure(expr), codes::PATTERN_MISMATCH);
}

#[test]
fn test_def_is_sequential() {
    let expr = def_in(
        vec![
            local_def(pid("x"), None, int(1)),
            local_def(pid("y"), None, binary(BinaryOp::Plus, var("x"), int(1))),
        ],
        var("y"),
    );
    assert_eq!(eval(expr), Value::int(2));
}

#[test]
fn test_let_be_such_that() {
    let pick = |bound: i64| {
        let_be_st(
            multi_in_set(vec![pid("x")], set_enum(ints(&[1, 2, 3]))),
            Some(binary(BinaryOp::Greater, var("x"), int(bound))),
            var("x"),
        )
    };
    assert_eq!(eval(pick(2)), Value::int(3));
    assert_eq!(failure(pick(5)), codes::LET_BE_ST_NO_MATCH);
}

#[test]
fn test_set_patterns() {
    let expr = let_in(
        vec![local_def(
            punion(pset(vec![pint(1)]), pid("rest")),
            None,
            set_enum(ints(&[1, 2, 3])),
        )],
        var("rest"),
    );
    assert_eq!(eval(expr), int_set(&[2, 3]));
}

#[test]
fn test_concat_pattern() {
    let expr = let_in(
        vec![local_def(
            pconcat(pseq(vec![pid("first")]), pid("rest")),
            None,
            seq_enum(ints(&[7, 8, 9])),
        )],
        tuple(vec![var("first"), var("rest")]),
    );
    assert_eq!(eval(expr), Value::Tuple(vec![Value::int(7), int_seq(&[8, 9])]));
}

// Quantifiers

fn numbers() -> TcExpr {
    set_enum(ints(&[1, 2, 3]))
}

#[test]
fn test_forall_and_exists() {
    let positive = forall(
        vec![multi_in_set(vec![pid("x")], numbers())],
        binary(BinaryOp::Greater, var("x"), int(0)),
    );
    assert_eq!(eval(positive), Value::Bool(true));

    let big = exists(
        vec![multi_in_set(vec![pid("x")], numbers())],
        binary(BinaryOp::Greater, var("x"), int(5)),
    );
    assert_eq!(eval(big), Value::Bool(false));

    let pairs = forall(
        vec![multi_in_set(vec![pid("x"), pid("y")], numbers())],
        binary(BinaryOp::GreaterEq, binary(BinaryOp::Plus, var("x"), var("y")), int(2)),
    );
    assert_eq!(eval(pairs), Value::Bool(true));
}

#[test]
fn test_quantifier_over_empty_set() {
    let all = forall(vec![multi_in_set(vec![pid("x")], set_enum(vec![]))], bool_lit(false));
    assert_eq!(eval(all), Value::Bool(true));
    let any = exists(vec![multi_in_set(vec![pid("x")], set_enum(vec![]))], bool_lit(true));
    assert_eq!(eval(any), Value::Bool(false));
}

#[test]
fn test_type_bind() {
    let expr = exists(vec![multi_of_type(vec![pid("b")], Type::Bool)], var("b"));
    assert_eq!(eval(expr), Value::Bool(true));
    let infinite = exists(vec![multi_of_type(vec![pid("n")], Type::Nat)], bool_lit(true));
    assert_eq!(failure(infinite), codes::TYPE_NOT_FINITE);
}

#[test]
fn test_exists_unique() {
    let one = exists1(
        in_set(pid("x"), numbers()),
        binary(BinaryOp::Equals, var("x"), int(2)),
    );
    assert_eq!(eval(one), Value::Bool(true));
    let two = exists1(
        in_set(pid("x"), numbers()),
        binary(BinaryOp::Greater, var("x"), int(1)),
    );
    assert_eq!(eval(two), Value::Bool(false));
}

#[test]
fn test_undefined_predicate_gives_undefined() {
    let expr = forall(vec![multi_in_set(vec![pid("x")], numbers())], undefined());
    assert_eq!(eval(expr), Value::Undefined);
}

#[test]
fn test_candidate_failure_propagates() {
    let expr = exists(
        vec![multi_in_set(vec![pid("x")], set_enum(ints(&[0, 1])))],
        binary(BinaryOp::Greater, binary(BinaryOp::Divide, int(1), var("x")), int(0)),
    );
    assert_eq!(failure(expr), codes::DIVISION_BY_ZERO);
}

#[test]
fn test_iota() {
    let unique = iota(
        in_set(pid("x"), numbers()),
        binary(BinaryOp::Greater, var("x"), int(2)),
    );
    assert_eq!(eval(unique), Value::int(3));

    let none = iota(
        in_set(pid("x"), numbers()),
        binary(BinaryOp::Greater, var("x"), int(5)),
    );
    assert_eq!(failure(none), codes::IOTA_NO_RESULT);

    let many = iota(in_set(pid("x"), numbers()), bool_lit(true));
    assert_eq!(failure(many), codes::IOTA_MULTIPLE_RESULTS);
}

// Functions

#[test]
fn test_lambda_application() {
    let inc = lambda(
        vec![(pid("x"), Type::Nat)],
        binary(BinaryOp::Plus, var("x"), int(1)),
    );
    assert_eq!(eval(apply(inc, vec![int(4)])), Value::int(5));
}

#[test]
fn test_lambda_captures_enclosing_names() {
    let expr = let_in(
        vec![local_def(pid("a"), None, int(10))],
        apply(
            lambda(
                vec![(pid("x"), Type::Nat)],
                binary(BinaryOp::Plus, var("x"), var("a")),
            ),
            vec![int(1)],
        ),
    );
    assert_eq!(eval(expr), Value::int(11));
}

#[test]
fn test_curried_lambda() {
    let adder = lambda(
        vec![(pid("x"), Type::Nat)],
        lambda(
            vec![(pid("y"), Type::Nat)],
            binary(BinaryOp::Plus, var("x"), var("y")),
        ),
    );
    assert_eq!(eval(apply(apply(adder, vec![int(1)]), vec![int(2)])), Value::int(3));
}

#[test]
fn test_argument_conversion() {
    let inc = lambda(
        vec![(pid("x"), Type::Nat)],
        binary(BinaryOp::Plus, var("x"), int(1)),
    );
    let err = eval_with(
        &Interpreter::default(),
        &Registry::new(),
        apply(inc, vec![unary(UnaryOp::Minus, int(4))]),
    )
    .unwrap_err();
    assert!(err.message.contains("do not fit its parameter types"), "{}", err.message);
    let cause = err.cause.as_deref().expect("conversion failure is kept");
    assert_eq!(cause.code, codes::TYPE_CONVERSION);
    assert_eq!(err.code, cause.code);
}

#[test]
fn test_function_composition_and_iteration() {
    let inc = || {
        lambda(
            vec![(pid("x"), Type::Int)],
            binary(BinaryOp::Plus, var("x"), int(1)),
        )
    };
    let double = lambda(
        vec![(pid("x"), Type::Int)],
        binary(BinaryOp::Times, var("x"), int(2)),
    );
    let composed = apply(binary(BinaryOp::Comp, double, inc()), vec![int(3)]);
    assert_eq!(eval(composed), Value::int(8));

    let iterated = apply(binary(BinaryOp::StarStar, inc(), int(3)), vec![int(0)]);
    assert_eq!(eval(iterated), Value::int(3));
}

fn guarded_function(registry: &Registry, interpreter: &mut Interpreter) {
    let halve = lambda(
        vec![(pid("x"), Type::Int)],
        binary(BinaryOp::Div, var("x"), int(2)),
    );
    let halve = function_of(eval_with(interpreter, registry, halve).unwrap());
    let pre = lower(registry, binary(BinaryOp::Greater, var("x"), int(0)));
    let post = lower(registry, binary(BinaryOp::Less, var("RESULT"), int(10)));
    let halve = FunctionValue {
        name: "halve".to_string(),
        ..(*halve).clone()
    }
    .with_precondition(pre)
    .with_postcondition(post);
    interpreter.define("halve", Value::Function(Arc::new(halve)));
}

#[test]
fn test_pre_and_postconditions() {
    let registry = Registry::new();
    let mut interpreter = Interpreter::default();
    guarded_function(&registry, &mut interpreter);

    let ok = eval_with(&interpreter, &registry, apply(var("halve"), vec![int(8)])).unwrap();
    assert_eq!(ok, Value::int(4));

    let err = eval_with(&interpreter, &registry, apply(var("halve"), vec![int(0)])).unwrap_err();
    assert_eq!(err.root_cause().code, codes::PRECONDITION_FAILURE);

    let err = eval_with(&interpreter, &registry, apply(var("halve"), vec![int(40)])).unwrap_err();
    assert_eq!(err.root_cause().code, codes::POSTCONDITION_FAILURE);

    let pre_holds = eval_with(&interpreter, &registry, pre(var("halve"), vec![int(0)])).unwrap();
    assert_eq!(pre_holds, Value::Bool(false));
}

#[test]
fn test_condition_checks_can_be_disabled() {
    let registry = Registry::new();
    let mut settings = Settings::default();
    settings.evaluation.pre_checks = false;
    settings.evaluation.post_checks = false;
    let mut interpreter = Interpreter::new(settings);
    guarded_function(&registry, &mut interpreter);

    let value = eval_with(&interpreter, &registry, apply(var("halve"), vec![int(40)])).unwrap();
    assert_eq!(value, Value::int(20));
}

fn ident(name: &str) -> InPattern {
    InPattern::new(PatternKind::Identifier(name.to_string()), Span::default())
}

/// `add: int -> int -> int`, `add(x)(y) == x + y pre x < y`
fn curried_add(registry: &Registry) -> Value {
    let ty = FunctionType::new(vec![Type::Int], Type::function(vec![Type::Int], Type::Int));
    let body = lower(registry, binary(BinaryOp::Plus, var("x"), var("y")));
    let pre = lower(registry, binary(BinaryOp::Less, var("x"), var("y")));
    let add = FunctionValue::new("add", ty, vec![ident("x")], body)
        .curried(vec![ident("y")])
        .with_precondition(pre);
    Value::Function(Arc::new(add))
}

#[test]
fn test_curried_precondition_sees_every_parameter_list() {
    let registry = Registry::new();
    let mut interpreter = Interpreter::default();
    interpreter.define("add", curried_add(&registry));
    let call = |x: i64, y: i64| apply(apply(var("add"), vec![int(x)]), vec![int(y)]);

    assert_eq!(eval_with(&interpreter, &registry, call(1, 2)).unwrap(), Value::int(3));
    let err = eval_with(&interpreter, &registry, call(2, 1)).unwrap_err();
    assert_eq!(err.root_cause().code, codes::PRECONDITION_FAILURE);

    // Supplying only the first list cannot fail the condition yet
    let partial = eval_with(&interpreter, &registry, apply(var("add"), vec![int(9)])).unwrap();
    assert!(matches!(partial, Value::Function(_)));

    let holds = |x: i64, y: i64| apply(pre(var("add"), vec![int(x)]), vec![int(y)]);
    assert_eq!(eval_with(&interpreter, &registry, holds(1, 2)).unwrap(), Value::Bool(true));
    assert_eq!(eval_with(&interpreter, &registry, holds(2, 1)).unwrap(), Value::Bool(false));
}

#[test]
fn test_curried_precondition_can_be_disabled() {
    let registry = Registry::new();
    let mut settings = Settings::default();
    settings.evaluation.pre_checks = false;
    let mut interpreter = Interpreter::new(settings);
    interpreter.define("add", curried_add(&registry));

    let call = apply(apply(var("add"), vec![int(2)]), vec![int(1)]);
    assert_eq!(eval_with(&interpreter, &registry, call).unwrap(), Value::int(3));
}

#[test]
fn test_polymorphic_instantiation() {
    let mut registry = Registry::new();
    let param = Type::Param("T".to_string());
    registry.define_function("id", &["T"], Type::function(vec![param.clone()], param.clone()));
    let mut interpreter = Interpreter::default();

    let body = lambda(vec![(pid("x"), param)], var("x"));
    let id = function_of(eval_with(&interpreter, &registry, body).unwrap());
    let id = FunctionValue {
        name: "id".to_string(),
        ..(*id).clone()
    }
    .with_type_params(&["T"]);
    interpreter.define("id", Value::Function(Arc::new(id)));

    let value = eval_with(
        &interpreter,
        &registry,
        apply(instantiate(var("id"), vec![Type::Nat]), vec![int(3)]),
    )
    .unwrap();
    assert_eq!(value, Value::int(3));

    let err = eval_with(&interpreter, &registry, apply(var("id"), vec![int(3)])).unwrap_err();
    assert_eq!(err.root_cause().code, codes::POLYMORPHIC_UNINSTANTIATED);
}

// Type tests

#[test]
fn test_is_and_narrow() {
    assert_eq!(eval(is_type(int(3), Type::Nat)), Value::Bool(true));
    assert_eq!(eval(is_type(unary(UnaryOp::Minus, int(1)), Type::Nat)), Value::Bool(false));
    assert_eq!(eval(is_type(text("a"), Type::seq_of(Type::Char))), Value::Bool(true));
    assert_eq!(eval(narrow(int(3), Type::Real)), Value::int(3));
    assert_eq!(eval(narrow(unary(UnaryOp::Minus, int(1)), Type::Nat)), Value::int(-1));
}

#[test]
fn test_is_reports_invariant_failures() {
    let mut registry = Registry::new();
    let even = registry.define_named("Even", Type::Nat, true);
    let mut interpreter = Interpreter::default();
    let inv = lambda(
        vec![(pid("n"), Type::Nat)],
        binary(BinaryOp::Equals, binary(BinaryOp::Mod, var("n"), int(2)), int(0)),
    );
    let inv = eval_with(&interpreter, &registry, inv).unwrap();
    interpreter.define("inv_Even", inv);

    let ty = Type::Named(even);
    let yes = eval_with(&interpreter, &registry, is_type(int(4), ty.clone())).unwrap();
    assert_eq!(yes, Value::Bool(true));
    let err = eval_with(&interpreter, &registry, is_type(int(3), ty)).unwrap_err();
    assert_eq!(err.root_cause().code, codes::INVARIANT_VIOLATION);
}

#[test]
fn test_broken_invariant_keeps_its_cause() {
    let mut registry = Registry::new();
    let odd = registry.define_named("Odd", Type::Nat, true);
    let mut interpreter = Interpreter::default();
    let inv = lambda(
        vec![(pid("n"), Type::Nat)],
        binary(BinaryOp::Equals, binary(BinaryOp::Mod, var("n"), int(0)), int(1)),
    );
    let inv = eval_with(&interpreter, &registry, inv).unwrap();
    interpreter.define("inv_Odd", inv);

    let err = eval_with(&interpreter, &registry, is_type(int(3), Type::Named(odd))).unwrap_err();
    assert_eq!(err.code, codes::INVARIANT_VIOLATION);
    assert!(err.message.contains("could not be evaluated"), "{}", err.message);
    assert_eq!(err.root_cause().code, codes::DIVISION_BY_ZERO);
}

// Objects and operations

#[derive(Debug)]
struct Deposit;

impl OperationBody for Deposit {
    fn execute(&self, ctx: &Context<'_>) -> EvalResult<Value> {
        let amount = ctx
            .lookup("amount")
            .ok_or_else(|| RuntimeError::name_not_found("amount"))?;
        let account = ctx
            .self_object()
            .ok_or_else(|| RuntimeError::new(codes::NO_SELF, "no account"))?;
        let balance = account
            .member("balance")
            .ok_or_else(|| RuntimeError::name_not_found("balance"))?;
        let updated = Value::number(balance.as_numeric()?.plus(amount.as_numeric()?));
        account.set_member("balance", updated.clone());
        Ok(updated)
    }
}

fn account_setup() -> (Registry, Interpreter, ObjectRef) {
    let mut registry = Registry::new();
    registry.define_class(ClassDef::new("Base"));
    registry.define_class(
        ClassDef::new("Account")
            .extends("Base")
            .member("balance", Binding::value(Type::Nat), Access::Public),
    );
    registry.define_value("acct", Type::Class("Account".to_string()));
    registry.define_operation("deposit", Type::operation(vec![Type::Nat], Type::Nat, false));

    let base = ObjectValue::new("Base", Vec::new(), Vec::new());
    let account = ObjectValue::new(
        "Account",
        vec![base],
        vec![("balance".to_string(), Value::int(5))],
    );

    let post = lower(
        &registry,
        binary(
            BinaryOp::Equals,
            var("balance"),
            binary(BinaryOp::Plus, old_var("balance"), var("amount")),
        ),
    );
    let ty = OperationType {
        params: vec![Type::Nat],
        result: Box::new(Type::Nat),
        pure: false,
    };
    let param = InPattern::new(PatternKind::Identifier("amount".to_string()), Span::default());
    let deposit = OperationValue::new("deposit", ty, vec![param], Arc::new(Deposit))
        .with_postcondition(post)
        .with_self(Arc::clone(&account));

    let mut interpreter = Interpreter::default();
    interpreter.define("acct", Value::Object(Arc::clone(&account)));
    interpreter.define("deposit", Value::Operation(Arc::new(deposit)));
    (registry, interpreter, account)
}

#[test]
fn test_object_members_and_classes() {
    let (registry, interpreter, _) = account_setup();
    let run = |expr| eval_with(&interpreter, &registry, expr).unwrap();

    assert_eq!(run(field(var("acct"), "balance")), Value::int(5));
    assert_eq!(run(is_of_class("Account", var("acct"))), Value::Bool(true));
    assert_eq!(run(is_of_class("Base", var("acct"))), Value::Bool(true));
    assert_eq!(run(is_of_base_class("Base", var("acct"))), Value::Bool(true));
    assert_eq!(run(is_of_class("Ledger", var("acct"))), Value::Bool(false));
    assert_eq!(run(same_class(var("acct"), var("acct"))), Value::Bool(true));
}

#[test]
fn test_operation_call_updates_history() {
    let (registry, interpreter, account) = account_setup();

    let value = eval_with(&interpreter, &registry, apply(var("deposit"), vec![int(3)])).unwrap();
    assert_eq!(value, Value::int(8));
    assert_eq!(account.member("balance"), Some(Value::int(8)));

    let counters = account.history("deposit");
    assert_eq!((counters.req, counters.act, counters.fin), (1, 1, 1));
    assert_eq!(counters.active(), 0);

    let root = interpreter.root_context();
    let inside = root.object_child("Account", Arc::clone(&account));
    let fin = lower(&registry, history(HistoryOp::Fin, &["deposit"]));
    assert_eq!(fin.eval(&inside).unwrap(), Value::int(1));
}

#[test]
fn test_history_needs_an_object() {
    assert_eq!(failure(history(HistoryOp::Req, &["deposit"])), codes::NO_SELF);
}

// Threads, clocks and hooks

#[derive(Debug)]
struct SteppingClock {
    start: Instant,
    ticks: AtomicU64,
}

impl SteppingClock {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            ticks: AtomicU64::new(0),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Instant {
        self.start + Duration::from_secs(self.ticks.fetch_add(1, Ordering::SeqCst))
    }

    fn time(&self) -> u64 {
        42
    }
}

fn hasty_interpreter() -> Interpreter {
    let mut settings = Settings::default();
    settings.evaluation.quantifier_timeout_ms = Some(10);
    Interpreter::new(settings).with_clock(Arc::new(SteppingClock::new()))
}

#[test]
fn test_quantifier_timeout() {
    let interpreter = hasty_interpreter();
    let registry = Registry::new();
    let expr = forall(
        vec![multi_in_set(vec![pid("x")], set_range(int(1), int(100)))],
        binary(BinaryOp::Greater, var("x"), int(0)),
    );
    assert_eq!(eval_with(&interpreter, &registry, expr).unwrap(), Value::Undefined);

    let selected = iota(in_set(pid("x"), set_range(int(1), int(100))), bool_lit(true));
    assert_eq!(eval_with(&interpreter, &registry, selected).unwrap(), Value::Undefined);
}

#[test]
fn test_time_reads_the_clock() {
    let interpreter = hasty_interpreter();
    let value = eval_with(&interpreter, &Registry::new(), time()).unwrap();
    assert_eq!(value, Value::int(42));
}

#[derive(Debug, Default)]
struct CountingHooks {
    visits: AtomicUsize,
}

impl EvalHooks for CountingHooks {
    fn visited(&self, _span: &Span) {
        self.visits.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_hooks_see_every_node() {
    let hooks = Arc::new(CountingHooks::default());
    let interpreter = Interpreter::default().with_hooks(hooks.clone());
    let expr = binary(BinaryOp::Plus, int(1), int(2));
    eval_with(&interpreter, &Registry::new(), expr).unwrap();
    assert_eq!(hooks.visits.load(Ordering::SeqCst), 3);
}

#[derive(Debug, Default)]
struct Recorder {
    seen: Mutex<Vec<Value>>,
}

impl ValueListener for Recorder {
    fn changed(&self, value: &Value) {
        self.seen.lock().unwrap().push(value.clone());
    }
}

#[test]
fn test_updatable_notifications() {
    let interpreter = Interpreter::default();
    let ctx = interpreter.root_context();
    let cell = UpdatableValue::new(Value::int(1));
    let recorder = Arc::new(Recorder::default());
    cell.add_listener(recorder.clone());

    cell.set(Value::int(2), &ctx);
    assert_eq!(*recorder.seen.lock().unwrap(), vec![Value::int(2)]);

    {
        let _atomic = ctx.thread().begin_atomic();
        cell.set(Value::int(3), &ctx);
        cell.set(Value::int(4), &ctx);
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }
    assert_eq!(*recorder.seen.lock().unwrap(), vec![Value::int(2), Value::int(4)]);
}

#[test]
fn test_updatable_reads() {
    let mut interpreter = Interpreter::default();
    let cell = UpdatableValue::new(Value::int(1));
    interpreter.define("counter", Value::Updatable(cell.clone()));
    let registry = Registry::new();

    let expr = lower(&registry, binary(BinaryOp::Plus, var("counter"), var("counter")));
    let ctx = interpreter.root_context();
    let reads = expr.updatable_reads(&ctx);
    assert_eq!(reads.len(), 1);
    assert_eq!(reads[0].id(), cell.id());
    assert_eq!(expr.eval(&ctx).unwrap(), Value::int(2));
}

// Contexts

#[test]
fn test_context_shadowing_and_flatten() {
    let interpreter = Interpreter::default();
    let mut root = interpreter.root_context();
    root.define("g", Value::int(0));

    let mut outer = root.child("outer");
    outer.define("x", Value::int(1));
    let mut inner = outer.child("inner");
    inner.define("x", Value::int(2));
    inner.define_type_param("T", Type::Nat);

    assert_eq!(inner.lookup("x"), Some(Value::int(2)));
    assert_eq!(inner.lookup("g"), Some(Value::int(0)));
    assert_eq!(inner.lookup_type_param("T"), Some(Type::Nat));
    assert_eq!(inner.depth(), 3);

    let captured = inner.flatten();
    assert_eq!(captured.get("x"), Some(&Value::int(2)));
    assert_eq!(captured.get("g"), None);
}

#[test]
fn test_run_rejects_unchecked_trees() {
    let interpreter = Interpreter::default();
    let err = interpreter.run(&binary(BinaryOp::Plus, int(1), int(2))).unwrap_err();
    assert!(matches!(err, EvaluationError::Remap(_)));
}

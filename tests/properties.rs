//! Algebraic properties of the arithmetic, map operators and quantifiers

use std::collections::{BTreeMap, BTreeSet};

use num_bigint::BigInt;
use num_integer::Integer;
use proptest::prelude::*;

use vdmx::diagnostics::error_codes::runtime as codes;
use vdmx::interpreter::ops;
use vdmx::interpreter::Numeric;
use vdmx::prelude::*;
use vdmx::syntax::builder::*;
use vdmx::typechecker::{Field, RecordType};

fn evaluate(registry: &Registry, mut expr: TcExpr) -> Value {
    let env = TypeEnv::new(registry);
    TypeChecker::new().check(&mut expr, &env);
    let runtime = to_runtime(&expr).expect("every node is annotated");
    Interpreter::default()
        .evaluate(&runtime)
        .expect("evaluation succeeds")
}

fn sign(n: &Numeric) -> i8 {
    if n.is_zero() {
        0
    } else if n.is_negative() {
        -1
    } else {
        1
    }
}

fn int_map(pairs: &BTreeMap<u8, u8>) -> Value {
    Value::map_of(
        pairs
            .iter()
            .map(|(k, v)| (Value::int(i64::from(*k)), Value::int(i64::from(*v)))),
    )
}

fn int_set(items: &BTreeSet<i64>) -> TcExpr {
    set_enum(items.iter().map(|&n| int(n)).collect())
}

proptest! {
    #[test]
    fn div_and_rem_reconstruct_the_dividend(x in -10_000i64..10_000, y in -100i64..100) {
        prop_assume!(y != 0);
        let (nx, ny) = (Numeric::from(x), Numeric::from(y));
        let quotient = nx.int_div(&ny).unwrap();
        let remainder = nx.int_rem(&ny).unwrap();
        prop_assert_eq!(quotient.times(&ny).plus(&remainder), nx.clone());
        let rem_sign = sign(&remainder);
        prop_assert!(rem_sign == 0 || rem_sign == sign(&nx));
    }

    #[test]
    fn mod_follows_floor_division(x in -10_000i64..10_000, y in -100i64..100) {
        prop_assume!(y != 0);
        let (nx, ny) = (Numeric::from(x), Numeric::from(y));
        let modulus = nx.int_mod(&ny).unwrap();
        prop_assert_eq!(modulus.clone(), Numeric::from(x - y * Integer::div_floor(&x, &y)));
        let mod_sign = sign(&modulus);
        prop_assert!(mod_sign == 0 || mod_sign == sign(&ny));
    }

    #[test]
    fn munion_fails_only_on_conflicting_keys(
        left in prop::collection::btree_map(0u8..8, 0u8..3, 0..5),
        right in prop::collection::btree_map(0u8..8, 0u8..3, 0..5),
    ) {
        let conflict = left.iter().any(|(k, v)| right.get(k).is_some_and(|w| w != v));
        match ops::binary(BinaryOp::Munion, &int_map(&left), &int_map(&right)) {
            Ok(merged) => {
                prop_assert!(!conflict);
                let keys: BTreeSet<Value> = merged.as_map().unwrap().keys().cloned().collect();
                let expected: BTreeSet<Value> = left
                    .keys()
                    .chain(right.keys())
                    .map(|k| Value::int(i64::from(*k)))
                    .collect();
                prop_assert_eq!(keys, expected);
            }
            Err(err) => {
                prop_assert!(conflict);
                prop_assert_eq!(err.code, codes::INCOMPATIBLE_MERGE);
            }
        }
    }

    #[test]
    fn inverse_is_an_involution_on_injective_maps(
        pairs in prop::collection::btree_map(0u8..10, 0u8..10, 0..6),
    ) {
        let map = int_map(&pairs);
        let injective = pairs.values().collect::<BTreeSet<_>>().len() == pairs.len();
        match ops::unary(UnaryOp::Inverse, &map) {
            Ok(inverted) => {
                prop_assert!(injective);
                prop_assert_eq!(ops::unary(UnaryOp::Inverse, &inverted).unwrap(), map);
            }
            Err(err) => {
                prop_assert!(!injective);
                prop_assert_eq!(err.code, codes::MAP_NOT_INJECTIVE);
            }
        }
    }

    #[test]
    fn quantifiers_over_nothing(predicate in any::<bool>()) {
        let registry = Registry::new();
        let empty = || vec![multi_in_set(vec![pid("x")], set_enum(Vec::new()))];
        prop_assert_eq!(evaluate(&registry, forall(empty(), bool_lit(predicate))), Value::Bool(true));
        prop_assert_eq!(evaluate(&registry, exists(empty(), bool_lit(predicate))), Value::Bool(false));
    }

    #[test]
    fn forall_is_not_exists_not(
        items in prop::collection::btree_set(-20i64..20, 0..8),
        bound in -20i64..20,
    ) {
        let registry = Registry::new();
        let holds = || binary(BinaryOp::Greater, var("x"), int(bound));
        let binds = || vec![multi_in_set(vec![pid("x")], int_set(&items))];

        let all = evaluate(&registry, forall(binds(), holds()));
        let none_fail = evaluate(
            &registry,
            unary(UnaryOp::Not, exists(binds(), unary(UnaryOp::Not, holds()))),
        );
        prop_assert_eq!(all.clone(), none_fail);
        prop_assert_eq!(all, Value::Bool(items.iter().all(|&x| x > bound)));
    }

    #[test]
    fn record_fields_round_trip(args in prop::collection::vec(-1_000i64..1_000, 1..6)) {
        let mut registry = Registry::new();
        let fields = (0..args.len())
            .map(|i| Field::new(format!("f{}", i), Type::Int))
            .collect();
        registry.define_record(RecordType::new("R", fields));

        for (i, arg) in args.iter().enumerate() {
            let made = mk("R", args.iter().map(|&n| int(n)).collect());
            let selected = evaluate(&registry, field(made, &format!("f{}", i)));
            prop_assert_eq!(selected, Value::int(*arg));
        }
    }

    #[test]
    fn machine_integer_overflow_is_exact(a in (i64::MAX - 1_000)..=i64::MAX, b in 0i64..1_000) {
        let sum = Numeric::from(a).plus(&Numeric::from(b));
        prop_assert_eq!(sum, Numeric::from(BigInt::from(a) + BigInt::from(b)));
    }
}

#[test]
fn integer_max_plus_one() {
    let registry = Registry::new();
    let value = evaluate(&registry, binary(BinaryOp::Plus, int(i64::MAX), int(1)));
    let expected = Value::Numeric(Numeric::from(BigInt::from(i64::MAX) + 1));
    assert_eq!(value, expected);
}

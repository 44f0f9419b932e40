use super::builder::*;
use super::*;

#[test]
fn test_children_of_binary() {
    let expr = binary(BinaryOp::Plus, int(1), var("x"));
    let children = expr.children();
    assert_eq!(children.len(), 2);
    assert_eq!(children[1].kind_name(), "variable");
}

#[test]
fn test_children_include_bind_sets_and_pattern_expressions() {
    let expr = forall(
        vec![multi_in_set(vec![pexpr(var("k"))], var("s"))],
        bool_lit(true),
    );
    let names: Vec<_> = expr.children().iter().map(|c| c.kind_name()).collect();
    assert_eq!(names, vec!["variable", "variable", "literal"]);
}

#[test]
fn test_variable_names_over_approximate() {
    let expr = let_in(
        vec![local_def(pid("y"), None, var("a"))],
        binary(BinaryOp::Times, var("y"), qualified_var("M", "z")),
    );
    let names = expr.variable_names();
    assert!(names.contains("a"));
    assert!(names.contains("y"));
    assert!(names.contains("z"));
    assert!(names.contains("M`z"));
}

#[test]
fn test_find_locates_first_match() {
    let expr = seq_enum(vec![int(1), undefined(), int(3)]);
    let found = expr.find(&|e| matches!(e.kind, ExprKind::Undefined));
    assert!(found.is_some());
    assert!(int(4).find(&|e| matches!(e.kind, ExprKind::Undefined)).is_none());
}

#[test]
fn test_map_phase_preserves_shape_and_ids() {
    let expr = set_enum(vec![int(1), int(2)]);
    let mut count = 0;
    let mapped: Result<Expr<Checked>, ()> = expr.map_phase(&mut |_| {
        count += 1;
        Ok(Some(crate::typechecker::types::Type::Nat))
    });
    let mapped = mapped.expect("mapping succeeds");
    assert_eq!(count, 3);
    assert_eq!(mapped.id, expr.id);
    assert_eq!(mapped.children().len(), 2);
}

#[test]
fn test_map_phase_stops_on_error() {
    let expr = tuple(vec![int(1), var("x")]);
    let result: Result<Expr<Checked>, String> = expr.map_phase(&mut |e| {
        if e.kind_name() == "variable" {
            Err("no".to_string())
        } else {
            Ok(None)
        }
    });
    assert_eq!(result.err(), Some("no".to_string()));
}

#[test]
fn test_pattern_names_in_order_without_duplicates() {
    let pattern = ptuple(vec![pid("a"), pseq(vec![pid("b"), pid("a")]), pignore()]);
    assert_eq!(pattern.names(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_pattern_display() {
    let pattern = pconcat(pseq(vec![pid("h")]), pid("t"));
    assert_eq!(pattern.to_string(), "[h] ^ t");
    assert_eq!(precord("R", vec![pid("x"), pint(1)]).to_string(), "mk_R(x, 1)");
}

#[test]
fn test_name_display() {
    assert_eq!(Name::qualified("A", "x").to_string(), "A`x");
    assert_eq!(Name::simple("x").to_string(), "x");
}

#[test]
fn test_bind_to_multiple() {
    let bind = in_set(pid("x"), var("s"));
    let multiple = bind.to_multiple();
    assert_eq!(multiple.patterns().len(), 1);
    assert!(matches!(multiple, MultipleBind::Set { .. }));
}

use super::*;

fn located(line: usize, col: usize) -> Span {
    Span::at("spec.vdmsl", line, col)
}

#[test]
fn diagnostic_serializes_code_and_message() {
    let diag = Diagnostic::error(types::TYPE_MISMATCH)
        .message("Type mismatch")
        .span(Span::new(PathBuf::from("test.vdmsl"), 10, 20, 1, 10, 1, 20))
        .build();

    let json = diag.to_json();
    assert!(json.contains("E3001"));
    assert!(json.contains("Type mismatch"));
    assert!(!json.contains("notes"));
}

#[test]
fn cover_spans_both_ends() {
    let first = Span::new(PathBuf::from("test.vdmsl"), 10, 20, 1, 10, 1, 20);
    let second = Span::new(PathBuf::from("test.vdmsl"), 15, 30, 1, 15, 2, 5);

    let covered = second.cover(&first);
    assert_eq!(covered.start, 10);
    assert_eq!(covered.end, 30);
    assert_eq!((covered.start_line, covered.start_col), (1, 10));
    assert_eq!((covered.end_line, covered.end_col), (2, 5));
}

#[test]
fn span_displays_file_line_and_column() {
    assert_eq!(located(4, 12).to_string(), "spec.vdmsl:4:12");
    assert_eq!(Span::default().to_string(), ":1:1");
}

#[test]
fn warnings_are_not_errors() {
    let diag = Diagnostic::warning(warnings::IMPURE_IN_PURE)
        .message("Impure operation call")
        .build();
    assert!(!diag.is_error());
    assert_eq!(diag.severity, Severity::Warning);
    assert_eq!(diag.span, Span::default());
}

#[test]
fn display_includes_notes() {
    let diag = Diagnostic::error(types::TYPE_MISMATCH)
        .message("Expected nat, found bool")
        .span(located(1, 1))
        .note(Note::new("constraint came from the enclosing set").with_span(located(1, 5)))
        .build();

    let output = diag.to_string();
    assert!(output.starts_with("error[E3001] spec.vdmsl:1:1: Expected nat"), "{}", output);
    assert!(output.contains("note: constraint"));
}

#[test]
fn miette_sees_code_and_help() {
    let diag = Diagnostic::error(types::UNKNOWN_IDENTIFIER)
        .message("Unknown identifier `y`")
        .note(Note::new("did you mean `x`?"))
        .build();

    let reported: &dyn miette::Diagnostic = &diag;
    assert_eq!(reported.code().map(|c| c.to_string()), Some("E3002".to_string()));
    assert_eq!(reported.severity(), Some(miette::Severity::Error));
    assert_eq!(
        reported.help().map(|h| h.to_string()),
        Some("did you mean `x`?".to_string())
    );
}

#[test]
fn bag_counts_by_severity() {
    let mut bag = DiagnosticBag::new();
    assert!(bag.is_empty());

    bag.push(Diagnostic::error(types::UNKNOWN_IDENTIFIER).message("error").build());
    bag.push(Diagnostic::warning(warnings::MAY_FAIL).message("warning").build());

    assert_eq!(bag.len(), 2);
    assert!(bag.has_errors());
    assert_eq!(bag.errors().count(), 1);
    assert_eq!(bag.warnings().count(), 1);
    assert!(bag.contains_code(types::UNKNOWN_IDENTIFIER));
    assert!(!bag.contains_code(types::UNKNOWN_FIELD));
}

#[test]
fn extend_keeps_recording_order() {
    let mut bag = DiagnosticBag::from(Diagnostic::error("E3001").message("err1").build());
    bag.extend(DiagnosticBag::from(
        Diagnostic::warning("W5001").message("warn1").build(),
    ));

    let codes: Vec<&str> = bag.iter().map(|d| d.code.as_str()).collect();
    assert_eq!(codes, vec!["E3001", "W5001"]);
    assert_eq!(bag.to_string().lines().count(), 2);
}

#[test]
fn sort_puts_errors_first_at_the_same_spot() {
    let mut bag = DiagnosticBag::new();
    bag.push(Diagnostic::error("E3001").span(located(3, 1)).build());
    bag.push(Diagnostic::warning("W5005").span(located(1, 4)).build());
    bag.push(Diagnostic::error("E3002").span(located(1, 4)).build());

    bag.sort_by_location();
    let codes: Vec<String> = bag.into_vec().into_iter().map(|d| d.code).collect();
    assert_eq!(codes, vec!["E3002", "W5005", "E3001"]);
}

#[test]
fn bag_serializes_as_array() {
    let bag = DiagnosticBag::from(Diagnostic::error("E3002").message("test error").build());

    let json = bag.to_json();
    assert!(json.starts_with('['));
    assert!(json.contains("E3002"));
    assert!(json.contains("test error"));

    let back: DiagnosticBag = serde_json::from_str(&json).unwrap();
    assert_eq!(back, bag);
}

#[test]
fn invariant_codes_are_recognised() {
    assert!(is_invariant_code(runtime::INVARIANT_VIOLATION));
    assert!(!is_invariant_code(runtime::DIVISION_BY_ZERO));
}

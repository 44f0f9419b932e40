use super::*;
use std::io::Write;

#[test]
fn test_parse_empty_settings_uses_defaults() {
    let settings = Settings::parse("").unwrap();
    assert_eq!(settings, Settings::default());
    assert!(settings.evaluation.dynamic_type_checks);
    assert_eq!(settings.evaluation.precision, numeric::DEFAULT_PRECISION);
    assert_eq!(settings.quantifier_timeout(), None);
}

#[test]
fn test_parse_full_settings() {
    let content = r#"
[checker]
strict = true

[evaluation]
precision = 40
dynamic_type_checks = false
pre_checks = true
post_checks = false
inv_checks = true
quantifier_timeout_ms = 250
undefined_logic = "literal-only"
"#;

    let settings = Settings::parse(content).unwrap();
    assert!(settings.checker.strict);
    assert_eq!(settings.evaluation.precision, 40);
    assert!(!settings.evaluation.dynamic_type_checks);
    assert!(!settings.evaluation.post_checks);
    assert_eq!(
        settings.quantifier_timeout(),
        Some(Duration::from_millis(250))
    );
    assert_eq!(
        settings.evaluation.undefined_logic,
        UndefinedLogic::LiteralOnly
    );
}

#[test]
fn test_zero_precision_rejected() {
    let err = Settings::parse("[evaluation]\nprecision = 0\n").unwrap_err();
    assert!(matches!(err, SettingsError::Validation(_)));
}

#[test]
fn test_bad_toml_is_parse_error() {
    let err = Settings::parse("[evaluation\nprecision = 3").unwrap_err();
    assert!(matches!(err, SettingsError::Parse(_)));
}

#[test]
fn test_round_trip_through_toml() {
    let mut settings = Settings::default();
    settings.checker.strict = true;
    settings.evaluation.quantifier_timeout_ms = Some(10);

    let text = settings.to_toml().unwrap();
    let parsed = Settings::parse(&text).unwrap();
    assert_eq!(parsed, settings);
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vdmx.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[evaluation]\nprecision = 25").unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.evaluation.precision, 25);
}

#[test]
fn test_load_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Settings::load(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, SettingsError::Io(_)));
}

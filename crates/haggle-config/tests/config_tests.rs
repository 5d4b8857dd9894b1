// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Haggle configuration system.

use haggle_config::diagnostic::{suggest_key, ConfigError};
use haggle_config::model::HaggleConfig;
use haggle_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_haggle_config() {
    let toml = r#"
[session]
send_timeout_secs = 10
mailbox_capacity = 64
mark_read_enabled = false

[push]
stream_buffer = 128

[roster]
mailbox_capacity = 32
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.session.send_timeout_secs, 10);
    assert_eq!(config.session.mailbox_capacity, 64);
    assert!(!config.session.mark_read_enabled);
    assert_eq!(config.push.stream_buffer, 128);
    assert_eq!(config.roster.mailbox_capacity, 32);
}

/// Unknown field in [session] section produces an error.
#[test]
fn unknown_field_in_session_produces_error() {
    let toml = r#"
[session]
send_timeot_secs = 10
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("send_timeot_secs"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let toml = "";
    let config = load_config_from_str(toml).expect("empty TOML should use defaults");

    assert_eq!(config.session.send_timeout_secs, 30);
    assert_eq!(config.session.mailbox_capacity, 256);
    assert!(config.session.mark_read_enabled);
    assert_eq!(config.push.stream_buffer, 512);
    assert_eq!(config.roster.mailbox_capacity, 256);
}

/// Env-style dotted overrides beat TOML values.
#[test]
fn dotted_override_beats_toml() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let toml_content = r#"
[session]
send_timeout_secs = 10
"#;

    // Simulates HAGGLE_SESSION_SEND_TIMEOUT_SECS without touching process env
    let config: HaggleConfig = Figment::new()
        .merge(Serialized::defaults(HaggleConfig::default()))
        .merge(Toml::string(toml_content))
        .merge(("session.send_timeout_secs", 5u64))
        .extract()
        .expect("should merge override");

    assert_eq!(config.session.send_timeout_secs, 5);
}

/// Missing config files are silently skipped (Figment's Toml::file() behavior).
#[test]
fn missing_config_files_silently_skipped() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: HaggleConfig = Figment::new()
        .merge(Serialized::defaults(HaggleConfig::default()))
        .merge(Toml::file("/nonexistent/path/haggle.toml"))
        .extract()
        .expect("missing file should be silently skipped");

    assert_eq!(config.session.send_timeout_secs, 30);
}

/// Loading from an explicit path picks up the file contents.
#[test]
fn load_from_explicit_path() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().expect("create temp file");
    writeln!(file, "[push]\nstream_buffer = 64").expect("write temp config");

    let config =
        haggle_config::load_config_from_path(file.path()).expect("should load from path");
    assert_eq!(config.push.stream_buffer, 64);
    // Untouched sections keep defaults
    assert_eq!(config.session.send_timeout_secs, 30);
}

/// Unexpected top-level section is rejected by deny_unknown_fields.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[logging]
level = "debug"
"#;

    let err =
        load_config_from_str(toml).expect_err("unknown top-level section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("logging"),
        "error should mention unknown field, got: {err_str}"
    );
}

// ============================================================================
// Diagnostic tests
// ============================================================================

/// Unknown key close to a real one produces a "did you mean" suggestion.
#[test]
fn diagnostic_typo_suggests_correction() {
    let valid_keys = &["send_timeout_secs", "mailbox_capacity", "mark_read_enabled"];
    let suggestion = suggest_key("mailbox_capactiy", valid_keys);
    assert_eq!(suggestion, Some("mailbox_capacity".to_string()));
}

/// Error output from load_and_validate_str includes the unknown key name.
#[test]
fn diagnostic_error_includes_unknown_key() {
    let toml = r#"
[session]
send_timeot_secs = 10
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    assert!(!errors.is_empty(), "should have at least one error");

    let has_unknown_key = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "send_timeot_secs"
                && suggestion.as_deref() == Some("send_timeout_secs")
                && valid_keys.contains("send_timeout_secs")
        })
    });
    assert!(
        has_unknown_key,
        "should have UnknownKey error with suggestion, got: {errors:?}"
    );
}

/// Invalid type (string where number expected) produces clear message.
#[test]
fn diagnostic_invalid_type_message() {
    let toml = r#"
[session]
send_timeout_secs = "not_a_number"
"#;

    let err = load_config_from_str(toml).expect_err("should reject invalid type");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("invalid type") || err_str.contains("send_timeout_secs"),
        "error should mention type mismatch, got: {err_str}"
    );
}

/// ConfigError implements miette::Diagnostic (can be rendered).
#[test]
fn config_error_implements_diagnostic() {
    use miette::Diagnostic;

    let error = ConfigError::UnknownKey {
        key: "send_timeot_secs".to_string(),
        suggestion: Some("send_timeout_secs".to_string()),
        valid_keys: "send_timeout_secs, mailbox_capacity, mark_read_enabled".to_string(),
        span: None,
        src: None,
    };

    let code = error.code();
    assert!(code.is_some(), "should have diagnostic code");

    let help = error.help();
    assert!(help.is_some(), "should have help text");
    let help_str = help.unwrap().to_string();
    assert!(
        help_str.contains("did you mean `send_timeout_secs`"),
        "help should contain suggestion, got: {help_str}"
    );
}

/// ConfigError can be rendered using miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::GraphicalReportHandler;

    let error = ConfigError::UnknownKey {
        key: "stream_bufer".to_string(),
        suggestion: Some("stream_buffer".to_string()),
        valid_keys: "stream_buffer".to_string(),
        span: None,
        src: None,
    };

    let handler = GraphicalReportHandler::new();
    let mut buf = String::new();
    handler
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(!buf.is_empty(), "rendered report should not be empty");
    assert!(buf.contains("stream_bufer"), "rendered report should mention the key");
}

/// load_and_validate_str with valid TOML returns Ok config.
#[test]
fn load_and_validate_valid_toml() {
    let toml = r#"
[session]
send_timeout_secs = 15
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should validate");
    assert_eq!(config.session.send_timeout_secs, 15);
}

/// Validation catches a zero send timeout.
#[test]
fn validation_catches_zero_timeout() {
    let toml = r#"
[session]
send_timeout_secs = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("zero timeout should fail");
    let has_validation_error = errors.iter().any(|e| {
        matches!(e, ConfigError::Validation { message } if message.contains("send_timeout_secs"))
    });
    assert!(
        has_validation_error,
        "should have validation error for zero timeout"
    );
}

/// Config diagnostics collapse into the engine error type.
#[test]
fn diagnostics_collapse_to_engine_error() {
    let toml = r#"
[session]
send_timeout_secs = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let engine_err = haggle_config::to_engine_error(errors);
    let rendered = engine_err.to_string();
    assert!(rendered.contains("configuration error"));
    assert!(rendered.contains("send_timeout_secs"));
}

use super::*;
use crate::DispatchError;
use serial_test::serial;
use std::env;

/// Tests mutate process-wide environment variables, so `#[serial]` keeps
/// them from stepping on each other when the test binary runs in parallel.
fn cleanup_test_env() {
    env::remove_var("API_KEY");
    env::remove_var("API_HOST");
    env::remove_var("API_PORT");
    env::remove_var("ALLOWED_ORIGINS");
    env::remove_var("SLA_MINUTES");
    env::remove_var("WARNING_MARKS");
    env::remove_var("SCORE_THRESHOLD");
    env::remove_var("MAX_RETRIES");
}

#[test]
#[serial]
fn missing_api_key_is_a_configuration_error() {
    cleanup_test_env();
    let result = Config::load();
    assert!(result.is_err());
    match result.unwrap_err() {
        DispatchError::Configuration(msg) => assert!(msg.contains("API_KEY")),
        other => panic!("expected Configuration error, got {other:?}"),
    }
    cleanup_test_env();
}

#[test]
#[serial]
fn blank_api_key_is_rejected() {
    cleanup_test_env();
    env::set_var("API_KEY", "");
    let result = Config::load();
    assert!(matches!(result, Err(DispatchError::Configuration(_))));
    cleanup_test_env();
}

#[test]
#[serial]
fn short_api_key_is_rejected() {
    cleanup_test_env();
    env::set_var("API_KEY", "too-short");
    let result = Config::load();
    assert!(matches!(result, Err(DispatchError::Configuration(_))));
    cleanup_test_env();
}

#[test]
#[serial]
fn valid_config_loads_with_defaults() {
    cleanup_test_env();
    env::set_var("API_KEY", "a".repeat(32));
    let config = Config::load().expect("valid API_KEY should load");
    assert_eq!(config.dispatch.sla_minutes, DEFAULT_SLA_MINUTES);
    assert_eq!(config.dispatch.warning_marks, DEFAULT_WARNING_MARKS.to_vec());
    assert_eq!(config.api.host, "127.0.0.1");
    assert_eq!(config.api.port, 3000);
    cleanup_test_env();
}

#[test]
#[serial]
fn score_threshold_out_of_range_is_rejected() {
    cleanup_test_env();
    env::set_var("API_KEY", "a".repeat(32));
    env::set_var("SCORE_THRESHOLD", "1.5");
    let result = Config::load();
    assert!(matches!(result, Err(DispatchError::Configuration(_))));
    cleanup_test_env();
}

#[test]
#[serial]
fn sla_minutes_must_be_positive() {
    cleanup_test_env();
    env::set_var("API_KEY", "a".repeat(32));
    env::set_var("SLA_MINUTES", "0");
    let result = Config::load();
    assert!(matches!(result, Err(DispatchError::Configuration(_))));
    cleanup_test_env();
}

#[test]
#[serial]
fn warning_marks_parses_comma_separated_list() {
    cleanup_test_env();
    env::set_var("API_KEY", "a".repeat(32));
    env::set_var("WARNING_MARKS", "10, 5, 2");
    let config = Config::load().expect("valid WARNING_MARKS should load");
    assert_eq!(config.dispatch.warning_marks, vec![10, 5, 2]);
    cleanup_test_env();
}

#[test]
#[serial]
fn malformed_warning_marks_is_rejected() {
    cleanup_test_env();
    env::set_var("API_KEY", "a".repeat(32));
    env::set_var("WARNING_MARKS", "10,not-a-number");
    let result = Config::load();
    assert!(matches!(result, Err(DispatchError::Configuration(_))));
    cleanup_test_env();
}

//! Environment-driven configuration
//!
//! These tests mutate process environment variables and run serially.

use ruqad_common::RuqadError;
use ruqad_monitor::config::{MonitorConfig, DEFAULT_GITLAB_PROJECT_ID};
use ruqad_monitor::FailurePolicy;
use serial_test::serial;
use std::path::PathBuf;

const VARIABLES: &[&str] = &[
    "KADIHOST",
    "KADITOKEN",
    "KADI_TIMEOUT_SECS",
    "GITLAB_API_URL",
    "GITLAB_PROJECT_ID",
    "GITLAB_PIPELINE_REF",
    "GITLAB_PIPELINE_TOKEN",
    "GITLAB_API_TOKEN",
    "S3_ENDPOINT",
    "S3_BUCKET",
    "S3_ACCESS_KEY_ID",
    "S3_SECRET_ACCESS_KEY",
    "CATALOG_URL",
    "CATALOG_TOKEN",
    "SKIP_QUALITY_CHECK",
    "RUQAD_POLL_INTERVAL_SECS",
    "RUQAD_MAX_RECORDS_PER_CYCLE",
    "RUQAD_PIPELINE_POLL_SECS",
    "RUQAD_PIPELINE_MAX_WAIT_SECS",
    "RUQAD_FAILURE_POLICY",
    "RUQAD_CURSOR_FILE",
    "RUQAD_START_CURSOR",
];

fn clear_env() {
    for name in VARIABLES {
        std::env::remove_var(name);
    }
}

fn set_kadi() {
    std::env::set_var("KADIHOST", "https://demo-kadi4mat.iam.kit.edu/");
    std::env::set_var("KADITOKEN", "pat_test");
}

#[test]
#[serial]
fn test_skip_quality_check_needs_only_repository_secrets() {
    clear_env();
    set_kadi();
    std::env::set_var("SKIP_QUALITY_CHECK", "1");

    let config = MonitorConfig::load().unwrap();

    assert!(config.cycle.skip_quality_check);
    assert!(config.pipeline.is_none());
    assert!(config.storage.is_none());
    assert_eq!(config.kadi.host, "https://demo-kadi4mat.iam.kit.edu");
    assert_eq!(config.cycle.poll_interval_secs, 5);
    assert_eq!(config.cycle.max_records_per_cycle, 5);
    assert_eq!(config.cycle.failure_policy, FailurePolicy::AbortCycle);
    assert_eq!(config.cycle.start_cursor.timestamp(), 631_161_282);

    clear_env();
}

#[test]
#[serial]
fn test_missing_secrets_are_reported_together() {
    clear_env();

    let err = MonitorConfig::load().unwrap_err();

    match err {
        RuqadError::MissingEnv(missing) => {
            for name in [
                "KADIHOST",
                "KADITOKEN",
                "GITLAB_PIPELINE_TOKEN",
                "GITLAB_API_TOKEN",
                "S3_ACCESS_KEY_ID",
                "S3_SECRET_ACCESS_KEY",
            ] {
                assert!(missing.iter().any(|m| m == name), "{name} not reported");
            }
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
#[serial]
fn test_full_configuration() {
    clear_env();
    set_kadi();
    std::env::set_var("GITLAB_PIPELINE_TOKEN", "trigger");
    std::env::set_var("GITLAB_API_TOKEN", "api");
    std::env::set_var("S3_ACCESS_KEY_ID", "minioadmin");
    std::env::set_var("S3_SECRET_ACCESS_KEY", "minioadmin");
    std::env::set_var("S3_ENDPOINT", "http://localhost:9000");
    std::env::set_var("RUQAD_PIPELINE_MAX_WAIT_SECS", "600");
    std::env::set_var("RUQAD_FAILURE_POLICY", "continue");
    std::env::set_var("RUQAD_CURSOR_FILE", "/var/lib/ruqad/cursor.json");
    std::env::set_var("RUQAD_MAX_RECORDS_PER_CYCLE", "20");

    let config = MonitorConfig::load().unwrap();

    let pipeline = config.pipeline.unwrap();
    assert_eq!(pipeline.project_id, DEFAULT_GITLAB_PROJECT_ID);
    assert_eq!(pipeline.pipeline_ref, "ruqad");
    assert_eq!(pipeline.poll_interval_secs, 1);
    assert_eq!(pipeline.max_wait_secs, Some(600));

    let storage = config.storage.unwrap();
    assert_eq!(storage.endpoint.as_deref(), Some("http://localhost:9000"));
    assert_eq!(storage.bucket, "ruqad");

    assert_eq!(config.cycle.failure_policy, FailurePolicy::Continue);
    assert_eq!(config.cycle.max_records_per_cycle, 20);
    assert_eq!(
        config.cycle.cursor_file,
        Some(PathBuf::from("/var/lib/ruqad/cursor.json"))
    );
    assert_eq!(config.catalog.url, "http://localhost:10080");

    clear_env();
}

#[test]
#[serial]
fn test_invalid_failure_policy_is_rejected() {
    clear_env();
    set_kadi();
    std::env::set_var("SKIP_QUALITY_CHECK", "1");
    std::env::set_var("RUQAD_FAILURE_POLICY", "retry-forever");

    let err = MonitorConfig::load().unwrap_err();
    assert!(matches!(err, RuqadError::Config(_)));

    clear_env();
}

#[test]
#[serial]
fn test_zero_poll_interval_is_rejected() {
    clear_env();
    set_kadi();
    std::env::set_var("SKIP_QUALITY_CHECK", "1");
    std::env::set_var("RUQAD_POLL_INTERVAL_SECS", "0");

    assert!(MonitorConfig::load().is_err());

    clear_env();
}

#[test]
#[serial]
fn test_debug_output_redacts_secrets() {
    clear_env();
    std::env::set_var("KADIHOST", "https://demo-kadi4mat.iam.kit.edu");
    std::env::set_var("KADITOKEN", "pat_secret_kadi");
    std::env::set_var("GITLAB_PIPELINE_TOKEN", "glptt_secret_trigger");
    std::env::set_var("GITLAB_API_TOKEN", "glpat_secret_api");
    std::env::set_var("S3_ACCESS_KEY_ID", "secret_access");
    std::env::set_var("S3_SECRET_ACCESS_KEY", "secret_s3_key");
    std::env::set_var("CATALOG_TOKEN", "secret_catalog");

    let config = MonitorConfig::load().unwrap();
    let debug = format!("{:?}", config);

    for secret in [
        "pat_secret_kadi",
        "glptt_secret_trigger",
        "glpat_secret_api",
        "secret_access",
        "secret_s3_key",
        "secret_catalog",
    ] {
        assert!(!debug.contains(secret), "{secret} leaked into {debug}");
    }
    assert!(debug.contains("demo-kadi4mat.iam.kit.edu"));
    assert!(debug.contains("<redacted>"));

    clear_env();
}

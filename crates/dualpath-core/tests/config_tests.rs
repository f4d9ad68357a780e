use dualpath_core::{Concurrency, ConfigError, ExperimentBuilder, ExperimentConfig};
use dualpath_test_utils::{returning, sleeping};
use std::io::Write;
use std::time::{Duration, Instant};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_loads_config_file() {
    let file = write_config(
        r#"
        concurrency = "concurrent"
        timeout_ms = 750
        "#,
    );

    let config = ExperimentConfig::from_toml_file(file.path()).unwrap();

    assert_eq!(config.concurrency, Concurrency::Concurrent);
    assert_eq!(config.timeout(), Some(Duration::from_millis(750)));
    assert!(!config.error_on_mismatch);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let err = ExperimentConfig::from_toml_file(&path).unwrap_err();

    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_file_with_sequential_timeout_is_rejected() {
    let file = write_config("timeout_ms = 100");

    let err = ExperimentConfig::from_toml_file(file.path()).unwrap_err();

    assert!(matches!(err, ConfigError::TimeoutRequiresConcurrency));
}

#[test]
fn test_malformed_file_is_parse_error() {
    let file = write_config("concurrency = \"sometimes\"");

    let err = ExperimentConfig::from_toml_file(file.path()).unwrap_err();

    assert!(matches!(err, ConfigError::Parse(_)));
}

#[tokio::test]
async fn test_loaded_config_drives_the_run() {
    let file = write_config(
        r#"
        concurrency = "concurrent"
        error_on_mismatch = true
        "#,
    );
    let config = ExperimentConfig::from_toml_file(file.path()).unwrap();

    let experiment = ExperimentBuilder::new("from-file")
        .use_control(sleeping(300, 1))
        .try_candidate(sleeping(300, 2))
        .config(config)
        .build()
        .unwrap();

    let start = Instant::now();
    let err = experiment.run().await.unwrap_err();

    assert!(start.elapsed() < Duration::from_millis(550));
    assert!(err.is_mismatch());
}

#[test]
fn test_builder_rejects_config_with_invalid_timeout() {
    let config = ExperimentConfig {
        concurrency: Concurrency::Concurrent,
        timeout_ms: Some(0),
        error_on_mismatch: false,
    };

    let result = ExperimentBuilder::new("invalid")
        .use_control(returning(1))
        .config(config)
        .build();

    assert!(matches!(result, Err(ConfigError::InvalidTimeout)));
}

#[test]
fn test_builder_reports_first_duplicate() {
    let result = ExperimentBuilder::new("dupes")
        .use_control(returning(1))
        .behavior("a", returning(1))
        .behavior("a", returning(2))
        .behavior("b", returning(1))
        .behavior("b", returning(2))
        .build();

    assert!(matches!(result, Err(ConfigError::DuplicateBehavior(name)) if name == "a"));
}

//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use jobwire::config::{ClientConfig, JobConfig, LogFormat, LoggingConfig, DEFAULT_CACHE_BYTE_LIMIT};
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = JobConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_default_cache_limit_is_32_mib() {
    let config = JobConfig::default();
    assert_eq!(config.client.cache_byte_limit, 32 * 1024 * 1024);
    assert_eq!(DEFAULT_CACHE_BYTE_LIMIT, 32 * 1024 * 1024);
}

#[test]
fn test_zero_send_chunk_size() {
    let mut config = JobConfig::default();
    config.client.send_chunk_size = 0;

    let errors = config.validate();
    assert!(!errors.is_empty());
    assert!(errors
        .iter()
        .any(|e| e.contains("Send chunk size must be greater than 0")));
}

#[test]
fn test_excessive_recv_chunk_size() {
    let mut config = JobConfig::default();
    config.client.recv_chunk_size = 64 * 1024 * 1024;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Receive chunk size too large")));
}

#[test]
fn test_tiny_max_body_length() {
    let mut config = JobConfig::default();
    config.client.max_body_length = 4;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Max body length too small")));
}

#[test]
fn test_missing_spool_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = JobConfig::default();
    config.client.spool_dir = Some(dir.path().join("does-not-exist"));

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Spool directory does not exist")));
}

#[test]
fn test_spool_dir_falls_back_to_temp_dir() {
    let config = ClientConfig::default();
    assert_eq!(config.spool_dir(), std::env::temp_dir());

    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig {
        spool_dir: Some(dir.path().to_path_buf()),
        ..ClientConfig::default()
    };
    assert_eq!(config.spool_dir(), dir.path());
}

#[test]
fn test_empty_app_name() {
    let mut config = JobConfig::default();
    config.logging.app_name = String::new();

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Application name cannot be empty")));
}

#[test]
fn test_log_file_in_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = JobConfig::default();
    config.logging.file = Some(dir.path().join("missing").join("client.log"));

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Log file directory does not exist")));
}

#[test]
fn test_log_file_pointing_at_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = JobConfig::default();
    config.logging.file = Some(dir.path().to_path_buf());

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Log file is a directory")));
}

#[test]
fn test_validate_strict_with_invalid_config() {
    let config = JobConfig::default_with_overrides(|c| {
        c.client.send_chunk_size = 0;
        c.logging.app_name = String::new();
    });

    let result = config.validate_strict();
    assert!(result.is_err());

    if let Err(e) = result {
        let error_str = e.to_string();
        assert!(error_str.contains("Configuration validation failed"));
        assert!(error_str.contains("Send chunk size"));
        assert!(error_str.contains("Application name"));
    }
}

#[test]
fn test_toml_roundtrip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobwire.toml");

    let config = JobConfig {
        client: ClientConfig {
            cache_byte_limit: 4096,
            spool_dir: Some(dir.path().to_path_buf()),
            send_chunk_size: 2048,
            recv_chunk_size: 8192,
            max_body_length: 1024 * 1024,
        },
        logging: LoggingConfig {
            app_name: "render-client".to_string(),
            level: Level::DEBUG,
            format: LogFormat::Json,
            file: Some(dir.path().join("client.log")),
        },
    };
    config.save_to_file(&path).expect("save should succeed");

    let loaded = JobConfig::from_file(&path).expect("load should succeed");
    assert_eq!(loaded.client.cache_byte_limit, 4096);
    assert_eq!(loaded.client.spool_dir.as_deref(), Some(dir.path()));
    assert_eq!(loaded.client.send_chunk_size, 2048);
    assert_eq!(loaded.client.recv_chunk_size, 8192);
    assert_eq!(loaded.logging.app_name, "render-client");
    assert_eq!(loaded.logging.level, Level::DEBUG);
    assert_eq!(loaded.logging.format, LogFormat::Json);
    assert_eq!(loaded.logging.file, Some(dir.path().join("client.log")));
    assert!(loaded.validate().is_empty());
}

#[test]
fn test_example_config_parses() {
    let example = JobConfig::example_config();
    assert!(example.contains("cache_byte_limit"));
    let parsed = JobConfig::from_toml(&example).expect("example config should parse");
    assert_eq!(parsed.client.cache_byte_limit, DEFAULT_CACHE_BYTE_LIMIT);
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let toml = r#"
        [client]
        cache_byte_limit = 1024

        [logging]
        level = "warn"
        format = "json"
    "#;
    let config = JobConfig::from_toml(toml).expect("partial config should parse");
    assert_eq!(config.client.cache_byte_limit, 1024);
    assert_eq!(config.client.send_chunk_size, 1024);
    assert_eq!(config.client.recv_chunk_size, 4096);
    assert_eq!(config.logging.level, Level::WARN);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.logging.app_name, "jobwire");
    assert!(config.logging.file.is_none());
}

#[test]
fn test_invalid_log_level_rejected() {
    let toml = r#"
        [logging]
        level = "chatty"
    "#;
    let err = JobConfig::from_toml(toml).unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML"));
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = JobConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

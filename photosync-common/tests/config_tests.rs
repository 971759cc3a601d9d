//! Configuration resolution and graceful degradation
//!
//! Tests that manipulate `PHOTOSYNC_*` variables are marked with #[serial]
//! so they never race each other.

use photosync_common::config::{
    load_toml_or_default, read_toml, resolve, write_toml, LoggingConfig,
};
use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::env;
use tempfile::TempDir;

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct SampleConfig {
    concurrency: Option<usize>,
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    env::set_var("PHOTOSYNC_TEST_CONCURRENCY", "12");
    let value = resolve(None, "PHOTOSYNC_TEST_CONCURRENCY", Some(4usize), 1).unwrap();
    env::remove_var("PHOTOSYNC_TEST_CONCURRENCY");
    assert_eq!(value, 12);
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    env::set_var("PHOTOSYNC_TEST_CONCURRENCY", "12");
    let value = resolve(Some(2usize), "PHOTOSYNC_TEST_CONCURRENCY", Some(4), 1).unwrap();
    env::remove_var("PHOTOSYNC_TEST_CONCURRENCY");
    assert_eq!(value, 2);
}

#[test]
#[serial]
fn test_unparsable_env_is_config_error() {
    env::set_var("PHOTOSYNC_TEST_CONCURRENCY", "many");
    let result = resolve::<usize>(None, "PHOTOSYNC_TEST_CONCURRENCY", None, 1);
    env::remove_var("PHOTOSYNC_TEST_CONCURRENCY");
    assert!(matches!(result, Err(photosync_common::Error::Config(_))));
}

#[test]
fn test_toml_round_trip_on_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("photosync-ingest.toml");
    let config = SampleConfig {
        concurrency: Some(6),
        logging: LoggingConfig {
            level: "debug".to_string(),
            file: None,
        },
    };

    write_toml(&config, &path).unwrap();
    let loaded: SampleConfig = read_toml(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_malformed_toml_falls_back_to_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "concurrency = [not toml").unwrap();

    let loaded: SampleConfig = load_toml_or_default(Some(&path), "photosync-test");
    assert_eq!(loaded, SampleConfig::default());
}

#[test]
fn test_missing_explicit_file_falls_back_to_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    let loaded: SampleConfig = load_toml_or_default(Some(&path), "photosync-test");
    assert_eq!(loaded.concurrency, None);
    assert_eq!(loaded.logging.level, "info");
}

//! Player configuration loaded from TOML files

use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;
use vfp_common::config::resolve_config_path;
use vfp_engine::{Error, PlayerConfig};

const TEST_ENV_VAR: &str = "VFP_ENGINE_TEST_CONFIG";

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_config_file_from_env_var() {
    let file = write_config(
        r#"
min_buffered_duration = 0.5
max_buffered_duration = 2.0
disable_deinterlacing = true
max_consecutive_decode_errors = 3

[sync]
drop_threshold = 0.08
max_drops_per_cycle = 2
"#,
    );
    std::env::set_var(TEST_ENV_VAR, file.path());

    let path = resolve_config_path(None, TEST_ENV_VAR).unwrap();
    let config = PlayerConfig::from_file(&path).unwrap();
    std::env::remove_var(TEST_ENV_VAR);

    assert_eq!(config.min_buffered_duration, 0.5);
    assert_eq!(config.max_buffered_duration, 2.0);
    assert!(config.disable_deinterlacing);
    assert_eq!(config.max_consecutive_decode_errors, 3);
    assert_eq!(config.sync.drop_threshold, 0.08);
    assert_eq!(config.sync.max_drops_per_cycle, 2);
    // Unset fields keep their defaults
    assert_eq!(config.sync.present_tolerance, 0.033);
    assert_eq!(config.event_capacity, 256);
}

#[test]
fn test_reversed_buffer_window_is_normalized() {
    let file = write_config("min_buffered_duration = 1.0\nmax_buffered_duration = 0.5\n");

    let config = PlayerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.max_buffered_duration, 2.0);
}

#[test]
fn test_out_of_range_values_rejected() {
    let file = write_config("min_buffered_duration = -0.1\n");

    let result = PlayerConfig::from_file(file.path());
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_missing_and_malformed_files_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let missing = PlayerConfig::from_file(&dir.path().join("absent.toml"));
    assert!(matches!(
        missing,
        Err(Error::Common(vfp_common::Error::Config(_)))
    ));

    let file = write_config("min_buffered_duration = \"soon\"\n");
    assert!(matches!(
        PlayerConfig::from_file(file.path()),
        Err(Error::Common(_))
    ));
}

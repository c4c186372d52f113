//! Loading configuration from disk

use coursehub::config::ConfigManager;
use coursehub::connection::RearmPolicy;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(
        r#"
        [database]
        uri = "mongodb://db.internal:27017/lms"
        max_pool_size = 20
        socket_timeout = "30s"

        [retry]
        max_retries = 4
        interval = "2s"
        rearm = "on_disconnect"

        [status_server]
        bind_addr = "0.0.0.0:8080"
        "#,
    );

    let config = assert_ok!(ConfigManager::load_from_file(file.path()));

    assert_eq!(config.database.max_pool_size, 20);
    assert_eq!(config.database.socket_timeout, Duration::from_secs(30));
    assert_eq!(config.database.connect_timeout, Duration::from_secs(10));
    assert_eq!(config.retry.max_retries, 4);
    assert_eq!(config.retry.interval, Duration::from_secs(2));
    assert_eq!(config.retry.rearm, RearmPolicy::OnDisconnect);
    assert!(config.status_server.enabled);
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = assert_ok!(ConfigManager::load_from_file(&dir.path().join("absent.toml")));

    assert_eq!(config.database.max_pool_size, 10);
    assert_eq!(config.retry.interval, Duration::from_secs(5));
    assert_eq!(config.status_server.bind_addr.ip().to_string(), "127.0.0.1");
}

#[test]
fn test_malformed_file_is_rejected() {
    let file = write_config("[database\nuri = ");
    assert_err!(ConfigManager::load_from_file(file.path()));
}

#[test]
fn test_invalid_values_are_rejected() {
    let file = write_config(
        r#"
        [database]
        max_pool_size = 0
        "#,
    );
    assert_err!(ConfigManager::load_from_file(file.path()));

    let file = write_config(
        r#"
        [logging]
        level = "chatty"
        "#,
    );
    assert_err!(ConfigManager::load_from_file(file.path()));
}

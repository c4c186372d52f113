//! Connect and retry behavior of the connection manager

mod support;

use coursehub::connection::{ConnectionError, ConnectionManager, ConnectionState, DriverError};
use coursehub::metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;
use support::{settings, settle, unreachable_error, ScriptedDriver};
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

#[tokio::test(start_paused = true)]
async fn test_connects_on_first_attempt() {
    let driver = ScriptedDriver::new();
    let metrics = Arc::new(Metrics::new());
    let manager = ConnectionManager::new(
        settings(3, Duration::from_secs(5)),
        driver.clone(),
        metrics.clone(),
    );

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_ok!(manager.connect());

    let status = manager.wait_until(|s| s.state == ConnectionState::Connected).await;
    assert!(status.connected);
    assert_eq!(status.retry_count, 0);
    assert_eq!(driver.connects(), 1);
    assert_eq!(metrics.get_connect_attempts(), 1);
    assert_eq!(metrics.get_connect_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_two_failures() {
    let driver = ScriptedDriver::new();
    driver.script([Err(unreachable_error()), Err(unreachable_error()), Ok(())]);
    let metrics = Arc::new(Metrics::new());
    let manager = ConnectionManager::new(
        settings(3, Duration::from_secs(5)),
        driver.clone(),
        metrics.clone(),
    );

    let started = Instant::now();
    assert_ok!(manager.connect());
    let status = manager.wait_until(|s| s.connected).await;

    assert_eq!(status.state, ConnectionState::Connected);
    // Counter goes back to zero on success
    assert_eq!(status.retry_count, 0);
    assert!(!status.retries_exhausted);
    assert_eq!(driver.connects(), 3);
    assert_eq!(metrics.get_retries(), 2);

    // Two waits of the retry interval
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(11), "elapsed {:?}", elapsed);

    let times = driver.attempt_times();
    assert_eq!(times[1] - times[0], Duration::from_secs(5));
    assert_eq!(times[2] - times[1], Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_retries() {
    let driver = ScriptedDriver::new();
    driver.fail_always();
    let metrics = Arc::new(Metrics::new());
    let manager = ConnectionManager::new(
        settings(3, Duration::from_secs(5)),
        driver.clone(),
        metrics.clone(),
    );

    assert_ok!(manager.connect());
    let status = manager.wait_until(|s| s.retries_exhausted).await;

    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(!status.connected);
    assert_eq!(status.retry_count, 3);
    // Initial attempt plus one per retry
    assert_eq!(driver.connects(), 4);
    assert_eq!(metrics.get_give_ups(), 1);

    // Nothing else is scheduled after giving up
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(driver.connects(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_gives_up_after_one_attempt() {
    let driver = ScriptedDriver::new();
    driver.fail_always();
    let manager = ConnectionManager::new(
        settings(0, Duration::from_secs(5)),
        driver.clone(),
        Arc::new(Metrics::new()),
    );

    assert_ok!(manager.connect());
    let status = manager.wait_until(|s| s.retries_exhausted).await;

    assert_eq!(status.retry_count, 0);
    assert_eq!(driver.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_connect_after_give_up_starts_fresh() {
    let driver = ScriptedDriver::new();
    driver.fail_always();
    let manager = ConnectionManager::new(
        settings(1, Duration::from_secs(1)),
        driver.clone(),
        Arc::new(Metrics::new()),
    );

    assert_ok!(manager.connect());
    manager.wait_until(|s| s.retries_exhausted).await;
    assert_eq!(driver.connects(), 2);

    driver.succeed_always();
    assert_ok!(manager.connect());
    let status = manager.wait_until(|s| s.connected).await;

    assert_eq!(status.retry_count, 0);
    assert!(!status.retries_exhausted);
    assert_eq!(driver.connects(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_connect_during_retries_is_ignored() {
    let driver = ScriptedDriver::new();
    driver.script([Err(unreachable_error())]);
    let manager = ConnectionManager::new(
        settings(3, Duration::from_secs(5)),
        driver.clone(),
        Arc::new(Metrics::new()),
    );

    assert_ok!(manager.connect());
    settle().await;
    assert_eq!(manager.state(), ConnectionState::Reconnecting);

    assert_ok!(manager.connect());
    assert_ok!(manager.connect());
    manager.wait_until(|s| s.connected).await;
    settle().await;

    assert_eq!(driver.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_target_from_driver_is_not_retried() {
    let driver = ScriptedDriver::new();
    driver.script([Err(DriverError::InvalidTarget("unknown auth mechanism".to_string()))]);
    let manager = ConnectionManager::new(
        settings(3, Duration::from_secs(5)),
        driver.clone(),
        Arc::new(Metrics::new()),
    );

    assert_ok!(manager.connect());
    settle().await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(driver.connects(), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.retry_count(), 0);
}

#[tokio::test]
async fn test_missing_target_is_reported_without_attempting() {
    let driver = ScriptedDriver::new();
    let mut settings = settings(3, Duration::from_secs(5));
    settings.uri = None;
    let manager = ConnectionManager::new(settings, driver.clone(), Arc::new(Metrics::new()));

    let err = assert_err!(manager.connect());
    assert!(matches!(err, ConnectionError::Configuration(_)));

    tokio::task::yield_now().await;
    assert_eq!(driver.connects(), 0);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_wrong_scheme_is_configuration_error() {
    let driver = ScriptedDriver::new();
    let mut settings = settings(3, Duration::from_secs(5));
    settings.uri = Some("mysql://localhost:3306/lms".to_string());
    let manager = ConnectionManager::new(settings, driver.clone(), Arc::new(Metrics::new()));

    let err = assert_err!(manager.connect());
    assert!(matches!(err, ConnectionError::Configuration(_)));
    assert_eq!(driver.connects(), 0);
}

use kubepulse::refresh::{ConnectionState, HealthTracker, Transition};

#[test]
fn test_initial_state_is_connected() {
    let health = HealthTracker::new();
    assert_eq!(health.state(), ConnectionState::Connected);
    assert!(!health.is_disconnected());
}

#[test]
fn test_three_consecutive_failures_disconnect() {
    let health = HealthTracker::new();
    assert_eq!(health.report_error("list failed"), Transition::Degraded);
    assert_eq!(health.report_error("list failed"), Transition::None);
    assert!(!health.is_disconnected());
    assert_eq!(health.report_error("list failed"), Transition::Disconnected);
    assert!(health.is_disconnected());
}

#[test]
fn test_success_resets_counter_and_reconnects() {
    let health = HealthTracker::new();
    health.report_error("a");
    health.report_error("b");
    assert_eq!(health.report_success(), Transition::Reconnected);
    assert_eq!(health.state(), ConnectionState::Connected);

    // counter was reset: two more failures stay degraded
    health.report_error("c");
    assert_eq!(health.report_error("d"), Transition::None);
    assert_eq!(health.state(), ConnectionState::Degraded);
}

#[test]
fn test_success_when_connected_is_no_transition() {
    let health = HealthTracker::new();
    assert_eq!(health.report_success(), Transition::None);
}

#[test]
fn test_last_error_is_recorded() {
    let health = HealthTracker::new();
    assert!(health.last_error().is_none());
    health.report_error("watch desync");
    let (msg, _ts) = health.last_error().expect("recorded");
    assert_eq!(msg, "watch desync");
}

#[test]
fn test_recovery_from_disconnected() {
    let health = HealthTracker::with_threshold(3);
    for _ in 0..5 {
        health.report_error("down");
    }
    assert!(health.is_disconnected());
    assert_eq!(health.report_success(), Transition::Reconnected);
    assert!(!health.is_disconnected());
}

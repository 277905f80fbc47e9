use pioneer_link::health::*;

const TIMEOUT_MS: u64 = 10_000;

#[test]
fn test_health_monitor_creation() {
    let monitor = HealthMonitor::new(0, TIMEOUT_MS);
    let state = monitor.get_state();

    // Monitor starts healthy with the start time as last success
    assert_eq!(state.status, HealthStatus::Normal);
    assert_eq!(state.last_success_ms, 0);
    assert_eq!(state.timeout_ms, TIMEOUT_MS);
    assert!(!state.missing_reported);
}

#[test]
fn test_no_data_ever_reports_missing_after_timeout() {
    let mut monitor = HealthMonitor::new(0, TIMEOUT_MS);

    assert_eq!(monitor.evaluate(9_999, TIMEOUT_MS), None);
    assert_eq!(
        monitor.evaluate(10_000, TIMEOUT_MS),
        Some(HealthTransition::ToError { elapsed_ms: 10_000 })
    );
    assert_eq!(monitor.status(), HealthStatus::Error);
    assert!(monitor.is_missing());
}

#[test]
fn test_error_reported_once_per_episode() {
    let mut monitor = HealthMonitor::new(0, TIMEOUT_MS);
    monitor.on_success(1_000);

    let mut errors = 0;
    for now in (11_000..60_000).step_by(500) {
        if let Some(HealthTransition::ToError { .. }) = monitor.evaluate(now, TIMEOUT_MS) {
            errors += 1;
        }
    }

    assert_eq!(errors, 1);
    assert_eq!(monitor.status(), HealthStatus::Error);
}

#[test]
fn test_normal_reported_once_per_recovery() {
    let mut monitor = HealthMonitor::new(0, TIMEOUT_MS);
    assert!(monitor.evaluate(20_000, TIMEOUT_MS).is_some());

    // Data flows again
    monitor.on_success(20_100);
    assert_eq!(monitor.evaluate(20_200, TIMEOUT_MS), Some(HealthTransition::ToNormal));
    assert_eq!(monitor.status(), HealthStatus::Normal);

    // Subsequent healthy evaluations stay silent
    monitor.on_success(20_300);
    assert_eq!(monitor.evaluate(20_400, TIMEOUT_MS), None);
    assert_eq!(monitor.evaluate(25_000, TIMEOUT_MS), None);
}

#[test]
fn test_repeated_episodes() {
    let mut monitor = HealthMonitor::new(0, TIMEOUT_MS);
    let mut transitions = Vec::new();

    // Two outages separated by a recovery
    for (success, now) in [(None, 10_000), (Some(12_000), 12_500), (None, 22_000), (Some(30_000), 30_001)] {
        if let Some(t) = success {
            monitor.on_success(t);
        }
        if let Some(transition) = monitor.evaluate(now, TIMEOUT_MS) {
            transitions.push(transition);
        }
    }

    assert_eq!(
        transitions,
        vec![
            HealthTransition::ToError { elapsed_ms: 10_000 },
            HealthTransition::ToNormal,
            HealthTransition::ToError { elapsed_ms: 10_000 },
            HealthTransition::ToNormal,
        ]
    );
}

#[test]
fn test_last_success_never_moves_backwards() {
    let mut monitor = HealthMonitor::new(0, TIMEOUT_MS);
    monitor.on_success(5_000);
    monitor.on_success(3_000);
    assert_eq!(monitor.last_success_ms(), 5_000);
}

#[test]
fn test_threshold_change_takes_effect() {
    let mut monitor = HealthMonitor::new(0, TIMEOUT_MS);
    monitor.on_success(1_000);

    // Healthy under 10 s, stale under a 2 s threshold
    assert_eq!(monitor.evaluate(4_000, TIMEOUT_MS), None);
    assert_eq!(
        monitor.evaluate(4_000, 2_000),
        Some(HealthTransition::ToError { elapsed_ms: 3_000 })
    );

    // check() uses the most recent threshold
    monitor.on_success(4_500);
    assert_eq!(monitor.check(5_000), Some(HealthTransition::ToNormal));
    assert_eq!(monitor.get_state().timeout_ms, 2_000);
}

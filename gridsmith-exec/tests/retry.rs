use std::time::Duration;

use gridsmith_exec::retry::{decide_retry, AbortReason, PersistentSignatures, RetryConfig, RetryDecision};

fn no_rng() -> u64 {
    panic!("jitter disabled")
}

#[test]
fn backoff_grows_with_consecutive_failures() {
    let cfg = RetryConfig::default();
    assert_eq!(
        decide_retry(&cfg, 1, 1, false, no_rng),
        RetryDecision::Retry { delay: Duration::from_millis(500) }
    );
    assert_eq!(
        decide_retry(&cfg, 2, 5, false, no_rng),
        RetryDecision::Retry { delay: Duration::from_millis(1000) }
    );
}

#[test]
fn backoff_is_capped() {
    let cfg = RetryConfig {
        max_consecutive_failures: 100,
        max_total_retries: 100,
        max_delay: Duration::from_secs(2),
        ..RetryConfig::default()
    };
    assert_eq!(
        decide_retry(&cfg, 50, 50, false, no_rng),
        RetryDecision::Retry { delay: Duration::from_secs(2) }
    );
}

#[test]
fn consecutive_bound_aborts_on_the_third_failure() {
    let cfg = RetryConfig::default();
    assert!(matches!(decide_retry(&cfg, 2, 2, false, no_rng), RetryDecision::Retry { .. }));
    assert_eq!(
        decide_retry(&cfg, 3, 3, false, no_rng),
        RetryDecision::Abort { reason: AbortReason::ConsecutiveFailures(3) }
    );
}

#[test]
fn total_bound_aborts_even_after_resets() {
    let cfg = RetryConfig::default();
    assert_eq!(
        decide_retry(&cfg, 1, 10, false, no_rng),
        RetryDecision::Abort { reason: AbortReason::TotalRetries(10) }
    );
}

#[test]
fn persistent_failures_are_skipped_regardless_of_counters() {
    let cfg = RetryConfig::default();
    assert_eq!(decide_retry(&cfg, 99, 99, true, no_rng), RetryDecision::Skip);
}

#[test]
fn jitter_uses_the_injected_rng() {
    let cfg = RetryConfig { jitter: true, ..RetryConfig::default() };
    assert_eq!(
        decide_retry(&cfg, 2, 2, false, || 0),
        RetryDecision::Retry { delay: Duration::from_millis(500) }
    );
    assert_eq!(
        decide_retry(&cfg, 2, 2, false, || 500),
        RetryDecision::Retry { delay: Duration::from_millis(1000) }
    );
}

#[test]
fn persistent_signatures_match_case_insensitively() {
    let sigs = PersistentSignatures::default();
    assert_eq!(sigs.matching("Request was Rate Limited by host"), Some("rate limited"));
    assert!(sigs.is_persistent("GeneralException: Access denied."));
    assert!(!sigs.is_persistent("InvalidArgument: bad shape"));

    let custom = PersistentSignatures::new(["Workbook Locked"]);
    assert!(custom.is_persistent("the workbook locked by another user"));
    assert!(!custom.is_persistent("rate limited"));
    assert!(custom.with("quota").is_persistent("Quota hit"));
}

#[test]
fn config_round_trips_through_millisecond_fields() {
    let cfg: RetryConfig = serde_json::from_str(r#"{"baseDelayMs": 250, "jitter": true}"#).unwrap();
    assert_eq!(cfg.base_delay, Duration::from_millis(250));
    assert!(cfg.jitter);
    assert_eq!(cfg.max_consecutive_failures, 3);
    let json = serde_json::to_value(&cfg).unwrap();
    assert_eq!(json["maxDelayMs"], 10_000);
    assert!(RetryConfig { base_delay: Duration::from_secs(60), ..cfg }.validate().is_err());
}

use gridsmith_core::ErrorFamily;
use gridsmith_exec::ledger::{fingerprint, LedgerEntry, OutcomeLedger};

#[test]
fn evicts_oldest_entries_at_capacity() {
    let mut ledger = OutcomeLedger::new(3, 80);
    for i in 0..5 {
        ledger.record_success(&format!("c{i}"), "sheet.getRange(\"A1\").values = [[1]];", 1, 10);
    }
    assert_eq!(ledger.len(), 3);
    let ids: Vec<&str> = ledger.entries().map(LedgerEntry::chunk_id).collect();
    assert_eq!(ids, ["c2", "c3", "c4"]);
    assert_eq!(ledger.stats().evicted, 2);
}

#[test]
fn stores_only_a_bounded_excerpt() {
    let mut ledger = OutcomeLedger::new(10, 20);
    let source = "x".repeat(5_000);
    ledger.record_failure("big", &source, "boom", ErrorFamily::Other, 0);
    let entry = ledger.entries().next().unwrap();
    assert!(entry.excerpt().chars().count() <= 21);
    assert!(entry.is_failure());
}

#[test]
fn stats_aggregate_by_family() {
    let mut ledger = OutcomeLedger::default();
    ledger.record_failure("a", "a()", "dims", ErrorFamily::Dimension, 2);
    ledger.record_failure("b", "b()", "dims", ErrorFamily::Dimension, 1);
    ledger.record_failure("c", "c()", "who", ErrorFamily::Reference, 0);
    ledger.record_success("d", "d()", 4, 30);
    ledger.record_success("e", "e()", 4, 10);

    let stats = ledger.stats();
    assert_eq!(stats.failures, 3);
    assert_eq!(stats.successes, 2);
    assert_eq!(stats.failures_by_category[&ErrorFamily::Dimension], 2);
    assert_eq!(stats.failures_by_category[&ErrorFamily::Reference], 1);
    assert!((stats.success_rate - 0.4).abs() < 1e-9);
    assert_eq!(stats.mean_success_ms, Some(20.0));
}

#[test]
fn suggestions_follow_the_failure_mix() {
    let mut ledger = OutcomeLedger::default();
    assert!(ledger.suggestions().is_empty());

    ledger.record_failure("a", "same()", "dims", ErrorFamily::Dimension, 0);
    ledger.record_failure("a", "same()", "dims", ErrorFamily::Dimension, 0);
    ledger.record_failure("b", "other()", "denied", ErrorFamily::Permission, 0);
    ledger.record_failure("c", "third()", "odd", ErrorFamily::Other, 0);

    let suggestions = ledger.suggestions();
    assert!(suggestions[0].starts_with("2 dimension failures"), "{suggestions:?}");
    assert!(suggestions.iter().any(|s| s.contains("identical source")));
    assert!(suggestions.iter().any(|s| s.contains("smaller chunks")));
    assert!(!suggestions.iter().any(|s| s.contains("permission")));
}

#[test]
fn fingerprints_differ_for_different_sources() {
    assert_ne!(fingerprint("a()"), fingerprint("b()"));
}

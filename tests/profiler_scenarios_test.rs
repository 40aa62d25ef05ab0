//! End-to-end classification scenarios against an in-memory history.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use session_profiler::history::{HistorySource, InMemoryHistorySource};
use session_profiler::priority::Priority;
use session_profiler::profiling::{evaluate, first_satisfied_rule, RuleSet, SessionProfiler};

fn profiler(history: &Arc<InMemoryHistorySource>, rules: RuleSet) -> SessionProfiler {
    SessionProfiler::new(history.clone(), rules, Duration::from_secs(3600), 10)
}

#[tokio::test]
async fn test_repeated_logins_classify_high() {
    let history = Arc::new(InMemoryHistorySource::new());
    record_requests(&history, "session-a", "GET", "/login", 6);
    record_requests(&history, "session-a", "GET", "/products", 20);

    let result = profiler(&history, login_rules())
        .classify("session-a")
        .await
        .unwrap();

    assert_eq!(result.session_id, "session-a");
    assert_eq!(result.priority, Priority::High);
}

#[tokio::test]
async fn test_too_few_logins_falls_through_to_root_rule() {
    let history = Arc::new(InMemoryHistorySource::new());
    record_requests(&history, "session-b", "GET", "/login", 3);
    record_requests(&history, "session-b", "GET", "/products", 19);
    record_requests(&history, "session-b", "POST", "/", 1);

    let result = profiler(&history, login_rules())
        .classify("session-b")
        .await
        .unwrap();

    assert_eq!(result.priority, Priority::Low);
}

#[tokio::test]
async fn test_no_rule_met_without_exact_root_path() {
    let history = Arc::new(InMemoryHistorySource::new());
    record_requests(&history, "session-b2", "GET", "/login", 3);
    record_requests(&history, "session-b2", "GET", "/products", 20);

    let result = profiler(&history, login_rules())
        .classify("session-b2")
        .await
        .unwrap();

    assert_eq!(result.priority, Priority::Unknown);
}

#[tokio::test]
async fn test_short_history_is_unknown_regardless_of_rules() {
    let history = Arc::new(InMemoryHistorySource::new());
    record_requests(&history, "session-c", "GET", "/login", 4);

    let always_low = RuleSetBuilder::new()
        .with_rule(None, "/login", 1, Priority::Low)
        .build();
    let result = profiler(&history, always_low)
        .classify("session-c")
        .await
        .unwrap();

    assert_eq!(result.priority, Priority::Unknown);
}

#[tokio::test]
async fn test_unknown_session_is_unknown() {
    let history = Arc::new(InMemoryHistorySource::new());
    let result = profiler(&history, login_rules())
        .classify("never-seen")
        .await
        .unwrap();
    assert_eq!(result.priority, Priority::Unknown);
}

#[tokio::test]
async fn test_history_failure_is_an_error_not_unknown() {
    let history = Arc::new(InMemoryHistorySource::new());
    record_requests(&history, "session-x", "GET", "/login", 20);
    history.set_unavailable(true);

    let result = profiler(&history, login_rules()).classify("session-x").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_classification_is_idempotent() {
    let history = Arc::new(InMemoryHistorySource::new());
    record_requests(&history, "session-i", "get", "login", 7);
    record_requests(&history, "session-i", "GET", "/cart", 7);

    let profiler = profiler(&history, login_rules());
    let first = profiler.classify("session-i").await.unwrap();
    let second = profiler.classify("session-i").await.unwrap();

    assert_eq!(first.priority, Priority::High);
    assert_eq!(first.priority, second.priority);
    assert_eq!(history.fetch_count(), 2);
}

#[tokio::test]
async fn test_history_is_scoped_per_session() {
    let history = Arc::new(InMemoryHistorySource::new());
    record_requests(&history, "busy", "GET", "/login", 20);
    record_requests(&history, "quiet", "GET", "/", 12);

    let profiler = profiler(&history, login_rules());
    assert_eq!(profiler.classify("busy").await.unwrap().priority, Priority::High);
    assert_eq!(profiler.classify("quiet").await.unwrap().priority, Priority::Low);
}

#[tokio::test]
async fn test_in_memory_history_normalizes_paths() {
    let history = InMemoryHistorySource::new();
    history.record("s", "GET", "login");
    let events = history
        .fetch_session_requests("s", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(events[0].path, "/login");
}

#[test]
fn test_method_match_ignores_case() {
    let rules = RuleSetBuilder::new()
        .with_rule(Some("post"), "/checkout", 2, Priority::High)
        .build();
    let mut events = repeated_events("POST", "/checkout", 1);
    events.extend(repeated_events("Post", "/checkout", 1));

    assert_eq!(evaluate(&rules, &events, 1), Priority::High);
}

#[test]
fn test_wildcard_matches_every_method() {
    let rules = RuleSetBuilder::new()
        .with_rule(None, "/search", 3, Priority::Low)
        .build();
    let mut events = repeated_events("GET", "/search", 1);
    events.extend(repeated_events("POST", "/search", 1));
    events.extend(repeated_events("DELETE", "/search", 1));

    assert_eq!(evaluate(&rules, &events, 1), Priority::Low);
}

#[test]
fn test_earlier_rule_wins_when_both_are_met() {
    let rules = RuleSetBuilder::new()
        .with_rule(None, "/cart", 2, Priority::Low)
        .with_rule(Some("GET"), "/cart", 2, Priority::High)
        .build();
    let events = repeated_events("GET", "/cart", 10);

    let rule = first_satisfied_rule(&rules, &events).unwrap();
    assert_eq!(rule.description(), "rule 1");
    assert_eq!(evaluate(&rules, &events, 10), Priority::Low);
}

#[test]
fn test_empty_rule_set_is_unknown() {
    let events = repeated_events("GET", "/", 50);
    assert_eq!(evaluate(&RuleSet::default(), &events, 10), Priority::Unknown);
}

//! Delivery lifecycle: acknowledge, reject, leave unresolved, reclaim.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use session_profiler::audit::{BatchedAuditLogger, InMemoryAuditSink};
use session_profiler::config::{AuditConfig, ConfigManager};
use session_profiler::messaging::{
    ConsumerId, DeliveryOutcome, DeliveryState, QueueError, QueueErrorKind, WorkQueue,
};
use session_profiler::orchestration::{ProfilerComponents, ProfilerSystem};
use session_profiler::priority::Priority;
use session_profiler::store::PriorityStore;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_classified_session_is_persisted_audited_and_acknowledged() {
    init_test_logging();
    let p = TestPipelineBuilder::new().build();
    record_requests(&p.history, "s1", "GET", "/login", 12);
    p.queue.publish("s1").await.unwrap();

    let item = p.queue.fetch(p.consumer.consumer_id(), 1).await.unwrap().remove(0);
    let outcome = p.consumer.process_delivery(item).await;

    assert_eq!(outcome, DeliveryOutcome::Acknowledged);
    assert_eq!(assert_ok!(p.store.get("s1").await), Some(Priority::High));
    let audited = p.audit.records();
    assert_eq!(audited.len(), 1);
    assert_eq!(audited[0].priority, Priority::High);
    assert!(p.queue.is_empty());
}

#[tokio::test]
async fn test_store_failure_rejects_without_ack() {
    let p = TestPipelineBuilder::new().build();
    record_requests(&p.history, "s1", "GET", "/login", 12);
    p.store.set_fail_writes(true);
    let handle = p.queue.publish("s1").await.unwrap();

    let item = p.queue.fetch(p.consumer.consumer_id(), 1).await.unwrap().remove(0);
    let outcome = p.consumer.process_delivery(item).await;

    assert_eq!(outcome, DeliveryOutcome::Rejected);
    assert_eq!(p.queue.state_of(&handle), Some(DeliveryState::Rejected));
    assert_eq!(p.queue.rejected_session_ids(), vec!["s1".to_string()]);
    assert_eq!(p.consumer.get_stats().get_acknowledged(), 0);

    // A rejected delivery can no longer be acknowledged
    assert_err!(p.queue.ack(p.consumer.consumer_id(), &handle).await);
    // Audit still records the classification even though persistence failed
    assert_eq!(p.audit.records().len(), 1);
}

#[tokio::test]
async fn test_history_failure_leaves_delivery_for_reclaim() {
    let p = TestPipelineBuilder::new()
        .with_liveness_window(Duration::from_millis(50))
        .build();
    record_requests(&p.history, "s1", "GET", "/", 12);
    p.history.set_unavailable(true);
    let handle = p.queue.publish("s1").await.unwrap();

    let item = p.queue.fetch(p.consumer.consumer_id(), 1).await.unwrap().remove(0);
    assert_eq!(item.delivery_count, 1);
    let outcome = p.consumer.process_delivery(item).await;

    assert_eq!(outcome, DeliveryOutcome::Unresolved);
    assert_eq!(p.queue.state_of(&handle), Some(DeliveryState::Unacked));
    assert_eq!(p.consumer.in_flight_count(), 0);
    assert!(p.audit.records().is_empty());
    assert_eq!(p.store.write_count(), 0);

    // Still within the liveness window
    assert_eq!(p.reclaimer.reclaim_once().await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(p.reclaimer.reclaim_once().await.unwrap(), 1);
    assert_eq!(p.queue.ready_session_ids(), vec!["s1".to_string()]);

    p.history.set_unavailable(false);
    let redelivered = p.queue.fetch(p.consumer.consumer_id(), 1).await.unwrap().remove(0);
    assert_eq!(redelivered.delivery_count, 2);
    assert!(redelivered.is_redelivery());

    let outcome = p.consumer.process_delivery(redelivered).await;
    assert_eq!(outcome, DeliveryOutcome::Acknowledged);
    assert_eq!(p.store.get("s1").await.unwrap(), Some(Priority::Low));
}

#[tokio::test]
async fn test_reclaimed_delivery_jumps_ahead_of_ready_items() {
    let p = TestPipelineBuilder::new()
        .with_liveness_window(Duration::from_millis(30))
        .build();
    p.queue.publish("stuck").await.unwrap();
    p.queue.fetch(&ConsumerId::new("crashed"), 1).await.unwrap();
    p.queue.publish("fresh").await.unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(p.reclaimer.reclaim_once().await.unwrap(), 1);

    assert_eq!(
        p.queue.ready_session_ids(),
        vec!["stuck".to_string(), "fresh".to_string()]
    );
}

#[tokio::test]
async fn test_running_consumer_recovers_unresolved_sessions() {
    let p = TestPipelineBuilder::new()
        .with_liveness_window(Duration::from_millis(80))
        .build();
    for session in ["a", "b", "c"] {
        record_requests(&p.history, session, "GET", "/login", 10);
        p.queue.publish(session).await.unwrap();
    }
    p.history.set_unavailable(true);

    let handles = p.consumer.start();
    let reclaim_task = p.reclaimer.start();

    let stats = p.consumer.get_stats();
    assert!(wait_until(Duration::from_secs(2), || stats.get_unresolved() >= 3).await);

    p.history.set_unavailable(false);
    let queue = p.queue.clone();
    assert!(wait_until(Duration::from_secs(5), || queue.is_empty()).await);

    p.consumer.stop().await;
    p.reclaimer.stop();
    handles.polling.await.unwrap();
    handles.heartbeat.await.unwrap();
    reclaim_task.abort();

    for session in ["a", "b", "c"] {
        assert_eq!(p.store.get(session).await.unwrap(), Some(Priority::High));
    }
    assert_eq!(stats.get_acknowledged(), 3);
    assert!(p.reclaimer.stats().reclaimed.load(std::sync::atomic::Ordering::Relaxed) >= 3);
}

#[tokio::test]
async fn test_in_flight_deliveries_never_exceed_prefetch_limit() {
    let p = TestPipelineBuilder::new()
        .with_prefetch_limit(2)
        .with_min_session_requests(1)
        .build();
    for i in 0..6 {
        let session = format!("s{i}");
        p.history.record(&session, "GET", "/");
        p.queue.publish(&session).await.unwrap();
    }

    let handles = p.consumer.start();
    let stats = p.consumer.get_stats();
    let consumer = p.consumer.clone();
    let mut max_in_flight = 0;
    let drained = wait_until(Duration::from_secs(5), || {
        max_in_flight = max_in_flight.max(consumer.in_flight_count());
        stats.get_acknowledged() == 6
    })
    .await;

    p.consumer.stop().await;
    handles.polling.await.unwrap();
    handles.heartbeat.await.unwrap();

    assert!(drained);
    assert!(max_in_flight <= 2);
    assert!(p.queue.is_empty());
}

#[tokio::test]
async fn test_heartbeat_refreshes_only_owned_deliveries() {
    let p = TestPipelineBuilder::new()
        .with_liveness_window(Duration::from_millis(60))
        .build();
    let handle = p.queue.publish("s1").await.unwrap();
    let item = p.queue.fetch(p.consumer.consumer_id(), 1).await.unwrap().remove(0);
    assert_eq!(item.handle, handle);

    // Only the owning consumer can refresh a delivery
    let tracked = p
        .queue
        .heartbeat(p.consumer.consumer_id(), std::slice::from_ref(&handle))
        .await
        .unwrap();
    assert_eq!(tracked, 1);

    let stranger = p
        .queue
        .heartbeat(&ConsumerId::new("someone-else"), std::slice::from_ref(&handle))
        .await
        .unwrap();
    assert_eq!(stranger, 0);
}

#[tokio::test]
async fn test_queue_errors_reach_the_error_channel() {
    let mut p = TestPipelineBuilder::new().build();
    p.queue.set_fail_heartbeat(true);

    p.consumer.heartbeat_once().await;

    let err = p.errors.try_recv().unwrap();
    assert_eq!(err.kind(), QueueErrorKind::Heartbeat);
}

#[tokio::test]
async fn test_ack_failure_is_reported_and_delivery_reclaimed() {
    let mut p = TestPipelineBuilder::new()
        .with_liveness_window(Duration::from_millis(50))
        .build();
    record_requests(&p.history, "s1", "GET", "/login", 12);
    let handle = p.queue.publish("s1").await.unwrap();
    p.queue.set_fail_ack(true);

    let item = p.queue.fetch(p.consumer.consumer_id(), 1).await.unwrap().remove(0);
    let outcome = p.consumer.process_delivery(item).await;

    assert_eq!(outcome, DeliveryOutcome::Unresolved);
    assert_eq!(p.queue.state_of(&handle), Some(DeliveryState::Unacked));
    assert_eq!(p.consumer.get_stats().get_unresolved(), 1);

    let err = p.errors.try_recv().unwrap();
    assert_eq!(err.kind(), QueueErrorKind::Delivery);
    match err {
        QueueError::Delivery { handle: failed, operation, .. } => {
            assert_eq!(failed, handle);
            assert_eq!(operation, "ack");
        }
        other => panic!("expected a delivery error, got {other:?}"),
    }

    p.queue.set_fail_ack(false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(p.reclaimer.reclaim_once().await.unwrap(), 1);

    let redelivered = p.queue.fetch(p.consumer.consumer_id(), 1).await.unwrap().remove(0);
    assert_eq!(redelivered.handle, handle);
    assert_eq!(redelivered.delivery_count, 2);
    assert_eq!(p.consumer.process_delivery(redelivered).await, DeliveryOutcome::Acknowledged);
    assert!(p.queue.is_empty());
}

#[tokio::test]
async fn test_failed_reject_after_store_failure_is_unresolved() {
    let mut p = TestPipelineBuilder::new().build();
    record_requests(&p.history, "s1", "GET", "/login", 12);
    p.store.set_fail_writes(true);
    p.queue.set_fail_reject(true);
    let handle = p.queue.publish("s1").await.unwrap();

    let item = p.queue.fetch(p.consumer.consumer_id(), 1).await.unwrap().remove(0);
    let outcome = p.consumer.process_delivery(item).await;

    assert_eq!(outcome, DeliveryOutcome::Unresolved);
    assert_eq!(p.queue.state_of(&handle), Some(DeliveryState::Unacked));
    assert!(p.queue.rejected_session_ids().is_empty());

    let stats = p.consumer.get_stats();
    assert_eq!(stats.get_rejected(), 0);
    assert_eq!(stats.get_unresolved(), 1);

    let err = p.errors.try_recv().unwrap();
    assert!(matches!(
        err,
        QueueError::Delivery { ref operation, .. } if operation == "reject"
    ));
}

#[tokio::test]
async fn test_fetch_failure_is_reported_and_polling_continues() {
    let mut p = TestPipelineBuilder::new().build();
    record_requests(&p.history, "s1", "GET", "/login", 12);
    p.queue.set_fail_fetch(true);

    let handles = p.consumer.start();

    let err = tokio::time::timeout(Duration::from_secs(2), p.errors.recv())
        .await
        .expect("consume error within timeout")
        .expect("error channel open");
    assert_eq!(err.kind(), QueueErrorKind::Consume);
    assert!(p.consumer.is_running());

    p.queue.set_fail_fetch(false);
    p.queue.publish("s1").await.unwrap();

    let stats = p.consumer.get_stats();
    assert!(wait_until(Duration::from_secs(2), || stats.get_acknowledged() == 1).await);

    p.consumer.stop().await;
    handles.polling.await.unwrap();
    handles.heartbeat.await.unwrap();

    assert_eq!(p.store.get("s1").await.unwrap(), Some(Priority::High));
}

fn system_yaml() -> &'static str {
    r#"
connections:
  store:   { url: "postgresql://localhost/store" }
  queue:   { url: "postgresql://localhost/queue" }
  history: { url: "postgresql://localhost/history" }
profiling:
  min_session_requests: 10
queue:
  poll_interval_ms: 10
  heartbeat_interval_ms: 20
  liveness_window_seconds: 1
  reclaim_interval_seconds: 1
  shutdown_timeout_seconds: 2
audit:
  enabled: true
  batch_size: 100
  flush_interval_ms: 1000
  channel_capacity: 100
rules:
  - description: "Repeated logins"
    method: { should_match_all: false, method: GET }
    path: /login
    occurrences: 5
    result: high
  - description: "Landing page"
    method: { should_match_all: true }
    path: /
    occurrences: 1
    result: low
"#
}

#[tokio::test]
async fn test_profiler_system_runs_and_flushes_audit_on_shutdown() {
    let config = ConfigManager::load_from_yaml_str(system_yaml()).unwrap();

    let p = TestPipelineBuilder::new().build();
    record_requests(&p.history, "hi", "GET", "/login", 10);
    record_requests(&p.history, "lo", "GET", "/", 10);
    p.queue.publish("hi").await.unwrap();
    p.queue.publish("lo").await.unwrap();

    let sink = Arc::new(InMemoryAuditSink::new());
    let audit_config = AuditConfig {
        flush_interval_ms: 60_000,
        ..config.config().audit.clone()
    };
    let (audit, writer) = BatchedAuditLogger::spawn(sink.clone(), &audit_config);

    let mut system = ProfilerSystem::new(
        config,
        ProfilerComponents {
            queue: p.queue.clone(),
            history: p.history.clone(),
            store: p.store.clone(),
            audit: Arc::new(audit),
            audit_writer: Some(writer),
        },
    );
    system.start();

    assert!(wait_until(Duration::from_secs(5), || system.status().acknowledged == 2).await);

    let status = system.status();
    assert!(status.running);
    assert!(!status.fetching_paused);
    assert!(p.queue.is_empty());

    // Flush interval is far away, so records reach the sink only through shutdown
    assert!(sink.records().is_empty());
    system.shutdown().await;

    assert_eq!(sink.records().len(), 2);
    assert_eq!(p.store.get("hi").await.unwrap(), Some(Priority::High));
    assert_eq!(p.store.get("lo").await.unwrap(), Some(Priority::Low));
}

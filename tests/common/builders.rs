//! Builders for rule sets and in-memory profiling pipelines.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use session_profiler::audit::RecordingAuditLogger;
use session_profiler::history::{InMemoryHistorySource, SessionRequestEvent};
use session_profiler::messaging::InMemoryWorkQueue;
use session_profiler::orchestration::{
    error_channel, ConsumerSettings, OrphanReclaimer, QueueErrorReceiver, SessionConsumer,
};
use session_profiler::priority::Priority;
use session_profiler::profiling::{MethodMatcher, Rule, RuleSet, SessionProfiler};
use session_profiler::store::InMemoryPriorityStore;

/// Builder for ordered rule sets
#[derive(Default)]
pub struct RuleSetBuilder {
    rules: Vec<Rule>,
}

impl RuleSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, method: Option<&str>, path: &str, occurrences: u32, result: Priority) -> Self {
        let matcher = match method {
            Some(m) => MethodMatcher::exact(m),
            None => MethodMatcher::Any,
        };
        let description = format!("rule {}", self.rules.len() + 1);
        self.rules.push(
            Rule::new(description, matcher, path, occurrences, result).expect("valid test rule"),
        );
        self
    }

    pub fn build(self) -> RuleSet {
        RuleSet::new(self.rules)
    }
}

/// `[{GET /login x5 => high}, {* / x1 => low}]`
pub fn login_rules() -> RuleSet {
    RuleSetBuilder::new()
        .with_rule(Some("GET"), "/login", 5, Priority::High)
        .with_rule(None, "/", 1, Priority::Low)
        .build()
}

/// `count` events with the same method and path, one second apart
pub fn repeated_events(method: &str, path: &str, count: usize) -> Vec<SessionRequestEvent> {
    let start = Utc::now() - ChronoDuration::minutes(5);
    (0..count)
        .map(|i| SessionRequestEvent::new(method, path, start + ChronoDuration::seconds(i as i64)))
        .collect()
}

/// Record `count` identical requests for `session_id`
pub fn record_requests(history: &InMemoryHistorySource, session_id: &str, method: &str, path: &str, count: usize) {
    for _ in 0..count {
        history.record(session_id, method, path);
    }
}

/// In-memory collaborators plus a consumer and reclaimer wired around them
pub struct TestPipeline {
    pub queue: Arc<InMemoryWorkQueue>,
    pub history: Arc<InMemoryHistorySource>,
    pub store: Arc<InMemoryPriorityStore>,
    pub audit: Arc<RecordingAuditLogger>,
    pub consumer: Arc<SessionConsumer>,
    pub reclaimer: Arc<OrphanReclaimer>,
    pub errors: QueueErrorReceiver,
}

pub struct TestPipelineBuilder {
    rules: RuleSet,
    min_session_requests: usize,
    settings: ConsumerSettings,
    liveness_window: Duration,
}

impl TestPipelineBuilder {
    pub fn new() -> Self {
        Self {
            rules: login_rules(),
            min_session_requests: 10,
            settings: ConsumerSettings {
                poll_interval: Duration::from_millis(10),
                heartbeat_interval: Duration::from_millis(20),
                shutdown_timeout: Duration::from_secs(2),
                ..ConsumerSettings::default()
            },
            liveness_window: Duration::from_millis(100),
        }
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_min_session_requests(mut self, min: usize) -> Self {
        self.min_session_requests = min;
        self
    }

    pub fn with_prefetch_limit(mut self, limit: usize) -> Self {
        self.settings.prefetch_limit = limit;
        self
    }

    pub fn with_liveness_window(mut self, window: Duration) -> Self {
        self.liveness_window = window;
        self
    }

    pub fn build(self) -> TestPipeline {
        let queue = Arc::new(InMemoryWorkQueue::new("sessions"));
        let history = Arc::new(InMemoryHistorySource::new());
        let store = Arc::new(InMemoryPriorityStore::new(Duration::from_secs(3600)));
        let audit = Arc::new(RecordingAuditLogger::new());

        let profiler = Arc::new(SessionProfiler::new(
            history.clone(),
            self.rules,
            Duration::from_secs(3600),
            self.min_session_requests,
        ));
        let (sender, errors) = error_channel(64);

        let consumer = Arc::new(SessionConsumer::new(
            queue.clone(),
            profiler,
            store.clone(),
            audit.clone(),
            sender,
            self.settings,
        ));
        let reclaimer = Arc::new(OrphanReclaimer::new(
            queue.clone(),
            self.liveness_window,
            Duration::from_millis(20),
        ));

        TestPipeline {
            queue,
            history,
            store,
            audit,
            consumer,
            reclaimer,
            errors,
        }
    }
}

impl Default for TestPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

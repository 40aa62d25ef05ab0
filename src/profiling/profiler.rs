//! # Session Profiler
//!
//! Turns a session's recent request history into a [`Priority`].
//!
//! ## Evaluation
//!
//! 1. Sessions with fewer events than the minimum observation count are
//!    `Unknown`; rules are not consulted.
//! 2. Rules run in configuration order. Each rule scans the events once,
//!    counting matches, and wins as soon as its count reaches its threshold.
//! 3. No rule satisfied means `Unknown`.
//!
//! The first satisfied rule wins even if a later rule would match more often.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use super::rules::{Rule, RuleSet};
use crate::config::ProfilingConfig;
use crate::history::{HistoryError, HistorySource, SessionRequestEvent};
use crate::priority::Priority;

/// Outcome of classifying one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub session_id: String,
    pub priority: Priority,
    pub evaluated_at: DateTime<Utc>,
}

/// First rule, in order, whose threshold is met by `events`
pub fn first_satisfied_rule<'a>(
    rules: &'a RuleSet,
    events: &[SessionRequestEvent],
) -> Option<&'a Rule> {
    rules.iter().find(|rule| {
        let threshold = rule.occurrences().get();
        let mut count = 0u32;
        events.iter().any(|event| {
            if rule.matches(event) {
                count += 1;
            }
            count >= threshold
        })
    })
}

/// Pure classification over an already-fetched history
pub fn evaluate(
    rules: &RuleSet,
    events: &[SessionRequestEvent],
    min_session_requests: usize,
) -> Priority {
    if events.len() < min_session_requests {
        return Priority::Unknown;
    }
    first_satisfied_rule(rules, events)
        .map(Rule::result)
        .unwrap_or(Priority::Unknown)
}

/// Classifies sessions by reading their history and evaluating the rules
pub struct SessionProfiler {
    history: Arc<dyn HistorySource>,
    rules: RuleSet,
    history_window: Duration,
    min_session_requests: usize,
}

impl std::fmt::Debug for SessionProfiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProfiler")
            .field("history", &self.history.source_name())
            .field("rules", &self.rules.len())
            .field("history_window", &self.history_window)
            .field("min_session_requests", &self.min_session_requests)
            .finish()
    }
}

impl SessionProfiler {
    pub fn new(
        history: Arc<dyn HistorySource>,
        rules: RuleSet,
        history_window: Duration,
        min_session_requests: usize,
    ) -> Self {
        Self {
            history,
            rules,
            history_window,
            min_session_requests,
        }
    }

    pub fn from_config(
        history: Arc<dyn HistorySource>,
        rules: RuleSet,
        config: &ProfilingConfig,
    ) -> Self {
        Self::new(
            history,
            rules,
            config.history_window(),
            config.min_session_requests,
        )
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Fetch history for `session_id` and classify it.
    ///
    /// Idempotent for an unchanged history. A history read failure is
    /// returned as an error and never reported as `Unknown`.
    #[instrument(skip(self), fields(source = self.history.source_name()))]
    pub async fn classify(&self, session_id: &str) -> Result<ClassificationResult, HistoryError> {
        let events = self
            .history
            .fetch_session_requests(session_id, self.history_window)
            .await?;

        let priority = if events.len() < self.min_session_requests {
            debug!(
                session_id = %session_id,
                event_count = events.len(),
                min_session_requests = self.min_session_requests,
                "Not enough requests to profile session"
            );
            Priority::Unknown
        } else {
            match first_satisfied_rule(&self.rules, &events) {
                Some(rule) => {
                    debug!(
                        session_id = %session_id,
                        event_count = events.len(),
                        rule = %rule,
                        "Session matched rule"
                    );
                    rule.result()
                }
                None => Priority::Unknown,
            }
        };

        Ok(ClassificationResult {
            session_id: session_id.to_string(),
            priority,
            evaluated_at: Utc::now(),
        })
    }
}

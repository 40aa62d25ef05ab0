//! # Queue Error Router
//!
//! Queue failures from the consumer's background loops are sent over a
//! bounded channel to a single task that logs them by category. Routing
//! never stops the service; it only decides how loudly to report.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::messaging::{QueueError, QueueErrorKind};

pub type QueueErrorSender = mpsc::Sender<QueueError>;
pub type QueueErrorReceiver = mpsc::Receiver<QueueError>;

/// How loudly an error is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

pub fn error_channel(capacity: usize) -> (QueueErrorSender, QueueErrorReceiver) {
    mpsc::channel(capacity.max(1))
}

/// Severity for an error; heartbeat failures escalate at the limit
pub fn severity(err: &QueueError) -> Severity {
    match err.kind() {
        QueueErrorKind::Heartbeat if err.is_heartbeat_limit() => Severity::Error,
        QueueErrorKind::Heartbeat | QueueErrorKind::Delivery => Severity::Warning,
        QueueErrorKind::Consume | QueueErrorKind::Connection | QueueErrorKind::Other => {
            Severity::Error
        }
    }
}

/// Log one queue error by category
pub fn route_queue_error(err: &QueueError) -> Severity {
    let kind = err.kind().as_str();
    let level = severity(err);

    match (err, level) {
        (QueueError::Heartbeat { count, limit, .. }, Severity::Error) => {
            error!(
                kind,
                count,
                limit,
                error = %err,
                "❌ Heartbeat error limit reached, consumer stopped fetching"
            );
        }
        (_, Severity::Warning) => warn!(kind, error = %err, "Queue error"),
        (_, Severity::Error) => error!(kind, error = %err, "Queue error"),
    }

    level
}

/// Report without blocking; if the router is backed up, log inline
pub fn report(errors: &QueueErrorSender, err: QueueError) {
    match errors.try_send(err) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(err)) => {
            debug!("Queue error channel full, logging inline");
            route_queue_error(&err);
        }
        Err(mpsc::error::TrySendError::Closed(err)) => {
            route_queue_error(&err);
        }
    }
}

/// Drain the channel until every sender is dropped
pub fn spawn_error_router(mut receiver: QueueErrorReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(err) = receiver.recv().await {
            route_queue_error(&err);
        }
        info!("Queue error router stopped");
    })
}

//! # Queue Error Types
//!
//! Queue failures are categorized so the error router can log each kind at
//! the right severity. None of them stops the service.

use thiserror::Error;

use super::types::DeliveryHandle;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Heartbeat failed ({count}/{limit} consecutive): {message}")]
    Heartbeat {
        count: u32,
        limit: u32,
        message: String,
    },

    #[error("Failed to consume from queue {queue_name}: {message}")]
    Consume { queue_name: String, message: String },

    #[error("Delivery {handle} {operation} failed: {message}")]
    Delivery {
        handle: DeliveryHandle,
        operation: String,
        message: String,
    },

    #[error("Delivery {handle} is not held by this consumer")]
    DeliveryNotFound { handle: DeliveryHandle },

    #[error("Failed to publish to queue {queue_name}: {message}")]
    Publish { queue_name: String, message: String },

    #[error("Queue connection error: {message}")]
    Connection { message: String },

    #[error("Internal queue error: {message}")]
    Internal { message: String },
}

/// Routing category of a [`QueueError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueErrorKind {
    Heartbeat,
    Consume,
    Delivery,
    Connection,
    Other,
}

impl QueueErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Consume => "consume",
            Self::Delivery => "delivery",
            Self::Connection => "connection",
            Self::Other => "other",
        }
    }
}

impl QueueError {
    pub fn heartbeat(count: u32, limit: u32, message: impl Into<String>) -> Self {
        Self::Heartbeat {
            count,
            limit,
            message: message.into(),
        }
    }

    pub fn consume(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consume {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    pub fn delivery(
        handle: DeliveryHandle,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Delivery {
            handle,
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn not_found(handle: DeliveryHandle) -> Self {
        Self::DeliveryNotFound { handle }
    }

    pub fn publish(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> QueueErrorKind {
        match self {
            Self::Heartbeat { .. } => QueueErrorKind::Heartbeat,
            Self::Consume { .. } => QueueErrorKind::Consume,
            Self::Delivery { .. } | Self::DeliveryNotFound { .. } => QueueErrorKind::Delivery,
            Self::Connection { .. } => QueueErrorKind::Connection,
            Self::Publish { .. } | Self::Internal { .. } => QueueErrorKind::Other,
        }
    }

    /// Consecutive heartbeat failures have reached the configured limit
    pub fn is_heartbeat_limit(&self) -> bool {
        matches!(self, Self::Heartbeat { count, limit, .. } if count >= limit)
    }
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let handle = DeliveryHandle::from(7_i64);
        assert_eq!(QueueError::heartbeat(1, 45, "x").kind(), QueueErrorKind::Heartbeat);
        assert_eq!(QueueError::consume("q", "x").kind(), QueueErrorKind::Consume);
        assert_eq!(
            QueueError::delivery(handle.clone(), "ack", "x").kind(),
            QueueErrorKind::Delivery
        );
        assert_eq!(QueueError::not_found(handle).kind(), QueueErrorKind::Delivery);
        assert_eq!(QueueError::connection("x").kind(), QueueErrorKind::Connection);
        assert_eq!(QueueError::internal("x").kind(), QueueErrorKind::Other);
    }

    #[test]
    fn test_heartbeat_limit_detection() {
        assert!(!QueueError::heartbeat(44, 45, "x").is_heartbeat_limit());
        assert!(QueueError::heartbeat(45, 45, "x").is_heartbeat_limit());
        assert!(!QueueError::consume("q", "x").is_heartbeat_limit());
    }

    #[test]
    fn test_display_includes_context() {
        let err = QueueError::delivery(DeliveryHandle::from(3_i64), "ack", "gone");
        assert_eq!(err.to_string(), "Delivery 3 ack failed: gone");
    }
}

//! Call notification fan-out.
//!
//! Subscribers are invoked synchronously, in subscription order, after
//! every dispatch. A failing subscriber is logged and skipped; it never
//! affects the call that triggered the notification.

use crate::strategy::{CallContext, HijackResult};
use mystic_core::{Environment, Timestamp, Value};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// Error type returned by subscribers
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Notification callback
pub type Subscriber = Arc<dyn Fn(&CallNotification) -> Result<(), SubscriberError> + Send + Sync>;

/// Payload describing one completed dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallNotification {
    /// Always `function_call`
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Qualified function name
    pub function: String,
    /// Call start time
    pub timestamp: Timestamp,
    /// Router environment
    pub environment: Environment,
    /// Router call counter for this call
    pub call_count: u64,
    /// Whether a value was produced
    pub executed: bool,
    /// Strategy that handled the call
    pub strategy: Option<String>,
    /// Wall time in seconds
    pub execution_time: f64,
    /// Error text, if the call failed
    pub error: Option<String>,
    /// Strategy metadata
    pub metadata: serde_json::Map<String, Value>,
}

impl CallNotification {
    /// Notification type tag
    pub const KIND: &'static str = "function_call";

    /// Build from a call context and its result
    #[must_use]
    pub fn new(ctx: &CallContext<'_>, result: &HijackResult) -> Self {
        Self {
            kind: Self::KIND,
            function: ctx.qualname(),
            timestamp: ctx.timestamp,
            environment: ctx.environment,
            call_count: ctx.call_count,
            executed: result.executed,
            strategy: result.strategy.clone(),
            execution_time: result.elapsed.as_secs_f64(),
            error: result.error.as_ref().map(ToString::to_string),
            metadata: result.metadata.clone(),
        }
    }
}

/// Process-wide list of notification subscribers
#[derive(Default)]
pub struct NotificationHub {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl NotificationHub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&CallNotification) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribers.write().push(Arc::new(subscriber));
    }

    /// Number of subscribers
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// True when nobody is subscribed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all subscribers
    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    /// Deliver a notification to every subscriber
    pub fn publish(&self, notification: &CallNotification) {
        let subscribers = self.subscribers.read().clone();
        for subscriber in &subscribers {
            if let Err(err) = subscriber(notification) {
                tracing::warn!(function = %notification.function, %err, "notification subscriber failed");
            }
        }
    }
}

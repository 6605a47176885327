//! Domain event system — metrics hooks for the orchestration core.
//!
//! The loop and the dispatcher publish events when something interesting
//! happens; metrics exporters or dashboards subscribe without the core
//! knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A task entered the reasoning loop
    TaskStarted {
        task_id: String,
        session_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A task produced its final result
    TaskCompleted {
        task_id: String,
        status: String,
        iterations: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool invocation settled (success or failure)
    ToolExecuted {
        tool_name: String,
        success: bool,
        error_kind: Option<String>,
        attempts: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A circuit breaker changed state
    CircuitStateChanged {
        category: String,
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },

    /// An error was absorbed by the loop
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

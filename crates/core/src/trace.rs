//! Execution trace recorder.
//!
//! An append-only, ordered log of everything that happened while a task
//! ran: thoughts, actions, observations, the answer, and absorbed errors.
//! The reasoning loop writes it; streaming UIs and audit tooling read it.
//!
//! Appending is synchronous and infallible, so a fault in trace recording
//! can never abort a task. Readers get immutable snapshots, never a view
//! into the live buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// A single trace event, tagged with the iteration it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEventKind {
    Thought {
        content: String,
    },
    Action {
        call_id: String,
        tool: String,
        arguments: serde_json::Value,
    },
    Observation {
        call_id: String,
        tool: String,
        success: bool,
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_kind: Option<String>,
        duration_ms: u64,
        /// Arrived after the task had already produced its result
        #[serde(default)]
        late: bool,
    },
    Answer {
        content: String,
    },
    Error {
        message: String,
    },
}

impl TraceEventKind {
    /// Short name of the event type (`thought`, `action`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            Self::Thought { .. } => "thought",
            Self::Action { .. } => "action",
            Self::Observation { .. } => "observation",
            Self::Answer { .. } => "answer",
            Self::Error { .. } => "error",
        }
    }
}

impl TraceEvent {
    pub fn new(iteration: u32, kind: TraceEventKind) -> Self {
        Self {
            iteration,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn thought(iteration: u32, content: impl Into<String>) -> Self {
        Self::new(iteration, TraceEventKind::Thought { content: content.into() })
    }

    pub fn answer(iteration: u32, content: impl Into<String>) -> Self {
        Self::new(iteration, TraceEventKind::Answer { content: content.into() })
    }

    pub fn error(iteration: u32, message: impl Into<String>) -> Self {
        Self::new(iteration, TraceEventKind::Error { message: message.into() })
    }
}

/// Shared handle to one task's trace.
///
/// Cloning is cheap and every clone appends to the same log, which is how
/// results that arrive after a task finished still land in its trace.
#[derive(Clone)]
pub struct TraceRecorder {
    events: Arc<Mutex<Vec<TraceEvent>>>,
    live: broadcast::Sender<TraceEvent>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(256);
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            live,
        }
    }

    // A panic elsewhere must not make the trace unwritable.
    fn lock(&self) -> MutexGuard<'_, Vec<TraceEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event. Never fails.
    pub fn append(&self, event: TraceEvent) {
        self.lock().push(event.clone());
        let _ = self.live.send(event);
    }

    /// An immutable copy of every event recorded so far.
    pub fn snapshot(&self) -> Arc<[TraceEvent]> {
        Arc::from(self.lock().as_slice())
    }

    /// Receive events as they are appended.
    ///
    /// Slow readers may observe `RecvError::Lagged`; `snapshot()` is the
    /// authoritative record.
    pub fn subscribe(&self) -> broadcast::Receiver<TraceEvent> {
        self.live.subscribe()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceRecorder").field("len", &self.len()).finish()
    }
}

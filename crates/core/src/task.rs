//! Task model: the unit of work the reasoning loop executes.
//!
//! A [`Task`] is created when a caller submits a query and is owned by one
//! run of the loop. Each reasoning cycle produces an [`IterationRecord`];
//! the run ends with a [`TaskResult`], which is always a structured value
//! and never a raw error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Message;
use crate::trace::TraceEvent;

/// A query being worked on.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub query: String,
    /// Prior conversation supplied by the caller
    pub context: Vec<Message>,
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl Task {
    pub fn new(query: impl Into<String>, context: Vec<Message>, session_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            query: query.into(),
            context,
            session_id,
            started_at: Utc::now(),
        }
    }
}

/// One tool call decided in an iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub call_id: String,
    pub tool: String,
    pub arguments: serde_json::Value,
}

/// Everything one reasoning cycle produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observations: Vec<String>,
    /// The model's unparsed text for this turn
    pub raw_text: String,
}

impl IterationRecord {
    pub fn new(iteration: u32) -> Self {
        Self {
            iteration,
            ..Self::default()
        }
    }
}

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The model produced an Answer
    Answered,
    /// The iteration budget ran out; the answer is synthesized
    Exhausted,
    /// The caller cancelled; the answer is synthesized from progress so far
    Cancelled,
    /// The model gateway failed irrecoverably; there is no answer
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

/// The outcome returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    /// Present for every status except [`TaskStatus::Failed`]
    pub answer: Option<String>,
    pub trace: Vec<TraceEvent>,
    pub iterations: u32,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub iteration_records: Vec<IterationRecord>,
    pub tool_calls_made: usize,
    pub duration_ms: u64,
    /// Served from the result cache without running the loop
    #[serde(default)]
    pub cached: bool,
}

impl TaskResult {
    pub fn is_success(&self) -> bool {
        self.status != TaskStatus::Failed
    }
}

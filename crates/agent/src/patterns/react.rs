//! ReAct pattern — Thought → Action → Observation loop.
//!
//! One [`ReactAgent`] serves any number of concurrent tasks. Each call to
//! [`ReactAgent::execute`] owns its context, trace and iteration counter;
//! only the provider, the dispatcher (registry and breakers), the event
//! bus and the cache are shared.
//!
//! # Turn policy
//!
//! Each iteration resolves the model's reply in this order:
//! - an `Answer:` (or `Final Answer:`) ends the task, even when the same
//!   turn also names an action or carries structured tool calls;
//! - structured tool calls are dispatched concurrently and their
//!   observations folded back in call order;
//! - an `Action:` described in text without a structured call is answered
//!   with a nudge to actually invoke the tool;
//! - anything else gets a plain continuation prompt.
//!
//! Transient gateway failures become `error` trace events plus a recovery
//! instruction. Only an irrecoverable gateway error fails the task.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ponder_config::AppConfig;
use ponder_core::cache::{CachedAnswer, InMemoryResultCache, ResultCache, fingerprint};
use ponder_core::error::ToolError;
use ponder_core::event::{DomainEvent, EventBus};
use ponder_core::message::{Message, MessageToolCall};
use ponder_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
use ponder_core::task::{ActionRecord, IterationRecord, Task, TaskResult, TaskStatus};
use ponder_core::tool::ToolContext;
use ponder_core::trace::{TraceEvent, TraceEventKind, TraceRecorder};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::{ToolDispatcher, ToolInvocationMetadata, ToolInvocationResult};
use crate::parser::{self, ParsedResponse};
use crate::prompts;

/// Default iteration budget per task.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Default limit on a single model gateway call.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for the ReAct agent.
pub struct ReactAgent {
    /// LLM provider.
    provider: Arc<dyn Provider>,
    /// Model name.
    model: String,
    /// Temperature.
    temperature: f32,
    /// Default max tokens per response.
    max_tokens: Option<u32>,
    /// The only path to tool handlers.
    dispatcher: Arc<ToolDispatcher>,
    /// Event bus.
    event_bus: Arc<EventBus>,
    /// Maximum reasoning iterations.
    max_iterations: u32,
    /// Limit on each gateway call.
    gateway_timeout: Duration,
    /// Optional answer cache keyed by query and context.
    cache: Option<Arc<dyn ResultCache>>,
    /// Replaces the built-in instructions; the tool list is still appended.
    system_prompt: Option<String>,
}

/// One task submission.
#[derive(Clone, Default)]
pub struct TaskRequest {
    pub query: String,
    /// Prior conversation, placed between the system prompt and the query
    pub context: Vec<Message>,
    pub session_id: Option<String>,
    /// Overrides the agent's default budget
    pub max_iterations: Option<u32>,
    pub cancel: Option<CancellationToken>,
    /// Supply one to follow the trace live through `subscribe()`
    pub recorder: Option<TraceRecorder>,
}

impl TaskRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: Vec<Message>) -> Self {
        self.context = context;
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_recorder(mut self, recorder: TraceRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }
}

// ── Per-task state ──

/// Mutable state owned by exactly one task.
struct TaskRun {
    task: Task,
    recorder: TraceRecorder,
    cancel: CancellationToken,
    tools: Vec<ToolDefinition>,
    messages: Vec<Message>,
    records: Vec<IterationRecord>,
    tool_calls_made: usize,
}

impl TaskRun {
    fn observe(&mut self, record: &mut IterationRecord, call: &MessageToolCall, result: &ToolInvocationResult) {
        let output = result.output_text();
        self.recorder
            .append(observation_event(record.iteration, call, result, false));
        record.observations.push(output.clone());
        self.messages.push(Message::tool_result(&call.id, output));
    }
}

/// How one iteration ended.
enum Turn {
    Answer(String),
    Continue,
    Cancelled,
    Fatal(String),
}

/// How the whole loop ended.
enum Outcome {
    Answered(String),
    Exhausted,
    Cancelled,
    Failed(String),
}

impl ReactAgent {
    /// Create a new ReAct agent.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        dispatcher: Arc<ToolDispatcher>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            dispatcher,
            event_bus,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            cache: None,
            system_prompt: None,
        }
    }

    /// Build an agent with model settings, budgets and caching taken from
    /// the application config.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        dispatcher: Arc<ToolDispatcher>,
        event_bus: Arc<EventBus>,
        config: &AppConfig,
    ) -> Self {
        let mut agent = Self::new(
            provider,
            config.default_model.clone(),
            config.default_temperature,
            dispatcher,
            event_bus,
        )
        .with_max_tokens(config.default_max_tokens)
        .with_max_iterations(config.agent.max_iterations)
        .with_gateway_timeout(Duration::from_secs(config.agent.gateway_timeout_secs));

        if config.agent.cache_results {
            agent = agent.with_cache(Arc::new(InMemoryResultCache::new(Duration::from_secs(
                config.agent.cache_ttl_secs,
            ))));
        }
        agent
    }

    /// Set max iterations.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    /// Answer `query` within `max_iterations` reasoning steps.
    pub async fn execute_task(&self, query: &str, max_iterations: u32) -> TaskResult {
        self.execute(TaskRequest::new(query).with_max_iterations(max_iterations))
            .await
    }

    /// Execute the ReAct loop for one task.
    ///
    /// Never fails: gateway loss is reported through
    /// [`TaskStatus::Failed`] and [`TaskResult::error`].
    pub async fn execute(&self, request: TaskRequest) -> TaskResult {
        let started = Instant::now();
        let max_iterations = request.max_iterations.unwrap_or(self.max_iterations);
        let task = Task::new(request.query, request.context, request.session_id);

        // ── Result cache ──
        let cache_key = self
            .cache
            .as_ref()
            .map(|_| fingerprint(&task.query, &task.context));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key)
            && let Some(hit) = cache.get(key)
        {
            debug!(task_id = %task.id, original_iterations = hit.iterations, "Result cache hit");
            return self.finish_cached(task, hit, started);
        }

        self.event_bus.publish(DomainEvent::TaskStarted {
            task_id: task.id.clone(),
            session_id: task.session_id.clone(),
            timestamp: Utc::now(),
        });
        info!(task_id = %task.id, model = %self.model, max_iter = max_iterations, "ReAct loop starting");

        let mut run = TaskRun {
            messages: self.seed_messages(&task),
            tools: self.dispatcher.registry().definitions(),
            recorder: request.recorder.unwrap_or_default(),
            cancel: request.cancel.unwrap_or_default(),
            records: Vec::new(),
            tool_calls_made: 0,
            task,
        };

        let mut iteration = 0u32;
        let outcome = loop {
            if iteration >= max_iterations {
                warn!(task_id = %run.task.id, "ReAct: max iterations reached ({max_iterations})");
                break Outcome::Exhausted;
            }
            if run.cancel.is_cancelled() {
                info!(task_id = %run.task.id, iteration, "ReAct: task cancelled");
                break Outcome::Cancelled;
            }

            iteration += 1;
            debug!(task_id = %run.task.id, iteration, "ReAct iteration");

            let mut record = IterationRecord::new(iteration);
            let turn = self.step(&mut run, &mut record).await;
            run.records.push(record);

            match turn {
                Turn::Answer(answer) => break Outcome::Answered(answer),
                Turn::Continue => {}
                Turn::Cancelled => {
                    info!(task_id = %run.task.id, iteration, "ReAct: task cancelled mid-iteration");
                    break Outcome::Cancelled;
                }
                Turn::Fatal(error) => break Outcome::Failed(error),
            }
        };

        self.finish(run, iteration, max_iterations, outcome, cache_key, started)
    }

    fn seed_messages(&self, task: &Task) -> Vec<Message> {
        let base = self
            .system_prompt
            .as_deref()
            .unwrap_or(prompts::DEFAULT_SYSTEM_PROMPT);
        let tools = self.dispatcher.registry().descriptors();

        let mut messages = Vec::with_capacity(task.context.len() + 2);
        messages.push(Message::system(prompts::system_prompt(base, &tools)));
        messages.extend(task.context.iter().cloned());
        messages.push(Message::user(prompts::seed_message(&task.query)));
        messages
    }

    // ── One iteration ──

    async fn step(&self, run: &mut TaskRun, record: &mut IterationRecord) -> Turn {
        let iteration = record.iteration;
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: run.messages.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: run.tools.clone(),
            stop: vec![],
        };

        let cancel = run.cancel.clone();
        let call = tokio::time::timeout(self.gateway_timeout, self.provider.complete(request));
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Turn::Cancelled,
            outcome = call => outcome,
        };

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_transient() => return self.recover(run, iteration, e.to_string()),
            Ok(Err(e)) => {
                warn!(task_id = %run.task.id, iteration, error = %e, "Model gateway failed");
                run.recorder.append(TraceEvent::error(iteration, e.to_string()));
                return Turn::Fatal(e.to_string());
            }
            Err(_) => {
                let message = format!("model gateway timed out after {:?}", self.gateway_timeout);
                return self.recover(run, iteration, message);
            }
        };

        self.handle_response(run, record, response).await
    }

    /// Absorb an iteration failure: record it and tell the model.
    fn recover(&self, run: &mut TaskRun, iteration: u32, error: String) -> Turn {
        warn!(task_id = %run.task.id, iteration, error = %error, "Iteration failed, recovering");
        run.recorder.append(TraceEvent::error(iteration, &error));
        self.event_bus.publish(DomainEvent::ErrorOccurred {
            context: format!("task {} iteration {iteration}", run.task.id),
            error_message: error.clone(),
            timestamp: Utc::now(),
        });
        run.messages.push(Message::user(prompts::recovery(&error)));
        Turn::Continue
    }

    async fn handle_response(
        &self,
        run: &mut TaskRun,
        record: &mut IterationRecord,
        response: ProviderResponse,
    ) -> Turn {
        let iteration = record.iteration;
        let text = response.message.content;
        let calls = normalize_calls(response.message.tool_calls, iteration);
        let parsed = parser::parse(&text);
        record.raw_text = text.clone();

        // ── Record thought ──
        if let Some(thought) = thought_of(&parsed, &text) {
            run.recorder.append(TraceEvent::thought(iteration, &thought));
            record.thought = Some(thought);
        }

        // ── Check for final answer ──
        if let Some(answer) = parsed.answer.as_deref().filter(|a| !a.is_empty()) {
            if !calls.is_empty() {
                warn!(
                    task_id = %run.task.id,
                    iteration,
                    ignored = calls.len(),
                    "Answer given alongside tool calls; calls not dispatched"
                );
            } else if parsed.action.is_some() {
                debug!(task_id = %run.task.id, iteration, "Answer given alongside an Action; Answer wins");
            }
            run.recorder.append(TraceEvent::answer(iteration, answer));
            return Turn::Answer(answer.to_string());
        }

        // ── Execute tool calls ──
        if !calls.is_empty() {
            if let Some(described) = parsed.parsed_action()
                && !calls.iter().any(|c| c.name == described.tool)
            {
                warn!(
                    task_id = %run.task.id,
                    iteration,
                    described = %described.tool,
                    "Text names a different action than the structured calls; using the calls"
                );
            }
            run.messages
                .push(Message::assistant(text).with_tool_calls(calls.clone()));
            return self.dispatch(run, record, calls).await;
        }

        // ── Described but not invoked ──
        if let Some(action) = parsed.parsed_action() {
            let registry = self.dispatcher.registry();
            let nudge = if registry.contains(&action.tool) {
                prompts::nudge(&action.tool, None)
            } else {
                let names = registry.names();
                prompts::nudge(&action.tool, Some(names.as_slice()))
            };
            debug!(task_id = %run.task.id, iteration, tool = %action.tool, "Action described without a call; nudging");
            run.messages.push(Message::assistant(text));
            run.messages.push(Message::user(nudge));
            return Turn::Continue;
        }

        debug!(task_id = %run.task.id, iteration, "No answer or action; asking to continue");
        if !text.trim().is_empty() {
            run.messages.push(Message::assistant(text));
        }
        run.messages.push(Message::user(prompts::CONTINUE));
        Turn::Continue
    }

    // ── Fan-out / fan-in ──

    async fn dispatch(
        &self,
        run: &mut TaskRun,
        record: &mut IterationRecord,
        calls: Vec<MessageToolCall>,
    ) -> Turn {
        let iteration = record.iteration;
        for call in &calls {
            let arguments = arguments_value(&call.arguments);
            run.recorder.append(TraceEvent::new(
                iteration,
                TraceEventKind::Action {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    arguments: arguments.clone(),
                },
            ));
            record.actions.push(ActionRecord {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                arguments,
            });
        }
        run.tool_calls_made += calls.len();
        info!(task_id = %run.task.id, iteration, calls = calls.len(), "Dispatching tool calls");

        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, ToolInvocationResult)>();
        for (index, call) in calls.iter().cloned().enumerate() {
            let dispatcher = Arc::clone(&self.dispatcher);
            let tx = tx.clone();
            let ctx = ToolContext {
                task_id: run.task.id.clone(),
                iteration,
                call_id: call.id.clone(),
            };
            tokio::spawn(async move {
                let result = dispatcher.run_call(&call, &ctx).await;
                let _ = tx.send((index, result));
            });
        }
        drop(tx);

        let mut settled: Vec<Option<ToolInvocationResult>> = vec![None; calls.len()];
        let mut pending = calls.len();
        let mut cancelled = false;
        let cancel = run.cancel.clone();
        while pending > 0 {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                next = rx.recv() => match next {
                    Some((index, result)) => {
                        settled[index] = Some(result);
                        pending -= 1;
                    }
                    // Every sender is gone: some handler task died without reporting.
                    None => break,
                },
            }
        }

        for (call, slot) in calls.iter().zip(settled) {
            match slot {
                Some(result) => run.observe(record, call, &result),
                None if cancelled => record
                    .observations
                    .push("(still running when the task was cancelled)".into()),
                None => {
                    warn!(task_id = %run.task.id, tool = %call.name, "Tool handler aborted");
                    run.observe(record, call, &aborted_result(call));
                }
            }
        }

        if cancelled {
            let recorder = run.recorder.clone();
            let task_id = run.task.id.clone();
            tokio::spawn(async move {
                while let Some((index, result)) = rx.recv().await {
                    let call = &calls[index];
                    debug!(%task_id, tool = %call.name, "Late tool result recorded");
                    recorder.append(observation_event(iteration, call, &result, true));
                }
            });
            return Turn::Cancelled;
        }

        Turn::Continue
    }

    // ── Finalization ──

    fn finish(
        &self,
        run: TaskRun,
        iterations: u32,
        max_iterations: u32,
        outcome: Outcome,
        cache_key: Option<String>,
        started: Instant,
    ) -> TaskResult {
        let (status, answer, error) = match outcome {
            Outcome::Answered(answer) => (TaskStatus::Answered, Some(answer), None),
            Outcome::Exhausted => (
                TaskStatus::Exhausted,
                Some(synthesize(&prompts::exhausted_header(max_iterations), &run.records)),
                None,
            ),
            Outcome::Cancelled => (
                TaskStatus::Cancelled,
                Some(synthesize(prompts::CANCELLED_HEADER, &run.records)),
                None,
            ),
            Outcome::Failed(error) => (TaskStatus::Failed, None, Some(error)),
        };

        if status == TaskStatus::Answered
            && let (Some(cache), Some(key), Some(answer)) = (&self.cache, &cache_key, &answer)
        {
            cache.put(
                key,
                CachedAnswer {
                    answer: answer.clone(),
                    iterations,
                },
            );
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.event_bus.publish(DomainEvent::TaskCompleted {
            task_id: run.task.id.clone(),
            status: status.as_str().to_string(),
            iterations: iterations as usize,
            duration_ms,
            timestamp: Utc::now(),
        });
        info!(
            task_id = %run.task.id,
            status = status.as_str(),
            iterations,
            tool_calls = run.tool_calls_made,
            duration_ms,
            "ReAct loop completed"
        );

        TaskResult {
            task_id: run.task.id,
            answer,
            trace: run.recorder.snapshot().to_vec(),
            iterations,
            status,
            error,
            iteration_records: run.records,
            tool_calls_made: run.tool_calls_made,
            duration_ms,
            cached: false,
        }
    }

    fn finish_cached(&self, task: Task, hit: CachedAnswer, started: Instant) -> TaskResult {
        let duration_ms = started.elapsed().as_millis() as u64;
        self.event_bus.publish(DomainEvent::TaskCompleted {
            task_id: task.id.clone(),
            status: TaskStatus::Answered.as_str().to_string(),
            iterations: 0,
            duration_ms,
            timestamp: Utc::now(),
        });
        TaskResult {
            task_id: task.id,
            answer: Some(hit.answer),
            trace: Vec::new(),
            iterations: 0,
            status: TaskStatus::Answered,
            error: None,
            iteration_records: Vec::new(),
            tool_calls_made: 0,
            duration_ms,
            cached: true,
        }
    }
}

// ── Helpers ──

/// The thought worth recording for this turn, if any. Marker-less text
/// counts as a thought so a degraded run still leaves material behind.
fn thought_of(parsed: &ParsedResponse, text: &str) -> Option<String> {
    match &parsed.thought {
        Some(thought) if !thought.is_empty() => Some(thought.clone()),
        Some(_) => None,
        None if parsed.is_degraded() && !text.trim().is_empty() => Some(text.trim().to_string()),
        None => None,
    }
}

/// Give every call an id so its tool message can reference it.
fn normalize_calls(calls: Vec<MessageToolCall>, iteration: u32) -> Vec<MessageToolCall> {
    calls
        .into_iter()
        .enumerate()
        .map(|(i, mut call)| {
            if call.id.trim().is_empty() {
                call.id = format!("call_{iteration}_{i}");
            }
            call
        })
        .collect()
}

/// Arguments as recorded in the trace: parsed JSON when possible, the raw
/// string otherwise.
fn arguments_value(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn observation_event(
    iteration: u32,
    call: &MessageToolCall,
    result: &ToolInvocationResult,
    late: bool,
) -> TraceEvent {
    TraceEvent::new(
        iteration,
        TraceEventKind::Observation {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            success: result.success,
            output: result.output_text(),
            error_kind: result.error_kind().map(str::to_string),
            duration_ms: result.metadata.duration_ms,
            late,
        },
    )
}

/// Stand-in result for a handler task that died (panicked) mid-call.
fn aborted_result(call: &MessageToolCall) -> ToolInvocationResult {
    ToolInvocationResult {
        success: false,
        data: None,
        error: Some(ToolError::execution(&call.name, "tool handler aborted")),
        metadata: ToolInvocationMetadata {
            tool_name: call.name.clone(),
            tool_version: String::new(),
            category: String::new(),
            duration_ms: 0,
            attempts: 1,
        },
    }
}

/// Best-effort answer from what the task recorded before it stopped.
fn synthesize(header: &str, records: &[IterationRecord]) -> String {
    let mut lines = Vec::new();
    for record in records {
        if let Some(thought) = &record.thought {
            lines.push(format!("- Step {}: {}", record.iteration, thought));
        }
        for (i, action) in record.actions.iter().enumerate() {
            let observed = record
                .observations
                .get(i)
                .map(String::as_str)
                .unwrap_or("(no result)");
            lines.push(format!("  - {}({}) -> {}", action.tool, action.arguments, observed));
        }
    }

    if lines.is_empty() {
        return prompts::NOTHING_RECORDED.to_string();
    }
    format!("{header}\n{}", lines.join("\n"))
}

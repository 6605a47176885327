//! Tool dispatcher — the single invocation path for every tool call.
//!
//! `run` applies, in order: lookup, schema validation, the category's
//! circuit breaker, and per-attempt timeout with optional retry and
//! exponential backoff. It never returns `Err`: every failure comes back
//! as a [`ToolInvocationResult`] the loop can feed to the model as an
//! observation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ponder_config::AppConfig;
use ponder_core::error::ToolError;
use ponder_core::event::{DomainEvent, EventBus};
use ponder_core::message::MessageToolCall;
use ponder_core::tool::{Tool, ToolContext, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::resilience::BreakerRegistry;

/// Timing and identity of one logical tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocationMetadata {
    pub tool_name: String,
    /// Empty when the tool is unknown
    pub tool_version: String,
    /// Empty when the tool is unknown
    pub category: String,
    /// Wall time including retries and backoff
    pub duration_ms: u64,
    /// Handler invocations (0 when rejected before execution)
    pub attempts: u32,
}

/// The outcome of a dispatched call.
#[derive(Debug, Clone)]
pub struct ToolInvocationResult {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<ToolError>,
    pub metadata: ToolInvocationMetadata,
}

impl ToolInvocationResult {
    /// Observation text for the model: data on success (strings verbatim,
    /// other JSON compact), `Error: ...` on failure.
    pub fn output_text(&self) -> String {
        if let Some(err) = &self.error {
            return format!("Error: {err}");
        }
        match &self.data {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    pub fn error_kind(&self) -> Option<&'static str> {
        self.error.as_ref().map(ToolError::kind)
    }
}

/// Registry-driven dispatcher shared by every task.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    breakers: Arc<BreakerRegistry>,
    events: Option<Arc<EventBus>>,
    backoff_unit: Duration,
    max_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            breakers: Arc::new(BreakerRegistry::default()),
            events: None,
            backoff_unit: Duration::from_secs(1),
            max_timeout: Duration::MAX,
        }
    }

    /// Build a dispatcher with breakers, backoff and timeout ceiling from
    /// configuration. Breaker transitions and tool outcomes go to `events`.
    pub fn from_config(registry: Arc<ToolRegistry>, config: &AppConfig, events: Arc<EventBus>) -> Self {
        let breakers = BreakerRegistry::from_config(&config.resilience).with_events(events.clone());
        Self::new(registry)
            .with_breakers(Arc::new(breakers))
            .with_events(events)
            .with_backoff_unit(Duration::from_millis(config.tools.backoff_unit_ms))
            .with_max_timeout(Duration::from_millis(config.tools.max_timeout_ms))
    }

    pub fn with_breakers(mut self, breakers: Arc<BreakerRegistry>) -> Self {
        self.breakers = breakers;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Delay before retry `n` (0-based) is `unit * 2^n`.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Cap every descriptor's `timeout_ms`.
    pub fn with_max_timeout(mut self, max: Duration) -> Self {
        self.max_timeout = max;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Invoke `name` with `params`.
    pub async fn run(&self, name: &str, params: Value, ctx: &ToolContext) -> ToolInvocationResult {
        let start = Instant::now();

        let Some(tool) = self.registry.get(name) else {
            return self.settle(
                name,
                None,
                start,
                0,
                Err(ToolError::UnknownTool(name.to_string())),
            );
        };

        if let Err(violations) = tool.descriptor().validate(&params) {
            let err = ToolError::Validation {
                tool_name: name.to_string(),
                violations,
            };
            return self.settle(name, Some(&tool), start, 0, Err(err));
        }

        let breaker = self.breakers.breaker(&tool.descriptor().category);
        let mut attempts = 0;
        let (tool_ref, params_ref, attempts_ref) = (&tool, &params, &mut attempts);
        let outcome = breaker
            .fire(move || self.execute_with_retry(tool_ref, params_ref, ctx, attempts_ref))
            .await;

        self.settle(name, Some(&tool), start, attempts, outcome)
    }

    /// Invoke a structured call whose arguments are a JSON string.
    ///
    /// Empty arguments mean `{}`; arguments that aren't valid JSON are a
    /// validation failure.
    pub async fn run_call(&self, call: &MessageToolCall, ctx: &ToolContext) -> ToolInvocationResult {
        let raw = call.arguments.trim();
        let parsed = if raw.is_empty() {
            Ok(Value::Object(Default::default()))
        } else {
            serde_json::from_str::<Value>(raw)
        };

        match parsed {
            Ok(params) => self.run(&call.name, params, ctx).await,
            Err(e) => {
                let start = Instant::now();
                let tool = self.registry.get(&call.name);
                let err = match &tool {
                    None => ToolError::UnknownTool(call.name.clone()),
                    Some(_) => ToolError::Validation {
                        tool_name: call.name.clone(),
                        violations: vec![format!("arguments are not valid JSON: {e}")],
                    },
                };
                self.settle(&call.name, tool.as_ref(), start, 0, Err(err))
            }
        }
    }

    async fn execute_with_retry(
        &self,
        tool: &Arc<dyn Tool>,
        params: &Value,
        ctx: &ToolContext,
        attempts: &mut u32,
    ) -> Result<Value, ToolError> {
        let descriptor = tool.descriptor();
        let timeout = Duration::from_millis(descriptor.timeout_ms).min(self.max_timeout);
        let max_retries = if descriptor.retryable {
            descriptor.max_retries
        } else {
            0
        };

        let mut attempt: u32 = 0;
        loop {
            *attempts += 1;
            let result = match tokio::time::timeout(timeout, tool.execute(params.clone(), ctx)).await {
                Ok(result) => result,
                Err(_) => Err(ToolError::Timeout {
                    tool_name: descriptor.name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_retries => {
                    let delay = self.backoff_unit.saturating_mul(1 << attempt.min(20));
                    warn!(
                        tool = %descriptor.name,
                        attempt = attempt + 1,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Tool attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn settle(
        &self,
        name: &str,
        tool: Option<&Arc<dyn Tool>>,
        start: Instant,
        attempts: u32,
        outcome: Result<Value, ToolError>,
    ) -> ToolInvocationResult {
        let duration_ms = start.elapsed().as_millis() as u64;
        let (tool_version, category) = tool
            .map(|t| {
                let d = t.descriptor();
                (d.version.clone(), d.category.clone())
            })
            .unwrap_or_default();

        let metadata = ToolInvocationMetadata {
            tool_name: name.to_string(),
            tool_version,
            category,
            duration_ms,
            attempts,
        };

        let result = match outcome {
            Ok(data) => {
                debug!(tool = name, duration_ms, attempts, "Tool succeeded");
                ToolInvocationResult {
                    success: true,
                    data: Some(data),
                    error: None,
                    metadata,
                }
            }
            Err(err) => {
                info!(tool = name, kind = err.kind(), duration_ms, attempts, error = %err, "Tool failed");
                ToolInvocationResult {
                    success: false,
                    data: None,
                    error: Some(err),
                    metadata,
                }
            }
        };

        if let Some(events) = &self.events {
            events.publish(DomainEvent::ToolExecuted {
                tool_name: name.to_string(),
                success: result.success,
                error_kind: result.error_kind().map(String::from),
                attempts,
                duration_ms,
                timestamp: Utc::now(),
            });
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{BreakerPolicy, ResiliencePolicy};
    use async_trait::async_trait;
    use ponder_core::tool::{ParamSpec, ParamType, ToolDescriptor};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyTool {
        descriptor: ToolDescriptor,
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyTool {
        fn new(descriptor: ToolDescriptor, failures: u32) -> Arc<Self> {
            Arc::new(Self {
                descriptor,
                failures,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(ToolError::execution(&self.descriptor.name, "upstream unavailable"))
            } else {
                Ok(json!("ok"))
            }
        }
    }

    struct HangingTool {
        descriptor: ToolDescriptor,
    }

    #[async_trait]
    impl Tool for HangingTool {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
            std::future::pending().await
        }
    }

    fn dispatcher_with(tool: Arc<dyn Tool>) -> ToolDispatcher {
        let registry = ToolRegistry::new().with(tool).unwrap();
        ToolDispatcher::new(Arc::new(registry))
    }

    fn flaky(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, "flaky upstream")
            .category("flaky")
            .param(ParamSpec::optional("q", ParamType::String, "query"))
    }

    #[tokio::test]
    async fn unknown_tool_fails_fast() {
        let dispatcher = dispatcher_with(FlakyTool::new(flaky("a"), 0));
        let result = dispatcher.run("nope", json!({}), &ToolContext::default()).await;
        assert!(!result.success);
        assert_eq!(result.error, Some(ToolError::UnknownTool("nope".into())));
        assert_eq!(result.metadata.attempts, 0);
        assert_eq!(result.output_text(), "Error: Unknown tool: nope");
    }

    #[tokio::test]
    async fn validation_failure_never_invokes_handler_or_breaker() {
        let descriptor = ToolDescriptor::new("strict", "needs input")
            .category("strict")
            .param(ParamSpec::required("a", ParamType::String, "a"))
            .param(ParamSpec::required("b", ParamType::Integer, "b"));
        let tool = FlakyTool::new(descriptor, 0);
        let breakers = Arc::new(BreakerRegistry::new(BreakerPolicy {
            failure_threshold: 1,
            ..BreakerPolicy::default()
        }));
        let dispatcher = dispatcher_with(tool.clone()).with_breakers(breakers.clone());

        for _ in 0..3 {
            let result = dispatcher
                .run("strict", json!({"b": 1.5}), &ToolContext::default())
                .await;
            match result.error {
                Some(ToolError::Validation { violations, .. }) => assert_eq!(
                    violations,
                    vec![
                        "missing required parameter 'a'",
                        "parameter 'b' expected integer, got number",
                    ]
                ),
                other => panic!("expected validation error, got {other:?}"),
            }
        }
        assert_eq!(tool.calls(), 0);
        assert!(breakers.snapshot().is_empty());
    }

    #[tokio::test]
    async fn valid_input_round_trips() {
        let tool = FlakyTool::new(flaky("echoish"), 0);
        let dispatcher = dispatcher_with(tool.clone());
        let result = dispatcher
            .run("echoish", json!({"q": "hi"}), &ToolContext::default())
            .await;
        assert!(result.success);
        assert_eq!(result.output_text(), "ok");
        assert_eq!(result.metadata.tool_version, "1.0.0");
        assert_eq!(result.metadata.category, "flaky");
        assert_eq!(result.metadata.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_tool_is_invoked_max_retries_plus_one_times() {
        let tool = FlakyTool::new(flaky("down").retry(3), u32::MAX);
        let dispatcher = dispatcher_with(tool.clone()).with_backoff_unit(Duration::from_millis(100));

        let result = dispatcher.run("down", json!({}), &ToolContext::default()).await;

        assert_eq!(tool.calls(), 4);
        assert_eq!(result.metadata.attempts, 4);
        assert_eq!(result.error_kind(), Some("execution"));
        // 100 + 200 + 400 ms of backoff
        assert!(result.metadata.duration_ms >= 700);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_failure_is_not_retried() {
        let tool = FlakyTool::new(flaky("once"), 1);
        let dispatcher = dispatcher_with(tool.clone());
        let result = dispatcher.run("once", json!({}), &ToolContext::default()).await;
        assert!(!result.success);
        assert_eq!(tool.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_one_failure_succeeds_and_includes_backoff() {
        let tool = FlakyTool::new(flaky("blip").retry(2), 1);
        let dispatcher = dispatcher_with(tool.clone());

        let result = dispatcher.run("blip", json!({}), &ToolContext::default()).await;

        assert!(result.success);
        assert_eq!(tool.calls(), 2);
        assert!(result.metadata.duration_ms >= 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_handler_times_out() {
        let tool = Arc::new(HangingTool {
            descriptor: ToolDescriptor::new("hang", "never returns").timeout_ms(250),
        });
        let dispatcher = dispatcher_with(tool);

        let result = dispatcher.run("hang", json!({}), &ToolContext::default()).await;

        assert_eq!(
            result.error,
            Some(ToolError::Timeout {
                tool_name: "hang".into(),
                timeout_ms: 250
            })
        );
        assert!(result.metadata.duration_ms >= 250);
        assert!(result.metadata.duration_ms < 300);
    }

    #[tokio::test(start_paused = true)]
    async fn max_timeout_caps_descriptor_timeout() {
        let tool = Arc::new(HangingTool {
            descriptor: ToolDescriptor::new("hang", "never returns").timeout_ms(60_000),
        });
        let dispatcher = dispatcher_with(tool).with_max_timeout(Duration::from_millis(50));
        let result = dispatcher.run("hang", json!({}), &ToolContext::default()).await;
        assert!(matches!(
            result.error,
            Some(ToolError::Timeout { timeout_ms: 50, .. })
        ));
    }

    #[tokio::test]
    async fn breaker_opens_after_consecutive_failures() {
        let tool = FlakyTool::new(flaky("sick"), u32::MAX);
        let breakers = Arc::new(BreakerRegistry::default().with_policy(ResiliencePolicy::new(
            "flaky",
            BreakerPolicy {
                failure_threshold: 2,
                ..BreakerPolicy::default()
            },
        )));
        let dispatcher = dispatcher_with(tool.clone()).with_breakers(breakers);

        for _ in 0..2 {
            let r = dispatcher.run("sick", json!({}), &ToolContext::default()).await;
            assert_eq!(r.error_kind(), Some("execution"));
        }
        let r = dispatcher.run("sick", json!({}), &ToolContext::default()).await;
        assert_eq!(
            r.error,
            Some(ToolError::CircuitOpen {
                category: "flaky".into()
            })
        );
        assert_eq!(r.metadata.attempts, 0);
        assert_eq!(tool.calls(), 2);
    }

    #[tokio::test]
    async fn run_call_parses_json_arguments() {
        let tool = FlakyTool::new(flaky("f"), 0);
        let dispatcher = dispatcher_with(tool);
        let ctx = ToolContext::default();

        let ok = dispatcher
            .run_call(&MessageToolCall::new("c1", "f", r#"{"q":"x"}"#), &ctx)
            .await;
        assert!(ok.success);

        let empty = dispatcher.run_call(&MessageToolCall::new("c2", "f", "  "), &ctx).await;
        assert!(empty.success);

        let bad = dispatcher.run_call(&MessageToolCall::new("c3", "f", "{q:"), &ctx).await;
        assert_eq!(bad.error_kind(), Some("validation"));

        let unknown = dispatcher.run_call(&MessageToolCall::new("c4", "g", "{q:"), &ctx).await;
        assert_eq!(unknown.error_kind(), Some("unknown_tool"));
    }

    #[tokio::test]
    async fn outcomes_are_published() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let dispatcher = dispatcher_with(FlakyTool::new(flaky("f"), 0)).with_events(bus);

        dispatcher.run("f", json!({}), &ToolContext::default()).await;

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::ToolExecuted {
                tool_name,
                success,
                attempts,
                ..
            } => {
                assert_eq!(tool_name, "f");
                assert!(*success);
                assert_eq!(*attempts, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn output_text_renders_json_compactly() {
        let result = ToolInvocationResult {
            success: true,
            data: Some(json!({"converted": 9.2})),
            error: None,
            metadata: ToolInvocationMetadata {
                tool_name: "convertCurrency".into(),
                tool_version: "1.0.0".into(),
                category: "finance".into(),
                duration_ms: 1,
                attempts: 1,
            },
        };
        assert_eq!(result.output_text(), r#"{"converted":9.2}"#);
    }
}

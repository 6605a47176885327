//! `ponder run` — Answer one query.

use std::process::ExitCode;
use std::sync::Arc;

use ponder_agent::{ReactAgent, TaskRequest, ToolDispatcher};
use ponder_config::AppConfig;
use ponder_core::event::EventBus;
use ponder_core::task::{TaskResult, TaskStatus};
use ponder_core::trace::{TraceEvent, TraceEventKind};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct RunArgs {
    pub query: String,
    pub max_iterations: Option<u32>,
    pub json: bool,
    pub trace: bool,
    pub session: Option<String>,
}

pub async fn run(config: &AppConfig, args: RunArgs) -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Check for API key early — give a clear error
    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENROUTER_API_KEY = 'sk-or-v1-...'   (recommended)");
        eprintln!("    OPENAI_API_KEY     = 'sk-...'         (for OpenAI direct)");
        eprintln!("    PONDER_API_KEY     = 'sk-...'         (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    debug!(provider = %config.default_provider, model = %config.default_model, "Building agent");
    let provider = ponder_providers::build_from_config(config);
    let events = Arc::new(EventBus::default());
    let registry = Arc::new(ponder_tools::default_registry());
    let dispatcher = Arc::new(ToolDispatcher::from_config(registry, config, events.clone()));
    let agent = ReactAgent::from_config(provider, dispatcher, events, config);

    // Ctrl-C ends the task at the next safe point.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Cancelling...");
            on_interrupt.cancel();
        }
    });

    let mut request = TaskRequest::new(args.query).with_cancel(cancel);
    if let Some(max) = args.max_iterations {
        request = request.with_max_iterations(max);
    }
    if let Some(session) = args.session {
        request = request.with_session_id(session);
    }

    let result = agent.execute(request).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result, args.trace);
    }

    Ok(if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_result(result: &TaskResult, with_trace: bool) {
    if with_trace {
        for event in &result.trace {
            println!("  {}", format_event(event));
        }
        println!();
    }

    match &result.answer {
        Some(answer) => println!("{answer}"),
        None => eprintln!(
            "  [Error] {}",
            result.error.as_deref().unwrap_or("the task produced no answer")
        ),
    }

    if result.status != TaskStatus::Answered {
        eprintln!(
            "  ({}, {} iteration{})",
            result.status.as_str(),
            result.iterations,
            if result.iterations == 1 { "" } else { "s" }
        );
    }
}

/// One trace event as a single display line.
pub fn format_event(event: &TraceEvent) -> String {
    let step = event.iteration;
    match &event.kind {
        TraceEventKind::Thought { content } => format!("[{step}] Thought: {content}"),
        TraceEventKind::Action { tool, arguments, .. } => {
            format!("[{step}] Action: {tool}({arguments})")
        }
        TraceEventKind::Observation {
            tool,
            success,
            output,
            late,
            ..
        } => {
            let mut tags = vec![tool.as_str()];
            if !success {
                tags.push("failed");
            }
            if *late {
                tags.push("late");
            }
            format!("[{step}] Observation ({}): {output}", tags.join(", "))
        }
        TraceEventKind::Answer { content } => format!("[{step}] Answer: {content}"),
        TraceEventKind::Error { message } => format!("[{step}] Error: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_each_event_kind() {
        assert_eq!(
            format_event(&TraceEvent::thought(1, "think")),
            "[1] Thought: think"
        );
        let action = TraceEvent::new(
            2,
            TraceEventKind::Action {
                call_id: "c".into(),
                tool: "calculator".into(),
                arguments: json!({"expression": "1+1"}),
            },
        );
        assert_eq!(
            format_event(&action),
            "[2] Action: calculator({\"expression\":\"1+1\"})"
        );
        let observation = TraceEvent::new(
            2,
            TraceEventKind::Observation {
                call_id: "c".into(),
                tool: "calculator".into(),
                success: false,
                output: "Error: boom".into(),
                error_kind: Some("execution".into()),
                duration_ms: 3,
                late: true,
            },
        );
        assert_eq!(
            format_event(&observation),
            "[2] Observation (calculator, failed, late): Error: boom"
        );
        assert_eq!(format_event(&TraceEvent::error(3, "down")), "[3] Error: down");
    }
}

//! Instruction texts the loop sends to the model.
//!
//! Everything the controller says on its own behalf lives here: the
//! system prompt, the seed suffix, and the corrective messages for each
//! branch of an iteration.

use ponder_core::tool::ToolDescriptor;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a careful assistant that solves tasks by reasoning step by step and using tools.

Respond in this format:
Thought: your reasoning about what to do next
Then EITHER call one or more tools through the function-calling interface,
OR finish with:
Answer: your final answer to the user

Rules:
- Always start with a Thought.
- Call tools only through the function-calling interface; never invent tool results.
- Tool results arrive as observations. Read them before deciding the next step.
- When you know the answer, reply with 'Answer:' and nothing after it.";

/// Appended to the user's query in the first message.
pub const SEED_SUFFIX: &str = "Begin with a Thought.";

/// Sent when the model neither answered nor acted.
pub const CONTINUE: &str =
    "Continue reasoning. Start with 'Thought:' then either call a tool or give 'Answer: <final answer>'.";

/// Used when a run ends before anything was recorded.
pub const NOTHING_RECORDED: &str =
    "No reasoning steps were recorded before the task stopped, so no answer can be offered.";

/// Render `base` followed by the tool list.
pub fn system_prompt(base: &str, tools: &[&ToolDescriptor]) -> String {
    let mut prompt = String::from(base);
    prompt.push_str("\n\nAvailable tools:\n");
    if tools.is_empty() {
        prompt.push_str("(none; answer from your own knowledge)\n");
    }
    for tool in tools {
        prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
    }
    prompt
}

pub fn seed_message(query: &str) -> String {
    format!("{query}\n\n{SEED_SUFFIX}")
}

/// Corrective message when the text names an action but no structured
/// call was made.
pub fn nudge(tool: &str, available: Option<&[&str]>) -> String {
    let mut msg = format!(
        "You described calling the tool '{tool}' but did not invoke it. Use the provided \
         function-calling interface to call a tool, or reply with 'Answer: <your answer>' \
         if you already know it."
    );
    if let Some(names) = available {
        msg.push_str(&format!(
            " There is no tool named '{tool}'. Available tools: {}.",
            names.join(", ")
        ));
    }
    msg
}

/// Fed back after an iteration failed for a recoverable reason.
pub fn recovery(error: &str) -> String {
    format!(
        "The previous step failed: {error}. Continue from where you left off. \
         Start with 'Thought:'."
    )
}

pub fn exhausted_header(max_iterations: u32) -> String {
    format!(
        "I could not reach a final answer within {max_iterations} iterations. \
         Here is what I worked out so far:"
    )
}

pub const CANCELLED_HEADER: &str =
    "The task was cancelled before a final answer was reached. Here is what I worked out so far:";

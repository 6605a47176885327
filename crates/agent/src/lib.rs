//! The reasoning loop — the heart of Ponder.
//!
//! The agent follows a **Thought → Action → Observation** cycle:
//!
//! 1. **Seed** the context with the system prompt, prior conversation and
//!    the query
//! 2. **Send** the context to the model gateway
//! 3. **Parse** the reply for a Thought and an Answer
//! 4. **If tool calls**: dispatch them concurrently through the
//!    [`ToolDispatcher`], fold the observations back in, loop to step 2
//! 5. **If an Answer**: return it with the full trace
//!
//! The loop also ends when the iteration budget runs out (with a
//! synthesized answer), on cancellation, or when the gateway fails
//! irrecoverably.

pub mod dispatcher;
pub mod parser;
pub mod patterns;
pub mod prompts;
pub mod resilience;

pub use dispatcher::{ToolDispatcher, ToolInvocationMetadata, ToolInvocationResult};
pub use parser::{ParsedAction, ParsedResponse, parse};
pub use patterns::{ReactAgent, TaskRequest};
pub use resilience::{BreakerPolicy, BreakerRegistry, CircuitBreaker, CircuitState, ResiliencePolicy};

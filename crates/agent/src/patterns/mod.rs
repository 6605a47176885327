//! Agent patterns — structured reasoning strategies.
//!
//! Ponder ships one: **ReAct**, the Thought → Action → Observation loop
//! with a fully recorded trace.

pub mod react;

pub use react::{DEFAULT_GATEWAY_TIMEOUT, DEFAULT_MAX_ITERATIONS, ReactAgent, TaskRequest};

#[cfg(test)]
pub(crate) mod test_helpers;

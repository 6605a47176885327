//! # Ponder Core
//!
//! Domain types, traits, and error definitions for the Ponder ReAct
//! orchestration runtime. This crate does **no I/O**: it defines the domain
//! model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the reasoning loop is a trait here:
//! - [`Provider`] is the capability model gateway (any LLM backend)
//! - [`Tool`] is a capability handler registered in a [`ToolRegistry`]
//! - [`ResultCache`] is the optional result cache consulted before a task
//!
//! Implementations live in their respective crates, which keeps the loop
//! testable against scripted gateways and stub tools.

pub mod cache;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod task;
pub mod tool;
pub mod trace;

// Re-export key types at crate root for ergonomics
pub use cache::{CachedAnswer, InMemoryResultCache, ResultCache, fingerprint};
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use task::{ActionRecord, IterationRecord, Task, TaskResult, TaskStatus};
pub use tool::{ParamSpec, ParamType, Tool, ToolContext, ToolDescriptor, ToolRegistry};
pub use trace::{TraceEvent, TraceEventKind, TraceRecorder};

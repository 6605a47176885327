//! Error types for the Ponder domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them with `#[from]` conversions.

use thiserror::Error;

/// The top-level error type for all Ponder operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model gateway errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the model gateway.
///
/// Transient variants are absorbed by the reasoning loop as a failed
/// iteration; the rest end the task (see [`ProviderError::is_transient`]).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Whether a later call to the same backend can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Network(_)
            | Self::MalformedResponse(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::AuthenticationFailed(_) | Self::ModelNotFound(_) | Self::NotConfigured(_) => {
                false
            }
        }
    }
}

/// Failures surfaced by the tool registry and dispatcher.
///
/// Every variant renders a non-empty, human-readable message because the
/// reasoning loop feeds it back to the model as an observation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool_name}: {}", .violations.join("; "))]
    Validation {
        tool_name: String,
        violations: Vec<String>,
    },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Circuit open for category '{category}': dependency marked unhealthy")]
    CircuitOpen { category: String },

    #[error("Tool already registered: {0}")]
    AlreadyRegistered(String),
}

impl ToolError {
    /// Stable, machine-readable kind used in trace events and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool(_) => "unknown_tool",
            Self::Validation { .. } => "validation",
            Self::Timeout { .. } => "timeout",
            Self::ExecutionFailed { .. } => "execution",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::AlreadyRegistered(_) => "already_registered",
        }
    }

    /// Convenience constructor for handler failures.
    pub fn execution(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Network("reset".into()).is_transient());
        assert!(ProviderError::RateLimited { retry_after_secs: 1 }.is_transient());
        assert!(
            ProviderError::ApiError {
                status_code: 503,
                message: "unavailable".into()
            }
            .is_transient()
        );
        assert!(
            !ProviderError::ApiError {
                status_code: 400,
                message: "bad request".into()
            }
            .is_transient()
        );
        assert!(!ProviderError::AuthenticationFailed("bad key".into()).is_transient());
    }

    #[test]
    fn validation_error_lists_every_violation() {
        let err = ToolError::Validation {
            tool_name: "convertCurrency".into(),
            violations: vec![
                "missing required parameter 'amount'".into(),
                "parameter 'to' expected string, got number".into(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("convertCurrency"));
        assert!(msg.contains("'amount'"));
        assert!(msg.contains("'to'"));
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn tool_error_kinds_are_distinct() {
        let kinds = [
            ToolError::UnknownTool("x".into()).kind(),
            ToolError::Timeout {
                tool_name: "x".into(),
                timeout_ms: 1,
            }
            .kind(),
            ToolError::execution("x", "boom").kind(),
            ToolError::CircuitOpen {
                category: "c".into(),
            }
            .kind(),
        ];
        let mut dedup = kinds.to_vec();
        dedup.dedup();
        assert_eq!(dedup.len(), kinds.len());
    }
}

//! Error types for the turnwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.
//!
//! Few failure classes ever escape a running loop: configuration errors
//! (caught before any network call), backend transport failures, decode
//! starvation, a broken streaming contract, and an exceeded iteration
//! budget. Tool failures are folded back into the conversation so the
//! model can self-correct.

use thiserror::Error;

/// The top-level error type for all turnwise operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- History errors ---
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The loop ran past its iteration budget without a terminating tool.
    /// Deliberately fatal: a runaway conversation is never truncated silently.
    #[error("Agent exceeded maximum iterations ({max_iterations})")]
    IterationsExceeded { max_iterations: u32 },

    /// The backend stream ended without producing a single decodable
    /// snapshot. Fatal for the turn; never retried automatically.
    #[error("Backend stream ended without a valid structured response")]
    DecodeStarved,

    /// The backend rewrote previously streamed user-facing text instead of
    /// appending to it. Contract breach, surfaced rather than patched over.
    #[error("Backend rewrote streamed user text mid-turn: {0}")]
    NonMonotonicStream(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a configuration error with a message.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Insert index {index} out of range for history of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_displays_correctly() {
        let err = Error::Backend(BackendError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn history_error_displays_index_and_len() {
        let err = Error::History(HistoryError::IndexOutOfRange { index: 9, len: 3 });
        assert!(err.to_string().contains('9'));
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn iterations_exceeded_reports_budget() {
        let err = Error::IterationsExceeded { max_iterations: 7 };
        assert!(err.to_string().contains('7'));
    }
}

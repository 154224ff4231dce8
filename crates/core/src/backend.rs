//! Backend trait — the abstraction over streaming text-generation services.
//!
//! A backend takes a rendered context plus a structured-output schema and
//! produces a sequence of text deltas terminated by a stream-end marker.
//! The engine treats it purely as an async source of text chunks; wire
//! shape is a backend implementation detail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::message::Message;

/// One completion request: the assembled context and the aligned schema
/// the accumulated response text must validate against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Ordered role/content pairs for the model
    pub messages: Vec<Message>,

    /// The concrete response schema for this iteration
    pub response_schema: serde_json::Value,
}

/// Token usage statistics, typically reported on the final chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only on the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The core Backend trait.
///
/// The loop calls `stream()` without knowing which backend is in use.
/// `complete()` is derived: it drains the stream and concatenates the
/// deltas, for collaborators that only need the final text (for example
/// the compaction summarizer).
#[async_trait]
pub trait Backend: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Send a request and receive a channel of text delta chunks.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, BackendError>>, BackendError>;

    /// Send a request and return the full accumulated text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, BackendError> {
        let mut chunks = self.stream(request).await?;
        let mut text = String::new();
        while let Some(chunk) = chunks.recv().await {
            let chunk = chunk?;
            if let Some(content) = chunk.content {
                text.push_str(&content);
            }
            if chunk.done {
                break;
            }
        }
        Ok(text)
    }
}

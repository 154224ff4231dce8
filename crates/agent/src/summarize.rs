//! Summarization through a completion backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use turnwise_core::backend::{Backend, CompletionRequest};
use turnwise_core::error::Result;
use turnwise_core::history::Summarizer;
use turnwise_core::message::Message;

/// A [`Summarizer`] that asks a backend to condense the transcript.
pub struct BackendSummarizer {
    backend: Arc<dyn Backend>,
}

impl BackendSummarizer {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Summarizer for BackendSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String> {
        let transcript: String = messages
            .iter()
            .map(|m| format!("[{:?}] {}\n", m.role, m.content))
            .collect();
        debug!(messages = messages.len(), "summarizing transcript");

        let request = CompletionRequest {
            messages: vec![
                Message::system(
                    "Condense the following conversation transcript. Keep facts, \
                     decisions, and open threads. Respond with a JSON object \
                     containing a single `summary` string.",
                ),
                Message::user(transcript),
            ],
            response_schema: json!({
                "type": "object",
                "properties": { "summary": { "type": "string" } },
                "required": ["summary"],
            }),
        };

        let text = self.backend.complete(request).await?;
        let summary = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("summary").and_then(|s| s.as_str()).map(String::from))
            .unwrap_or(text);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use turnwise_core::backend::StreamChunk;
    use turnwise_core::error::BackendError;

    struct CannedBackend {
        reply: &'static str,
    }

    #[async_trait]
    impl Backend for CannedBackend {
        fn name(&self) -> &str {
            "canned"
        }

        async fn stream(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<
            mpsc::Receiver<std::result::Result<StreamChunk, BackendError>>,
            BackendError,
        > {
            let (tx, rx) = mpsc::channel(4);
            let reply = self.reply;
            tokio::spawn(async move {
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: Some(reply.to_string()),
                        ..StreamChunk::default()
                    }))
                    .await;
                let _ = tx
                    .send(Ok(StreamChunk {
                        done: true,
                        ..StreamChunk::default()
                    }))
                    .await;
            });
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn extracts_the_summary_field() {
        let summarizer = BackendSummarizer::new(Arc::new(CannedBackend {
            reply: r#"{"summary": "they discussed rust"}"#,
        }));
        let summary = summarizer
            .summarize(&[Message::user("tell me about rust")])
            .await
            .unwrap();
        assert_eq!(summary, "they discussed rust");
    }

    #[tokio::test]
    async fn falls_back_to_raw_text() {
        let summarizer = BackendSummarizer::new(Arc::new(CannedBackend {
            reply: "they discussed rust",
        }));
        let summary = summarizer.summarize(&[Message::user("hi")]).await.unwrap();
        assert_eq!(summary, "they discussed rust");
    }
}

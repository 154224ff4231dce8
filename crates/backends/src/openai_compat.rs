//! OpenAI-compatible backend implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/v1/chat/completions` with `json_schema` structured
//! output.
//!
//! The aligned response schema travels in `response_format`, so the model
//! is constrained server-side to the same shape the streaming decoder
//! validates client-side.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};
use turnwise_config::AppConfig;
use turnwise_core::backend::{Backend, CompletionRequest, StreamChunk, Usage};
use turnwise_core::error::BackendError;
use turnwise_core::message::{Message, Role};

/// An OpenAI-compatible streaming completion backend.
pub struct OpenAiCompatBackend {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    /// Create a new OpenAI-compatible backend.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            client,
        }
    }

    /// Create a backend wired from loaded configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, BackendError> {
        let api_key = config.backend.api_key.clone().ok_or_else(|| {
            BackendError::NotConfigured("backend.api_key (or TURNWISE_API_KEY) is not set".into())
        })?;
        let mut backend = Self::new(
            "openai-compat",
            config.backend.base_url.clone(),
            api_key,
            config.backend.model.clone(),
        );
        backend.temperature = config.backend.temperature;
        backend.max_tokens = config.backend.max_tokens;
        Ok(backend)
    }

    /// Create an OpenAI backend (convenience constructor).
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key, model)
    }

    /// Create an Ollama backend (convenience constructor).
    pub fn ollama(base_url: Option<&str>, model: impl Into<String>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
            model,
        )
    }

    /// Override the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Limit the response length.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Convert our Message types to OpenAI API format. Flags and ids are
    /// engine-internal and never go over the wire.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => "system",
                },
                content: m.content.clone(),
            })
            .collect()
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": self.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "agent_response",
                    "schema": request.response_schema,
                    "strict": true,
                },
            },
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }

    fn map_status(status: u16, error_body: String) -> BackendError {
        match status {
            429 => BackendError::RateLimited {
                retry_after_secs: 5,
            },
            401 | 403 => BackendError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ),
            _ => BackendError::ApiError {
                status_code: status,
                message: error_body,
            },
        }
    }
}

#[async_trait]
impl Backend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, BackendError>>, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(backend = %self.name, model = %self.model, "Sending streaming completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Backend streaming error");
            return Err(Self::map_status(status, error_body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Read the SSE byte stream and forward parsed chunks.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut usage: Option<Usage> = None;

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(BackendError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    match parse_sse_line(&line) {
                        SseEvent::Ignore => {}
                        SseEvent::Done => {
                            let _ = tx
                                .send(Ok(StreamChunk {
                                    content: None,
                                    done: true,
                                    usage: usage.take(),
                                }))
                                .await;
                            return;
                        }
                        SseEvent::Data(stream_resp) => {
                            if let Some(api_usage) = stream_resp.usage {
                                usage = Some(Usage {
                                    prompt_tokens: api_usage.prompt_tokens,
                                    completion_tokens: api_usage.completion_tokens,
                                    total_tokens: api_usage.total_tokens,
                                });
                            }
                            let delta = stream_resp
                                .choices
                                .first()
                                .and_then(|c| c.delta.content.clone());
                            if delta.as_deref().is_some_and(|d| !d.is_empty()) {
                                let chunk = StreamChunk {
                                    content: delta,
                                    done: false,
                                    usage: None,
                                };
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return; // receiver dropped
                                }
                            }
                        }
                        SseEvent::Malformed(data) => {
                            // A garbled frame is not fatal; the decoder
                            // treats missing deltas as not-enough-data.
                            warn!(data = %data, "Skipping unparseable SSE frame");
                        }
                    }
                }
            }

            // Stream ended without [DONE]; still signal completion.
            let _ = tx
                .send(Ok(StreamChunk {
                    content: None,
                    done: true,
                    usage: usage.take(),
                }))
                .await;
        });

        Ok(rx)
    }
}

enum SseEvent {
    Ignore,
    Done,
    Data(StreamResponse),
    Malformed(String),
}

fn parse_sse_line(line: &str) -> SseEvent {
    if line.is_empty() || line.starts_with(':') {
        return SseEvent::Ignore;
    }
    let Some(data) = line.strip_prefix("data: ") else {
        return SseEvent::Ignore;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseEvent::Done;
    }
    match serde_json::from_str::<StreamResponse>(data) {
        Ok(resp) => SseEvent::Data(resp),
        Err(_) => SseEvent::Malformed(data.to_string()),
    }
}

// --- Wire types ---

#[derive(serde::Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use turnwise_core::message::MessageFlag;

    #[test]
    fn api_messages_carry_role_and_content_only() {
        let messages = vec![
            Message::system("instructions").with_flag(MessageFlag::IsSystemInstruction),
            Message::user("hello"),
            Message::assistant("{\"msg_to_user\":\"hi\"}"),
        ];
        let api = OpenAiCompatBackend::to_api_messages(&messages);
        assert_eq!(api.len(), 3);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[2].role, "assistant");
        let json = serde_json::to_string(&api[0]).unwrap();
        assert!(!json.contains("flags"));
        assert!(!json.contains("id"));
    }

    #[test]
    fn request_body_embeds_response_schema() {
        let backend = OpenAiCompatBackend::openai("sk-test", "gpt-4o-mini");
        let schema = json!({"type": "object", "properties": {"msg_to_user": {"type": "string"}}});
        let request = CompletionRequest {
            messages: vec![Message::user("hi")],
            response_schema: schema.clone(),
        };
        let body = backend.request_body(&request);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["schema"], schema);
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn sse_content_frame_parses() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        match parse_sse_line(line) {
            SseEvent::Data(resp) => {
                assert_eq!(resp.choices[0].delta.content.as_deref(), Some("Hel"));
            }
            _ => panic!("expected data frame"),
        }
    }

    #[test]
    fn sse_done_and_comment_frames() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseEvent::Done));
        assert!(matches!(parse_sse_line(": keepalive"), SseEvent::Ignore));
        assert!(matches!(parse_sse_line(""), SseEvent::Ignore));
        assert!(matches!(
            parse_sse_line("data: {not json"),
            SseEvent::Malformed(_)
        ));
    }

    #[test]
    fn usage_frame_parses() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        match parse_sse_line(line) {
            SseEvent::Data(resp) => {
                let usage = resp.usage.unwrap();
                assert_eq!(usage.total_tokens, 15);
            }
            _ => panic!("expected data frame"),
        }
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            OpenAiCompatBackend::map_status(429, String::new()),
            BackendError::RateLimited { .. }
        ));
        assert!(matches!(
            OpenAiCompatBackend::map_status(401, String::new()),
            BackendError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            OpenAiCompatBackend::map_status(500, "boom".into()),
            BackendError::ApiError {
                status_code: 500,
                ..
            }
        ));
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = AppConfig::default();
        assert!(matches!(
            OpenAiCompatBackend::from_config(&config),
            Err(BackendError::NotConfigured(_))
        ));
    }
}

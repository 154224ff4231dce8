//! The agent loop itself.
//!
//! One `run()` drives one conversation to completion: context assembly,
//! schema alignment, streamed decoding, turn bookkeeping, and the
//! continue/terminate decision, bounded by an iteration budget. Two
//! caller surfaces sit on top of the same execution: [`AgentLoop::run`]
//! yields full response snapshots, [`AgentLoop::stream_text`] reduces
//! them to printable text deltas.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};
use turnwise_core::backend::{Backend, CompletionRequest};
use turnwise_core::error::{Error, Result};
use turnwise_core::event::{DomainEvent, EventBus};
use turnwise_core::history::{History, Summarizer};
use turnwise_core::message::Message;
use turnwise_core::response::{AgentResponse, TurnOutcome};

use crate::decoder::StreamDecoder;
use crate::environment::Environment;
use crate::schema::align_schema;

const DEFAULT_MAX_ITERATIONS: u32 = 7;
const DEFAULT_SEPARATOR: &str = "\n\n";
const CHANNEL_CAPACITY: usize = 64;

/// Drives the conversation between a backend and an environment.
///
/// The loop owns its [`History`] for the duration of a run; seed it with
/// [`AgentLoop::with_history`] before starting.
pub struct AgentLoop {
    backend: Arc<dyn Backend>,
    environment: Arc<dyn Environment>,
    history: History,
    base_schema: Value,
    max_iterations: u32,
    separator: String,
    events: Option<Arc<EventBus>>,
    compaction: Option<Compaction>,
}

struct Compaction {
    threshold: usize,
    reduce_by: usize,
    summarizer: Arc<dyn Summarizer>,
}

impl AgentLoop {
    pub fn new(backend: Arc<dyn Backend>, environment: Arc<dyn Environment>) -> Self {
        Self {
            backend,
            environment,
            history: History::new(),
            base_schema: AgentResponse::base_schema(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            separator: DEFAULT_SEPARATOR.to_string(),
            events: None,
            compaction: None,
        }
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = history;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Replace the base response schema. The schema must keep the
    /// `msg_to_user` and `action` properties; alignment checks this.
    pub fn with_base_schema(mut self, schema: Value) -> Self {
        self.base_schema = schema;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Apply loop settings from configuration. Compaction settings still
    /// need a summarizer via [`AgentLoop::with_compaction`].
    pub fn with_settings(mut self, config: &turnwise_config::AgentConfig) -> Self {
        self.max_iterations = config.max_iterations;
        self.separator = config.message_separator.clone();
        self
    }

    pub fn with_compaction(
        mut self,
        config: &turnwise_config::CompactionConfig,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        self.compaction = Some(Compaction {
            threshold: config.threshold,
            reduce_by: config.reduce_by,
            summarizer,
        });
        self
    }

    /// Run the loop, yielding every validated snapshot plus one final
    /// response per turn. The first `Err` on the channel is fatal and
    /// nothing follows it.
    pub fn run(mut self) -> mpsc::Receiver<Result<AgentResponse>> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            if let Err(err) = self.drive(&tx).await {
                error!(%err, "agent run failed");
                if let Some(events) = &self.events {
                    events.publish(DomainEvent::ErrorOccurred {
                        context: "agent_loop".to_string(),
                        error_message: err.to_string(),
                        timestamp: chrono::Utc::now(),
                    });
                }
                let _ = tx.send(Err(err)).await;
            }
        });
        rx
    }

    /// Run the loop, yielding printable text deltas.
    ///
    /// Within one turn, each snapshot extends the previous user message
    /// and only the new suffix is emitted. A message that restarts
    /// (a new turn) is preceded by the configured separator.
    pub fn stream_text(self) -> mpsc::Receiver<Result<String>> {
        let separator = self.separator.clone();
        let mut responses = self.run();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut emitted = String::new();
            while let Some(item) = responses.recv().await {
                let response = match item {
                    Ok(response) => response,
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                };
                let Some(message) = response.msg_to_user.as_deref() else {
                    continue;
                };
                if message.is_empty() {
                    continue;
                }
                let delta = if let Some(suffix) = message.strip_prefix(emitted.as_str()) {
                    if suffix.is_empty() {
                        continue; // final snapshot repeats the last one
                    }
                    suffix.to_string()
                } else {
                    // a new turn started a fresh message; the separator is
                    // its own increment, then the message follows
                    if tx.send(Ok(separator.clone())).await.is_err() {
                        return;
                    }
                    message.to_string()
                };
                emitted = message.to_string();
                if tx.send(Ok(delta)).await.is_err() {
                    return;
                }
            }
        });
        rx
    }

    #[instrument(skip_all, fields(backend = self.backend.name(), max = self.max_iterations))]
    async fn drive(&mut self, tx: &mpsc::Sender<Result<AgentResponse>>) -> Result<()> {
        let mut iteration: u32 = 0;
        loop {
            iteration += 1;
            if iteration > self.max_iterations {
                return Err(Error::IterationsExceeded {
                    max_iterations: self.max_iterations,
                });
            }
            let remaining = self.max_iterations - iteration;
            debug!(iteration, remaining, "starting iteration");

            let context = self
                .environment
                .get_context(&self.history, remaining)
                .await?;
            let tools = self.environment.tools().await?;
            let schema = align_schema(&self.base_schema, &tools)?;

            let mut chunks = self
                .backend
                .stream(CompletionRequest {
                    messages: context,
                    response_schema: schema.clone(),
                })
                .await?;

            let mut decoder = StreamDecoder::new(schema);
            while let Some(chunk) = chunks.recv().await {
                let chunk = chunk?;
                if let Some(content) = chunk.content.as_deref() {
                    if let Some(snapshot) = decoder.feed(content)? {
                        if tx.send(Ok(snapshot)).await.is_err() {
                            return Ok(()); // caller went away
                        }
                    }
                }
                if chunk.done {
                    break;
                }
            }

            let mut response = decoder.into_last().ok_or(Error::DecodeStarved)?;
            response.turn_completed = true;

            self.history
                .append(Message::assistant(serde_json::to_string_pretty(&response)?));
            if let Some(events) = &self.events {
                events.publish(DomainEvent::TurnCompleted {
                    iteration,
                    has_action: response.action.is_some(),
                    timestamp: chrono::Utc::now(),
                });
            }
            // The turn's final value reaches the caller before any tool
            // runs; a failing continuation decision never swallows it.
            if tx.send(Ok(response.clone())).await.is_err() {
                return Ok(());
            }
            let outcome = self.environment.on_turn_completed(&response).await?;

            match outcome {
                TurnOutcome::Terminate => {
                    info!(iteration, "conversation terminated");
                    return Ok(());
                }
                TurnOutcome::Continue(message) => self.history.append(message),
            }

            if let Some(compaction) = &self.compaction {
                let marker_before = self.history.last_summary_index();
                self.history
                    .compact(
                        compaction.threshold,
                        compaction.reduce_by,
                        compaction.summarizer.as_ref(),
                    )
                    .await?;
                if self.history.last_summary_index() != marker_before {
                    if let Some(events) = &self.events {
                        events.publish(DomainEvent::HistoryCompacted {
                            live_messages: self.history.len_since_summary(),
                            timestamp: chrono::Utc::now(),
                        });
                    }
                }
            }
        }
    }
}

//! # Turnwise Agent
//!
//! The agent loop and streaming response reconciliation engine.
//!
//! The loop drives one conversation: it assembles context through an
//! [`Environment`], aligns the response schema to the current tool set,
//! decodes the backend's token-delta stream into validated snapshots, and
//! asks the environment whether to continue or terminate after each turn.
//!
//! ```no_run
//! use std::sync::Arc;
//! use turnwise_agent::{AgentLoop, ToolEnvironment};
//! use turnwise_core::{History, Message};
//!
//! # async fn example(backend: Arc<dyn turnwise_core::Backend>) {
//! let environment = Arc::new(ToolEnvironment::with_static_tools(vec![]));
//! let mut history = History::new();
//! history.append(Message::user("What is the capital of France?"));
//!
//! let mut responses = AgentLoop::new(backend, environment)
//!     .with_history(history)
//!     .run();
//! while let Some(response) = responses.recv().await {
//!     // every streamed snapshot, plus one final value per turn
//! }
//! # }
//! ```

pub mod decoder;
pub mod environment;
pub mod loop_runner;
pub mod prompt;
pub mod schema;
pub mod summarize;
pub mod validate;

pub use decoder::StreamDecoder;
pub use environment::{Environment, ToolEnvironment};
pub use loop_runner::AgentLoop;
pub use prompt::{render_system_instruction, PromptContext};
pub use schema::align_schema;
pub use summarize::BackendSummarizer;

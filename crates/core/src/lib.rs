//! # Turnwise Core
//!
//! Domain types, traits, and error definitions for the turnwise agent loop
//! engine. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here: the streaming text
//! backend, the tool executor, tool discovery, and the history summarizer.
//! Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod backend;
pub mod error;
pub mod event;
pub mod history;
pub mod message;
pub mod response;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use backend::{Backend, CompletionRequest, StreamChunk, Usage};
pub use error::{BackendError, Error, HistoryError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use history::{History, Summarizer};
pub use message::{Message, MessageFlag, Role};
pub use response::{AgentResponse, ToolInvocation, TurnOutcome};
pub use tool::{StaticTools, ToolDescriptor, ToolExecutor, ToolSource};

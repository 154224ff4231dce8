//! The environment seam between the loop and the outside world.
//!
//! [`Environment`] is the one trait a host application implements (or
//! composes) to control what the model sees and what happens after each
//! turn. [`ToolEnvironment`] is the batteries-included implementation:
//! it discovers tools from a [`ToolSource`], renders the system
//! instruction, executes non-terminating actions, and folds every result
//! back into the conversation as text.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use turnwise_core::error::{Result, ToolError};
use turnwise_core::event::{DomainEvent, EventBus};
use turnwise_core::history::History;
use turnwise_core::message::{Message, MessageFlag};
use turnwise_core::response::{AgentResponse, TurnOutcome};
use turnwise_core::tool::{StaticTools, ToolDescriptor, ToolExecutor, ToolSource};

use crate::prompt::{render_system_instruction, PromptContext};

const NO_ACTION_NUDGE: &str =
    "No action taken. You must conclude with an answer or a follow-up question.";

/// What the loop needs from its surroundings: context for the next
/// request, the current tool set, and a verdict after each turn.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Assemble the messages for the next completion request. The live
    /// window of `history` is the conversation so far; implementations
    /// prepend whatever instructions the model should see.
    async fn get_context(
        &self,
        history: &History,
        remaining_iterations: u32,
    ) -> Result<Vec<Message>>;

    /// The tools available this iteration. Stable between a
    /// `get_context` call and the matching `on_turn_completed`.
    async fn tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// React to a finished turn: execute the action (if any) and decide
    /// whether the loop continues or the conversation is over.
    async fn on_turn_completed(&self, response: &AgentResponse) -> Result<TurnOutcome>;
}

/// An [`Environment`] backed by a tool source and an optional executor.
pub struct ToolEnvironment {
    source: Arc<dyn ToolSource>,
    executor: Option<Arc<dyn ToolExecutor>>,
    extra_instructions: Option<String>,
    events: Option<Arc<EventBus>>,
    // refreshed in get_context so tools() and on_turn_completed() see
    // the same set the instruction was rendered against
    cached_tools: Mutex<Vec<ToolDescriptor>>,
}

impl ToolEnvironment {
    pub fn new(source: Arc<dyn ToolSource>) -> Self {
        Self {
            source,
            executor: None,
            extra_instructions: None,
            events: None,
            cached_tools: Mutex::new(Vec::new()),
        }
    }

    /// An environment over a fixed tool list.
    pub fn with_static_tools(tools: Vec<ToolDescriptor>) -> Self {
        Self::new(Arc::new(StaticTools::new(tools)))
    }

    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_extra_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.extra_instructions = Some(instructions.into());
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Re-list tools from the source, guaranteeing the built-in
    /// terminating tools are always present.
    async fn refresh_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let mut tools = self.source.list_tools().await?;
        for builtin in [ToolDescriptor::answer(), ToolDescriptor::follow_up()] {
            if !tools.iter().any(|t| t.name == builtin.name) {
                tools.push(builtin);
            }
        }
        *self.cached_tools.lock().await = tools.clone();
        Ok(tools)
    }

    async fn current_tools(&self) -> Result<Vec<ToolDescriptor>> {
        {
            let cached = self.cached_tools.lock().await;
            if !cached.is_empty() {
                return Ok(cached.clone());
            }
        }
        self.refresh_tools().await
    }

    async fn execute_action(
        &self,
        invocation: &turnwise_core::response::ToolInvocation,
    ) -> std::result::Result<String, ToolError> {
        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| ToolError::NotFound(invocation.tool_name.clone()))?;
        executor.execute(invocation).await
    }
}

#[async_trait]
impl Environment for ToolEnvironment {
    async fn get_context(
        &self,
        history: &History,
        remaining_iterations: u32,
    ) -> Result<Vec<Message>> {
        let tools = self.refresh_tools().await?;
        let terminating: Vec<String> = tools
            .iter()
            .filter(|t| t.is_terminating())
            .map(|t| t.name.clone())
            .collect();
        let instruction = render_system_instruction(&PromptContext {
            tools: &tools,
            remaining_iterations,
            terminating_tools: &terminating,
            extra_instructions: self.extra_instructions.as_deref(),
        });

        let mut context = vec![Message::system(instruction).with_flag(MessageFlag::IsSystemInstruction)];
        context.extend(
            history
                .live_window()
                .iter()
                .filter(|m| !m.has_flag(MessageFlag::IsSystemInstruction))
                .cloned(),
        );
        Ok(context)
    }

    async fn tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.current_tools().await
    }

    async fn on_turn_completed(&self, response: &AgentResponse) -> Result<TurnOutcome> {
        let Some(invocation) = response.action.as_ref() else {
            debug!("turn completed without an action, nudging");
            return Ok(TurnOutcome::Continue(
                Message::user(NO_ACTION_NUDGE).with_flag(MessageFlag::IsSystemResponse),
            ));
        };

        let tools = self.current_tools().await?;
        let is_terminating = tools
            .iter()
            .any(|t| t.name == invocation.tool_name && t.is_terminating());
        if is_terminating {
            debug!(tool = %invocation.tool_name, "terminating tool called");
            return Ok(TurnOutcome::Terminate);
        }

        let started = Instant::now();
        let (content, success) = match self.execute_action(invocation).await {
            Ok(result) => (format!("Tool result: {result}"), true),
            Err(error) => {
                warn!(tool = %invocation.tool_name, %error, "tool execution failed");
                (format!("Tool result: error: {error}"), false)
            }
        };
        if let Some(events) = &self.events {
            events.publish(DomainEvent::ToolExecuted {
                tool_name: invocation.tool_name.clone(),
                success,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: chrono::Utc::now(),
            });
        }
        Ok(TurnOutcome::Continue(
            Message::user(content).with_flag(MessageFlag::IsToolResult),
        ))
    }
}

//! Tool descriptors and the collaborator traits around them.
//!
//! The engine never inspects tool internals: execution and discovery are
//! both behind traits. A descriptor tagged `terminating` ends the loop
//! when invoked instead of producing a continuation message.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ToolError;
use crate::response::ToolInvocation;

/// Metadata tag marking a tool as loop-terminating.
pub const TERMINATING_TAG: &str = "terminating";

/// Describes one callable unit available to the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique name, the discriminant in the aligned response schema
    pub name: String,

    /// What this tool does (rendered into the system instruction)
    pub description: String,

    /// JSON Schema for the tool's arguments
    pub argument_schema: serde_json::Value,

    /// Free-form metadata tags
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub metadata: BTreeSet<String>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        argument_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            argument_schema,
            metadata: BTreeSet::new(),
        }
    }

    /// Mark this tool as terminating (builder-style).
    pub fn terminating(mut self) -> Self {
        self.metadata.insert(TERMINATING_TAG.to_string());
        self
    }

    /// Whether invoking this tool ends the loop.
    pub fn is_terminating(&self) -> bool {
        self.metadata.contains(TERMINATING_TAG)
    }

    /// The built-in terminating tool for delivering a final answer.
    pub fn answer() -> Self {
        Self::new(
            "answer",
            "Provide the final answer to the user's query based on the information gathered.",
            json!({
                "type": "object",
                "properties": {
                    "answer": {
                        "type": "string",
                        "description": "The final answer to the user's query.",
                    },
                },
                "required": ["answer"],
            }),
        )
        .terminating()
    }

    /// The built-in terminating tool for asking the user a question.
    pub fn follow_up() -> Self {
        Self::new(
            "follow_up",
            "Ask a follow-up question to gather more information from the user.",
            json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "The follow-up question to ask the user.",
                    },
                },
                "required": ["question"],
            }),
        )
        .terminating()
    }
}

/// Executes tool invocations. The engine treats failures as text to feed
/// back into the conversation, so implementations may return rich errors.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<String, ToolError>;
}

/// Supplies the current tool set, statically or by remote discovery.
#[async_trait]
pub trait ToolSource: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError>;
}

/// A fixed, in-memory tool source.
pub struct StaticTools {
    tools: Vec<ToolDescriptor>,
}

impl StaticTools {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl ToolSource for StaticTools {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        Ok(self.tools.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminating_tag_round_trips() {
        let tool = ToolDescriptor::new("lookup", "Look something up", json!({"type": "object"}));
        assert!(!tool.is_terminating());
        assert!(tool.terminating().is_terminating());
    }

    #[test]
    fn builtin_terminators_are_flagged() {
        assert!(ToolDescriptor::answer().is_terminating());
        assert!(ToolDescriptor::follow_up().is_terminating());
    }

    #[test]
    fn answer_schema_requires_answer_field() {
        let tool = ToolDescriptor::answer();
        assert_eq!(tool.argument_schema["required"][0], "answer");
    }

    #[tokio::test]
    async fn static_source_lists_registered_tools() {
        let source = StaticTools::new(vec![ToolDescriptor::answer()]);
        let tools = source.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "answer");
    }
}

//! The structured agent response and the per-turn continuation signal.
//!
//! An `AgentResponse` is produced once per loop iteration as a final
//! snapshot, and also streamed as a sequence of growing partial snapshots
//! while the backend is still emitting deltas.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::message::Message;

/// A request to invoke one tool with validated arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolInvocation {
    /// Name of the tool to invoke
    pub tool_name: String,

    /// Arguments conforming to the tool's argument schema
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// One structured response from the model.
///
/// Within a single streaming session, `msg_to_user` is monotonically
/// non-decreasing by string-prefix extension once non-empty; the backend
/// appends, never rewrites. The decoder enforces this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgentResponse {
    /// The model's private reasoning for this turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,

    /// User-facing text, streamed incrementally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_to_user: Option<String>,

    /// The tool the model wants to invoke, or nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ToolInvocation>,

    /// Set on the final per-turn value, never by the model itself
    #[serde(default)]
    #[schemars(skip)]
    pub turn_completed: bool,
}

impl AgentResponse {
    /// The base response schema, before tool alignment constrains `action`.
    pub fn base_schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(AgentResponse))
            .expect("response schema serializes")
    }
}

/// What the environment decided after a completed turn.
///
/// A dedicated two-variant type rather than `Option<Message>`: terminating
/// the loop and "no message" are different things.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Append this message to history and run another iteration.
    Continue(Message),
    /// Stop the loop.
    Terminate,
}

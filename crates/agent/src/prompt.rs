//! System instruction rendering.
//!
//! The instruction is rebuilt every iteration because the tool set and
//! the remaining-iteration budget both change as the loop runs.

use turnwise_core::tool::ToolDescriptor;

/// Everything the instruction depends on for one iteration.
pub struct PromptContext<'a> {
    pub tools: &'a [ToolDescriptor],
    pub remaining_iterations: u32,
    pub terminating_tools: &'a [String],
    pub extra_instructions: Option<&'a str>,
}

/// Render the per-iteration system instruction.
pub fn render_system_instruction(ctx: &PromptContext<'_>) -> String {
    let mut out = String::from(
        "You are an autonomous agent. You reason step by step and act by \
         calling tools.\n\nAvailable tools:\n",
    );
    for tool in ctx.tools {
        let schema = serde_json::to_string(&tool.argument_schema).unwrap_or_default();
        out.push_str(&format!(
            "- {}: {} (arguments schema: {})\n",
            tool.name, tool.description, schema
        ));
    }

    out.push_str(
        "\nAlways respond with a single JSON object of this form:\n\
         {\n  \"thought\": \"your private reasoning\",\n  \
         \"msg_to_user\": \"text shown to the user as it streams\",\n  \
         \"action\": {\"tool_name\": \"...\", \"arguments\": {...}} or null\n}\n",
    );

    out.push_str(&format!(
        "\nYou have a limited budget of turns ({} remaining after this one).\n",
        ctx.remaining_iterations
    ));
    if !ctx.terminating_tools.is_empty() {
        out.push_str(&format!(
            "Calling one of these tools ends the conversation turn: {}.\n",
            ctx.terminating_tools.join(", ")
        ));
    }
    if ctx.remaining_iterations == 0 {
        out.push_str(
            "This is your last turn. You must call a terminating tool now.\n",
        );
    }
    if let Some(extra) = ctx.extra_instructions {
        out.push('\n');
        out.push_str(extra);
        out.push('\n');
    }
    out
}

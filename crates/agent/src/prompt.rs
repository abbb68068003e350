//! Prompt assembly.
//!
//! The prompt is a fixed tagged template: system directive, the current
//! user input, the tool catalog, the context window, then the thought and
//! action directives that tell the model to end with one JSON object.

use std::fmt::Write;
use stepwise_core::context::ContextEntry;
use stepwise_core::tool::ToolDescriptor;

const THOUGHT: &str = "Determine the next action based on the input and context. \
If the request has been fully addressed or the desired result has been obtained, \
return a \"stop\" action and the result.";

const ACTION: &str = r#"Return a JSON object: {"tool": "tool_name", "input": "input_data"} or {"tool": "stop", "result": "result_data"}"#;

/// Render one prompt. Pure: same inputs, same string.
///
/// Tools and context entries appear exactly in the order given; nothing is
/// dropped or truncated here (the caller picks the window).
pub fn build(
    system_prompt: &str,
    user_input: &str,
    tools: &[ToolDescriptor],
    context: &[ContextEntry],
) -> String {
    let tools_block = tools
        .iter()
        .map(|t| format!("<tool name='{}'>{}</tool>", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    let context_block = context
        .iter()
        .map(|e| {
            format!(
                "<entry timestamp='{}' type='{}'>{}</entry>",
                e.timestamp_string(),
                e.entry_type,
                e.data
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut prompt = String::new();
    let _ = writeln!(prompt, "<system>{system_prompt}</system>");
    let _ = writeln!(prompt, "<user>{user_input}</user>");
    let _ = writeln!(prompt, "<tools>{tools_block}</tools>");
    let _ = writeln!(prompt, "<context>{context_block}</context>");
    let _ = writeln!(prompt, "<thought>{THOUGHT}</thought>");
    let _ = writeln!(prompt, "<action>{ACTION}</action>");
    prompt
}

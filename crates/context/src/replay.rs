//! Human-readable rendering of stored entries for the operator commands.

use serde_json::Value;
use std::fmt::Write;
use stepwise_core::context::{ContextEntry, EntryType};

/// Printed when a replay or query matches nothing.
pub const NO_ENTRIES: &str = "No context entries found.";

/// Render entries grouped by session, in the order given.
///
/// A session header is emitted whenever the session changes, so entries
/// should already be in chronological order.
pub fn render_replay(entries: &[ContextEntry]) -> String {
    if entries.is_empty() {
        return format!("{NO_ENTRIES}\n");
    }

    let mut out = String::new();
    let mut current: Option<&str> = None;
    for entry in entries {
        if current != Some(entry.session_id.as_str()) {
            let _ = writeln!(out, "\n===== Session: {} =====", entry.session_id);
            current = Some(entry.session_id.as_str());
        }
        let _ = writeln!(out, "[{}] {}", entry.timestamp_string(), describe(entry));
    }
    out
}

/// Render entries one per line as `[timestamp] [Session: id] data`.
pub fn render_query(entries: &[ContextEntry]) -> String {
    if entries.is_empty() {
        return format!("{NO_ENTRIES}\n");
    }

    entries.iter().fold(String::new(), |mut out, entry| {
        let _ = writeln!(
            out,
            "[{}] [Session: {}] {}",
            entry.timestamp_string(),
            entry.session_id,
            entry.data
        );
        out
    })
}

/// One-line description of an entry, shaped by its type.
pub fn describe(entry: &ContextEntry) -> String {
    let data = &entry.data;
    match entry.entry_type {
        EntryType::ToolResult => format!(
            "Tool: {} | Input: {} | Result: {}",
            field(data, "tool"),
            field(data, "input"),
            field(data, "result")
        ),
        EntryType::Error => match data.get("tool") {
            Some(tool) => format!("Error ({}): {}", plain(tool), field(data, "error")),
            None => format!("Error: {}", field(data, "error")),
        },
        EntryType::Stop => format!("Final result: {}", field(data, "result")),
        EntryType::HumanInput => format!("Human: {}", field(data, "human_input")),
        EntryType::General | EntryType::Custom => data.to_string(),
    }
}

fn field(data: &Value, key: &str) -> String {
    data.get(key).map_or_else(|| "null".to_string(), plain)
}

/// Strings print bare; everything else as compact JSON.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use stepwise_core::context::SessionId;

    fn entry(id: i64, session: &str, entry_type: EntryType, data: Value) -> ContextEntry {
        ContextEntry {
            id,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, id as u32).unwrap(),
            entry_type,
            data,
            session_id: SessionId::from(session),
            annotations: None,
        }
    }

    #[test]
    fn empty_replay_says_so() {
        assert_eq!(render_replay(&[]), "No context entries found.\n");
        assert_eq!(render_query(&[]), "No context entries found.\n");
    }

    #[test]
    fn replay_groups_by_session() {
        let entries = vec![
            entry(1, "s1", EntryType::HumanInput, json!({"human_input": "add 2 and 2"})),
            entry(2, "s1", EntryType::ToolResult, json!({"tool": "calculator", "input": "2+2", "result": {"result": 4.0}})),
            entry(3, "s2", EntryType::Stop, json!({"result": 4})),
        ];
        let out = render_replay(&entries);

        assert_eq!(out.matches("===== Session:").count(), 2);
        assert!(out.contains("\n===== Session: s1 =====\n[2024-03-01T12:00:01.000000Z] Human: add 2 and 2\n"));
        assert!(out.contains("Tool: calculator | Input: 2+2 | Result: {\"result\":4.0}"));
        assert!(out.contains("===== Session: s2 =====\n[2024-03-01T12:00:03.000000Z] Final result: 4"));
    }

    #[test]
    fn describes_errors_with_and_without_tool() {
        let with_tool = entry(1, "s", EntryType::Error, json!({"tool": "calculator", "input": "1/0", "error": "Division by zero"}));
        assert_eq!(describe(&with_tool), "Error (calculator): Division by zero");

        let bare = entry(2, "s", EntryType::Error, json!({"error": "Tool 'unknown' not found"}));
        assert_eq!(describe(&bare), "Error: Tool 'unknown' not found");
    }

    #[test]
    fn general_entries_print_raw_json() {
        let e = entry(1, "s", EntryType::General, json!({"a": 1}));
        assert_eq!(describe(&e), "{\"a\":1}");
    }

    #[test]
    fn query_lines_carry_session() {
        let out = render_query(&[entry(4, "abc", EntryType::General, json!("note"))]);
        assert_eq!(out, "[2024-03-01T12:00:04.000000Z] [Session: abc] \"note\"\n");
    }
}

//! The structured action extracted from one model response.

use serde::{Deserialize, Serialize};
use crate::provider::Usage;

/// What the model asked the agent to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Run a registered tool with the given input.
    Invoke {
        tool: String,
        input: serde_json::Value,
    },

    /// The goal is met; `result` is the final answer.
    Stop { result: serde_json::Value },

    /// The response did not contain a usable action. The message is fed
    /// back to the model as an error entry.
    Invalid { error: String },
}

/// A decision plus the request metadata captured while reading the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,

    /// Token accounting from the stream, kept out of the action itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Decision {
    pub fn new(action: Action) -> Self {
        Self { action, usage: None }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self.action, Action::Stop { .. })
    }

    /// The annotation object written next to the entry for this turn.
    pub fn annotations(&self) -> Option<serde_json::Value> {
        self.usage
            .as_ref()
            .map(|u| serde_json::json!({ "usage": u }))
    }
}

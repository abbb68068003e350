//! Agent settings, lifecycle state, and the human-input collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::error::Error;

/// Default system directive placed at the top of every prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant that uses tools to solve tasks.";

/// Settings the controller reads for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model name forwarded to the provider
    pub model: String,

    /// System directive rendered into the prompt
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_temp")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Ask for human input after every turn
    #[serde(default)]
    pub collaboration: bool,

    /// Safety limit on turns per run (None = until the model stops)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,

    /// Deadline for each model response and each tool execution
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_secs")]
    pub turn_timeout: Option<Duration>,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}
fn default_temp() -> f32 {
    0.7
}

impl AgentSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: default_system_prompt(),
            temperature: default_temp(),
            max_tokens: None,
            collaboration: false,
            max_turns: None,
            turn_timeout: None,
        }
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

/// Lifecycle state of the agent controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

impl AgentState {
    /// Whether a new run may start from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Stopped)
    }
}

/// Source of human turns in collaboration mode.
#[async_trait]
pub trait HumanInput: Send + Sync {
    /// Wait for the next human message. `None` means the input is closed.
    async fn next_input(&self) -> Result<Option<String>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_defaults_to_idle() {
        assert_eq!(AgentState::default(), AgentState::Idle);
        assert!(AgentState::Idle.can_start());
        assert!(AgentState::Stopped.can_start());
        assert!(!AgentState::Running.can_start());
        assert!(!AgentState::Paused.can_start());
    }

    #[test]
    fn settings_defaults() {
        let settings = AgentSettings::new("gpt-4o-mini");
        assert_eq!(settings.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert!(!settings.collaboration);
        assert!(settings.max_turns.is_none());
    }

    #[test]
    fn settings_timeout_serializes_as_seconds() {
        let mut settings = AgentSettings::new("m");
        settings.turn_timeout = Some(Duration::from_secs(30));
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["turn_timeout"], 30);

        let back: AgentSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back.turn_timeout, Some(Duration::from_secs(30)));
    }
}

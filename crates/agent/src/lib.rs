//! The agent loop: the heart of Stepwise.
//!
//! Each turn follows a **Build → Ask → Act → Record** cycle:
//!
//! 1. **Build** a prompt from the system directive, the current user input,
//!    the tool catalog, and the session's recent context
//! 2. **Ask** the model and drain its streamed response
//! 3. **Act** on the trailing JSON decision: run a tool or stop
//! 4. **Record** exactly one context entry for what happened
//!
//! The loop continues until the model returns a stop decision, the
//! controller is stopped, or a configured limit is reached.

pub mod controller;
pub mod interpreter;
pub mod prompt;

#[cfg(test)]
mod test_helpers;

pub use controller::{AgentController, ControlHandle, FinishReason, MODEL_SYSTEM_MESSAGE, RunOutcome};
pub use interpreter::{extract_action, interpret};
pub use prompt::build as build_prompt;

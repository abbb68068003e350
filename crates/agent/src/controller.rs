//! The agent controller: the turn loop and its lifecycle.
//!
//! Each turn builds a prompt from the session's recent context, streams a
//! response, interprets it into a decision, and records exactly one entry
//! for the outcome. Tool faults, unknown tools, and unparseable responses
//! become `error` entries and the loop goes on; context and provider faults
//! end the run.
//!
//! State lives in a `watch` channel. A [`ControlHandle`] can pause, resume,
//! or stop the loop from any task; the loop only looks at the state between
//! turns, so an in-flight response or tool call always completes and is
//! recorded first.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use stepwise_core::agent::{AgentSettings, AgentState, HumanInput};
use stepwise_core::context::{ContextStore, EntryType, NewEntry, SessionId};
use stepwise_core::decision::{Action, Decision};
use stepwise_core::error::{Error, ProviderError, Result, ToolError};
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_core::provider::{Provider, ProviderRequest};
use stepwise_core::tool::ToolRegistry;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::interpreter::interpret;
use crate::prompt;

/// System message sent with every model request; the directive the agent
/// actually follows is rendered inside the prompt.
pub const MODEL_SYSTEM_MESSAGE: &str = "You are an AI assistant.";

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model returned a stop decision
    Completed,
    /// `stop()` was called
    StoppedExternally,
    /// The configured turn limit was reached
    MaxTurns,
    /// Collaboration mode and the human input closed
    InputClosed,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub session_id: SessionId,
    /// Number of turns that reached the model
    pub turns: u32,
    /// The stop decision's result, when the run completed
    pub result: Option<Value>,
    pub reason: FinishReason,
}

/// Cloneable remote control for a controller's lifecycle.
#[derive(Clone)]
pub struct ControlHandle {
    state: Arc<watch::Sender<AgentState>>,
    events: Arc<EventBus>,
}

impl ControlHandle {
    fn new(events: Arc<EventBus>) -> Self {
        let (state, _) = watch::channel(AgentState::Idle);
        Self {
            state: Arc::new(state),
            events,
        }
    }

    pub fn state(&self) -> AgentState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.state.subscribe()
    }

    /// Running → Paused. Returns whether the state changed.
    pub fn pause(&self) -> bool {
        self.transition(|s| s == AgentState::Running, AgentState::Paused)
    }

    /// Paused → Running. Returns whether the state changed.
    pub fn resume(&self) -> bool {
        self.transition(|s| s == AgentState::Paused, AgentState::Running)
    }

    /// Any state → Stopped. Returns whether the state changed.
    pub fn stop(&self) -> bool {
        self.transition(|s| s != AgentState::Stopped, AgentState::Stopped)
    }

    fn transition(&self, allowed: impl Fn(AgentState) -> bool, to: AgentState) -> bool {
        let mut from = None;
        self.state.send_if_modified(|current| {
            if allowed(*current) {
                from = Some(*current);
                *current = to;
                true
            } else {
                false
            }
        });

        match from {
            Some(from) => {
                debug!(?from, ?to, "Agent state changed");
                self.events.publish(DomainEvent::AgentStateChanged {
                    from,
                    to,
                    timestamp: Utc::now(),
                });
                true
            }
            None => false,
        }
    }

    /// Block at a turn boundary until the state is no longer Paused.
    async fn wait_unpaused(&self) -> AgentState {
        let mut rx = self.state.subscribe();
        rx.wait_for(|s| *s != AgentState::Paused)
            .await
            .map(|s| *s)
            .unwrap_or(AgentState::Stopped)
    }
}

/// Drives the turn loop for one session at a time.
pub struct AgentController {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn ContextStore>,
    settings: AgentSettings,
    human_input: Option<Arc<dyn HumanInput>>,
    events: Arc<EventBus>,
    control: ControlHandle,
    current_session: Mutex<Option<SessionId>>,
    /// Set while a run is inside its loop, including a turn that is
    /// finishing after `stop()`
    active: AtomicBool,
}

impl AgentController {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn ContextStore>,
        settings: AgentSettings,
    ) -> Self {
        let events = Arc::new(EventBus::default());
        Self {
            provider,
            tools,
            store,
            settings,
            human_input: None,
            control: ControlHandle::new(events.clone()),
            events,
            current_session: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    /// Source of human turns for collaboration mode.
    pub fn with_human_input(mut self, input: Arc<dyn HumanInput>) -> Self {
        self.human_input = Some(input);
        self
    }

    /// Publish run events on this bus instead of a private one.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.control.events = events.clone();
        self.events = events;
        self
    }

    pub fn handle(&self) -> ControlHandle {
        self.control.clone()
    }

    pub fn state(&self) -> AgentState {
        self.control.state()
    }

    pub fn pause(&self) -> bool {
        self.control.pause()
    }

    pub fn resume(&self) -> bool {
        self.control.resume()
    }

    pub fn stop(&self) -> bool {
        self.control.stop()
    }

    /// The session allocated by the most recent `start`.
    pub fn current_session_id(&self) -> Option<SessionId> {
        self.current_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run a new session towards `goal` until it stops.
    ///
    /// Only valid from Idle or Stopped. `context_limit` caps how many recent
    /// entries each prompt includes (None = the whole session).
    pub async fn start(&self, goal: &str, context_limit: Option<usize>) -> Result<RunOutcome> {
        if self.settings.collaboration && self.human_input.is_none() {
            return Err(Error::Config {
                message: "collaboration mode needs a human input source".into(),
            });
        }

        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::InvalidState(format!(
                "cannot start while a previous run is {:?}",
                self.state()
            )));
        }
        if !self.control.transition(|s| s.can_start(), AgentState::Running) {
            self.active.store(false, Ordering::Release);
            return Err(Error::InvalidState(format!(
                "cannot start while {:?}",
                self.state()
            )));
        }
        let _guard = ActiveRun(self);

        let session = self.store.new_session();
        *self
            .current_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(session.clone());

        info!(session_id = %session, goal, "Starting session");
        self.events.publish(DomainEvent::SessionStarted {
            session_id: session.to_string(),
            goal: goal.to_string(),
            timestamp: Utc::now(),
        });

        let result = self.run(&session, goal, context_limit).await;

        match &result {
            Ok(outcome) => info!(
                session_id = %session,
                turns = outcome.turns,
                reason = ?outcome.reason,
                "Session finished"
            ),
            Err(e) => warn!(session_id = %session, error = %e, "Session aborted"),
        }
        result
    }

    async fn run(
        &self,
        session: &SessionId,
        goal: &str,
        context_limit: Option<usize>,
    ) -> Result<RunOutcome> {
        self.record(session, EntryType::HumanInput, json!({ "human_input": goal }), None)
            .await?;

        let mut user_input = goal.to_string();
        let mut turns = 0u32;
        let finish = |turns: u32, result: Option<Value>, reason: FinishReason| RunOutcome {
            session_id: session.clone(),
            turns,
            result,
            reason,
        };

        loop {
            if self.control.wait_unpaused().await == AgentState::Stopped {
                return Ok(finish(turns, None, FinishReason::StoppedExternally));
            }

            if let Some(max) = self.settings.max_turns {
                if turns >= max {
                    warn!(session_id = %session, max, "Turn limit reached");
                    self.record(
                        session,
                        EntryType::Error,
                        json!({ "error": format!("Turn limit of {max} reached") }),
                        None,
                    )
                    .await?;
                    return Ok(finish(turns, None, FinishReason::MaxTurns));
                }
            }

            turns += 1;
            debug!(session_id = %session, turn = turns, "Turn started");
            self.events.publish(DomainEvent::TurnStarted {
                session_id: session.to_string(),
                turn: turns,
                timestamp: Utc::now(),
            });

            let decision = self.decide(session, &user_input, context_limit).await?;
            let annotations = decision.annotations();

            match decision.action {
                Action::Stop { result } => {
                    self.record(
                        session,
                        EntryType::Stop,
                        json!({ "result": result }),
                        annotations,
                    )
                    .await?;
                    return Ok(finish(turns, Some(result), FinishReason::Completed));
                }
                Action::Invoke { tool, input } => {
                    self.dispatch(session, &tool, input, annotations).await?;
                }
                Action::Invalid { error } => {
                    warn!(session_id = %session, error = %error, "Unusable model response");
                    self.record(session, EntryType::Error, json!({ "error": error }), annotations)
                        .await?;
                }
            }

            if self.settings.collaboration && self.state() != AgentState::Stopped {
                let Some(human) = &self.human_input else {
                    return Ok(finish(turns, None, FinishReason::InputClosed));
                };
                match human.next_input().await? {
                    Some(text) => {
                        self.record(
                            session,
                            EntryType::HumanInput,
                            json!({ "human_input": text }),
                            None,
                        )
                        .await?;
                        user_input = text;
                    }
                    None => {
                        info!(session_id = %session, "Human input closed");
                        return Ok(finish(turns, None, FinishReason::InputClosed));
                    }
                }
            }
        }
    }

    /// Build the prompt, stream the response, and interpret it.
    async fn decide(
        &self,
        session: &SessionId,
        user_input: &str,
        context_limit: Option<usize>,
    ) -> Result<Decision> {
        let context = self.store.recent(session, context_limit, None).await?;
        let prompt = prompt::build(
            &self.settings.system_prompt,
            user_input,
            &self.tools.catalog(),
            &context,
        );

        let request = ProviderRequest {
            model: self.settings.model.clone(),
            system: MODEL_SYSTEM_MESSAGE.into(),
            prompt,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let respond = async {
            let rx = self.provider.stream(request).await?;
            interpret(rx).await
        };

        let decision = match self.settings.turn_timeout {
            Some(limit) => tokio::time::timeout(limit, respond).await.map_err(|_| {
                ProviderError::Timeout(format!("no complete response within {limit:?}"))
            })??,
            None => respond.await?,
        };

        if let Some(usage) = &decision.usage {
            self.events.publish(DomainEvent::ResponseGenerated {
                session_id: session.to_string(),
                model: self.settings.model.clone(),
                tokens_used: usage.total_tokens,
                timestamp: Utc::now(),
            });
        }
        Ok(decision)
    }

    /// Execute an invoked tool and record what happened.
    async fn dispatch(
        &self,
        session: &SessionId,
        name: &str,
        input: Value,
        annotations: Option<Value>,
    ) -> Result<()> {
        let Some(tool) = self.tools.find(name) else {
            warn!(session_id = %session, tool = name, "Model asked for an unknown tool");
            let error = ToolError::NotFound(name.to_string()).to_string();
            self.record(session, EntryType::Error, json!({ "error": error }), annotations)
                .await?;
            return Ok(());
        };

        debug!(session_id = %session, tool = name, %input, "Executing tool");
        let started = Instant::now();
        let outcome = match self.settings.turn_timeout {
            Some(limit) => tokio::time::timeout(limit, tool.execute(input.clone()))
                .await
                .unwrap_or_else(|_| {
                    Err(ToolError::Timeout {
                        tool_name: name.to_string(),
                        timeout_secs: limit.as_secs(),
                    })
                }),
            None => tool.execute(input.clone()).await,
        };

        self.events.publish(DomainEvent::ToolExecuted {
            tool_name: name.to_string(),
            success: outcome.is_ok(),
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });

        match outcome {
            Ok(result) => {
                self.record(
                    session,
                    EntryType::ToolResult,
                    json!({ "tool": name, "input": input, "result": result }),
                    annotations,
                )
                .await?;
            }
            Err(e) => {
                warn!(session_id = %session, tool = name, error = %e, "Tool failed");
                self.record(
                    session,
                    EntryType::Error,
                    json!({ "tool": name, "input": input, "error": e.to_string() }),
                    annotations,
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn record(
        &self,
        session: &SessionId,
        entry_type: EntryType,
        data: Value,
        annotations: Option<Value>,
    ) -> Result<i64> {
        let id = self
            .store
            .insert(NewEntry::new(session, entry_type, data.clone()).with_annotations(annotations))
            .await?;

        self.events.publish(DomainEvent::EntryRecorded {
            session_id: session.to_string(),
            entry_type,
            data,
            timestamp: Utc::now(),
        });
        Ok(id)
    }
}

/// Marks the controller's loop as occupied. Dropping it (normal exit, error,
/// or a cancelled `start` future) stops the state and frees the loop.
struct ActiveRun<'a>(&'a AgentController);

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.0.control.stop();
        self.0.active.store(false, Ordering::Release);
    }
}

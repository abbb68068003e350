//! Console progress for a run, driven by the controller's event bus.

use std::sync::Arc;
use stepwise_context::describe;
use stepwise_core::context::{ContextEntry, SessionId};
use stepwise_core::event::{DomainEvent, EventBus};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Print one line per notable event until the bus is dropped.
pub fn spawn(events: &Arc<EventBus>) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(line) = render(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Progress output fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn render(event: &DomainEvent) -> Option<String> {
    match event {
        DomainEvent::SessionStarted { session_id, goal, .. } => {
            Some(format!("🚀 Session {session_id}: {goal}"))
        }
        DomainEvent::TurnStarted { turn, .. } => Some(format!("🔄 Turn {turn}")),
        DomainEvent::ResponseGenerated { tokens_used, .. } => {
            Some(format!("   ({tokens_used} tokens)"))
        }
        DomainEvent::EntryRecorded {
            session_id,
            entry_type,
            data,
            timestamp,
        } => {
            let entry = ContextEntry {
                id: 0,
                timestamp: *timestamp,
                entry_type: *entry_type,
                data: data.clone(),
                session_id: SessionId(session_id.clone()),
                annotations: None,
            };
            Some(format!("   {}", describe(&entry)))
        }
        DomainEvent::ToolExecuted { .. } | DomainEvent::AgentStateChanged { .. } => None,
    }
}

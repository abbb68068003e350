//! # Stepwise Core
//!
//! Domain types, traits, and error definitions for the Stepwise agent loop.
//! This crate has **no backend dependencies**: it defines the domain model
//! that the store, provider, tool, and agent crates implement against.
//!
//! ## Layout
//!
//! Every collaborator of the loop is a trait here:
//! - [`ContextStore`]: the append-only session log
//! - [`Provider`]: the streaming model backend
//! - [`Tool`]: an executable capability, collected in a [`ToolRegistry`]
//! - [`HumanInput`]: the source of human turns in collaboration mode
//!
//! Implementations live in their own crates so the loop can be driven by
//! scripted stand-ins in tests.

pub mod error;
pub mod context;
pub mod decision;
pub mod provider;
pub mod tool;
pub mod agent;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use context::{ContextEntry, ContextQuery, ContextStore, EntryType, NewEntry, SessionId};
pub use decision::{Action, Decision};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, StreamChunk, Usage};
pub use tool::{Tool, ToolDescriptor, ToolRegistry};
pub use agent::{AgentSettings, AgentState, HumanInput, DEFAULT_SYSTEM_PROMPT};
pub use event::{DomainEvent, EventBus};

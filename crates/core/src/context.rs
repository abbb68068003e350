//! Context store trait: the append-only log of everything a run did.
//!
//! Every prompt the agent builds is assembled from this log, and operators
//! replay it afterwards. Entries are grouped by session and are never
//! mutated once written.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::error::ContextError;

/// Unique identifier for a session (one run of the agent loop).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The recognized kinds of context entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    General,
    HumanInput,
    ToolResult,
    Error,
    Stop,
    Custom,
}

impl EntryType {
    pub const ALL: [EntryType; 6] = [
        EntryType::General,
        EntryType::HumanInput,
        EntryType::ToolResult,
        EntryType::Error,
        EntryType::Stop,
        EntryType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::HumanInput => "human_input",
            Self::ToolResult => "tool_result",
            Self::Error => "error",
            Self::Stop => "stop",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ContextError::InvalidEntryType {
                entry_type: s.to_string(),
                expected: Self::ALL
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// A single recorded event in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Store-assigned, monotonically increasing id
    pub id: i64,

    /// When the entry was written (strictly increasing within one store)
    pub timestamp: DateTime<Utc>,

    pub entry_type: EntryType,

    /// The entry payload
    pub data: serde_json::Value,

    pub session_id: SessionId,

    /// Side-channel metadata (token usage etc.), never part of `data`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<serde_json::Value>,
}

impl ContextEntry {
    /// The timestamp in the fixed-width ISO-8601 form used for storage and prompts.
    pub fn timestamp_string(&self) -> String {
        format_timestamp(&self.timestamp)
    }
}

/// Format a timestamp so that lexical order equals chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// An entry to be appended.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub session_id: SessionId,
    pub entry_type: EntryType,
    pub data: serde_json::Value,
    pub annotations: Option<serde_json::Value>,
}

impl NewEntry {
    pub fn new(session_id: &SessionId, entry_type: EntryType, data: serde_json::Value) -> Self {
        Self {
            session_id: session_id.clone(),
            entry_type,
            data,
            annotations: None,
        }
    }

    pub fn with_annotations(mut self, annotations: Option<serde_json::Value>) -> Self {
        self.annotations = annotations;
        self
    }
}

/// Cross-session filter for operational queries. All bounds are optional;
/// time bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct ContextQuery {
    pub session_id: Option<SessionId>,
    pub entry_type: Option<EntryType>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Keep only the first N matches (ascending order)
    pub limit: Option<usize>,
}

impl ContextQuery {
    pub fn matches(&self, entry: &ContextEntry) -> bool {
        self.session_id.as_ref().is_none_or(|s| *s == entry.session_id)
            && self.entry_type.is_none_or(|t| t == entry.entry_type)
            && self.start_time.is_none_or(|t| entry.timestamp >= t)
            && self.end_time.is_none_or(|t| entry.timestamp <= t)
    }
}

/// The core ContextStore trait.
///
/// Implementations: SQLite (durable), in-memory (tests, ephemeral runs).
/// Within one run the controller is the only writer, so backends only have
/// to make each single append atomic.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Append an entry and return its id.
    async fn insert(&self, entry: NewEntry) -> Result<i64, ContextError>;

    /// Entries of one session, newest first, optionally filtered and truncated.
    async fn recent(
        &self,
        session_id: &SessionId,
        limit: Option<usize>,
        entry_type: Option<EntryType>,
    ) -> Result<Vec<ContextEntry>, ContextError>;

    /// Entries matching the filter, oldest first.
    async fn query(&self, query: ContextQuery) -> Result<Vec<ContextEntry>, ContextError>;

    /// All session ids, ordered by each session's first entry.
    async fn sessions(&self) -> Result<Vec<SessionId>, ContextError>;

    /// Delete one session's entries, or everything when `session_id` is None.
    async fn clear(&self, session_id: Option<&SessionId>) -> Result<u64, ContextError>;

    /// Number of stored entries, optionally for one session.
    async fn count(&self, session_id: Option<&SessionId>) -> Result<usize, ContextError>;

    /// Append an entry whose type is given by name.
    ///
    /// Fails with [`ContextError::InvalidEntryType`] before touching storage
    /// if the name is not a recognized [`EntryType`].
    async fn add(
        &self,
        data: serde_json::Value,
        entry_type: &str,
        session_id: &SessionId,
    ) -> Result<i64, ContextError> {
        let entry_type = entry_type.parse::<EntryType>()?;
        self.insert(NewEntry::new(session_id, entry_type, data)).await
    }

    /// Allocate a fresh session id. Existing sessions are left untouched.
    fn new_session(&self) -> SessionId {
        SessionId::new()
    }
}

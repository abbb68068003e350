//! In-memory backend: useful for testing and ephemeral runs.

use crate::clock::MonotonicClock;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use stepwise_core::context::{
    ContextEntry, ContextQuery, ContextStore, EntryType, NewEntry, SessionId,
};
use stepwise_core::error::ContextError;
use tokio::sync::RwLock;

/// A context store that keeps entries in a Vec, in insertion order.
/// Nothing survives the process.
pub struct InMemoryStore {
    entries: Arc<RwLock<Vec<ContextEntry>>>,
    next_id: AtomicI64,
    clock: MonotonicClock,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicI64::new(1),
            clock: MonotonicClock::new(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, entry: NewEntry) -> Result<i64, ContextError> {
        let mut entries = self.entries.write().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.push(ContextEntry {
            id,
            timestamp: self.clock.next(),
            entry_type: entry.entry_type,
            data: entry.data,
            session_id: entry.session_id,
            annotations: entry.annotations,
        });
        Ok(id)
    }

    async fn recent(
        &self,
        session_id: &SessionId,
        limit: Option<usize>,
        entry_type: Option<EntryType>,
    ) -> Result<Vec<ContextEntry>, ContextError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.session_id == *session_id)
            .filter(|e| entry_type.is_none_or(|t| t == e.entry_type))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn query(&self, query: ContextQuery) -> Result<Vec<ContextEntry>, ContextError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| query.matches(e))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn sessions(&self) -> Result<Vec<SessionId>, ContextError> {
        let entries = self.entries.read().await;
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for entry in entries.iter() {
            if seen.insert(entry.session_id.clone()) {
                ordered.push(entry.session_id.clone());
            }
        }
        Ok(ordered)
    }

    async fn clear(&self, session_id: Option<&SessionId>) -> Result<u64, ContextError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        match session_id {
            Some(s) => entries.retain(|e| e.session_id != *s),
            None => entries.clear(),
        }
        Ok((before - entries.len()) as u64)
    }

    async fn count(&self, session_id: Option<&SessionId>) -> Result<usize, ContextError> {
        let entries = self.entries.read().await;
        Ok(match session_id {
            Some(s) => entries.iter().filter(|e| e.session_id == *s).count(),
            None => entries.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn add_and_recent() {
        let store = InMemoryStore::new();
        let s = store.new_session();
        store.add(json!({"step": 1}), "general", &s).await.unwrap();
        store.add(json!({"step": 2}), "tool_result", &s).await.unwrap();

        let entries = store.recent(&s, None, None).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].data["step"], 2);
        assert!(entries[0].timestamp > entries[1].timestamp);
        assert!(entries[0].id > entries[1].id);
    }

    #[tokio::test]
    async fn rejects_unknown_entry_type() {
        let store = InMemoryStore::new();
        let s = store.new_session();
        assert!(store.add(json!(1), "custom_type", &s).await.is_err());
        assert_eq!(store.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn recent_limit_and_type_filter() {
        let store = InMemoryStore::new();
        let s = store.new_session();
        for i in 0..4 {
            store.add(json!(i), "general", &s).await.unwrap();
        }
        store.add(json!({"error": "e"}), "error", &s).await.unwrap();

        let two = store.recent(&s, Some(2), None).await.unwrap();
        assert_eq!(two[0].data, json!({"error": "e"}));
        assert_eq!(two[1].data, json!(3));

        let general = store.recent(&s, None, Some(EntryType::General)).await.unwrap();
        assert_eq!(general.len(), 4);
    }

    #[tokio::test]
    async fn sessions_keep_first_seen_order() {
        let store = InMemoryStore::new();
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        store.add(json!(1), "general", &b).await.unwrap();
        store.add(json!(2), "general", &a).await.unwrap();
        store.add(json!(3), "general", &b).await.unwrap();

        assert_eq!(store.sessions().await.unwrap(), vec![b, a]);
    }

    #[tokio::test]
    async fn clear_reports_removed_count() {
        let store = InMemoryStore::new();
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        store.add(json!(1), "general", &a).await.unwrap();
        store.add(json!(2), "general", &b).await.unwrap();

        assert_eq!(store.clear(Some(&a)).await.unwrap(), 1);
        assert_eq!(store.count(None).await.unwrap(), 1);
        assert_eq!(store.clear(None).await.unwrap(), 1);
        assert_eq!(store.clear(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ids_keep_increasing_after_clear() {
        let store = InMemoryStore::new();
        let s = SessionId::from("s");
        store.add(json!(1), "general", &s).await.unwrap();
        let second = store.add(json!(2), "general", &s).await.unwrap();
        store.clear(Some(&s)).await.unwrap();
        let third = store.add(json!(3), "general", &s).await.unwrap();
        assert_eq!(second, 2);
        assert_eq!(third, 3);
    }
}

//! Chat history, keyed by session id.
//!
//! The store is injected into [`Conversation`](crate::Conversation) rather
//! than living in a global, so its lifetime and eviction are under the
//! caller's control.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Who said a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The person asking.
    User,
    /// The model.
    Assistant,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    /// Speaker.
    pub role: Role,
    /// Message text.
    pub content: String,
}

/// Ordered turns of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatHistory {
    turns: Vec<Turn>,
}

impl ChatHistory {
    /// Append a turn.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn {
            role,
            content: content.into(),
        });
    }

    /// All turns, oldest first.
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether nothing has been said yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Render as `Role: content` lines for a prompt.
    ///
    /// ```rust
    /// use precis::{ChatHistory, Role};
    ///
    /// let mut history = ChatHistory::default();
    /// history.push(Role::User, "What is it about?");
    /// history.push(Role::Assistant, "Budgets.");
    /// assert_eq!(history.render(), "User: What is it about?\nAssistant: Budgets.");
    /// ```
    #[must_use]
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role.label(), t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Shared, lockable history of one session.
pub type SessionHandle = Arc<Mutex<ChatHistory>>;

/// Keyed storage of chat histories.
pub trait SessionStore: Send + Sync {
    /// The session's history, creating an empty one if absent.
    fn get_or_create(&self, session_id: &str) -> SessionHandle;

    /// The session's history, if present.
    fn get(&self, session_id: &str) -> Option<SessionHandle>;

    /// Store `history` under `session_id`, replacing any existing session.
    fn put(&self, session_id: &str, history: ChatHistory) -> SessionHandle;

    /// Drop a session.
    fn remove(&self, session_id: &str) -> Option<SessionHandle>;

    /// Number of live sessions.
    fn len(&self) -> usize;

    /// Whether there are no live sessions.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    handle: SessionHandle,
    last_access: Instant,
}

/// In-memory [`SessionStore`] with idle expiry and a size cap.
///
/// Sessions idle for longer than `ttl` are dropped on the next access to the
/// store. When inserting would exceed `capacity`, the least recently used
/// session is evicted first.
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    capacity: usize,
}

impl std::fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySessionStore")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl Default for MemorySessionStore {
    /// One hour TTL, 1024 sessions.
    fn default() -> Self {
        Self::new(Duration::from_secs(3600), 1024)
    }
}

impl MemorySessionStore {
    /// Create a store. A `capacity` of 0 is treated as 1.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn purge_expired(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.last_access) <= self.ttl);
        let expired = before - entries.len();
        if expired > 0 {
            tracing::debug!(expired, "expired idle sessions");
        }
    }

    fn insert(&self, entries: &mut HashMap<String, Entry>, id: &str, handle: SessionHandle, now: Instant) {
        if !entries.contains_key(id) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                entries.remove(&key);
                tracing::debug!(session = %key, "evicted least recently used session");
            }
        }
        entries.insert(
            id.to_string(),
            Entry {
                handle,
                last_access: now,
            },
        );
    }
}

impl SessionStore for MemorySessionStore {
    fn get_or_create(&self, session_id: &str) -> SessionHandle {
        let now = Instant::now();
        let mut entries = self.lock();
        self.purge_expired(&mut entries, now);

        if let Some(entry) = entries.get_mut(session_id) {
            entry.last_access = now;
            return Arc::clone(&entry.handle);
        }
        let handle = SessionHandle::default();
        self.insert(&mut entries, session_id, Arc::clone(&handle), now);
        handle
    }

    fn get(&self, session_id: &str) -> Option<SessionHandle> {
        let now = Instant::now();
        let mut entries = self.lock();
        self.purge_expired(&mut entries, now);

        entries.get_mut(session_id).map(|entry| {
            entry.last_access = now;
            Arc::clone(&entry.handle)
        })
    }

    fn put(&self, session_id: &str, history: ChatHistory) -> SessionHandle {
        let now = Instant::now();
        let mut entries = self.lock();
        self.purge_expired(&mut entries, now);

        let handle = Arc::new(Mutex::new(history));
        self.insert(&mut entries, session_id, Arc::clone(&handle), now);
        handle
    }

    fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.lock().remove(session_id).map(|e| e.handle)
    }

    fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        self.purge_expired(&mut entries, now);
        entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_returns_same_handle() {
        let store = MemorySessionStore::default();
        let a = store.get_or_create("s1");
        a.lock().unwrap().push(Role::User, "hi");

        let b = store.get_or_create("s1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.lock().unwrap().len(), 1);
        assert!(store.get("s2").is_none());
    }

    #[test]
    fn test_put_replaces_and_remove_drops() {
        let store = MemorySessionStore::default();
        store.get_or_create("s").lock().unwrap().push(Role::User, "old");

        let mut fresh = ChatHistory::default();
        fresh.push(Role::Assistant, "new");
        store.put("s", fresh.clone());
        assert_eq!(*store.get("s").unwrap().lock().unwrap(), fresh);

        assert!(store.remove("s").is_some());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_expire() {
        let store = MemorySessionStore::new(Duration::from_secs(60), 10);
        store.get_or_create("idle");
        store.get_or_create("busy");

        tokio::time::advance(Duration::from_secs(40)).await;
        store.get("busy");
        tokio::time::advance(Duration::from_secs(40)).await;

        assert!(store.get("idle").is_none());
        assert!(store.get("busy").is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_least_recently_used() {
        let store = MemorySessionStore::new(Duration::from_secs(3600), 2);
        store.get_or_create("a");
        tokio::time::advance(Duration::from_millis(1)).await;
        store.get_or_create("b");
        tokio::time::advance(Duration::from_millis(1)).await;
        store.get("a");
        tokio::time::advance(Duration::from_millis(1)).await;
        store.get_or_create("c");

        assert!(store.get("b").is_none());
        assert!(store.get("a").is_some());
        assert!(store.get("c").is_some());
        assert_eq!(store.len(), 2);
    }
}

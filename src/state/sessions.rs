use std::collections::HashMap;

use crate::{ConnId, UserId, WebSocketSender};

/// The single source of truth for who is currently live-streaming location.
///
/// Exactly one session per user id. A second `join` supersedes the first;
/// the superseded connection keeps its transport but loses the binding, so
/// its eventual disconnect must not evict the successor's session.
pub struct SessionState {
    /// user -> owning connection
    sessions: HashMap<UserId, ConnId>,
    /// reverse map, used on disconnect when only the connection is known
    conn_users: HashMap<ConnId, UserId>,
    /// outbound channel per live connection
    senders: HashMap<ConnId, WebSocketSender>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            conn_users: HashMap::new(),
            senders: HashMap::new(),
        }
    }

    /// Insert or replace the session for `user_id`. Returns the superseded
    /// connection, if any, so the caller can drop its room memberships.
    pub fn register(&mut self, user_id: UserId, conn_id: ConnId) -> Option<ConnId> {
        let prior = self.sessions.insert(user_id, conn_id.clone());
        if let Some(old) = prior.as_ref().filter(|old| **old != conn_id) {
            self.conn_users.remove(old);
        }
        self.conn_users.insert(conn_id.clone(), user_id);
        prior.filter(|old| *old != conn_id)
    }

    /// Explicit leave. Returns the connection that owned the session.
    pub fn unregister(&mut self, user_id: UserId) -> Option<ConnId> {
        let conn = self.sessions.remove(&user_id)?;
        self.conn_users.remove(&conn);
        Some(conn)
    }

    /// Disconnect path: the event only carries a connection identity.
    /// Returns the freed user id if this connection owned a session.
    /// An orphaned connection (superseded by a later `join`) finds nothing
    /// here and frees nothing.
    pub fn unregister_by_conn(&mut self, conn_id: &str) -> Option<UserId> {
        let user_id = self.conn_users.remove(conn_id)?;
        self.sessions.remove(&user_id);
        Some(user_id)
    }

    pub fn is_registered(&self, user_id: UserId) -> bool {
        self.sessions.contains_key(&user_id)
    }

    /// All users with a live session right now.
    pub fn snapshot_active(&self) -> Vec<UserId> {
        self.sessions.keys().copied().collect()
    }

    pub fn insert_sender(&mut self, conn_id: ConnId, sender: WebSocketSender) {
        self.senders.insert(conn_id, sender);
    }

    pub fn remove_sender(&mut self, conn_id: &str) {
        self.senders.remove(conn_id);
    }

    pub fn sender(&self, conn_id: &str) -> Option<WebSocketSender> {
        self.senders.get(conn_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_snapshot() {
        let mut state = SessionState::new();
        assert!(!state.is_registered(1));
        assert!(state.register(1, "a".into()).is_none());
        assert!(state.is_registered(1));
        assert_eq!(state.snapshot_active(), vec![1]);
    }

    #[test]
    fn double_join_is_idempotent() {
        let mut state = SessionState::new();
        state.register(1, "a".into());
        assert!(state.register(1, "a".into()).is_none());
        assert_eq!(state.snapshot_active(), vec![1]);
        assert_eq!(state.unregister_by_conn("a"), Some(1));
        assert!(!state.is_registered(1));
    }

    #[test]
    fn second_join_supersedes_and_orphan_disconnect_is_harmless() {
        let mut state = SessionState::new();
        state.register(1, "a".into());
        assert_eq!(state.register(1, "b".into()), Some("a".into()));

        // The orphaned connection disconnects without corrupting the
        // successor's session.
        assert_eq!(state.unregister_by_conn("a"), None);
        assert!(state.is_registered(1));

        assert_eq!(state.unregister_by_conn("b"), Some(1));
        assert!(!state.is_registered(1));
    }

    #[test]
    fn explicit_unregister_returns_owning_conn() {
        let mut state = SessionState::new();
        state.register(5, "c".into());
        assert_eq!(state.unregister(5), Some("c".into()));
        assert_eq!(state.unregister(5), None);
        assert!(state.snapshot_active().is_empty());
    }
}

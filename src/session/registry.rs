//! # Session Registry
//!
//! The only mutable state shared between connections. Each connection actor
//! talks to it exclusively through the methods below; no guard ever escapes
//! a method, so no lock can be held across an `.await`.
//!
//! ## Thread Safety:
//! A single `RwLock` around the map. Lookups take the read side, everything
//! else the write side. Every critical section is a couple of map operations,
//! so there is nothing to gain from finer-grained locking.

use super::{ConnectionId, ConnectionState, Session};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<ConnectionId, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock leaves the map itself intact (every
    // mutation is a single insert/remove/increment), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Session>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the session for a connection. Last write wins.
    ///
    /// Returns the session that was replaced, if any.
    pub fn put(&self, connection: ConnectionId, session: Session) -> Option<Session> {
        self.write().insert(connection, session)
    }

    /// Copy of the connection's session. `None` is an ordinary answer, e.g.
    /// audio arriving before `session_start`.
    pub fn get(&self, connection: &ConnectionId) -> Option<Session> {
        self.read().get(connection).cloned()
    }

    /// Forget a connection's session. Removing an unknown connection is a no-op.
    ///
    /// Returns whether an entry was actually removed.
    pub fn remove(&self, connection: &ConnectionId) -> bool {
        self.write().remove(connection).is_some()
    }

    pub fn state(&self, connection: &ConnectionId) -> ConnectionState {
        match self.get(connection) {
            Some(session) => ConnectionState::Active(session),
            None => ConnectionState::NotStarted,
        }
    }

    /// Count a finished turn. Returns the new turn total, or `None` when the
    /// session disappeared while the turn was in flight.
    pub fn complete_turn(&self, connection: &ConnectionId) -> Option<u64> {
        self.write().get_mut(connection).map(|session| {
            session.turns += 1;
            session.turns
        })
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Total turns across every active session.
    pub fn total_turns(&self) -> u64 {
        self.read().values().map(|session| session.turns).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::from(id)
    }

    #[test]
    fn test_put_get_remove() {
        let registry = SessionRegistry::new();
        assert!(registry.get(&conn("a")).is_none());

        assert!(registry.put(conn("a"), Session::new(Some("s-1".into()), Some("Alex".into()))).is_none());
        let session = registry.get(&conn("a")).unwrap();
        assert_eq!(session.candidate_name, "Alex");
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(&conn("a")));
        assert!(!registry.remove(&conn("a")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_put_overwrites() {
        let registry = SessionRegistry::new();
        registry.put(conn("a"), Session::new(None, Some("First".into())));
        registry.complete_turn(&conn("a"));

        let replaced = registry.put(conn("a"), Session::new(None, Some("Second".into())));
        assert_eq!(replaced.unwrap().turns, 1);

        let session = registry.get(&conn("a")).unwrap();
        assert_eq!(session.candidate_name, "Second");
        assert_eq!(session.turns, 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_state_transitions() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.state(&conn("a")), ConnectionState::NotStarted);

        registry.put(conn("a"), Session::new(None, None));
        assert!(matches!(registry.state(&conn("a")), ConnectionState::Active(_)));

        registry.remove(&conn("a"));
        assert_eq!(registry.state(&conn("a")), ConnectionState::NotStarted);
    }

    #[test]
    fn test_turn_counting() {
        let registry = SessionRegistry::new();
        assert!(registry.complete_turn(&conn("a")).is_none());

        registry.put(conn("a"), Session::new(Some("s-1".into()), Some("Alex".into())));

        for expected in 1..=5 {
            let turn = registry.get(&conn("a")).unwrap().next_turn();
            assert_eq!(turn.turn, expected);
            assert_eq!(turn.candidate_name, "Alex");
            assert_eq!(registry.complete_turn(&conn("a")), Some(expected));
        }
        assert_eq!(registry.total_turns(), 5);
    }

    #[test]
    fn test_sessions_are_isolated_per_connection() {
        let registry = SessionRegistry::new();
        registry.put(conn("a"), Session::new(None, None));
        registry.put(conn("b"), Session::new(None, None));

        registry.complete_turn(&conn("a"));
        registry.complete_turn(&conn("a"));
        registry.complete_turn(&conn("b"));

        assert_eq!(registry.get(&conn("a")).unwrap().turns, 2);
        assert_eq!(registry.get(&conn("b")).unwrap().turns, 1);
    }

    #[test]
    fn test_concurrent_access() {
        let registry = SessionRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let id = conn(&format!("10.0.0.{worker}:4000"));
                    registry.put(id.clone(), Session::new(None, None));
                    for _ in 0..100 {
                        registry.complete_turn(&id);
                    }
                    assert_eq!(registry.get(&id).unwrap().turns, 100);
                    if worker % 2 == 0 {
                        registry.remove(&id);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.total_turns(), 400);
    }
}

//! # Session Registry
//!
//! Process-wide map from session id to in-memory conversation state. Sessions
//! are created lazily the first time any connection joins an unknown id, and
//! survive the connection that created them: a reconnect mid-interview
//! resumes the same history.
//!
//! ## Locking:
//! The registry's own lock is held only for map operations (lookup, insert,
//! evict). All conversation state sits behind each session's own lock, so two
//! connections working different sessions never serialize against each other;
//! the registry is the only structure mutated by more than one connection.

use crate::relay::session::InterviewSession;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Why a session could not be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The concurrent-session ceiling was reached; joining an EXISTING
    /// session still works, only new ids are refused.
    Full { max_sessions: usize },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::Full { max_sessions } => {
                write!(f, "maximum concurrent sessions ({}) reached", max_sessions)
            }
        }
    }
}

/// Manages all live interview sessions.
pub struct SessionRegistry {
    /// Active sessions mapped by session ID
    sessions: RwLock<HashMap<String, Arc<InterviewSession>>>,

    /// Maximum number of concurrent sessions allowed
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Get the session for `session_id`, creating it if this is the first join.
    ///
    /// ## Idempotency:
    /// Concurrent joins of the same never-seen id race on the write lock;
    /// whichever arrives second finds the entry the first inserted, so exactly
    /// one history wins and every joiner observes it. The first joiner becomes
    /// the session owner.
    pub fn get_or_create(
        &self,
        session_id: &str,
        owner_id: &str,
    ) -> Result<Arc<InterviewSession>, RegistryError> {
        // Fast path: the common case is a rejoin of an existing session
        if let Some(session) = self.get(session_id) {
            return Ok(session);
        }

        let mut sessions = self.sessions.write().unwrap();

        // Re-check under the write lock; another joiner may have won the race
        if let Some(session) = sessions.get(session_id) {
            return Ok(session.clone());
        }

        if sessions.len() >= self.max_sessions {
            return Err(RegistryError::Full { max_sessions: self.max_sessions });
        }

        let session = Arc::new(InterviewSession::new(
            session_id.to_string(),
            owner_id.to_string(),
        ));
        sessions.insert(session_id.to_string(), session.clone());

        Ok(session)
    }

    /// Look up a session without creating it.
    pub fn get(&self, session_id: &str) -> Option<Arc<InterviewSession>> {
        self.sessions.read().unwrap().get(session_id).cloned()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }

    /// Drop sessions whose idle clock exceeds `max_idle_seconds`.
    ///
    /// The serving path never deletes; this sweep runs from a background task
    /// so abandoned interviews do not accumulate for the process lifetime.
    /// Connections holding an `Arc` to an evicted session keep a working
    /// handle until they drop it; they just can no longer be found by id.
    pub fn evict_idle(&self, max_idle_seconds: u64) -> usize {
        let mut sessions = self.sessions.write().unwrap();

        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| session.idle_seconds() > max_idle_seconds as i64)
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in &stale {
            sessions.remove(session_id);
            tracing::info!(session_id = %session_id, "Evicted idle session");
        }

        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// First join creates; later joins observe the same session and history.
    #[test]
    fn test_get_or_create_is_idempotent() {
        let registry = SessionRegistry::new(10);

        let first = registry.get_or_create("abc123", "candidate-1").unwrap();
        first.begin_exchange("Hello").unwrap();
        first.complete_exchange("Tell me about yourself").unwrap();

        let second = registry.get_or_create("abc123", "candidate-2").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        // Ownership was decided by the first join
        assert_eq!(second.owner_id, "candidate-1");
        assert_eq!(second.history_len(), 2);
    }

    /// Concurrent first joins of one id produce exactly one session object.
    #[test]
    fn test_concurrent_creation_single_winner() {
        let registry = Arc::new(SessionRegistry::new(10));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                registry.get_or_create("contested", "candidate-1").unwrap()
            }));
        }

        let sessions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for session in &sessions[1..] {
            assert!(Arc::ptr_eq(&sessions[0], session));
        }
        assert_eq!(registry.len(), 1);
    }

    /// Two distinct session ids never observe each other's history.
    #[test]
    fn test_no_cross_talk() {
        let registry = SessionRegistry::new(10);

        let a = registry.get_or_create("session-a", "candidate-a").unwrap();
        let b = registry.get_or_create("session-b", "candidate-b").unwrap();

        a.begin_exchange("only in a").unwrap();
        a.complete_exchange("reply in a").unwrap();
        b.begin_exchange("only in b").unwrap();

        assert_eq!(a.history_len(), 2);
        assert_eq!(b.history_len(), 1);
        assert!(a.history_snapshot().iter().all(|t| t.content.contains("a")));
        assert!(b.history_snapshot().iter().all(|t| t.content.contains("b")));
    }

    /// Absence of connections does not delete; get() still finds the session.
    #[test]
    fn test_sessions_survive_without_connections() {
        let registry = SessionRegistry::new(10);
        registry.get_or_create("abc123", "candidate-1").unwrap();

        // No connection holds the Arc any more; a rejoin still resumes it
        assert!(registry.get("abc123").is_some());
        assert!(registry.get("never-seen").is_none());
    }

    /// New ids are refused at the ceiling; existing ids still resolve.
    #[test]
    fn test_capacity_limit() {
        let registry = SessionRegistry::new(2);
        registry.get_or_create("one", "a").unwrap();
        registry.get_or_create("two", "b").unwrap();

        assert!(matches!(
            registry.get_or_create("three", "c"),
            Err(RegistryError::Full { max_sessions: 2 })
        ));
        assert!(registry.get_or_create("one", "a").is_ok());
    }

    /// Only sessions past the idle threshold are swept.
    #[test]
    fn test_evict_idle() {
        let registry = SessionRegistry::new(10);
        registry.get_or_create("fresh", "a").unwrap();

        // Nothing is older than an hour
        assert_eq!(registry.evict_idle(3600), 0);
        assert_eq!(registry.len(), 1);

        // Zero tolerance sweeps everything not touched this second...
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert_eq!(registry.evict_idle(0), 1);
        assert!(registry.is_empty());
    }
}

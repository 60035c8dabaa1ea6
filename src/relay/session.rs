//! # Interview Session State
//!
//! One session is one candidate's live interview conversation, identified by
//! an opaque id shared between the chat and audio channels. The session holds
//! the ordered turn history and the Chat Relay's two-state turn-taking
//! machine. All of it lives in process memory only: restart or explicit
//! teardown discards it, which is a deliberate simplicity/availability
//! trade-off rather than a durability guarantee.
//!
//! ## Turn-taking state machine:
//! 1. **Idle**: waiting for candidate input
//! 2. **AwaitingEngine**: one request to the AI engine is in flight
//!
//! Transitions:
//! - `begin_exchange` (Idle -> AwaitingEngine): appends the candidate turn
//! - `complete_exchange` (AwaitingEngine -> Idle): appends the engine turn
//! - `abort_exchange` (AwaitingEngine -> Idle): appends nothing; the caller
//!   delivers a fallback reply instead
//!
//! A second candidate message while one is in flight is rejected with
//! [`ExchangeError::Busy`]; it is a transient condition, never recorded in
//! history, so the history stays strictly candidate/engine alternating.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, RwLock};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The interviewee typing or speaking
    Candidate,
    /// The conversational AI engine
    Engine,
}

/// One entry in a session's chat history.
///
/// Insertion order is meaningful: the history is replayed verbatim to a
/// rejoining client and forms the conversational context of the interview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn candidate(content: impl Into<String>) -> Self {
        Self { role: Role::Candidate, content: content.into() }
    }

    pub fn engine(content: impl Into<String>) -> Self {
        Self { role: Role::Engine, content: content.into() }
    }
}

/// Current phase of the turn-taking machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    /// Waiting for candidate input
    Idle,
    /// A request to the AI engine is in flight
    AwaitingEngine,
}

/// Why an exchange could not be started or finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// A previous candidate message is still in flight to the engine.
    /// Transient: the sender may retry once the current reply lands.
    Busy,
    /// `complete_exchange`/`abort_exchange` called with no exchange open.
    /// Indicates a relay bug, not a client error.
    NotAwaiting,
}

impl std::fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeError::Busy => write!(f, "a message is already in flight for this session"),
            ExchangeError::NotAwaiting => write!(f, "no exchange is in flight for this session"),
        }
    }
}

/// History and state share one lock so a transition and its history append
/// are atomic. Without that, two racing `begin_exchange` calls could both
/// observe Idle and interleave two candidate turns.
#[derive(Debug)]
struct Conversation {
    state: ChatState,
    history: Vec<Turn>,
}

/// One candidate's live interview conversation.
///
/// ## Thread Safety:
/// Shared between the control connection, spawned engine-call tasks, and the
/// registry's eviction sweep via `Arc`. The conversation lock is per-session,
/// so sessions never serialize against each other.
pub struct InterviewSession {
    /// Opaque routing key, supplied by the caller who created the interview record
    pub session_id: String,

    /// Principal authorized to join this session
    pub owner_id: String,

    /// When the session was lazily created
    pub created_at: DateTime<Utc>,

    /// Turn history plus turn-taking state
    conversation: Mutex<Conversation>,

    /// Refreshed on every join, message, and relayed frame; read by eviction
    last_activity: RwLock<DateTime<Utc>>,
}

impl InterviewSession {
    pub fn new(session_id: String, owner_id: String) -> Self {
        Self {
            session_id,
            owner_id,
            created_at: Utc::now(),
            conversation: Mutex::new(Conversation {
                state: ChatState::Idle,
                history: Vec::new(),
            }),
            last_activity: RwLock::new(Utc::now()),
        }
    }

    /// Current phase of the turn-taking machine.
    pub fn state(&self) -> ChatState {
        self.conversation.lock().unwrap().state
    }

    /// Copy of the full history, for replay to a (re)joining connection.
    ///
    /// ## Why a copy:
    /// Cloning releases the lock immediately so replay serialization never
    /// blocks an in-flight exchange on the same session.
    pub fn history_snapshot(&self) -> Vec<Turn> {
        self.conversation.lock().unwrap().history.clone()
    }

    /// Number of turns recorded so far.
    pub fn history_len(&self) -> usize {
        self.conversation.lock().unwrap().history.len()
    }

    /// Start an exchange: record the candidate's turn and move to AwaitingEngine.
    ///
    /// ## Concurrency rule:
    /// At most one candidate message may be in flight per session. A second
    /// message while AwaitingEngine returns `Busy` and leaves the history
    /// untouched; the caller signals the sender to retry.
    pub fn begin_exchange(&self, candidate_text: impl Into<String>) -> Result<(), ExchangeError> {
        let mut convo = self.conversation.lock().unwrap();

        if convo.state == ChatState::AwaitingEngine {
            return Err(ExchangeError::Busy);
        }

        convo.history.push(Turn::candidate(candidate_text));
        convo.state = ChatState::AwaitingEngine;
        self.touch();
        Ok(())
    }

    /// Finish an exchange: record the engine's turn and return to Idle.
    pub fn complete_exchange(&self, engine_text: impl Into<String>) -> Result<(), ExchangeError> {
        let mut convo = self.conversation.lock().unwrap();

        if convo.state != ChatState::AwaitingEngine {
            return Err(ExchangeError::NotAwaiting);
        }

        convo.history.push(Turn::engine(engine_text));
        convo.state = ChatState::Idle;
        self.touch();
        Ok(())
    }

    /// Abandon an exchange after an engine failure: return to Idle WITHOUT
    /// appending an engine turn.
    ///
    /// The candidate's turn stays in the history; the caller delivers a
    /// user-visible fallback reply that is never recorded.
    pub fn abort_exchange(&self) -> Result<(), ExchangeError> {
        let mut convo = self.conversation.lock().unwrap();

        if convo.state != ChatState::AwaitingEngine {
            return Err(ExchangeError::NotAwaiting);
        }

        convo.state = ChatState::Idle;
        self.touch();
        Ok(())
    }

    /// Refresh the idle clock.
    pub fn touch(&self) {
        *self.last_activity.write().unwrap() = Utc::now();
    }

    /// Seconds since the last join, message, or relayed frame.
    pub fn idle_seconds(&self) -> i64 {
        Utc::now()
            .signed_duration_since(*self.last_activity.read().unwrap())
            .num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> InterviewSession {
        InterviewSession::new("abc123".to_string(), "candidate-1".to_string())
    }

    /// Messages sent one at a time produce strict candidate/engine alternation.
    #[test]
    fn test_history_ordering() {
        let session = session();

        for i in 0..3 {
            session.begin_exchange(format!("answer {}", i)).unwrap();
            session.complete_exchange(format!("question {}", i)).unwrap();
        }

        let history = session.history_snapshot();
        assert_eq!(history.len(), 6);
        for (i, turn) in history.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::Candidate } else { Role::Engine };
            assert_eq!(turn.role, expected, "turn {} out of order", i);
        }
        assert_eq!(history[0].content, "answer 0");
        assert_eq!(history[1].content, "question 0");
    }

    /// The happy-path scenario: "Hello" in, one engine question out.
    #[test]
    fn test_single_exchange() {
        let session = session();

        session.begin_exchange("Hello").unwrap();
        assert_eq!(session.state(), ChatState::AwaitingEngine);

        session.complete_exchange("Tell me about yourself").unwrap();
        assert_eq!(session.state(), ChatState::Idle);

        let history = session.history_snapshot();
        assert_eq!(
            history,
            vec![
                Turn::candidate("Hello"),
                Turn::engine("Tell me about yourself"),
            ]
        );
    }

    /// A second message while one is in flight is rejected, not interleaved.
    #[test]
    fn test_busy_rejection() {
        let session = session();

        session.begin_exchange("first").unwrap();
        assert_eq!(session.begin_exchange("second"), Err(ExchangeError::Busy));

        // The rejected message left no trace
        assert_eq!(session.history_len(), 1);

        // After the reply lands the session accepts input again
        session.complete_exchange("reply").unwrap();
        assert!(session.begin_exchange("second").is_ok());
    }

    /// Engine failure: back to Idle, no engine turn appended.
    #[test]
    fn test_abort_leaves_no_engine_turn() {
        let session = session();

        session.begin_exchange("are you there?").unwrap();
        session.abort_exchange().unwrap();

        assert_eq!(session.state(), ChatState::Idle);
        let history = session.history_snapshot();
        assert_eq!(history, vec![Turn::candidate("are you there?")]);
    }

    /// complete/abort outside an exchange is a relay bug and says so.
    #[test]
    fn test_transitions_require_open_exchange() {
        let session = session();
        assert_eq!(session.complete_exchange("q"), Err(ExchangeError::NotAwaiting));
        assert_eq!(session.abort_exchange(), Err(ExchangeError::NotAwaiting));
    }

    /// Concurrent begin_exchange calls: exactly one wins, one turn recorded.
    #[test]
    fn test_concurrent_begin_exchange() {
        use std::sync::Arc;

        let session = Arc::new(session());
        let mut handles = Vec::new();

        for i in 0..8 {
            let session = session.clone();
            handles.push(std::thread::spawn(move || {
                session.begin_exchange(format!("msg {}", i)).is_ok()
            }));
        }

        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(wins, 1);
        assert_eq!(session.history_len(), 1);
        assert_eq!(session.state(), ChatState::AwaitingEngine);
    }

    /// Turns serialize with the wire-visible role names.
    #[test]
    fn test_turn_serialization() {
        let json = serde_json::to_string(&Turn::candidate("hi")).unwrap();
        assert!(json.contains(r#""role":"candidate""#));

        let json = serde_json::to_string(&Turn::engine("hello")).unwrap();
        assert!(json.contains(r#""role":"engine""#));
    }
}

//! # AI Engine Client
//!
//! Thin client for the remote conversational-AI engine's request/response
//! text endpoint. The engine is a black box: it takes a session id plus the
//! candidate's latest answer and returns the next question (and optional
//! hints). Everything else about it (prompting, scoring, voice synthesis) is
//! its business, not the relay's.
//!
//! ## Failure model:
//! Every call has a bounded wait (`engine.request_timeout_ms`). Timeouts,
//! connection errors, non-2xx statuses, and unparseable bodies all collapse
//! into [`EngineError`]; the Chat Relay absorbs that error and delivers a
//! fallback reply, so engine trouble never escapes one session's exchange.

use crate::config::EngineConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body for the engine's next-turn endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct NextTurnRequest {
    pub session_id: String,
    pub candidate_answer: String,
}

/// Reply from the engine's next-turn endpoint.
///
/// `hints` is optional coaching material some engine deployments attach;
/// the relay forwards it untouched when present.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NextTurnReply {
    pub question: String,
    #[serde(default)]
    pub hints: Option<Vec<String>>,
}

/// What went wrong talking to the engine.
#[derive(Debug)]
pub enum EngineError {
    /// Could not reach the endpoint, or the bounded wait elapsed
    Unreachable(String),
    /// The endpoint answered with a non-success status
    BadStatus(u16),
    /// The endpoint answered 2xx but the body was not a next-turn reply
    BadPayload(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Unreachable(msg) => write!(f, "engine unreachable: {}", msg),
            EngineError::BadStatus(status) => write!(f, "engine returned status {}", status),
            EngineError::BadPayload(msg) => write!(f, "engine reply unparseable: {}", msg),
        }
    }
}

/// Client for the engine's request/response endpoints.
///
/// Cheap to clone behind an `Arc`; the inner reqwest client pools
/// connections across all sessions.
pub struct EngineClient {
    http: reqwest::Client,
    http_url: String,
}

impl EngineClient {
    /// Build a client from the engine configuration.
    ///
    /// The timeout is baked into the underlying HTTP client so every call
    /// (connect + response) shares one deadline; a pending call that never
    /// returns is converted to `Unreachable` instead of hanging the session
    /// in awaiting-engine forever.
    pub fn new(config: &EngineConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            // Builder only fails on TLS backend misconfiguration, which is
            // a deployment defect we cannot run without
            .expect("failed to build engine HTTP client");

        Self {
            http,
            http_url: config.http_url.trim_end_matches('/').to_string(),
        }
    }

    /// Ask the engine for the next interview turn.
    pub async fn next_turn(
        &self,
        session_id: &str,
        candidate_answer: &str,
    ) -> Result<NextTurnReply, EngineError> {
        let request = NextTurnRequest {
            session_id: session_id.to_string(),
            candidate_answer: candidate_answer.to_string(),
        };

        let response = self
            .http
            .post(format!("{}/interview/next", self.http_url))
            .json(&request)
            .send()
            .await
            .map_err(|err| EngineError::Unreachable(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::BadStatus(status.as_u16()));
        }

        response
            .json::<NextTurnReply>()
            .await
            .map_err(|err| EngineError::BadPayload(err.to_string()))
    }

    /// Streaming endpoint URL for a session's voice tunnel.
    pub fn voice_url(ws_base: &str, session_id: &str) -> String {
        format!("{}/ws/voice/{}", ws_base.trim_end_matches('/'), session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = NextTurnRequest {
            session_id: "abc123".to_string(),
            candidate_answer: "Hello".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["session_id"], "abc123");
        assert_eq!(json["candidate_answer"], "Hello");
    }

    #[test]
    fn test_reply_parses_with_and_without_hints() {
        let reply: NextTurnReply =
            serde_json::from_str(r#"{"question": "Tell me about yourself"}"#).unwrap();
        assert_eq!(reply.question, "Tell me about yourself");
        assert_eq!(reply.hints, None);

        let reply: NextTurnReply = serde_json::from_str(
            r#"{"question": "Why Rust?", "hints": ["mention ownership"]}"#,
        )
        .unwrap();
        assert_eq!(reply.hints, Some(vec!["mention ownership".to_string()]));
    }

    #[test]
    fn test_reply_without_question_is_bad_payload() {
        let parsed = serde_json::from_str::<NextTurnReply>(r#"{"hints": []}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_voice_url_joins_cleanly() {
        assert_eq!(
            EngineClient::voice_url("ws://127.0.0.1:8000/", "abc123"),
            "ws://127.0.0.1:8000/ws/voice/abc123"
        );
        assert_eq!(
            EngineClient::voice_url("ws://ai:8000", "xyz"),
            "ws://ai:8000/ws/voice/xyz"
        );
    }

    /// A dead endpoint surfaces as Unreachable within the bounded wait.
    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let config = EngineConfig {
            // Reserved TEST-NET address: nothing listens there
            http_url: "http://192.0.2.1:9".to_string(),
            ws_url: "ws://192.0.2.1:9".to_string(),
            request_timeout_ms: 200,
        };
        let client = EngineClient::new(&config);

        match client.next_turn("xyz", "hello?").await {
            Err(EngineError::Unreachable(_)) => {}
            other => panic!("expected Unreachable, got {:?}", other.map(|r| r.question)),
        }
    }
}

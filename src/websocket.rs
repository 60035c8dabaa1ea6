//! # Control-Channel WebSocket Handler
//!
//! Handles the textual turn-taking chat channel of a live interview. Clients
//! connect to `/ws/interview`, authenticate at the handshake, and then drive
//! the Chat Relay with JSON messages.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: Credential Guard runs before the upgrade; rejection is
//!    a plain HTTP 401, never an application frame
//! 2. **Join**: The client must send `joinSession` before any relay work;
//!    joining replays the full existing history as `chatHistory`
//! 3. **Turn-taking**: `sendMessage` forwards the candidate's text to the AI
//!    engine and the reply comes back as `reply`; a message sent while one is
//!    already in flight is answered with `busy` (retryable, not fatal)
//! 4. **Liveness**: Server pings every 30s and drops clients silent for 60s
//!
//! ## Message Format:
//! - **Client → Server**: `joinSession`, `sendMessage`, `pong`
//! - **Server → Client**: `chatHistory`, `reply`, `busy`, `error`, `ping`
//!
//! Closing the control connection stops relaying for that connection but
//! never tears down the session: another connection, or a reconnect, may
//! still need the history.

use crate::auth::{CredentialGuard, Principal};
use crate::relay::session::{ExchangeError, InterviewSession, Turn};
use crate::relay::registry::RegistryError;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the server pings the client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long a silent client is kept before the connection is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// What the candidate sees when the engine call fails.
///
/// Delivered exactly once per failed exchange and never recorded in history.
const FALLBACK_REPLY: &str = "The assistant is unavailable right now. Please try again.";

/// Control-channel message types for client-server communication.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Join (or rejoin) an interview session; replays existing history
    #[serde(rename = "joinSession")]
    JoinSession {
        #[serde(rename = "sessionId")]
        session_id: String,
    },

    /// Candidate utterance for the current session
    #[serde(rename = "sendMessage")]
    SendMessage { text: String },

    /// Full history replay, sent immediately after a successful join
    #[serde(rename = "chatHistory")]
    ChatHistory { messages: Vec<Turn> },

    /// The engine's next turn (or the fallback text on engine failure)
    #[serde(rename = "reply")]
    Reply {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hints: Option<Vec<String>>,
    },

    /// Transient rejection: a previous message is still in flight
    #[serde(rename = "busy")]
    Busy { message: String },

    /// Error messages
    #[serde(rename = "error")]
    Error {
        /// Error code
        code: String,
        /// Human-readable error message
        message: String,
    },

    /// Heartbeat/ping message
    #[serde(rename = "ping")]
    Ping {
        /// Timestamp for latency measurement
        timestamp: u64,
    },

    /// Heartbeat/pong response
    #[serde(rename = "pong")]
    Pong {
        /// Original timestamp from ping
        timestamp: u64,
    },
}

/// Outcome of a spawned engine call, delivered back to the actor.
#[derive(Message)]
#[rtype(result = "()")]
enum EngineOutcome {
    /// The engine answered; history already carries the turn
    Reply {
        text: String,
        hints: Option<Vec<String>>,
    },
    /// The engine failed; history carries no engine turn
    Fallback,
}

/// WebSocket actor for one control-channel connection.
///
/// ## Actor Model:
/// Each connection is an independent actor; engine calls run in spawned
/// tasks that message the actor back, so a slow engine blocks only this
/// session's state machine and never another connection.
pub struct InterviewSocket {
    /// Connection id for log correlation (one candidate may reconnect)
    connection_id: String,

    /// Verified identity, attached at the handshake and trusted from then on
    principal: Principal,

    /// Shared application state (registry, engine client, metrics)
    app_state: web::Data<AppState>,

    /// The joined session, if any; join is explicit, never implied by connect
    session: Option<Arc<InterviewSession>>,

    /// Last heartbeat time
    last_heartbeat: Instant,
}

impl InterviewSocket {
    pub fn new(principal: Principal, app_state: web::Data<AppState>) -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            principal,
            app_state,
            session: None,
            last_heartbeat: Instant::now(),
        }
    }

    /// Serialize and send one control frame.
    fn send_frame(&self, ctx: &mut ws::WebsocketContext<Self>, frame: &ControlMessage) {
        if let Ok(json) = serde_json::to_string(frame) {
            ctx.text(json);
        }
    }

    /// Handle `joinSession`: resolve (or lazily create) the session, check
    /// ownership, and replay the existing history.
    fn handle_join(&mut self, session_id: String, ctx: &mut ws::WebsocketContext<Self>) {
        let session = match self
            .app_state
            .registry
            .get_or_create(&session_id, &self.principal.id)
        {
            Ok(session) => session,
            Err(RegistryError::Full { .. }) => {
                self.send_frame(
                    ctx,
                    &ControlMessage::Error {
                        code: "capacity".to_string(),
                        message: "No capacity for new sessions, try again later".to_string(),
                    },
                );
                return;
            }
        };

        // The first principal to join owns the session; the transcript stays
        // private to them even though session ids travel in URLs
        if session.owner_id != self.principal.id {
            warn!(
                connection_id = %self.connection_id,
                session_id = %session_id,
                principal = %self.principal.id,
                "Join refused: principal does not own session"
            );
            self.send_frame(
                ctx,
                &ControlMessage::Error {
                    code: "forbidden".to_string(),
                    message: "This session belongs to another candidate".to_string(),
                },
            );
            return;
        }

        session.touch();
        let messages = session.history_snapshot();
        info!(
            connection_id = %self.connection_id,
            session_id = %session_id,
            replayed_turns = messages.len(),
            "Connection joined session"
        );

        self.session = Some(session);
        self.send_frame(ctx, &ControlMessage::ChatHistory { messages });
    }

    /// Handle `sendMessage`: record the candidate turn and fire the engine call.
    fn handle_send_message(&mut self, text: String, ctx: &mut ws::WebsocketContext<Self>) {
        let session = match &self.session {
            Some(session) => session.clone(),
            None => {
                self.send_frame(
                    ctx,
                    &ControlMessage::Error {
                        code: "not_joined".to_string(),
                        message: "Send joinSession before sendMessage".to_string(),
                    },
                );
                return;
            }
        };

        // One in-flight exchange per session; a second message is rejected
        // as retryable, never queued out of order into the history
        if let Err(ExchangeError::Busy) = session.begin_exchange(&text) {
            self.send_frame(
                ctx,
                &ControlMessage::Busy {
                    message: "Previous message is still being answered, retry shortly"
                        .to_string(),
                },
            );
            return;
        }

        let engine = self.app_state.engine.clone();
        let app_state = self.app_state.clone();
        let addr = ctx.address();
        let connection_id = self.connection_id.clone();

        // The engine call suspends only this session's exchange. The actor
        // keeps processing heartbeats (and busy-rejecting further messages)
        // while the call is in flight.
        tokio::spawn(async move {
            match engine.next_turn(&session.session_id, &text).await {
                Ok(reply) => {
                    app_state.record_engine_request(false);
                    if let Err(err) = session.complete_exchange(&reply.question) {
                        // Only reachable if the state machine was torn up
                        // underneath us; log and still show the reply
                        warn!(
                            connection_id = %connection_id,
                            session_id = %session.session_id,
                            error = %err,
                            "Exchange completed in unexpected state"
                        );
                    }
                    addr.do_send(EngineOutcome::Reply {
                        text: reply.question,
                        hints: reply.hints,
                    });
                }
                Err(err) => {
                    app_state.record_engine_request(true);
                    warn!(
                        connection_id = %connection_id,
                        session_id = %session.session_id,
                        error = %err,
                        "Engine call failed, delivering fallback"
                    );
                    let _ = session.abort_exchange();
                    addr.do_send(EngineOutcome::Fallback);
                }
            }
        });
    }
}

impl Actor for InterviewSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Called when the WebSocket connection starts.
    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            connection_id = %self.connection_id,
            principal = %self.principal.id,
            "Control connection started"
        );
        self.app_state.control_connection_opened();

        // Heartbeat timer: ping every interval, drop clients silent too long
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(
                    connection_id = %act.connection_id,
                    "Control connection heartbeat timeout, closing"
                );
                ctx.stop();
                return;
            }

            let ping = ControlMessage::Ping {
                timestamp: chrono::Utc::now().timestamp_millis() as u64,
            };
            if let Ok(json) = serde_json::to_string(&ping) {
                ctx.text(json);
            }
        });
    }

    /// Called when the WebSocket connection stops.
    ///
    /// Relaying stops; the session stays registered for reconnects.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(
            connection_id = %self.connection_id,
            session_id = self.session.as_deref().map(|s| s.session_id.as_str()),
            "Control connection stopped"
        );
        self.app_state.control_connection_closed();
    }
}

/// Handle incoming WebSocket messages.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for InterviewSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                match serde_json::from_str::<ControlMessage>(&text) {
                    Ok(ControlMessage::JoinSession { session_id }) => {
                        self.handle_join(session_id, ctx);
                    }
                    Ok(ControlMessage::SendMessage { text }) => {
                        self.handle_send_message(text, ctx);
                    }
                    Ok(ControlMessage::Pong { .. }) => {
                        self.last_heartbeat = Instant::now();
                    }
                    Ok(_) => {
                        // Server-to-client frame echoed back; nothing to do
                        debug!(
                            connection_id = %self.connection_id,
                            "Ignoring unexpected control frame from client"
                        );
                    }
                    Err(err) => {
                        // Malformed frames are dropped at the point of
                        // receipt; they never terminate the connection
                        debug!(
                            connection_id = %self.connection_id,
                            error = %err,
                            "Dropping unparseable control frame"
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                debug!(
                    connection_id = %self.connection_id,
                    "Ignoring binary frame on control channel"
                );
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(
                    connection_id = %self.connection_id,
                    reason = ?reason,
                    "Control connection closed by client"
                );
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {
                // Handle no-op frames (usually internal)
            }
            Err(err) => {
                warn!(
                    connection_id = %self.connection_id,
                    error = %err,
                    "Control connection protocol error"
                );
                ctx.stop();
            }
        }
    }
}

/// Deliver the result of a spawned engine call to the client.
impl Handler<EngineOutcome> for InterviewSocket {
    type Result = ();

    fn handle(&mut self, msg: EngineOutcome, ctx: &mut Self::Context) {
        let frame = match msg {
            EngineOutcome::Reply { text, hints } => ControlMessage::Reply { text, hints },
            EngineOutcome::Fallback => ControlMessage::Reply {
                text: FALLBACK_REPLY.to_string(),
                hints: None,
            },
        };
        self.send_frame(ctx, &frame);
    }
}

/// Control-channel endpoint handler.
///
/// ## HTTP to WebSocket Upgrade:
/// The Credential Guard runs against the plain HTTP request; only a verified
/// principal reaches `ws::start`. Rejections surface as HTTP 401 responses,
/// which the browser sees before any interview UI state exists.
pub async fn interview_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let config = app_state.get_config();
    let guard = CredentialGuard::new(&config.auth.jwt_secret, &config.auth.cookie_name);

    let principal = guard.authenticate(&req)?;
    debug!(
        principal = %principal.id,
        peer = ?req.connection_info().peer_addr(),
        "Control connection authenticated"
    );

    ws::start(InterviewSocket::new(principal, app_state), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parsing() {
        let msg: ControlMessage =
            serde_json::from_str(r#"{"type":"joinSession","sessionId":"abc123"}"#).unwrap();
        match msg {
            ControlMessage::JoinSession { session_id } => assert_eq!(session_id, "abc123"),
            _ => panic!("Wrong message type"),
        }

        let msg: ControlMessage =
            serde_json::from_str(r#"{"type":"sendMessage","text":"Hello"}"#).unwrap();
        match msg {
            ControlMessage::SendMessage { text } => assert_eq!(text, "Hello"),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_malformed_frames_do_not_parse() {
        assert!(serde_json::from_str::<ControlMessage>("not json").is_err());
        assert!(serde_json::from_str::<ControlMessage>(r#"{"type":"unknown"}"#).is_err());
        // Missing required field
        assert!(serde_json::from_str::<ControlMessage>(r#"{"type":"sendMessage"}"#).is_err());
    }

    #[test]
    fn test_reply_serialization_omits_empty_hints() {
        let json = serde_json::to_string(&ControlMessage::Reply {
            text: "Tell me about yourself".to_string(),
            hints: None,
        })
        .unwrap();
        assert!(json.contains(r#""type":"reply""#));
        assert!(!json.contains("hints"));

        let json = serde_json::to_string(&ControlMessage::Reply {
            text: "Why Rust?".to_string(),
            hints: Some(vec!["ownership".to_string()]),
        })
        .unwrap();
        assert!(json.contains(r#""hints":["ownership"]"#));
    }

    /// The failure path the spawned engine task takes: a dead engine leads
    /// to abort, the state machine returns to Idle, and the history keeps
    /// the candidate turn but gains no engine turn.
    #[tokio::test]
    async fn test_engine_failure_leaves_history_without_engine_turn() {
        use crate::config::EngineConfig;
        use crate::engine::EngineClient;
        use crate::relay::session::ChatState;

        let session = InterviewSession::new("xyz".to_string(), "candidate-1".to_string());
        session.begin_exchange("hello?").unwrap();

        // Reserved TEST-NET address: the bounded wait elapses, nothing answers
        let engine = EngineClient::new(&EngineConfig {
            http_url: "http://192.0.2.1:9".to_string(),
            ws_url: "ws://192.0.2.1:9".to_string(),
            request_timeout_ms: 200,
        });

        assert!(engine.next_turn("xyz", "hello?").await.is_err());
        session.abort_exchange().unwrap();

        assert_eq!(session.state(), ChatState::Idle);
        assert_eq!(session.history_snapshot(), vec![Turn::candidate("hello?")]);
    }

    #[test]
    fn test_chat_history_wire_shape() {
        let json = serde_json::to_string(&ControlMessage::ChatHistory {
            messages: vec![Turn::candidate("Hello"), Turn::engine("Tell me about yourself")],
        })
        .unwrap();
        assert!(json.contains(r#""type":"chatHistory""#));
        assert!(json.contains(r#""role":"candidate""#));
        assert!(json.contains(r#""role":"engine""#));
    }
}

//! # Audio Relay (Proxy Tunnel)
//!
//! Transparent pass-through between a browser streaming connection and the
//! AI engine's streaming endpoint, keyed by the session id in the path
//! (`/ws/voice/{session_id}`). The relay does not parse, validate, or
//! transform frame contents: binary audio and textual control frames travel
//! verbatim in both directions, because the engine and the client agree on
//! the framing between themselves.
//!
//! ## Tunnel anatomy:
//! - The upstream connection is dialed BEFORE the browser upgrade completes;
//!   if the engine cannot be reached, the browser gets an explicit 502
//!   instead of a tunnel to nowhere.
//! - After the upgrade, two independent copy loops run:
//!   1. downstream → upstream: the actor pushes frames into an mpsc channel
//!      drained by a writer task that owns the upstream sink
//!   2. upstream → downstream: a reader task owns the upstream stream and
//!      delivers frames to the actor
//!   Each loop is cancellable on its own, so one direction closing can never
//!   hang the other.
//! - Downstream close cancels the reader and closes the upstream sink
//!   immediately, so no upstream connection is ever leaked.
//!
//! Every tunnel is independent: one tunnel's backpressure or failure touches
//! nothing but its own two endpoints.

use crate::auth::CredentialGuard;
use crate::engine::EngineClient;
use crate::error::AppError;
use crate::relay::registry::RegistryError;
use crate::relay::session::InterviewSession;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tracing::{debug, info, warn};

/// A frame (or closure) observed on the upstream leg, delivered to the actor.
#[derive(Message)]
#[rtype(result = "()")]
enum UpstreamEvent {
    /// Raw audio block from the engine
    Binary(Vec<u8>),
    /// Control JSON from the engine (transcripts, partials, audio metadata)
    Text(String),
    /// The engine closed or the upstream leg errored
    Closed,
}

/// WebSocket actor for one tunnel's downstream (browser) leg.
pub struct VoiceTunnel {
    /// Session id carried in the connection path; the tunnel's routing key
    session_id: String,

    /// Tunnel id for log correlation
    tunnel_id: String,

    /// Shared application state (metrics)
    app_state: web::Data<AppState>,

    /// The session this tunnel belongs to; frames refresh its idle clock
    session: Arc<InterviewSession>,

    /// Feed of the writer task that owns the upstream sink
    upstream_tx: mpsc::UnboundedSender<UpstreamMessage>,

    /// Cancels the upstream reader task when the downstream leg goes away
    cancel_reader: Option<oneshot::Sender<()>>,
}

impl VoiceTunnel {
    /// Forward one frame to the engine; a dead writer task means the
    /// upstream leg is gone and the tunnel must come down.
    fn forward_upstream(&self, msg: UpstreamMessage, ctx: &mut ws::WebsocketContext<Self>) {
        self.session.touch();
        if self.upstream_tx.send(msg).is_err() {
            warn!(
                tunnel_id = %self.tunnel_id,
                session_id = %self.session_id,
                "Upstream writer gone, closing tunnel"
            );
            ctx.stop();
        }
    }
}

impl Actor for VoiceTunnel {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!(
            tunnel_id = %self.tunnel_id,
            session_id = %self.session_id,
            "Tunnel established"
        );
        self.app_state.tunnel_opened();
    }

    /// Downstream is gone: cancel the reader and close the upstream sink so
    /// the engine-side connection is released immediately.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(cancel) = self.cancel_reader.take() {
            let _ = cancel.send(());
        }
        let _ = self.upstream_tx.send(UpstreamMessage::Close(None));

        info!(
            tunnel_id = %self.tunnel_id,
            session_id = %self.session_id,
            "Tunnel torn down"
        );
        self.app_state.tunnel_closed();
    }
}

/// Downstream → upstream direction.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VoiceTunnel {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                // Microphone PCM; forwarded verbatim and unbuffered
                self.forward_upstream(UpstreamMessage::Binary(data.to_vec()), ctx);
            }
            Ok(ws::Message::Text(text)) => {
                // Client control frames are the engine's business, not ours
                self.forward_upstream(UpstreamMessage::Text(text.to_string()), ctx);
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                debug!(
                    tunnel_id = %self.tunnel_id,
                    reason = ?reason,
                    "Downstream closed"
                );
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(err) => {
                warn!(
                    tunnel_id = %self.tunnel_id,
                    error = %err,
                    "Downstream protocol error"
                );
                ctx.stop();
            }
        }
    }
}

/// Upstream → downstream direction.
impl Handler<UpstreamEvent> for VoiceTunnel {
    type Result = ();

    fn handle(&mut self, msg: UpstreamEvent, ctx: &mut Self::Context) {
        match msg {
            UpstreamEvent::Binary(data) => ctx.binary(data),
            UpstreamEvent::Text(text) => ctx.text(text),
            UpstreamEvent::Closed => {
                debug!(
                    tunnel_id = %self.tunnel_id,
                    session_id = %self.session_id,
                    "Upstream closed, stopping downstream"
                );
                ctx.stop();
            }
        }
    }
}

/// Streaming endpoint handler.
///
/// ## Order of operations:
/// 1. Credential Guard (HTTP 401 on rejection, before any upgrade)
/// 2. Session resolution and ownership check (403 for someone else's session)
/// 3. Upstream dial (HTTP 502 if the engine's streaming endpoint is down)
/// 4. WebSocket upgrade and pump startup
pub async fn voice_tunnel(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let session_id = path.into_inner();
    let config = app_state.get_config();

    let guard = CredentialGuard::new(&config.auth.jwt_secret, &config.auth.cookie_name);
    let principal = guard.authenticate(&req)?;

    // Voice-only flows may reach a session id before any chat join did, so
    // the tunnel participates in lazy session creation too
    let session = app_state
        .registry
        .get_or_create(&session_id, &principal.id)
        .map_err(|err: RegistryError| AppError::Internal(err.to_string()))?;

    if session.owner_id != principal.id {
        return Err(AppError::Forbidden(
            "This session belongs to another candidate".to_string(),
        ));
    }

    // Dial the engine BEFORE upgrading: a refused dial must surface as an
    // explicit error status, never as a silently dead tunnel
    let upstream_url = EngineClient::voice_url(&config.engine.ws_url, &session_id);
    let (upstream, _response) = tokio_tungstenite::connect_async(upstream_url.as_str())
        .await
        .map_err(|err| {
            warn!(
                session_id = %session_id,
                upstream = %upstream_url,
                error = %err,
                "Upstream dial failed"
            );
            AppError::UpstreamUnavailable(format!("engine streaming endpoint: {}", err))
        })?;

    let (mut upstream_sink, mut upstream_stream) = upstream.split();
    let (upstream_tx, mut upstream_rx) = mpsc::unbounded_channel::<UpstreamMessage>();
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    let tunnel = VoiceTunnel {
        session_id: session_id.clone(),
        tunnel_id: uuid::Uuid::new_v4().to_string(),
        app_state,
        session,
        upstream_tx,
        cancel_reader: Some(cancel_tx),
    };

    let (addr, response) = ws::WsResponseBuilder::new(tunnel, &req, stream)
        .start_with_addr()
        .map_err(|err| AppError::Internal(format!("WebSocket upgrade failed: {}", err)))?;

    // Copy loop 1: downstream -> upstream. Ends when the actor drops the
    // sender (downstream closed) or the sink errors (upstream closed).
    tokio::spawn(async move {
        while let Some(msg) = upstream_rx.recv().await {
            let closing = matches!(msg, UpstreamMessage::Close(_));
            if upstream_sink.send(msg).await.is_err() || closing {
                break;
            }
        }
        let _ = upstream_sink.close().await;
    });

    // Copy loop 2: upstream -> downstream. Cancellable on its own so a
    // closed downstream never leaves this loop parked on a healthy engine.
    let reader_session_id = session_id;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    debug!(session_id = %reader_session_id, "Upstream reader cancelled");
                    break;
                }
                frame = upstream_stream.next() => match frame {
                    Some(Ok(UpstreamMessage::Binary(data))) => {
                        addr.do_send(UpstreamEvent::Binary(data));
                    }
                    Some(Ok(UpstreamMessage::Text(text))) => {
                        addr.do_send(UpstreamEvent::Text(text));
                    }
                    Some(Ok(UpstreamMessage::Ping(_)))
                    | Some(Ok(UpstreamMessage::Pong(_)))
                    | Some(Ok(UpstreamMessage::Frame(_))) => {
                        // Transport chatter; tungstenite answers pings itself
                    }
                    Some(Ok(UpstreamMessage::Close(_))) | Some(Err(_)) | None => {
                        addr.do_send(UpstreamEvent::Closed);
                        break;
                    }
                }
            }
        }
    });

    Ok(response)
}

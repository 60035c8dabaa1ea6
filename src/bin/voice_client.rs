//! # Voice Client
//!
//! Reference candidate-side client for the streaming channel. Connects to
//! the relay's `/ws/voice/{session_id}` endpoint, streams microphone PCM up,
//! and plays engine audio back in arrival order while printing live
//! transcript captions.
//!
//! ## Usage:
//! ```text
//! INTERVIEW_TOKEN=<jwt> voice-client <session-id> [ws-base-url]
//! ```
//! The token is the same signed credential the browser presents as a cookie;
//! the client sends it the same way so the relay's Credential Guard treats
//! both identically.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use interview_relay_backend::client::playback::{self, PlaybackQueue};
use interview_relay_backend::client::{capture, pcm, transcript::TranscriptView};
use interview_relay_backend::config::AppConfig;
use std::sync::atomic::Ordering;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_client=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let session_id = args
        .next()
        .context("usage: voice-client <session-id> [ws-base-url]")?;
    let base_url = args
        .next()
        .unwrap_or_else(|| "ws://127.0.0.1:8080".to_string());
    let token = std::env::var("INTERVIEW_TOKEN")
        .context("INTERVIEW_TOKEN must hold the signed session credential")?;

    // Audio settings come from the same layered config the server reads, so
    // both ends agree on the frame format
    let audio = AppConfig::load()
        .map(|config| config.audio)
        .unwrap_or_else(|_| AppConfig::default().audio);

    let url = format!("{}/ws/voice/{}", base_url.trim_end_matches('/'), session_id);
    let mut request = url
        .clone()
        .into_client_request()
        .context("invalid relay URL")?;
    request.headers_mut().insert(
        "Cookie",
        HeaderValue::from_str(&format!("token={}", token)).context("credential not header-safe")?,
    );

    info!(url = %url, "Connecting to relay");
    let (ws, _response) = tokio_tungstenite::connect_async(request)
        .await
        .context("relay refused the streaming connection")?;
    info!("Streaming connection established");

    let (mut sink, mut ws_stream) = ws.split();

    // Playback: received frames drain through the FIFO to the speaker
    let queue = PlaybackQueue::new();
    let _output_stream = playback::start_playback(&audio, queue.clone())?;

    // Capture: the device callback hands frames off without blocking
    let mut mic = capture::start_capture(&audio)?;

    let view = TranscriptView::new();
    let mut was_speaking = false;
    let mut stats = tokio::time::interval(std::time::Duration::from_secs(10));

    loop {
        tokio::select! {
            // Microphone frame ready: ship it upstream
            maybe_frame = mic.frames.recv() => match maybe_frame {
                Some(frame) => {
                    if sink.send(Message::Binary(frame)).await.is_err() {
                        warn!("Relay connection lost while sending audio");
                        break;
                    }
                }
                None => break,  // Capture stream ended
            },

            // Frame from the engine: audio to the queue, text to the captions
            maybe_msg = ws_stream.next() => match maybe_msg {
                Some(Ok(Message::Binary(data))) => match pcm::decode_frame(&data) {
                    Ok(samples) => queue.enqueue(samples),
                    Err(err) => debug!(error = %err, "Dropping undecodable audio frame"),
                },
                Some(Ok(Message::Text(text))) => {
                    if view.apply_text(&text) {
                        println!("{}", view.latest());
                    }
                }
                Some(Ok(Message::Ping(_)))
                | Some(Ok(Message::Pong(_)))
                | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(reason))) => {
                    info!(reason = ?reason, "Relay closed the connection");
                    break;
                }
                Some(Err(err)) => {
                    warn!(error = %err, "Streaming connection error");
                    break;
                }
                None => break,
            },

            _ = stats.tick() => {
                let dropped = mic.dropped.load(Ordering::Relaxed);
                if dropped > 0 {
                    warn!(dropped, backlog = queue.backlog(), "Capture frames dropped");
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }

        // Surface speaking-state transitions between frames as well
        if queue.is_speaking() != was_speaking {
            was_speaking = queue.is_speaking();
            if was_speaking {
                println!("[engine speaking]");
            }
        }
    }

    Ok(())
}

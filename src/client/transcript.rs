//! # Transcript Display Model
//!
//! Textual control frames arrive interleaved with audio on the streaming
//! connection: finished utterances, partial transcripts, and audio metadata.
//! They update this display model independently of the playback queue; a
//! control frame never waits on audio and audio never waits on a control
//! frame.
//!
//! Unparseable text frames are dropped silently at the point of receipt.
//! The engine is free to add event types we don't know; unknown types are
//! not an error worth killing a live interview over.

use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Body of a finished utterance event.
#[derive(Debug, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub content: Option<String>,
}

/// Control frames the engine interleaves with audio on the streaming side.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ControlFrame {
    /// Candidate's finished utterance, as the engine heard it
    #[serde(rename = "user_message")]
    UserMessage { message: MessageBody },

    /// Engine's reply text (spoken audio follows as binary frames)
    #[serde(rename = "assistant_message")]
    AssistantMessage { message: MessageBody },

    /// Live partial transcript while the candidate is still talking
    #[serde(rename = "user_partial")]
    UserPartial { partial: String },

    /// The engine is about to stream audio output
    #[serde(rename = "audio_output_meta")]
    AudioOutputMeta,
}

/// What the interview screen shows: the latest caption line plus a hint
/// that engine audio is incoming.
pub struct TranscriptView {
    line: RwLock<String>,
    engine_speaking_hint: AtomicBool,
}

impl TranscriptView {
    pub fn new() -> Self {
        Self {
            line: RwLock::new(String::new()),
            engine_speaking_hint: AtomicBool::new(false),
        }
    }

    /// Apply one raw text frame.
    ///
    /// Returns true when the display changed; false means the frame was
    /// dropped (malformed, unknown type, or empty content).
    pub fn apply_text(&self, raw: &str) -> bool {
        let frame = match serde_json::from_str::<ControlFrame>(raw) {
            Ok(frame) => frame,
            Err(_) => return false,  // Dropped silently, connection lives on
        };

        match frame {
            ControlFrame::UserMessage { message } => match message.content {
                Some(content) if !content.is_empty() => {
                    self.set_line(format!("You: {}", content));
                    true
                }
                _ => false,
            },
            ControlFrame::AssistantMessage { message } => match message.content {
                Some(content) if !content.is_empty() => {
                    self.set_line(format!("AI: {}", content));
                    true
                }
                _ => false,
            },
            ControlFrame::UserPartial { partial } => {
                self.set_line(format!("You: {}", partial));
                true
            }
            ControlFrame::AudioOutputMeta => {
                self.engine_speaking_hint.store(true, Ordering::Relaxed);
                true
            }
        }
    }

    /// The current caption line.
    pub fn latest(&self) -> String {
        self.line.read().unwrap().clone()
    }

    /// The engine announced incoming audio.
    pub fn engine_speaking_hint(&self) -> bool {
        self.engine_speaking_hint.load(Ordering::Relaxed)
    }

    fn set_line(&self, line: String) {
        *self.line.write().unwrap() = line;
    }
}

impl Default for TranscriptView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_utterances_update_caption() {
        let view = TranscriptView::new();

        assert!(view.apply_text(
            r#"{"type":"user_message","message":{"content":"I led the migration"}}"#
        ));
        assert_eq!(view.latest(), "You: I led the migration");

        assert!(view.apply_text(
            r#"{"type":"assistant_message","message":{"content":"What went wrong?"}}"#
        ));
        assert_eq!(view.latest(), "AI: What went wrong?");
    }

    #[test]
    fn test_partials_overwrite_caption_live() {
        let view = TranscriptView::new();

        view.apply_text(r#"{"type":"user_partial","partial":"I led"}"#);
        assert_eq!(view.latest(), "You: I led");

        view.apply_text(r#"{"type":"user_partial","partial":"I led the"}"#);
        assert_eq!(view.latest(), "You: I led the");
    }

    #[test]
    fn test_audio_meta_sets_speaking_hint() {
        let view = TranscriptView::new();
        assert!(!view.engine_speaking_hint());

        assert!(view.apply_text(r#"{"type":"audio_output_meta","sample_rate":48000}"#));
        assert!(view.engine_speaking_hint());
    }

    /// Malformed and unknown frames are dropped without touching the display.
    #[test]
    fn test_bad_frames_dropped_silently() {
        let view = TranscriptView::new();
        view.apply_text(r#"{"type":"user_partial","partial":"kept"}"#);

        assert!(!view.apply_text("not json at all"));
        assert!(!view.apply_text(r#"{"type":"some_future_event","data":1}"#));
        assert!(!view.apply_text(r#"{"type":"user_message","message":{}}"#));

        assert_eq!(view.latest(), "You: kept");
    }
}

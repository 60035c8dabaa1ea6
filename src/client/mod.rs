//! # Client Audio Pipeline
//!
//! Everything the candidate-side voice client needs to hold a live audio
//! conversation with the relay. Used by the `voice-client` binary.
//!
//! ## Two independent directions, concurrently active:
//! - **Capture path**: microphone input, converted to 16-bit PCM frames and
//!   handed off without ever blocking the audio device callback
//! - **Playback path**: received PCM frames, queued and played strictly in
//!   arrival order with no overlap and no dropped frames
//!
//! Control frames (textual transcript updates) ride the same streaming
//! connection but feed a display model that neither blocks nor is blocked by
//! the audio queues.
//!
//! ## Audio Format:
//! - **Sample Rate**: 48kHz (48,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers, one frame per WebSocket
//!   binary message (the transport delimits frames)

pub mod capture;     // Microphone -> fixed-size PCM frames
pub mod pcm;         // f32 <-> 16-bit PCM codec
pub mod playback;    // In-order gapless playback queue
pub mod transcript;  // Control-frame display model

/// Errors from the audio device layer.
#[derive(Debug)]
pub enum AudioDeviceError {
    /// No usable input/output device on this host
    NoDevice(String),
    /// The device rejected the stream configuration or died mid-stream
    Stream(String),
}

impl std::fmt::Display for AudioDeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioDeviceError::NoDevice(msg) => write!(f, "no audio device: {}", msg),
            AudioDeviceError::Stream(msg) => write!(f, "audio stream error: {}", msg),
        }
    }
}

impl std::error::Error for AudioDeviceError {}

//! # Playback Queue
//!
//! In-order, gapless playback of received audio frames. The queue is an
//! explicit FIFO with a single "currently playing" slot: frame n+1 starts
//! only when frame n has been fully consumed, which makes the no-overlap
//! invariant auditable instead of an accident of scheduling.
//!
//! ## Key Behaviors:
//! - **Arrival order**: frames play exactly in the order enqueued, never
//!   reordered or overlapped
//! - **Bursty delivery**: frames may arrive much faster than real time; the
//!   backlog grows unboundedly rather than dropping audio, because dropped
//!   audio is a worse failure than a few hundred milliseconds of latency
//! - **Speaking signal**: true from the moment the first queued frame after
//!   a silence starts playing until the queue drains to empty
//!
//! The queue is owned by exactly one connection; the only concurrent access
//! is between the network task enqueueing frames and the audio device
//! callback draining them.

use crate::client::AudioDeviceError;
use crate::config::AudioConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// The frame currently driving the output device.
#[derive(Debug)]
struct ActiveFrame {
    samples: Vec<f32>,
    position: usize,
}

#[derive(Debug, Default)]
struct QueueInner {
    /// Frames waiting their turn, in arrival order
    pending: VecDeque<Vec<f32>>,
    /// At most one frame is active at any instant
    active: Option<ActiveFrame>,
}

/// Ordered queue of not-yet-played audio frames with a single active slot.
///
/// Clones share the same queue (the device callback holds one clone, the
/// network task another).
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<Mutex<QueueInner>>,
    /// "Engine is speaking" signal for the UI
    speaking: Arc<AtomicBool>,
    /// Total frames that have started playing (diagnostics and tests)
    frames_started: Arc<AtomicU64>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner::default())),
            speaking: Arc::new(AtomicBool::new(false)),
            frames_started: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append a decoded frame. Never drops, never blocks the caller beyond
    /// the queue lock; empty frames are ignored since they carry no audio.
    pub fn enqueue(&self, samples: Vec<f32>) {
        if samples.is_empty() {
            return;
        }
        self.inner.lock().unwrap().pending.push_back(samples);
    }

    /// Fill an output buffer from the queue. This is the output device
    /// callback's entry point.
    ///
    /// ## Chain-to-next-on-completion:
    /// Samples come from the active frame until it is exhausted; only then
    /// is the next pending frame promoted to the active slot. Silence is
    /// emitted when nothing is queued, and the speaking signal follows the
    /// promote/drain transitions.
    pub fn fill(&self, out: &mut [f32]) {
        let mut inner = self.inner.lock().unwrap();

        for slot in out.iter_mut() {
            if inner.active.is_none() {
                match inner.pending.pop_front() {
                    Some(samples) => {
                        inner.active = Some(ActiveFrame { samples, position: 0 });
                        self.frames_started.fetch_add(1, Ordering::Relaxed);
                        self.speaking.store(true, Ordering::Relaxed);
                    }
                    None => {
                        // Queue drained: silence until the next frame arrives
                        self.speaking.store(false, Ordering::Relaxed);
                        *slot = 0.0;
                        continue;
                    }
                }
            }

            // Borrow is re-established each iteration; the frame is retired
            // the moment its last sample is consumed
            let finished = {
                let frame = inner.active.as_mut().unwrap();
                *slot = frame.samples[frame.position];
                frame.position += 1;
                frame.position >= frame.samples.len()
            };
            if finished {
                inner.active = None;
            }
        }
    }

    /// True while queued audio is being played.
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }

    /// Frames promoted to the active slot so far.
    pub fn frames_started(&self) -> u64 {
        self.frames_started.load(Ordering::Relaxed)
    }

    /// Frames waiting behind the active one.
    pub fn backlog(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Build and start the speaker output stream, draining `queue`.
///
/// The returned stream must be kept alive for the duration of the
/// conversation; dropping it stops playback.
pub fn start_playback(
    audio: &AudioConfig,
    queue: PlaybackQueue,
) -> Result<cpal::Stream, AudioDeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioDeviceError::NoDevice("no default output device".to_string()))?;

    let config = cpal::StreamConfig {
        channels: audio.channels as cpal::ChannelCount,
        sample_rate: cpal::SampleRate(audio.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                queue.fill(data);
            },
            |err| tracing::error!(error = %err, "Output stream error"),
            None,
        )
        .map_err(|err| AudioDeviceError::Stream(err.to_string()))?;

    stream
        .play()
        .map_err(|err| AudioDeviceError::Stream(err.to_string()))?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drain the queue through small output buffers, the way a device
    /// callback would, and collect everything played.
    fn drain(queue: &PlaybackQueue, buffer_len: usize, calls: usize) -> Vec<f32> {
        let mut played = Vec::new();
        let mut buffer = vec![0.0f32; buffer_len];
        for _ in 0..calls {
            queue.fill(&mut buffer);
            played.extend_from_slice(&buffer);
        }
        played
    }

    /// Frames play in arrival order, each one contiguous and complete,
    /// regardless of how the output buffer slices them.
    #[test]
    fn test_frames_play_in_order_without_overlap() {
        let queue = PlaybackQueue::new();

        // Distinguishable constant-valued frames of awkward lengths
        queue.enqueue(vec![0.1; 7]);
        queue.enqueue(vec![0.2; 5]);
        queue.enqueue(vec![0.3; 9]);

        let played = drain(&queue, 4, 8);  // 32 slots for 21 samples

        let mut expected = Vec::new();
        expected.extend_from_slice(&[0.1; 7]);
        expected.extend_from_slice(&[0.2; 5]);
        expected.extend_from_slice(&[0.3; 9]);
        expected.resize(32, 0.0);  // Trailing silence after the queue drains

        assert_eq!(played, expected);
        assert_eq!(queue.frames_started(), 3);
    }

    /// Frame n+1 never starts before frame n finishes, even when frames
    /// arrive while playback is underway (jittered delivery).
    #[test]
    fn test_later_arrivals_wait_their_turn() {
        let queue = PlaybackQueue::new();
        let mut buffer = vec![0.0f32; 4];

        queue.enqueue(vec![0.5; 6]);
        queue.fill(&mut buffer);  // 4 of 6 samples consumed
        assert_eq!(buffer, vec![0.5; 4]);

        // A burst arrives mid-frame; the active frame keeps the device
        queue.enqueue(vec![0.7; 2]);
        queue.enqueue(vec![0.9; 2]);

        queue.fill(&mut buffer);
        // Remaining 2 samples of frame 1, then all of frame 2
        assert_eq!(buffer, vec![0.5, 0.5, 0.7, 0.7]);

        queue.fill(&mut buffer);
        assert_eq!(buffer, vec![0.9, 0.9, 0.0, 0.0]);
    }

    /// The speaking signal rises with the first frame after silence and
    /// falls only when the queue fully drains.
    #[test]
    fn test_speaking_signal() {
        let queue = PlaybackQueue::new();
        let mut buffer = vec![0.0f32; 4];

        assert!(!queue.is_speaking());

        queue.enqueue(vec![0.4; 6]);
        queue.fill(&mut buffer);
        assert!(queue.is_speaking());

        // Still speaking while the tail of the frame plays
        queue.fill(&mut buffer);
        assert!(!queue.is_speaking(), "queue drained, signal should fall");

        // A new frame after silence raises it again
        queue.enqueue(vec![0.4; 4]);
        queue.fill(&mut buffer);
        assert!(queue.is_speaking());
    }

    /// Bursty delivery grows the backlog; nothing is dropped.
    #[test]
    fn test_unbounded_backlog_keeps_everything() {
        let queue = PlaybackQueue::new();

        for i in 0..500 {
            queue.enqueue(vec![i as f32; 3]);
        }
        assert_eq!(queue.backlog(), 500);

        let played = drain(&queue, 300, 5);  // 1500 slots for 1500 samples
        for i in 0..500 {
            assert_eq!(played[i * 3..i * 3 + 3], [i as f32; 3]);
        }
        assert_eq!(queue.frames_started(), 500);
    }

    /// Empty frames are ignored rather than wedging the active slot.
    #[test]
    fn test_empty_frames_ignored() {
        let queue = PlaybackQueue::new();
        queue.enqueue(Vec::new());
        queue.enqueue(vec![0.6; 2]);

        let mut buffer = vec![0.0f32; 2];
        queue.fill(&mut buffer);
        assert_eq!(buffer, vec![0.6; 2]);
    }
}

//! # Microphone Capture
//!
//! Acquires the microphone input stream and turns it into fixed-size PCM
//! frames ready for the wire. The audio device callback runs on a real-time
//! thread and must NEVER block on network I/O: finished frames are handed
//! off with `try_send` on a bounded channel, and when the network side falls
//! behind, frames are dropped and counted rather than stalling the device.

use crate::client::pcm;
use crate::client::AudioDeviceError;
use crate::config::AudioConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Accumulates arbitrary-sized device callbacks into fixed-size blocks.
///
/// Device callbacks deliver whatever buffer size the host picked; the wire
/// wants exactly `frame_samples` per frame. Carry-over between callbacks
/// lives here.
pub struct FrameChunker {
    frame_samples: usize,
    block: Vec<f32>,
}

impl FrameChunker {
    pub fn new(frame_samples: usize) -> Self {
        Self {
            frame_samples,
            block: Vec::with_capacity(frame_samples),
        }
    }

    /// Feed captured samples; `emit` is called once per completed block.
    pub fn push(&mut self, input: &[f32], mut emit: impl FnMut(&[f32])) {
        for &sample in input {
            self.block.push(sample);
            if self.block.len() == self.frame_samples {
                emit(&self.block);
                self.block.clear();
            }
        }
    }

    /// Samples waiting for the next callback to complete a block.
    pub fn buffered(&self) -> usize {
        self.block.len()
    }
}

/// A running microphone capture.
///
/// Dropping the handle stops capture (the cpal stream lives exactly as long
/// as this struct).
pub struct CaptureHandle {
    /// Encoded frames ready to transmit, in capture order
    pub frames: mpsc::Receiver<Vec<u8>>,

    /// Frames dropped because the network side fell behind
    pub dropped: Arc<AtomicU64>,

    // cpal stream kept alive for the duration of the conversation
    _stream: cpal::Stream,
}

/// Open the default microphone and start producing frames.
///
/// ## Backpressure policy:
/// The channel holds `capture_queue_frames` encoded frames. The device
/// callback uses `try_send`: a full queue drops the frame and bumps the
/// counter. Capture never waits on the network.
pub fn start_capture(audio: &AudioConfig) -> Result<CaptureHandle, AudioDeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| AudioDeviceError::NoDevice("no default input device".to_string()))?;

    let config = cpal::StreamConfig {
        channels: audio.channels as cpal::ChannelCount,
        sample_rate: cpal::SampleRate(audio.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let (frames_tx, frames_rx) = mpsc::channel::<Vec<u8>>(audio.capture_queue_frames);
    let dropped = Arc::new(AtomicU64::new(0));

    let mut chunker = FrameChunker::new(audio.frame_samples);
    let callback_dropped = dropped.clone();

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                chunker.push(data, |block| {
                    let frame = pcm::encode_frame(block);
                    if frames_tx.try_send(frame).is_err() {
                        // Queue full or receiver gone; dropping beats
                        // stalling the device thread
                        callback_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                });
            },
            |err| tracing::error!(error = %err, "Input stream error"),
            None,
        )
        .map_err(|err| AudioDeviceError::Stream(err.to_string()))?;

    stream
        .play()
        .map_err(|err| AudioDeviceError::Stream(err.to_string()))?;

    tracing::info!(
        sample_rate = audio.sample_rate,
        frame_samples = audio.frame_samples,
        "Microphone capture started"
    );

    Ok(CaptureHandle {
        frames: frames_rx,
        dropped,
        _stream: stream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Odd callback sizes still produce exact fixed-size blocks in order.
    #[test]
    fn test_chunker_reassembles_fixed_blocks() {
        let mut chunker = FrameChunker::new(4);
        let mut blocks: Vec<Vec<f32>> = Vec::new();

        // 3 + 4 + 3 = 10 samples -> two full blocks, two left over
        chunker.push(&[0.0, 0.1, 0.2], |b| blocks.push(b.to_vec()));
        chunker.push(&[0.3, 0.4, 0.5, 0.6], |b| blocks.push(b.to_vec()));
        chunker.push(&[0.7, 0.8, 0.9], |b| blocks.push(b.to_vec()));

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], vec![0.0, 0.1, 0.2, 0.3]);
        assert_eq!(blocks[1], vec![0.4, 0.5, 0.6, 0.7]);
        assert_eq!(chunker.buffered(), 2);
    }

    /// A callback larger than several blocks emits them all.
    #[test]
    fn test_chunker_handles_large_callbacks() {
        let mut chunker = FrameChunker::new(2);
        let mut count = 0;

        chunker.push(&[0.0; 7], |_| count += 1);
        assert_eq!(count, 3);
        assert_eq!(chunker.buffered(), 1);
    }

    /// The handoff never blocks: a full queue drops and counts.
    #[tokio::test]
    async fn test_try_send_drops_when_full() {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(2);
        let dropped = AtomicU64::new(0);

        for _ in 0..5 {
            if tx.try_send(vec![0u8; 4]).is_err() {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        assert_eq!(dropped.load(Ordering::Relaxed), 3);
        // The frames that made it are intact and in order
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
    }
}

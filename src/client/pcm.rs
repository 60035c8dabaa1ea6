//! # PCM Sample Format Conversion
//!
//! Converts between the audio device's normalized floating-point samples and
//! the wire format: linear 16-bit signed little-endian PCM, mono, one frame
//! per message. No framing header exists because the transport itself is
//! message-delimited.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Why a received binary frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PcmError {
    /// Zero-length frame
    Empty,
    /// Not an even number of bytes, so not a run of 16-bit samples
    OddLength(usize),
}

impl std::fmt::Display for PcmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PcmError::Empty => write!(f, "empty audio frame"),
            PcmError::OddLength(len) => {
                write!(f, "audio frame length {} is not a whole number of samples", len)
            }
        }
    }
}

/// Encode normalized floating-point samples into one wire frame.
///
/// ## Saturating rounding:
/// Each sample is clamped to [-1.0, 1.0], scaled by 32768, rounded to
/// nearest, and saturated into the i16 range (so +1.0 lands on 32767, one
/// quantization step below the unreachable +32768).
pub fn encode_frame(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);

    for &sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * 32768.0).round();
        let value = scaled.clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    bytes
}

/// Decode one wire frame back into normalized floating-point samples.
///
/// Samples are scaled from [-32768, 32767] to [-1.0, 1.0).
pub fn decode_frame(bytes: &[u8]) -> Result<Vec<f32>, PcmError> {
    if bytes.is_empty() {
        return Err(PcmError::Empty);
    }
    if bytes.len() % 2 != 0 {
        return Err(PcmError::OddLength(bytes.len()));
    }

    let mut cursor = Cursor::new(bytes);
    let mut samples = Vec::with_capacity(bytes.len() / 2);

    // Read each 16-bit sample (little-endian format)
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample as f32 / 32768.0);
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One quantization step of the 16-bit format.
    const STEP: f32 = 1.0 / 32768.0;

    /// Encoding a known waveform and decoding it back reproduces every
    /// sample within one quantization step.
    #[test]
    fn test_round_trip_within_one_step() {
        let waveform: Vec<f32> = (0..4096)
            .map(|i| (i as f32 * 0.013).sin())  // Full-scale sine sweep
            .collect();

        let decoded = decode_frame(&encode_frame(&waveform)).unwrap();
        assert_eq!(decoded.len(), waveform.len());

        for (i, (original, decoded)) in waveform.iter().zip(decoded.iter()).enumerate() {
            let diff = (original - decoded).abs();
            assert!(
                diff <= STEP * 1.0001,
                "sample {} off by {} (> one step): {} vs {}",
                i, diff, original, decoded
            );
        }
    }

    /// Out-of-range input saturates instead of wrapping.
    #[test]
    fn test_clipping_saturates() {
        let bytes = encode_frame(&[2.0, -2.0, 1.0, -1.0]);
        let decoded = decode_frame(&bytes).unwrap();

        assert_eq!(decoded[0], 32767.0 / 32768.0);  // +2.0 clamps to full scale
        assert_eq!(decoded[1], -1.0);               // -2.0 clamps to -32768
        assert_eq!(decoded[2], 32767.0 / 32768.0);
        assert_eq!(decoded[3], -1.0);
    }

    /// Silence is exactly representable.
    #[test]
    fn test_silence_is_exact() {
        let decoded = decode_frame(&encode_frame(&[0.0; 64])).unwrap();
        assert!(decoded.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert_eq!(decode_frame(&[]), Err(PcmError::Empty));
        assert_eq!(decode_frame(&[0u8; 15]), Err(PcmError::OddLength(15)));
    }

    #[test]
    fn test_encode_is_little_endian() {
        // 0.5 * 32768 = 16384 = 0x4000, little-endian on the wire
        let bytes = encode_frame(&[0.5]);
        assert_eq!(bytes, vec![0x00, 0x40]);
    }
}

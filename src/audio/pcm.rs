//! PCM sample conversion and the base64 framing used on the wire.
//!
//! Capture and playback run in two fixed clock domains (16 kHz in, 24 kHz
//! out); nothing in here resamples between them.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;
/// Samples per capture frame (~128 ms at 16 kHz).
pub const FRAME_SAMPLES: usize = 2048;

/// One frame of mono PCM16 audio tagged with its clock domain.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn capture(samples: Vec<i16>) -> Self {
        Self { samples, sample_rate: CAPTURE_SAMPLE_RATE }
    }

    pub fn playback(samples: Vec<i16>) -> Self {
        Self { samples, sample_rate: PLAYBACK_SAMPLE_RATE }
    }
}

/// Saturating float-to-PCM16 conversion. The scale is asymmetric so that
/// +1.0 still fits in 16 bits.
pub fn sample_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0).round() as i16
    } else {
        (s * 32767.0).round() as i16
    }
}

pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples.iter().copied().map(sample_to_i16).collect()
}

/// Root-mean-square level of a float frame. Advisory loudness only, never
/// used to gate transmission.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Encode PCM16 samples as base64 over little-endian bytes.
pub fn encode_base64(samples: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    STANDARD.encode(bytes)
}

/// Decode a base64 payload back into PCM16 samples.
pub fn decode_base64(data: &str) -> Result<Vec<i16>> {
    let bytes = STANDARD
        .decode(data)
        .context("audio payload is not valid base64")?;
    if bytes.len() % 2 != 0 {
        bail!("audio payload has odd byte length {}", bytes.len());
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    // inverse of sample_to_i16, only needed by tests
    fn sample_to_f32(value: i16) -> f32 {
        if value < 0 {
            value as f32 / 32768.0
        } else {
            value as f32 / 32767.0
        }
    }

    #[test]
    fn scaling_endpoints() {
        assert_eq!(sample_to_i16(1.0), 32767);
        assert_eq!(sample_to_i16(-1.0), -32768);
        assert_eq!(sample_to_i16(0.0), 0);
    }

    #[test]
    fn scaling_saturates_out_of_range() {
        assert_eq!(sample_to_i16(2.5), 32767);
        assert_eq!(sample_to_i16(-7.0), -32768);
    }

    #[test]
    fn quantization_round_trips() {
        for v in [-32768i16, -32767, -12345, -1, 0, 1, 999, 12345, 32766, 32767] {
            assert_eq!(sample_to_i16(sample_to_f32(v)), v);
        }
    }

    #[test]
    fn base64_round_trip() {
        let samples = vec![0i16, 1, -1, 32767, -32768, 512];
        let encoded = encode_base64(&samples);
        assert_eq!(decode_base64(&encoded).unwrap(), samples);
    }

    #[test]
    fn base64_known_vector() {
        assert_eq!(encode_base64(&[1]), "AQA=");
        assert_eq!(decode_base64("AQA=").unwrap(), vec![1i16]);
    }

    #[test]
    fn odd_length_payload_rejected() {
        // one byte cannot hold a 16-bit sample
        assert!(decode_base64("AQ==").is_err());
    }

    #[test]
    fn rms_levels() {
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(rms(&[0.0; 16]), 0.0);
        let level = rms(&[0.5; 64]);
        assert!((level - 0.5).abs() < 1e-6);
    }
}

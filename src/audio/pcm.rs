//! 16-bit PCM quantization and Base64 framing.
//!
//! Encoding (capture side):
//!
//! ```text
//! f32 ─clamp[-1,1]─▶ ×32767 ─floor─▶ i16 ─LE bytes─▶ base64 ─▶ EncodedFrame
//! ```
//!
//! Decoding (playback side) reverses it and rescales by `1 / 32768`.
//!
//! # Example
//!
//! ```rust
//! use safechat_voice::audio::pcm;
//!
//! let frame = pcm::encode_samples(&[0.5, -0.5, 0.5, -0.5]);
//! assert_eq!(frame.as_str(), "/z8AwP8/AMA=");
//!
//! let pcm = pcm::decode(&frame).unwrap();
//! assert_eq!(pcm.samples, vec![16383, -16384, 16383, -16384]);
//! ```

use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

use super::frame::{EncodedFrame, PcmFrame};

/// Scale applied when quantizing `f32` to `i16`.
pub const ENCODE_SCALE: f32 = 32_767.0;

/// Divisor applied when rescaling decoded `i16` back to `f32`.
pub const DECODE_SCALE: f32 = 32_768.0;

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// Why an [`EncodedFrame`] could not be turned back into PCM.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    /// Byte count is odd, so the last sample is incomplete.
    #[error("truncated PCM payload: {bytes} bytes is not a whole number of 16-bit samples")]
    Truncated { bytes: usize },
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Quantize one sample: clamp to `[-1.0, 1.0]`, scale by 32767, floor.
///
/// NaN maps to `0`.  The result is always within `[-32767, 32767]`.
#[inline]
pub fn quantize(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * ENCODE_SCALE).floor() as i16
}

/// Quantize a whole block of samples.
pub fn quantize_frame(samples: &[f32]) -> PcmFrame {
    PcmFrame::new(samples.iter().map(|&s| quantize(s)).collect())
}

/// Base64-encode a [`PcmFrame`]'s little-endian bytes.
pub fn encode(pcm: &PcmFrame) -> EncodedFrame {
    EncodedFrame::from_base64(STANDARD.encode(pcm.to_le_bytes()))
}

/// Quantize and encode `samples` in one step.
pub fn encode_samples(samples: &[f32]) -> EncodedFrame {
    encode(&quantize_frame(samples))
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode an [`EncodedFrame`] into little-endian 16-bit samples.
///
/// # Errors
///
/// [`DecodeError::InvalidBase64`] when the text is not standard Base64,
/// [`DecodeError::Truncated`] when the payload has an odd byte count.
pub fn decode(frame: &EncodedFrame) -> Result<PcmFrame, DecodeError> {
    let bytes = STANDARD
        .decode(frame.as_str())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;

    if bytes.len() % 2 != 0 {
        return Err(DecodeError::Truncated { bytes: bytes.len() });
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok(PcmFrame::new(samples))
}

/// Rescale 16-bit samples to `f32` by dividing by 32768.
pub fn to_f32(pcm: &PcmFrame) -> Vec<f32> {
    pcm.samples.iter().map(|&s| s as f32 / DECODE_SCALE).collect()
}

/// Decode straight to `f32` samples.
pub fn decode_to_f32(frame: &EncodedFrame) -> Result<Vec<f32>, DecodeError> {
    decode(frame).map(|pcm| to_f32(&pcm))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

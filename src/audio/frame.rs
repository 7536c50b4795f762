//! Frame types flowing through the capture and playback pipeline.
//!
//! ```text
//! AudioFrame (f32, native rate) ─resample─▶ AudioFrame (f32, 16 kHz)
//!            ─quantize─▶ PcmFrame (i16) ─base64─▶ EncodedFrame (text)
//! ```

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// A single block of audio as delivered by the audio subsystem.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]`.  The capture
/// pipeline downmixes to mono before resampling, so every frame leaving the
/// resampler has `channels == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this frame in Hz (e.g. 44100, 48000, 16000).
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono).
    pub channels: u16,
}

impl AudioFrame {
    /// Build a mono frame.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Returns `true` when the frame carries no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the frame in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }
}

// ---------------------------------------------------------------------------
// PcmFrame
// ---------------------------------------------------------------------------

/// Signed 16-bit PCM samples, one per resampled [`AudioFrame`] sample.
///
/// Frames produced by [`crate::audio::pcm::quantize_frame`] only contain
/// values in `[-32767, 32767]`.  Decoded frames may also contain `-32768`
/// since the remote side is not bound by that rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PcmFrame {
    pub samples: Vec<i16>,
}

impl PcmFrame {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Raw bytes, two per sample, low byte first.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for &s in &self.samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }
}

// ---------------------------------------------------------------------------
// EncodedFrame
// ---------------------------------------------------------------------------

/// Base64 text of a [`PcmFrame`]'s little-endian bytes.
///
/// Self-contained: decoding never depends on a previous frame.  Serialises
/// as a bare JSON string so it can be embedded in the live-session wire
/// format without wrapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedFrame(String);

impl EncodedFrame {
    /// Wrap an already-encoded Base64 string.
    ///
    /// No validation is performed here; malformed input is reported when
    /// the frame is decoded.
    pub fn from_base64(data: impl Into<String>) -> Self {
        Self(data.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Number of PCM samples the frame should decode to, assuming it is
    /// well formed.
    pub fn sample_count_hint(&self) -> usize {
        let trimmed = self.0.trim_end_matches('=');
        trimmed.len() * 3 / 4 / 2
    }
}

impl std::fmt::Display for EncodedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

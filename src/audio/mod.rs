//! Audio pipeline: microphone capture → resampling → PCM encoding, and the
//! reverse path for playback.
//!
//! # Pipeline
//!
//! ```text
//! AudioSource (cpal callback) → FrameProcessor { stereo_to_mono → downsample
//!     → pcm::encode } → bounded queue → frame-dispatch → on_frame(EncodedFrame)
//!
//! EncodedFrame → PlaybackDecoder { pcm::decode } → SharedPlayback → speaker
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use safechat_voice::audio::{CaptureController, CpalSource};
//! use safechat_voice::config::AudioConfig;
//!
//! # async fn example() -> Result<(), safechat_voice::audio::CaptureError> {
//! let capture = CaptureController::new(Arc::new(CpalSource::new(None)), AudioConfig::default());
//! capture
//!     .start(|frame| println!("frame: {} base64 chars", frame.as_str().len()))
//!     .await?;
//! capture.stop(); // releases the microphone
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod controller;
pub mod frame;
pub mod output;
pub mod pcm;
pub mod playback;
pub mod processor;
pub mod resample;
pub mod source;

/// Sample rate of every frame sent to or received from the live session.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Channel count of every frame sent to or received from the live session.
pub const CHANNELS: u16 = 1;

pub use capture::{CpalSource, StreamHandle};
pub use controller::{CaptureController, CaptureError, CaptureStatus, PermissionStatus};
pub use frame::{AudioFrame, EncodedFrame, PcmFrame};
pub use output::CpalPlayback;
pub use pcm::DecodeError;
pub use playback::{
    PlaybackBackend, PlaybackContext, PlaybackDecoder, PlaybackError, PlaybackStats,
    SharedPlayback,
};
pub use processor::{FrameOutlet, FrameProcessor, FrameStats, FrameStatsSnapshot, PostOutcome};
pub use resample::{downsample, resample_linear, stereo_to_mono};
pub use source::{ActiveStream, AudioSource, CaptureConstraints, FrameCallback, SourceError};

#[cfg(test)]
pub use playback::MockPlayback;
#[cfg(test)]
pub use source::MockSource;

//! Platform audio-input abstraction.
//!
//! [`AudioSource`] is the seam between the capture controller and the
//! platform: the production implementation is
//! [`CpalSource`](crate::audio::CpalSource); tests inject [`MockSource`].
//!
//! The frame callback handed to [`AudioSource::open`] runs on the real-time
//! audio thread.  It must not block, allocate unboundedly or take locks
//! shared with the controller.

use thiserror::Error;

use super::frame::AudioFrame;

// ---------------------------------------------------------------------------
// SourceError
// ---------------------------------------------------------------------------

/// Errors reported by an [`AudioSource`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SourceError {
    /// The platform has no audio-capture capability at all.
    #[error("audio capture is not available: {0}")]
    Unavailable(String),

    /// Access to the microphone was refused.
    #[error("microphone access denied: {0}")]
    Denied(String),

    /// Access was granted but the device could not be opened or started.
    #[error("audio device error: {0}")]
    Device(String),

    /// The device cannot deliver samples in a form the real-time pipeline
    /// can process.
    #[error("real-time audio processing is not supported: {0}")]
    Unsupported(String),
}

// ---------------------------------------------------------------------------
// CaptureConstraints
// ---------------------------------------------------------------------------

/// Requested properties of the microphone stream.
///
/// Voice-processing flags are requests; backends that cannot honour them
/// log the fact and open a plain stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Sample rate to ask the device for.  The pipeline resamples whatever
    /// the device actually delivers.
    pub preferred_sample_rate: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            preferred_sample_rate: super::TARGET_SAMPLE_RATE,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Callback invoked on the audio thread once per device frame.
pub type FrameCallback = Box<dyn FnMut(AudioFrame) + Send + 'static>;

/// A running input stream.  Dropping it must also stop the stream.
pub trait ActiveStream: Send {
    /// Stop delivering frames and release the device.  Idempotent.
    fn stop(&mut self);
}

/// A microphone provider.
///
/// `request_access` and `open` may block for an arbitrary time (device
/// enumeration, OS permission prompts); the controller calls them from
/// `tokio::task::spawn_blocking`.
pub trait AudioSource: Send + Sync {
    /// Ask for microphone access without starting a capture.
    fn request_access(&self) -> Result<(), SourceError>;

    /// Whether the platform can run the real-time processing callback.
    fn supports_realtime(&self) -> Result<(), SourceError>;

    /// Open the microphone and start delivering frames to `on_frame`.
    fn open(
        &self,
        constraints: &CaptureConstraints,
        on_frame: FrameCallback,
    ) -> Result<Box<dyn ActiveStream>, SourceError>;
}

// Compile-time assertion: Box<dyn AudioSource> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn AudioSource>) {}
};

// ---------------------------------------------------------------------------
// MockSource (test only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockSource;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn default_constraints_request_voice_processing_at_16k() {
        let c = CaptureConstraints::default();
        assert!(c.echo_cancellation);
        assert!(c.noise_suppression);
        assert!(c.auto_gain_control);
        assert_eq!(c.preferred_sample_rate, 16_000);
    }

    #[test]
    fn mock_stream_stops_delivering_after_drop() {
        let source = MockSource::granting();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_cb = Arc::clone(&hits);

        let stream = source
            .open(
                &CaptureConstraints::default(),
                Box::new(move |_| {
                    hits_cb.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        source.emit(AudioFrame::mono(vec![0.0; 4], 16_000));
        drop(stream);
        source.emit(AudioFrame::mono(vec![0.0; 4], 16_000));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(source.active_streams(), 0);
    }

    #[test]
    fn source_error_display_is_informative() {
        let msg = SourceError::Denied("blocked".into()).to_string();
        assert!(msg.contains("denied"), "{msg}");
        assert!(msg.contains("blocked"), "{msg}");
    }
}

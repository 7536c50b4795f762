//! Playback of encoded response audio.
//!
//! ```text
//! EncodedFrame ─base64─▶ i16 LE ─/32768─▶ f32 ─▶ SharedPlayback ─▶ PlaybackContext
//! ```
//!
//! [`SharedPlayback`] holds one output context for the whole application.
//! The context is created on the first frame, resumed if the platform
//! suspended it, and released only by [`SharedPlayback::shutdown`].
//! [`PlaybackDecoder`] is stateless apart from its counters; a malformed
//! frame is rejected before the context is touched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use super::frame::EncodedFrame;
use super::pcm::{self, DecodeError};
use super::{CHANNELS, TARGET_SAMPLE_RATE};

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("failed to decode audio frame: {0}")]
    Decode(#[from] DecodeError),

    #[error("audio output error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// An open audio output.
pub trait PlaybackContext: Send {
    /// Rate the context expects scheduled samples at.
    fn sample_rate(&self) -> u32;

    /// Whether the platform paused the output.
    fn is_suspended(&self) -> bool;

    fn resume(&mut self) -> Result<(), PlaybackError>;

    /// Queue mono samples after everything scheduled so far.
    fn schedule(&mut self, samples: Vec<f32>) -> Result<(), PlaybackError>;

    /// Release the output device.  Idempotent.
    fn close(&mut self);
}

/// Factory for [`PlaybackContext`]s; [`CpalPlayback`](crate::audio::CpalPlayback)
/// in production, [`MockPlayback`] in tests.
pub trait PlaybackBackend: Send + Sync {
    fn create(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn PlaybackContext>, PlaybackError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn PlaybackBackend>, _: Box<dyn PlaybackContext>) {}
};

// ---------------------------------------------------------------------------
// SharedPlayback
// ---------------------------------------------------------------------------

/// The application's single, lazily created playback context.
///
/// Response audio is always 16 kHz mono, so the context is created at
/// [`TARGET_SAMPLE_RATE`] with [`CHANNELS`]; the rate is never negotiated.
pub struct SharedPlayback {
    backend: Arc<dyn PlaybackBackend>,
    context: Mutex<Option<Box<dyn PlaybackContext>>>,
}

impl SharedPlayback {
    pub fn new(backend: Arc<dyn PlaybackBackend>) -> Self {
        Self {
            backend,
            context: Mutex::new(None),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        TARGET_SAMPLE_RATE
    }

    /// `true` once a context has been created and not yet shut down.
    pub fn is_open(&self) -> bool {
        self.context.lock().is_some()
    }

    /// Schedule `samples`, creating or resuming the context first.
    ///
    /// Creation happens under the same lock as the check, so concurrent
    /// first calls still produce a single context.
    pub fn schedule(&self, samples: Vec<f32>) -> Result<(), PlaybackError> {
        let mut slot = self.context.lock();

        if slot.is_none() {
            let created = self.backend.create(TARGET_SAMPLE_RATE, CHANNELS)?;
            log::info!("playback context created ({TARGET_SAMPLE_RATE} Hz, {CHANNELS} ch)");
            *slot = Some(created);
        }

        let Some(context) = slot.as_mut() else {
            return Err(PlaybackError::Backend("playback context unavailable".into()));
        };

        if context.is_suspended() {
            log::debug!("resuming suspended playback context");
            context.resume()?;
        }
        context.schedule(samples)
    }

    /// Close the context.  The next `schedule` creates a fresh one.
    pub fn shutdown(&self) {
        if let Some(mut context) = self.context.lock().take() {
            context.close();
            log::info!("playback context closed");
        }
    }
}

impl Drop for SharedPlayback {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// PlaybackDecoder
// ---------------------------------------------------------------------------

/// Counters kept by a [`PlaybackDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackStats {
    pub frames_played: u64,
    pub samples_played: u64,
    pub decode_failures: u64,
    pub backend_failures: u64,
}

/// Turns response frames into scheduled audio.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use safechat_voice::audio::{pcm, CpalPlayback, PlaybackDecoder, SharedPlayback};
///
/// let playback = SharedPlayback::new(Arc::new(CpalPlayback::new(None)));
/// let decoder = PlaybackDecoder::new();
/// let frame = pcm::encode_samples(&[0.0; 160]);
/// decoder.play(&playback, &frame).unwrap();
/// playback.shutdown();
/// ```
#[derive(Debug, Default)]
pub struct PlaybackDecoder {
    frames_played: AtomicU64,
    samples_played: AtomicU64,
    decode_failures: AtomicU64,
    backend_failures: AtomicU64,
}

impl PlaybackDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `frame` and schedule it.  Returns the number of samples
    /// scheduled.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::Decode`] for malformed frames (the context is not
    /// created or touched), [`PlaybackError::Backend`] when the output
    /// could not be created, resumed or fed.
    pub fn play(&self, playback: &SharedPlayback, frame: &EncodedFrame) -> Result<usize, PlaybackError> {
        let samples = match pcm::decode_to_f32(frame) {
            Ok(samples) => samples,
            Err(e) => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("dropping malformed audio frame: {e}");
                return Err(e.into());
            }
        };

        if samples.is_empty() {
            return Ok(0);
        }

        let count = samples.len();
        if let Err(e) = playback.schedule(samples) {
            self.backend_failures.fetch_add(1, Ordering::Relaxed);
            log::error!("Error playing audio: {e}");
            return Err(e);
        }

        self.frames_played.fetch_add(1, Ordering::Relaxed);
        self.samples_played.fetch_add(count as u64, Ordering::Relaxed);
        Ok(count)
    }

    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            frames_played: self.frames_played.load(Ordering::Relaxed),
            samples_played: self.samples_played.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            backend_failures: self.backend_failures.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// MockPlayback (test only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockPlayback;

#[cfg(test)]
mod mock {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorded {
        scheduled: Vec<Vec<f32>>,
        formats: Vec<(u32, u16)>,
        resumes: usize,
        closes: usize,
    }

    /// Backend that records everything scheduled on its contexts.
    #[derive(Default)]
    pub struct MockPlayback {
        recorded: Arc<Mutex<Recorded>>,
        created: AtomicUsize,
        start_suspended: AtomicBool,
        fail_create: AtomicBool,
    }

    impl MockPlayback {
        pub fn new() -> Self {
            Self::default()
        }

        /// New contexts start suspended, as a browser-style output would.
        pub fn suspended() -> Self {
            let backend = Self::default();
            backend.start_suspended.store(true, Ordering::SeqCst);
            backend
        }

        pub fn set_fail_create(&self, fail: bool) {
            self.fail_create.store(fail, Ordering::SeqCst);
        }

        pub fn contexts_created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }

        pub fn scheduled(&self) -> Vec<Vec<f32>> {
            self.recorded.lock().scheduled.clone()
        }

        /// `(sample_rate, channels)` of every context created.
        pub fn created_formats(&self) -> Vec<(u32, u16)> {
            self.recorded.lock().formats.clone()
        }

        pub fn resumes(&self) -> usize {
            self.recorded.lock().resumes
        }

        pub fn closes(&self) -> usize {
            self.recorded.lock().closes
        }
    }

    impl PlaybackBackend for MockPlayback {
        fn create(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn PlaybackContext>, PlaybackError> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(PlaybackError::Backend("no output device".into()));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            self.recorded.lock().formats.push((sample_rate, channels));
            Ok(Box::new(MockContext {
                sample_rate,
                suspended: self.start_suspended.load(Ordering::SeqCst),
                closed: false,
                recorded: Arc::clone(&self.recorded),
            }))
        }
    }

    struct MockContext {
        sample_rate: u32,
        suspended: bool,
        closed: bool,
        recorded: Arc<Mutex<Recorded>>,
    }

    impl PlaybackContext for MockContext {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn is_suspended(&self) -> bool {
            self.suspended
        }

        fn resume(&mut self) -> Result<(), PlaybackError> {
            self.suspended = false;
            self.recorded.lock().resumes += 1;
            Ok(())
        }

        fn schedule(&mut self, samples: Vec<f32>) -> Result<(), PlaybackError> {
            if self.closed {
                return Err(PlaybackError::Backend("context closed".into()));
            }
            self.recorded.lock().scheduled.push(samples);
            Ok(())
        }

        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                self.recorded.lock().closes += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(backend: &Arc<MockPlayback>) -> SharedPlayback {
        SharedPlayback::new(Arc::clone(backend) as Arc<dyn PlaybackBackend>)
    }

    #[test]
    fn frame_is_decoded_and_scheduled_at_16k() {
        let backend = Arc::new(MockPlayback::new());
        let playback = shared(&backend);
        let decoder = PlaybackDecoder::new();

        let frame = EncodedFrame::from_base64("/z8AwP8/AMA=");
        assert_eq!(decoder.play(&playback, &frame).unwrap(), 4);

        let scheduled = backend.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(
            scheduled[0],
            vec![16_383.0 / 32_768.0, -0.5, 16_383.0 / 32_768.0, -0.5]
        );
        assert_eq!(playback.sample_rate(), 16_000);
        assert_eq!(backend.created_formats(), vec![(16_000, 1)]);
    }

    #[test]
    fn context_is_created_lazily_and_reused() {
        let backend = Arc::new(MockPlayback::new());
        let playback = shared(&backend);
        let decoder = PlaybackDecoder::new();

        assert!(!playback.is_open());
        assert_eq!(backend.contexts_created(), 0);

        for v in [0.1_f32, 0.2, 0.3] {
            decoder.play(&playback, &pcm::encode_samples(&[v; 8])).unwrap();
        }

        assert!(playback.is_open());
        assert_eq!(backend.contexts_created(), 1);
        assert_eq!(backend.scheduled().len(), 3);
    }

    #[test]
    fn frames_play_in_arrival_order() {
        let backend = Arc::new(MockPlayback::new());
        let playback = shared(&backend);
        let decoder = PlaybackDecoder::new();

        for v in [0.25_f32, -0.25, 0.75] {
            decoder.play(&playback, &pcm::encode_samples(&[v])).unwrap();
        }

        let firsts: Vec<i16> = backend
            .scheduled()
            .iter()
            .map(|s| (s[0] * 32_768.0) as i16)
            .collect();
        assert_eq!(
            firsts,
            vec![pcm::quantize(0.25), pcm::quantize(-0.25), pcm::quantize(0.75)]
        );
    }

    #[test]
    fn suspended_context_is_resumed_before_scheduling() {
        let backend = Arc::new(MockPlayback::suspended());
        let playback = shared(&backend);
        let decoder = PlaybackDecoder::new();

        decoder.play(&playback, &pcm::encode_samples(&[0.1; 4])).unwrap();
        decoder.play(&playback, &pcm::encode_samples(&[0.1; 4])).unwrap();

        assert_eq!(backend.resumes(), 1);
    }

    #[test]
    fn malformed_frame_does_not_touch_context() {
        let backend = Arc::new(MockPlayback::new());
        let playback = shared(&backend);
        let decoder = PlaybackDecoder::new();

        let err = decoder
            .play(&playback, &EncodedFrame::from_base64("AQID"))
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Decode(DecodeError::Truncated { bytes: 3 })));
        assert!(!playback.is_open());

        let err = decoder
            .play(&playback, &EncodedFrame::from_base64("%%%"))
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Decode(DecodeError::InvalidBase64(_))));

        // Later valid frames still play.
        decoder.play(&playback, &pcm::encode_samples(&[0.5; 2])).unwrap();
        assert_eq!(backend.scheduled().len(), 1);

        let stats = decoder.stats();
        assert_eq!(stats.decode_failures, 2);
        assert_eq!(stats.frames_played, 1);
        assert_eq!(stats.samples_played, 2);
    }

    #[test]
    fn empty_frame_schedules_nothing() {
        let backend = Arc::new(MockPlayback::new());
        let playback = shared(&backend);
        let decoder = PlaybackDecoder::new();

        assert_eq!(decoder.play(&playback, &EncodedFrame::from_base64("")).unwrap(), 0);
        assert!(!playback.is_open());
    }

    #[test]
    fn backend_failure_is_reported_and_retried_next_frame() {
        let backend = Arc::new(MockPlayback::new());
        backend.set_fail_create(true);
        let playback = shared(&backend);
        let decoder = PlaybackDecoder::new();
        let frame = pcm::encode_samples(&[0.1; 4]);

        let err = decoder.play(&playback, &frame).unwrap_err();
        assert!(matches!(err, PlaybackError::Backend(_)), "{err}");
        assert!(!playback.is_open());

        backend.set_fail_create(false);
        decoder.play(&playback, &frame).unwrap();
        assert_eq!(backend.contexts_created(), 1);
        assert_eq!(decoder.stats().backend_failures, 1);
    }

    #[test]
    fn shutdown_closes_once_and_allows_recreation() {
        let backend = Arc::new(MockPlayback::new());
        let playback = shared(&backend);
        let decoder = PlaybackDecoder::new();
        let frame = pcm::encode_samples(&[0.1; 4]);

        decoder.play(&playback, &frame).unwrap();
        playback.shutdown();
        playback.shutdown();
        assert_eq!(backend.closes(), 1);
        assert!(!playback.is_open());

        decoder.play(&playback, &frame).unwrap();
        assert_eq!(backend.contexts_created(), 2);
    }

    #[test]
    fn concurrent_first_frames_create_one_context() {
        let backend = Arc::new(MockPlayback::new());
        let playback = Arc::new(shared(&backend));
        let decoder = Arc::new(PlaybackDecoder::new());

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let playback = Arc::clone(&playback);
                let decoder = Arc::clone(&decoder);
                std::thread::spawn(move || {
                    decoder
                        .play(&playback, &pcm::encode_samples(&[0.2; 16]))
                        .unwrap();
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        assert_eq!(backend.contexts_created(), 1);
        assert_eq!(decoder.stats().frames_played, 8);
    }
}

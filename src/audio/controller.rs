//! Capture controller: permission, lifecycle and frame delivery.
//!
//! [`CaptureController`] is the main-thread side of the capture pipeline.
//! It owns at most one active capture at a time:
//!
//! ```text
//! start(on_frame)
//!   ├─ permission (request if Unknown / Denied)
//!   ├─ real-time capability check
//!   ├─ AudioSource::open ── audio thread ──▶ FrameProcessor ──try_send──┐
//!   └─ frame-dispatch thread ◀──────────── bounded queue ◀──────────────┘
//!          └─▶ on_frame(EncodedFrame)
//! ```
//!
//! `stop()` is idempotent.  A `stop()` that lands while a `start()` is still
//! waiting on the device bumps a generation counter; the late `start()`
//! sees the mismatch, releases what it acquired and returns
//! [`CaptureError::Aborted`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::AudioConfig;

use super::frame::EncodedFrame;
use super::processor::{FrameOutlet, FrameProcessor, FrameStats, FrameStatsSnapshot};
use super::source::{ActiveStream, AudioSource, FrameCallback, SourceError};

// ---------------------------------------------------------------------------
// Status types
// ---------------------------------------------------------------------------

/// Cached outcome of the last permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionStatus {
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// Lifecycle of the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureStatus {
    #[default]
    Idle,
    /// `start()` is waiting on permission or the device.
    Starting,
    Capturing,
}

impl CaptureStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CaptureStatus::Idle => "Idle",
            CaptureStatus::Starting => "Starting",
            CaptureStatus::Capturing => "Capturing",
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Reasons a `start()` call was rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    #[error("microphone permission not granted: {0}")]
    PermissionDenied(String),

    /// Real-time processing is unavailable; retrying will not help.
    #[error("real-time audio processing unsupported: {0}")]
    Unsupported(String),

    #[error("failed to open microphone: {0}")]
    Device(String),

    /// `stop()` was called while the start was still in flight.
    #[error("capture start cancelled by stop()")]
    Aborted,

    #[error("internal capture error: {0}")]
    Internal(String),
}

impl From<SourceError> for CaptureError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::Unavailable(msg) | SourceError::Denied(msg) => {
                CaptureError::PermissionDenied(msg)
            }
            SourceError::Device(msg) => CaptureError::Device(msg),
            SourceError::Unsupported(msg) => CaptureError::Unsupported(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureController
// ---------------------------------------------------------------------------

struct ActiveCapture {
    stream: Box<dyn ActiveStream>,
    /// Cleared on stop so queued frames are not delivered afterwards.
    running: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Inner {
    permission: PermissionStatus,
    status: CaptureStatus,
    last_error: Option<String>,
    generation: u64,
    active: Option<ActiveCapture>,
    stats: Arc<FrameStats>,
}

/// Main-thread owner of the microphone capture.
///
/// Share it behind an `Arc`; every method takes `&self`.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use safechat_voice::audio::{CaptureController, CpalSource};
/// use safechat_voice::config::AudioConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let capture = CaptureController::new(Arc::new(CpalSource::new(None)), AudioConfig::default());
/// capture
///     .start(|frame| println!("{} bytes of base64", frame.as_str().len()))
///     .await?;
/// // ...
/// capture.stop();
/// # Ok(())
/// # }
/// ```
pub struct CaptureController {
    source: Arc<dyn AudioSource>,
    config: AudioConfig,
    inner: Mutex<Inner>,
}

impl CaptureController {
    pub fn new(source: Arc<dyn AudioSource>, config: AudioConfig) -> Self {
        Self {
            source,
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    // -----------------------------------------------------------------------
    // State accessors
    // -----------------------------------------------------------------------

    pub fn permission(&self) -> PermissionStatus {
        self.inner.lock().permission
    }

    pub fn status(&self) -> CaptureStatus {
        self.inner.lock().status
    }

    pub fn is_capturing(&self) -> bool {
        self.status() == CaptureStatus::Capturing
    }

    /// Message of the most recent failure, cleared by the next `start()` or
    /// successful permission request.
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    /// Counters of the current (or most recent) capture session.
    pub fn stats(&self) -> FrameStatsSnapshot {
        self.inner.lock().stats.snapshot()
    }

    // -----------------------------------------------------------------------
    // Permission
    // -----------------------------------------------------------------------

    /// Ask the platform for microphone access and cache the outcome.
    ///
    /// Does not start capturing.  Returns `false` when the platform has no
    /// capture capability or access is refused; the reason is available
    /// from [`last_error`](Self::last_error).
    pub async fn request_permission(&self) -> bool {
        let source = Arc::clone(&self.source);
        let result = tokio::task::spawn_blocking(move || source.request_access()).await;

        let mut inner = self.inner.lock();
        match result {
            Ok(Ok(())) => {
                log::info!("microphone access granted");
                inner.permission = PermissionStatus::Granted;
                inner.last_error = None;
                true
            }
            Ok(Err(e)) => {
                log::error!("microphone permission request failed: {e}");
                inner.permission = PermissionStatus::Denied;
                inner.last_error = Some(e.to_string());
                false
            }
            Err(e) => {
                log::error!("microphone permission task failed: {e}");
                inner.permission = PermissionStatus::Denied;
                inner.last_error = Some(format!("permission request aborted: {e}"));
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // start / stop
    // -----------------------------------------------------------------------

    /// Start capturing and deliver every encoded frame to `on_frame`.
    ///
    /// `on_frame` runs on the `frame-dispatch` thread, once per frame, in
    /// production order.  It should hand the frame off quickly; while it
    /// runs, new frames queue up and are dropped once the queue is full.
    ///
    /// Calling `start` while a capture is starting or running logs a
    /// warning and returns `Ok(())` without touching the running capture.
    ///
    /// # Errors
    ///
    /// * [`CaptureError::PermissionDenied`]: access still refused after
    ///   asking again.
    /// * [`CaptureError::Unsupported`]: no real-time processing support.
    /// * [`CaptureError::Device`]: the device could not be opened.
    /// * [`CaptureError::Aborted`]: `stop()` was called meanwhile.
    pub async fn start<F>(&self, on_frame: F) -> Result<(), CaptureError>
    where
        F: FnMut(EncodedFrame) + Send + 'static,
    {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.status != CaptureStatus::Idle {
                log::warn!(
                    "capture already {}; start() ignored",
                    inner.status.label().to_lowercase()
                );
                return Ok(());
            }
            inner.last_error = None;
            inner.status = CaptureStatus::Starting;
            inner.generation += 1;
            inner.generation
        };

        // ── 1. Permission ────────────────────────────────────────────────
        if self.permission() != PermissionStatus::Granted && !self.request_permission().await {
            let reason = self
                .last_error()
                .unwrap_or_else(|| "access refused".to_string());
            return Err(self.fail(generation, CaptureError::PermissionDenied(reason)));
        }
        if !self.is_current(generation) {
            return Err(CaptureError::Aborted);
        }

        // ── 2. Capability ────────────────────────────────────────────────
        let source = Arc::clone(&self.source);
        match tokio::task::spawn_blocking(move || source.supports_realtime()).await {
            Ok(Ok(())) => {}
            Ok(Err(SourceError::Unsupported(msg))) => {
                return Err(self.fail(generation, CaptureError::Unsupported(msg)));
            }
            Ok(Err(e)) => return Err(self.fail(generation, e.into())),
            Err(e) => {
                return Err(self.fail(generation, CaptureError::Internal(e.to_string())));
            }
        }

        // ── 3. Device + processing graph ─────────────────────────────────
        let stats = Arc::new(FrameStats::default());
        let (outlet, frames_rx) =
            FrameOutlet::bounded(self.config.frame_queue_capacity, Arc::clone(&stats));
        let mut processor = FrameProcessor::new(self.config.target_sample_rate, outlet);
        let callback: FrameCallback = Box::new(move |frame| {
            processor.handle(&frame);
        });

        let constraints = self.config.constraints();
        let source = Arc::clone(&self.source);
        let opened = tokio::task::spawn_blocking(move || source.open(&constraints, callback)).await;

        let mut stream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.fail(generation, open_error(e))),
            Err(e) => {
                return Err(self.fail(generation, CaptureError::Internal(e.to_string())));
            }
        };

        // ── 4. Commit, unless stop() raced us ────────────────────────────
        let running = Arc::new(AtomicBool::new(true));
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.status != CaptureStatus::Starting {
            drop(inner);
            stream.stop();
            log::warn!("capture start resolved after stop(); device released");
            return Err(CaptureError::Aborted);
        }

        let dispatcher =
            match spawn_dispatcher(frames_rx, on_frame, Arc::clone(&running), Arc::clone(&stats)) {
                Ok(handle) => handle,
                Err(e) => {
                    let err =
                        CaptureError::Internal(format!("failed to spawn frame-dispatch thread: {e}"));
                    inner.status = CaptureStatus::Idle;
                    inner.last_error = Some(err.to_string());
                    drop(inner);
                    stream.stop();
                    return Err(err);
                }
            };

        inner.active = Some(ActiveCapture {
            stream,
            running,
            dispatcher: Some(dispatcher),
        });
        inner.stats = stats;
        inner.status = CaptureStatus::Capturing;
        drop(inner);

        log::info!(
            "capture started (target {} Hz, queue {} frames)",
            self.config.target_sample_rate,
            self.config.frame_queue_capacity
        );
        Ok(())
    }

    /// Stop capturing and release the device.  No-op when idle.
    ///
    /// Frames still queued are discarded.  Safe to call from the frame sink
    /// itself and from cleanup paths after a failed `start()`.
    pub fn stop(&self) {
        let active = {
            let mut inner = self.inner.lock();
            match inner.status {
                CaptureStatus::Idle => {
                    log::debug!("stop(): capture not active");
                    return;
                }
                CaptureStatus::Starting => {
                    log::info!("stop(): cancelling in-flight capture start");
                    inner.generation += 1;
                    inner.status = CaptureStatus::Idle;
                    return;
                }
                CaptureStatus::Capturing => {
                    inner.status = CaptureStatus::Idle;
                    inner.active.take()
                }
            }
        };

        let Some(mut active) = active else {
            return;
        };

        active.running.store(false, Ordering::Release);
        active.stream.stop();

        if let Some(dispatcher) = active.dispatcher.take() {
            // Joining from the dispatcher itself would deadlock.
            if dispatcher.thread().id() != thread::current().id() && dispatcher.join().is_err() {
                log::error!("frame-dispatch thread panicked");
            }
        }

        let stats = self.stats();
        log::info!(
            "Recording stopped and resources released ({} frames delivered, {} dropped)",
            stats.delivered,
            stats.dropped
        );
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn is_current(&self, generation: u64) -> bool {
        let inner = self.inner.lock();
        inner.generation == generation && inner.status == CaptureStatus::Starting
    }

    /// Record a start failure.  Only resets the status if this start still
    /// owns it.
    fn fail(&self, generation: u64, err: CaptureError) -> CaptureError {
        log::error!("Error starting recording: {err}");
        let mut inner = self.inner.lock();
        inner.last_error = Some(err.to_string());
        if inner.generation == generation && inner.status == CaptureStatus::Starting {
            inner.status = CaptureStatus::Idle;
        }
        err
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Access was granted before `open`, so a missing device there means the
/// hardware went away, not that permission was refused.
fn open_error(e: SourceError) -> CaptureError {
    match e {
        SourceError::Unavailable(msg) => CaptureError::Device(msg),
        other => other.into(),
    }
}

/// Spawn the thread that hands queued frames to the caller's sink.
///
/// It exits when the processor's sender is dropped (stream stopped) or the
/// running flag is cleared.
fn spawn_dispatcher<F>(
    frames: mpsc::Receiver<EncodedFrame>,
    mut on_frame: F,
    running: Arc<AtomicBool>,
    stats: Arc<FrameStats>,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnMut(EncodedFrame) + Send + 'static,
{
    thread::Builder::new()
        .name("frame-dispatch".into())
        .spawn(move || {
            while let Ok(frame) = frames.recv() {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                on_frame(frame);
                stats.record_delivered();
            }
            log::debug!("frame-dispatch: exiting");
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audio::frame::AudioFrame;
    use crate::audio::pcm;
    use crate::audio::source::MockSource;

    const WAIT: Duration = Duration::from_secs(2);

    fn controller(source: &Arc<MockSource>) -> CaptureController {
        let source: Arc<dyn AudioSource> = Arc::clone(source) as Arc<dyn AudioSource>;
        CaptureController::new(source, AudioConfig::default())
    }

    /// Sink that forwards every frame to a std channel.
    fn channel_sink() -> (
        impl FnMut(EncodedFrame) + Send + 'static,
        mpsc::Receiver<EncodedFrame>,
    ) {
        let (tx, rx) = mpsc::channel();
        (
            move |frame| {
                let _ = tx.send(frame);
            },
            rx,
        )
    }

    fn tone(value: f32, rate: u32, len: usize) -> AudioFrame {
        AudioFrame::mono(vec![value; len], rate)
    }

    // ---- delivery ----------------------------------------------------------

    #[tokio::test]
    async fn frames_are_delivered_in_order() {
        let source = Arc::new(MockSource::granting());
        let capture = controller(&source);
        let (sink, rx) = channel_sink();

        capture.start(sink).await.unwrap();
        assert_eq!(capture.status(), CaptureStatus::Capturing);

        for v in [0.1_f32, 0.2, 0.3] {
            source.emit(tone(v, 16_000, 8));
        }

        for v in [0.1_f32, 0.2, 0.3] {
            let frame = rx.recv_timeout(WAIT).unwrap();
            let pcm = pcm::decode(&frame).unwrap();
            assert_eq!(pcm.samples, vec![pcm::quantize(v); 8]);
        }

        capture.stop();
        assert_eq!(capture.stats().delivered, 3);
    }

    #[tokio::test]
    async fn native_rate_frames_arrive_at_target_rate() {
        let source = Arc::new(MockSource::granting());
        let capture = controller(&source);
        let (sink, rx) = channel_sink();

        capture.start(sink).await.unwrap();
        source.emit(tone(0.25, 48_000, 480));

        let frame = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(pcm::decode(&frame).unwrap().len(), 160);
        capture.stop();
    }

    #[tokio::test]
    async fn empty_frames_are_not_delivered() {
        let source = Arc::new(MockSource::granting());
        let capture = controller(&source);
        let (sink, rx) = channel_sink();

        capture.start(sink).await.unwrap();
        source.emit(tone(0.0, 16_000, 0));
        source.emit(tone(0.5, 16_000, 4));

        let frame = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(frame.as_str(), pcm::encode_samples(&[0.5; 4]).as_str());
        assert_eq!(capture.stats().produced, 1);
        capture.stop();
    }

    #[tokio::test]
    async fn voice_processing_constraints_are_requested() {
        let source = Arc::new(MockSource::granting());
        let capture = controller(&source);
        let (sink, _rx) = channel_sink();

        capture.start(sink).await.unwrap();
        let c = source.last_constraints().unwrap();
        assert!(c.echo_cancellation && c.noise_suppression && c.auto_gain_control);
        capture.stop();
    }

    // ---- idempotence -------------------------------------------------------

    #[tokio::test]
    async fn second_start_is_a_noop() {
        let source = Arc::new(MockSource::granting());
        let capture = controller(&source);
        let (first, first_rx) = channel_sink();
        let (second, second_rx) = channel_sink();

        capture.start(first).await.unwrap();
        capture.start(second).await.unwrap();
        assert_eq!(source.open_count(), 1);
        assert_eq!(source.active_streams(), 1);

        source.emit(tone(0.5, 16_000, 4));
        assert!(first_rx.recv_timeout(WAIT).is_ok());
        assert!(first_rx.recv_timeout(Duration::from_millis(50)).is_err());

        // The second sink was dropped unused.
        assert!(matches!(
            second_rx.try_recv(),
            Err(mpsc::TryRecvError::Disconnected)
        ));
        capture.stop();
    }

    #[tokio::test]
    async fn stop_twice_matches_single_stop() {
        let source = Arc::new(MockSource::granting());
        let capture = controller(&source);
        let (sink, _rx) = channel_sink();

        capture.start(sink).await.unwrap();
        capture.stop();
        let after_first = (capture.status(), capture.permission(), capture.last_error());
        capture.stop();
        let after_second = (capture.status(), capture.permission(), capture.last_error());

        assert_eq!(after_first, after_second);
        assert_eq!(after_second.0, CaptureStatus::Idle);
        assert_eq!(source.active_streams(), 0);
    }

    #[tokio::test]
    async fn stop_when_never_started_is_harmless() {
        let source = Arc::new(MockSource::granting());
        let capture = controller(&source);
        capture.stop();
        assert_eq!(capture.status(), CaptureStatus::Idle);
        assert!(capture.last_error().is_none());
    }

    #[tokio::test]
    async fn no_frames_after_stop() {
        let source = Arc::new(MockSource::granting());
        let capture = controller(&source);
        let (sink, rx) = channel_sink();

        capture.start(sink).await.unwrap();
        capture.stop();
        source.emit(tone(0.5, 16_000, 4));

        assert!(matches!(rx.try_recv(), Err(mpsc::TryRecvError::Disconnected)));
    }

    #[tokio::test]
    async fn capture_can_restart_after_stop() {
        let source = Arc::new(MockSource::granting());
        let capture = controller(&source);

        let (sink, _rx) = channel_sink();
        capture.start(sink).await.unwrap();
        capture.stop();

        let (sink, rx) = channel_sink();
        capture.start(sink).await.unwrap();
        source.emit(tone(0.5, 16_000, 4));
        assert!(rx.recv_timeout(WAIT).is_ok());
        assert_eq!(source.open_count(), 2);
        capture.stop();
    }

    // ---- permission --------------------------------------------------------

    #[tokio::test]
    async fn permission_outcome_is_cached() {
        let source = Arc::new(MockSource::granting());
        let capture = controller(&source);

        assert_eq!(capture.permission(), PermissionStatus::Unknown);
        assert!(capture.request_permission().await);
        assert_eq!(capture.permission(), PermissionStatus::Granted);
        assert_eq!(capture.status(), CaptureStatus::Idle);

        let (sink, _rx) = channel_sink();
        capture.start(sink).await.unwrap();
        assert_eq!(source.access_requests(), 1);
        capture.stop();
    }

    #[tokio::test]
    async fn start_requests_permission_when_unknown() {
        let source = Arc::new(MockSource::granting());
        let capture = controller(&source);
        let (sink, _rx) = channel_sink();

        capture.start(sink).await.unwrap();
        assert_eq!(source.access_requests(), 1);
        assert_eq!(capture.permission(), PermissionStatus::Granted);
        capture.stop();
    }

    #[tokio::test]
    async fn denied_permission_rejects_start() {
        let source = Arc::new(MockSource::denying());
        let capture = controller(&source);
        let (sink, _rx) = channel_sink();

        let err = capture.start(sink).await.unwrap_err();
        assert!(matches!(err, CaptureError::PermissionDenied(_)), "{err}");
        assert_eq!(capture.permission(), PermissionStatus::Denied);
        assert_eq!(capture.status(), CaptureStatus::Idle);
        assert!(capture.last_error().is_some());
        assert_eq!(source.open_count(), 0);
    }

    #[tokio::test]
    async fn denied_permission_is_asked_again_on_start() {
        let source = Arc::new(MockSource::denying());
        let capture = controller(&source);

        assert!(!capture.request_permission().await);
        source.set_access(Ok(()));

        let (sink, _rx) = channel_sink();
        capture.start(sink).await.unwrap();
        assert_eq!(source.access_requests(), 2);
        assert!(capture.is_capturing());
        assert!(capture.last_error().is_none());
        capture.stop();
    }

    #[tokio::test]
    async fn missing_capture_capability_fails_permission() {
        let source = Arc::new(MockSource::without_capture());
        let capture = controller(&source);

        assert!(!capture.request_permission().await);
        let msg = capture.last_error().unwrap();
        assert!(msg.contains("not available"), "{msg}");
    }

    // ---- failures ----------------------------------------------------------

    #[tokio::test]
    async fn missing_realtime_support_is_distinct_error() {
        let source = Arc::new(MockSource::without_realtime());
        let capture = controller(&source);
        let (sink, _rx) = channel_sink();

        let err = capture.start(sink).await.unwrap_err();
        assert!(matches!(err, CaptureError::Unsupported(_)), "{err}");
        assert_eq!(source.open_count(), 0);
        assert_eq!(capture.status(), CaptureStatus::Idle);
    }

    #[tokio::test]
    async fn device_failure_leaves_nothing_open() {
        let source = Arc::new(MockSource::failing_open());
        let capture = controller(&source);
        let (sink, _rx) = channel_sink();

        let err = capture.start(sink).await.unwrap_err();
        assert!(matches!(err, CaptureError::Device(_)), "{err}");
        assert_eq!(source.active_streams(), 0);
        assert_eq!(capture.status(), CaptureStatus::Idle);
        assert_eq!(capture.last_error(), Some(err.to_string()));

        // Cleanup path after a failed start.
        capture.stop();
        assert_eq!(capture.status(), CaptureStatus::Idle);
    }

    #[tokio::test]
    async fn unplugged_device_is_a_device_error() {
        let source = Arc::new(MockSource::unplugged());
        let capture = controller(&source);
        let (sink, _rx) = channel_sink();

        let err = capture.start(sink).await.unwrap_err();
        assert!(matches!(err, CaptureError::Device(_)), "{err}");
        assert_eq!(capture.permission(), PermissionStatus::Granted);
        assert_eq!(capture.status(), CaptureStatus::Idle);
        assert!(!capture.last_error().unwrap().contains("permission"));
    }

    #[tokio::test]
    async fn ignored_second_start_keeps_last_error() {
        let source = Arc::new(MockSource::granting());
        let capture = controller(&source);
        let (sink, _rx) = channel_sink();
        capture.start(sink).await.unwrap();

        // A failed permission re-check while capturing records an error.
        source.set_access(Err(SourceError::Denied("revoked".into())));
        assert!(!capture.request_permission().await);
        let before = capture.last_error();
        assert!(before.is_some());

        let (second, _rx2) = channel_sink();
        capture.start(second).await.unwrap();
        assert_eq!(capture.last_error(), before);
        assert!(capture.is_capturing());
        capture.stop();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_during_start_prevents_late_resurrection() {
        let (source, gate) = MockSource::gated();
        let source = Arc::new(source);
        let capture = Arc::new(controller(&source));
        let (sink, _rx) = channel_sink();

        let starter = {
            let capture = Arc::clone(&capture);
            tokio::spawn(async move { capture.start(sink).await })
        };

        tokio::time::timeout(WAIT, async {
            while capture.status() != CaptureStatus::Starting {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        capture.stop();
        let _ = gate.send(());

        let result = starter.await.unwrap();
        assert_eq!(result, Err(CaptureError::Aborted));
        assert_eq!(capture.status(), CaptureStatus::Idle);
        assert_eq!(source.active_streams(), 0);
    }

    #[test]
    fn source_errors_map_to_capture_errors() {
        assert!(matches!(
            CaptureError::from(SourceError::Denied("x".into())),
            CaptureError::PermissionDenied(_)
        ));
        assert!(matches!(
            CaptureError::from(SourceError::Device("x".into())),
            CaptureError::Device(_)
        ));
        assert!(matches!(
            CaptureError::from(SourceError::Unsupported("x".into())),
            CaptureError::Unsupported(_)
        ));
    }
}

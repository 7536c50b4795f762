//! Real-time frame processor: the code that runs on the audio thread.
//!
//! For every device frame [`FrameProcessor::handle`]:
//!
//! 1. ignores empty input (the stream stays alive);
//! 2. downmixes to mono and block-averages to the target rate;
//! 3. quantizes and Base64-encodes;
//! 4. posts the [`EncodedFrame`] through a [`FrameOutlet`] with `try_send`.
//!
//! # Backpressure
//!
//! The outlet is a bounded `std::sync::mpsc::sync_channel`.  When the
//! receiver falls behind and the queue is full, the **newest** frame is
//! dropped and counted in [`FrameStats`].  Frames already queued keep their
//! order.  The audio thread never waits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use super::frame::{AudioFrame, EncodedFrame};
use super::pcm;
use super::resample::{downsample, stereo_to_mono};

// ---------------------------------------------------------------------------
// FrameStats
// ---------------------------------------------------------------------------

/// Lock-free counters shared by the audio thread and the dispatcher.
#[derive(Debug, Default)]
pub struct FrameStats {
    produced: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
}

/// Point-in-time copy of [`FrameStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStatsSnapshot {
    /// Frames encoded by the processor.
    pub produced: u64,
    /// Frames discarded because the outlet queue was full.
    pub dropped: u64,
    /// Frames handed to the caller's sink.
    pub delivered: u64,
}

impl FrameStats {
    pub fn snapshot(&self) -> FrameStatsSnapshot {
        FrameStatsSnapshot {
            produced: self.produced.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// FrameOutlet
// ---------------------------------------------------------------------------

/// One-way, non-blocking post from the audio thread to the controller.
pub struct FrameOutlet {
    tx: mpsc::SyncSender<EncodedFrame>,
    stats: Arc<FrameStats>,
}

/// Outcome of a single [`FrameOutlet::post`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Queued,
    /// Queue full; the frame was discarded.
    Dropped,
    /// Receiver gone (capture is being torn down).
    Closed,
}

impl FrameOutlet {
    /// Create an outlet with room for `capacity` frames and the matching
    /// receiver.  A zero capacity is raised to one.
    pub fn bounded(
        capacity: usize,
        stats: Arc<FrameStats>,
    ) -> (Self, mpsc::Receiver<EncodedFrame>) {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        (Self { tx, stats }, rx)
    }

    pub fn post(&self, frame: EncodedFrame) -> PostOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => PostOutcome::Queued,
            Err(mpsc::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                PostOutcome::Dropped
            }
            Err(mpsc::TrySendError::Disconnected(_)) => PostOutcome::Closed,
        }
    }
}

// ---------------------------------------------------------------------------
// FrameProcessor
// ---------------------------------------------------------------------------

/// Per-session processor living inside the audio callback.
///
/// Holds nothing between frames except the target rate and the outlet.
pub struct FrameProcessor {
    target_rate: u32,
    outlet: FrameOutlet,
}

impl FrameProcessor {
    pub fn new(target_rate: u32, outlet: FrameOutlet) -> Self {
        Self {
            target_rate,
            outlet,
        }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Resample and encode one frame.  Returns `None` for empty input.
    pub fn process(&self, frame: &AudioFrame) -> Option<EncodedFrame> {
        if frame.is_empty() || frame.channels == 0 {
            return None;
        }

        let mono = stereo_to_mono(&frame.samples, frame.channels);
        let resampled = downsample(&mono, frame.sample_rate, self.target_rate);
        if resampled.is_empty() {
            return None;
        }

        Some(pcm::encode_samples(&resampled))
    }

    /// Process `frame` and post the result.  Returns `None` when there was
    /// nothing to send.
    pub fn handle(&mut self, frame: &AudioFrame) -> Option<PostOutcome> {
        let encoded = self.process(frame)?;
        self.outlet.stats.produced.fetch_add(1, Ordering::Relaxed);
        Some(self.outlet.post(encoded))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

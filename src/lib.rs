//! Real-time microphone capture, PCM framing and playback for a live
//! voice session.
//!
//! ```text
//! Microphone → AudioSource → FrameProcessor (resample + encode)
//!           → CaptureController → LiveSession → PlaybackDecoder → speakers
//! ```

pub mod audio;
pub mod config;
pub mod pipeline;
pub mod session;

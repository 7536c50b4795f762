//! Voice loop wiring for the live conversation.
//!
//! This module connects microphone capture, the live model session and
//! response playback, and exposes the shared state a front end reads.
//!
//! # Architecture
//!
//! ```text
//! VoiceCommand (mpsc)
//!        │
//!        ▼
//! VoiceLoop::run()  ← async tokio task
//!        │
//!        ├─ StartTalking  → CaptureController::start          → Capturing
//!        │                    └─ EncodedFrame ─▶ LiveSession::send_audio
//!        ├─ StopTalking   → CaptureController::stop            → Idle
//!        ├─ SendText      → transcript + LiveSession::send_text
//!        │
//!        └─ SessionEvent
//!              ├─ text   → transcript
//!              ├─ audio  → spawn_blocking(PlaybackDecoder::play)
//!              └─ Closed → stop capture                        → Closed
//!
//! SharedState (Arc<Mutex<AppState>>) ←─── read by the front end
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use safechat_voice::audio::{CaptureController, CpalSource};
//! use safechat_voice::config::AppConfig;
//! use safechat_voice::pipeline::{new_shared_state, VoiceCommand, VoiceLoop};
//! use safechat_voice::session::LoopbackTransport;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let state = new_shared_state(config.clone());
//!     let capture = Arc::new(CaptureController::new(
//!         Arc::new(CpalSource::new(None)),
//!         config.audio.clone(),
//!     ));
//!
//!     let mut voice = VoiceLoop::new(Arc::clone(&state), capture, None);
//!     voice
//!         .connect(&LoopbackTransport::default(), config.session.clone())
//!         .await
//!         .unwrap();
//!
//!     let (tx, rx) = mpsc::channel(16);
//!     tokio::spawn(voice.run(rx));
//!     tx.send(VoiceCommand::StartTalking).await.unwrap();
//! }
//! ```

pub mod runner;
pub mod state;

pub use runner::{VoiceCommand, VoiceLoop};
pub use state::{new_shared_state, AppState, SessionState, SharedState, Speaker, TranscriptEntry};

//! Shared application state for the voice loop.
//!
//! [`AppState`] is the single source of truth for anything a front end
//! would show: permission and capture status, session state, the running
//! transcript, counters and the last error.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<AppState>>`, cheap to
//! clone and safe to share across threads.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::{CaptureStatus, PermissionStatus};
use crate::config::AppConfig;

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle of the live session as seen by the voice loop.
///
/// ```text
/// Disconnected ──connect──▶ Connecting ──Opened──▶ Open ──close / error──▶ Closed
///                                  └──connect failed──▶ Closed
/// Closed ──connect──▶ Connecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Closed,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Open => "Open",
            SessionState::Closed => "Closed",
        }
    }
}

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub permission: PermissionStatus,
    pub capture: CaptureStatus,
    pub session: SessionState,

    /// User turns and model replies, oldest first.  Streamed model text is
    /// appended to the open model entry until the turn completes.
    pub transcript: Vec<TranscriptEntry>,
    model_turn_open: bool,

    /// Audio frames handed to the live session.
    pub frames_sent: u64,
    /// Captured frames discarded because the session fell behind or
    /// capture was stopped before they were sent.
    pub frames_dropped: u64,
    /// Response audio frames scheduled for playback.
    pub frames_played: u64,

    pub error_message: Option<String>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            permission: PermissionStatus::Unknown,
            capture: CaptureStatus::Idle,
            session: SessionState::Disconnected,
            transcript: Vec::new(),
            model_turn_open: false,
            frames_sent: 0,
            frames_dropped: 0,
            frames_played: 0,
            error_message: None,
            config,
        }
    }

    pub fn push_user_text(&mut self, text: impl Into<String>) {
        self.model_turn_open = false;
        self.transcript.push(TranscriptEntry {
            speaker: Speaker::User,
            text: text.into(),
        });
    }

    /// Append streamed model text, starting a new entry if no model turn is
    /// open.
    pub fn append_model_text(&mut self, text: &str) {
        if self.model_turn_open {
            if let Some(entry) = self.transcript.last_mut() {
                entry.text.push_str(text);
                return;
            }
        }
        self.model_turn_open = true;
        self.transcript.push(TranscriptEntry {
            speaker: Speaker::Model,
            text: text.to_string(),
        });
    }

    pub fn finish_model_turn(&mut self) {
        self.model_turn_open = false;
    }

    pub fn last_model_text(&self) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|e| e.speaker == Speaker::Model)
            .map(|e| e.text.as_str())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`AppState`].  Do not hold the lock across
/// `.await` points.
pub type SharedState = Arc<Mutex<AppState>>;

pub fn new_shared_state(config: AppConfig) -> SharedState {
    Arc::new(Mutex::new(AppState::new(config)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

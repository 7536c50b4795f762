//! Voice loop: drives capture, the live session and playback.
//!
//! [`VoiceLoop`] owns the [`SharedState`] and responds to [`VoiceCommand`]s
//! received over a `tokio::sync::mpsc` channel.
//!
//! # Flow
//!
//! ```text
//! VoiceCommand::StartTalking
//!   └─▶ CaptureController::start(sink)            [Capturing]
//!         sink ─try_send─▶ bounded frames channel ─▶ LiveSession::send_audio
//!
//! VoiceCommand::StopTalking
//!   └─▶ spawn_blocking(CaptureController::stop), discard queued frames
//!
//! SessionEvent::Message
//!   ├─ text parts  ─▶ transcript
//!   └─ audio parts ─▶ spawn_blocking(PlaybackDecoder::play)
//!
//! SessionEvent::Closed / Error ─▶ stop capture
//! VoiceCommand::Shutdown       ─▶ stop capture, close session, close playback
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audio::{
    CaptureController, CaptureError, EncodedFrame, PlaybackDecoder, SharedPlayback,
};
use crate::config::SessionConfig;
use crate::session::{LiveSession, LiveTransport, ServerMessage, SessionError, SessionEvent};

use super::state::{SessionState, SharedState};

// ---------------------------------------------------------------------------
// VoiceCommand
// ---------------------------------------------------------------------------

/// Requests a front end can make of the voice loop.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceCommand {
    /// Ask for microphone access without starting a capture.
    RequestPermission,
    /// Start streaming microphone audio to the session.
    StartTalking,
    StopTalking,
    /// Send a complete text turn.
    SendText(String),
    /// Stop everything and return from [`VoiceLoop::run`].
    Shutdown,
}

// ---------------------------------------------------------------------------
// VoiceLoop
// ---------------------------------------------------------------------------

/// Connects one capture controller, one live session and the shared
/// playback context.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use safechat_voice::audio::{CaptureController, CpalSource};
/// use safechat_voice::config::AppConfig;
/// use safechat_voice::pipeline::{new_shared_state, VoiceCommand, VoiceLoop};
/// use safechat_voice::session::LoopbackTransport;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AppConfig::default();
/// let state = new_shared_state(config.clone());
/// let capture = Arc::new(CaptureController::new(
///     Arc::new(CpalSource::new(None)),
///     config.audio.clone(),
/// ));
///
/// let mut voice = VoiceLoop::new(state, capture, None);
/// voice.connect(&LoopbackTransport::default(), config.session).await?;
///
/// let (tx, rx) = tokio::sync::mpsc::channel(16);
/// let runner = tokio::spawn(voice.run(rx));
/// tx.send(VoiceCommand::StartTalking).await?;
/// tx.send(VoiceCommand::Shutdown).await?;
/// runner.await?;
/// # Ok(())
/// # }
/// ```
pub struct VoiceLoop {
    state: SharedState,
    capture: Arc<CaptureController>,
    session: Option<LiveSession>,
    session_events: Option<mpsc::Receiver<SessionEvent>>,
    playback: Option<Arc<SharedPlayback>>,
    decoder: Arc<PlaybackDecoder>,
    /// Bounded bridge from the frame-dispatch thread.  Full means drop.
    frames_tx: mpsc::Sender<EncodedFrame>,
    frames_rx: mpsc::Receiver<EncodedFrame>,
}

impl VoiceLoop {
    /// Create a voice loop.  `playback == None` ignores response audio.
    ///
    /// Frames waiting for the session are capped at
    /// `audio.frame_queue_capacity`, like the capture queue.
    pub fn new(
        state: SharedState,
        capture: Arc<CaptureController>,
        playback: Option<Arc<SharedPlayback>>,
    ) -> Self {
        let capacity = state.lock().config.audio.frame_queue_capacity.max(1);
        let (frames_tx, frames_rx) = mpsc::channel(capacity);
        Self {
            state,
            capture,
            session: None,
            session_events: None,
            playback,
            decoder: Arc::new(PlaybackDecoder::new()),
            frames_tx,
            frames_rx,
        }
    }

    fn session_active(&self) -> bool {
        self.session.as_ref().is_some_and(LiveSession::is_active)
    }

    /// Open the live session.
    ///
    /// # Errors
    ///
    /// [`SessionError::AlreadyActive`] while a session is open, otherwise
    /// whatever the transport reports.
    pub async fn connect(
        &mut self,
        transport: &dyn LiveTransport,
        config: SessionConfig,
    ) -> Result<(), SessionError> {
        if self.session_active() {
            log::warn!("Session already active. Close the existing session before starting a new one.");
            return Err(SessionError::AlreadyActive);
        }

        self.state.lock().session = SessionState::Connecting;

        match LiveSession::connect(transport, config).await {
            Ok((session, events)) => {
                self.session = Some(session);
                self.session_events = Some(events);
                let mut st = self.state.lock();
                st.session = SessionState::Open;
                st.error_message = None;
                Ok(())
            }
            Err(e) => {
                self.set_session(SessionState::Closed);
                self.set_error(e.to_string());
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until [`VoiceCommand::Shutdown`] arrives or `commands` closes,
    /// then release capture, session and playback.
    pub async fn run(mut self, mut commands: mpsc::Receiver<VoiceCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(VoiceCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(frame) = self.frames_rx.recv() => {
                    self.forward_frame(frame).await;
                }
                event = next_event(&mut self.session_events) => match event {
                    Some(event) => self.handle_session_event(event).await,
                    None => self.session_events = None,
                },
            }
        }

        self.shutdown().await;
        log::info!("voice loop: shut down");
    }

    // -----------------------------------------------------------------------
    // Command handlers
    // -----------------------------------------------------------------------

    async fn handle_command(&mut self, command: VoiceCommand) {
        log::debug!("voice loop: {command:?}");
        match command {
            VoiceCommand::RequestPermission => {
                if !self.capture.request_permission().await {
                    if let Some(message) = self.capture.last_error() {
                        self.set_error(message);
                    }
                }
                self.sync_capture();
            }
            VoiceCommand::StartTalking => self.start_talking().await,
            VoiceCommand::StopTalking => self.stop_capture().await,
            VoiceCommand::SendText(text) => {
                self.state.lock().push_user_text(text.clone());
                let sent = match &self.session {
                    Some(session) => session.send_text(&text).await,
                    None => false,
                };
                if !sent {
                    self.set_error("Not connected to the live session.".to_string());
                }
            }
            VoiceCommand::Shutdown => {}
        }
    }

    async fn start_talking(&mut self) {
        if !self.session_active() {
            log::warn!("voice loop: no open session, not starting capture");
            self.set_error("Not connected to the live session.".to_string());
            return;
        }

        let frames = self.frames_tx.clone();
        let state = Arc::clone(&self.state);
        let result = self
            .capture
            .start(move |frame| {
                // Drop-newest: frames already queued keep their order.
                if frames.try_send(frame).is_err() {
                    state.lock().frames_dropped += 1;
                }
            })
            .await;

        match result {
            Ok(()) => self.state.lock().error_message = None,
            Err(CaptureError::Aborted) => log::debug!("voice loop: capture start cancelled"),
            Err(e) => self.set_error(e.to_string()),
        }
        self.sync_capture();
    }

    async fn forward_frame(&mut self, frame: EncodedFrame) {
        let Some(session) = &self.session else {
            return;
        };
        if session.send_audio(&frame).await {
            self.state.lock().frames_sent += 1;
        }
    }

    // -----------------------------------------------------------------------
    // Session events
    // -----------------------------------------------------------------------

    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Opened => self.set_session(SessionState::Open),
            SessionEvent::Message(message) => self.handle_message(message).await,
            SessionEvent::Error(message) => {
                self.set_error(format!("Live session error: {message}"));
                self.end_session().await;
            }
            SessionEvent::Closed { reason } => {
                log::info!("voice loop: session closed ({reason})");
                self.end_session().await;
            }
        }
    }

    async fn handle_message(&mut self, message: ServerMessage) {
        if let Some(text) = message.text() {
            self.state.lock().append_model_text(&text);
        }
        if message.turn_complete() {
            self.state.lock().finish_model_turn();
        }

        let Some(playback) = &self.playback else {
            return;
        };

        for frame in message.audio_frames() {
            let playback = Arc::clone(playback);
            let decoder = Arc::clone(&self.decoder);
            let played =
                tokio::task::spawn_blocking(move || decoder.play(&playback, &frame)).await;

            match played {
                Ok(Ok(_)) => self.state.lock().frames_played += 1,
                // Already logged by the decoder; later frames still play.
                Ok(Err(_)) => {}
                Err(e) => log::error!("voice loop: playback task failed: {e}"),
            }
        }
    }

    /// The session is gone: stop streaming into it.
    async fn end_session(&mut self) {
        self.stop_capture().await;
        self.set_session(SessionState::Closed);
    }

    /// Stop the microphone and discard frames not yet sent.
    async fn stop_capture(&mut self) {
        let capture = Arc::clone(&self.capture);
        if let Err(e) = tokio::task::spawn_blocking(move || capture.stop()).await {
            log::error!("voice loop: capture stop task failed: {e}");
        }

        // The dispatcher has been joined, so nothing refills the bridge.
        let mut discarded = 0;
        while self.frames_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            log::debug!("voice loop: discarded {discarded} unsent frames");
            self.state.lock().frames_dropped += discarded;
        }

        self.sync_capture();
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    async fn shutdown(&mut self) {
        self.stop_capture().await;

        if let Some(session) = self.session.take() {
            session.close().await;
        }
        self.session_events = None;
        self.set_session(SessionState::Closed);

        if let Some(playback) = &self.playback {
            playback.shutdown();
        }

        let stats = self.decoder.stats();
        log::info!(
            "voice loop: {} frames played, {} malformed",
            stats.frames_played,
            stats.decode_failures
        );
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn sync_capture(&self) {
        let mut st = self.state.lock();
        st.permission = self.capture.permission();
        st.capture = self.capture.status();
    }

    fn set_session(&self, session: SessionState) {
        self.state.lock().session = session;
    }

    fn set_error(&self, message: String) {
        log::error!("voice loop error: {message}");
        self.state.lock().error_message = Some(message);
    }
}

/// Next session event, or never when no session is attached.
async fn next_event(events: &mut Option<mpsc::Receiver<SessionEvent>>) -> Option<SessionEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

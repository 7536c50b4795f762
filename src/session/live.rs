//! Live session handle and the transport seam.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::wire::{ClientMessage, ServerMessage};
use super::SessionError;
use crate::audio::EncodedFrame;
use crate::config::SessionConfig;

const EVENT_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Lifecycle and data events of a live session, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Opened,
    Message(ServerMessage),
    /// The transport failed; the session is no longer usable.
    Error(String),
    /// Final event of every session.
    Closed { reason: String },
}

/// Where a transport posts its [`SessionEvent`]s.
pub type EventSink = mpsc::Sender<SessionEvent>;

// ---------------------------------------------------------------------------
// Transport traits
// ---------------------------------------------------------------------------

/// Opens connections to the model service.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Connect and return the outbound half.  Inbound traffic and lifecycle
    /// changes are posted to `events` until the transport drops it.
    async fn connect(
        &self,
        config: &SessionConfig,
        events: EventSink,
    ) -> Result<Box<dyn LiveSender>, SessionError>;
}

/// Outbound half of a connected transport.
#[async_trait]
pub trait LiveSender: Send + Sync {
    async fn send(&self, message: ClientMessage) -> Result<(), SessionError>;

    /// Close the connection.  The transport should answer with
    /// [`SessionEvent::Closed`].
    async fn close(&self);
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn LiveTransport>, _: Box<dyn LiveSender>) {}
};

// ---------------------------------------------------------------------------
// LiveSession
// ---------------------------------------------------------------------------

/// A connected live session.
///
/// Sends after the session closed (locally, by the server or through a
/// transport error) are dropped with a warning.
pub struct LiveSession {
    config: SessionConfig,
    sender: Box<dyn LiveSender>,
    open: Arc<AtomicBool>,
}

impl LiveSession {
    /// Connect through `transport` and send the session setup.
    ///
    /// Returns the session and the receiver of its events.  The receiver
    /// always ends with a [`SessionEvent::Closed`].
    pub async fn connect(
        transport: &dyn LiveTransport,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), SessionError> {
        log::info!("Attempting to connect to model: {}", config.model);

        let (raw_tx, raw_rx) = mpsc::channel(EVENT_CAPACITY);
        let sender = transport.connect(&config, raw_tx).await.map_err(|e| {
            log::error!("Failed to start live session: {e}");
            e
        })?;

        if let Err(e) = sender.send(ClientMessage::setup(&config)).await {
            log::error!("Failed to send session setup: {e}");
            sender.close().await;
            return Err(SessionError::Connect(e.to_string()));
        }

        let open = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        tokio::spawn(forward_events(raw_rx, tx, Arc::clone(&open)));

        log::info!("Live session established.");
        Ok((
            Self {
                config,
                sender,
                open,
            },
            rx,
        ))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Send one encoded audio chunk.  Returns `false` if it was not sent.
    pub async fn send_audio(&self, frame: &EncodedFrame) -> bool {
        if !self.is_active() {
            log::warn!("No active session or session not open to send audio data.");
            return false;
        }
        let message = ClientMessage::audio(frame, &self.config.audio_mime_type);
        match self.sender.send(message).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Error sending real-time audio input: {e}");
                false
            }
        }
    }

    /// Send `text` as a complete user turn.  Returns `false` if it was not
    /// sent.
    pub async fn send_text(&self, text: &str) -> bool {
        if !self.is_active() {
            log::warn!("No active session or session not open to send text data.");
            return false;
        }
        match self.sender.send(ClientMessage::text(text)).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Error sending client text content: {e}");
                false
            }
        }
    }

    /// Close the session.  Idempotent.
    pub async fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            log::info!("Closing live session...");
            self.sender.close().await;
        } else {
            log::debug!("Live session already closed or closing.");
        }
    }
}

/// Relay transport events to the caller, tracking the open flag.
async fn forward_events(
    mut raw: mpsc::Receiver<SessionEvent>,
    out: EventSink,
    open: Arc<AtomicBool>,
) {
    let mut closed = false;

    while let Some(event) = raw.recv().await {
        match &event {
            SessionEvent::Opened => log::info!("Live session opened"),
            SessionEvent::Message(_) => {}
            SessionEvent::Error(msg) => {
                log::error!("Live session error: {msg}");
                open.store(false, Ordering::Release);
            }
            SessionEvent::Closed { reason } => {
                log::info!("Live session closed. Reason: {reason}");
                open.store(false, Ordering::Release);
                closed = true;
            }
        }

        // A dropped receiver only means nobody is listening.
        let _ = out.send(event).await;
        if closed {
            return;
        }
    }

    open.store(false, Ordering::Release);
    let _ = out
        .send(SessionEvent::Closed {
            reason: "transport ended".into(),
        })
        .await;
}

// ---------------------------------------------------------------------------
// MockTransport (test only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockTransport;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

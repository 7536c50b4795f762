//! Live model session: a bidirectional stream of audio and text.
//!
//! The remote service is reached through the [`LiveTransport`] /
//! [`LiveSender`] trait pair.  [`LiveSession`] wraps a connected sender,
//! tracks whether the session is still open and forwards transport events
//! to the caller as [`SessionEvent`]s.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use safechat_voice::config::SessionConfig;
//! use safechat_voice::session::{LiveSession, LoopbackTransport, SessionEvent};
//!
//! # async fn example() -> Result<(), safechat_voice::session::SessionError> {
//! let (session, mut events) =
//!     LiveSession::connect(&LoopbackTransport::default(), SessionConfig::default()).await?;
//! session.send_text("hello").await;
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::Message(message) = event {
//!         println!("{:?}", message.text());
//!         break;
//!     }
//! }
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod live;
pub mod loopback;
pub mod wire;

use thiserror::Error;

pub use live::{EventSink, LiveSender, LiveSession, LiveTransport, SessionEvent};
pub use loopback::LoopbackTransport;
pub use wire::{ClientMessage, Part, ServerMessage};

#[cfg(test)]
pub use live::MockTransport;

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// A session is already open; close it before connecting again.
    #[error("session already active")]
    AlreadyActive,

    #[error("no open session")]
    NotConnected,

    #[error("failed to start live session: {0}")]
    Connect(String),

    #[error("failed to send to live session: {0}")]
    Send(String),

    #[error("invalid session message: {0}")]
    Encode(String),
}

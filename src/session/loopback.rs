//! In-process transport that plays the model service back to itself.
//!
//! Every outbound message is serialized to JSON and parsed again, exactly
//! as a remote peer would see it.  Audio chunks come back as model audio,
//! text turns come back as a short text reply.  Used by the binary and by
//! the voice-loop tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::live::{EventSink, LiveSender, LiveTransport, SessionEvent};
use super::wire::{ClientMessage, Part, ServerMessage};
use super::SessionError;
use crate::config::SessionConfig;

#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    echo_audio: bool,
}

impl LoopbackTransport {
    /// `echo_audio == false` swallows audio chunks and only answers text.
    pub fn new(echo_audio: bool) -> Self {
        Self { echo_audio }
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl LiveTransport for LoopbackTransport {
    async fn connect(
        &self,
        config: &SessionConfig,
        events: EventSink,
    ) -> Result<Box<dyn LiveSender>, SessionError> {
        log::debug!("loopback: connecting as {}", config.model);
        events
            .send(SessionEvent::Opened)
            .await
            .map_err(|_| SessionError::Connect("event receiver dropped".into()))?;

        Ok(Box::new(LoopbackSender {
            echo_audio: self.echo_audio,
            events: Mutex::new(Some(events)),
        }))
    }
}

struct LoopbackSender {
    echo_audio: bool,
    events: Mutex<Option<EventSink>>,
}

impl LoopbackSender {
    fn reply_to(&self, message: ClientMessage) -> Option<ServerMessage> {
        match message {
            ClientMessage::Setup(_) => Some(ServerMessage {
                setup_complete: Some(serde_json::json!({})),
                server_content: None,
            }),
            ClientMessage::RealtimeInput(input) if self.echo_audio => {
                let part = Part {
                    text: None,
                    inline_data: Some(input.media),
                };
                Some(ServerMessage::model_turn(vec![part], false))
            }
            ClientMessage::RealtimeInput(_) => None,
            ClientMessage::ClientContent(content) => {
                let said: Vec<String> = content
                    .turns
                    .iter()
                    .flat_map(|turn| turn.parts.iter())
                    .filter_map(|part| part.text.clone())
                    .collect();
                Some(ServerMessage::model_turn(
                    vec![Part::text(format!("You said: {}", said.join(" ")))],
                    content.turn_complete,
                ))
            }
        }
    }
}

#[async_trait]
impl LiveSender for LoopbackSender {
    async fn send(&self, message: ClientMessage) -> Result<(), SessionError> {
        let sink = self.events.lock().clone().ok_or(SessionError::NotConnected)?;

        let received = ClientMessage::from_json(&message.to_json()?)?;
        let Some(reply) = self.reply_to(received) else {
            return Ok(());
        };

        let reply = ServerMessage::from_json(&reply.to_json()?)?;
        sink.send(SessionEvent::Message(reply))
            .await
            .map_err(|_| SessionError::Send("event receiver dropped".into()))
    }

    async fn close(&self) {
        let sink = self.events.lock().take();
        if let Some(sink) = sink {
            let _ = sink
                .send(SessionEvent::Closed {
                    reason: "loopback closed".into(),
                })
                .await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

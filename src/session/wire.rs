//! JSON messages exchanged with the live model service.
//!
//! Client → server:
//!
//! ```json
//! {"setup":{"model":"…","generationConfig":{"responseModalities":["TEXT","AUDIO"]}}}
//! {"realtimeInput":{"media":{"data":"<base64 pcm>","mimeType":"audio/pcm;rate=16000"}}}
//! {"clientContent":{"turns":[{"role":"user","parts":[{"text":"hi"}]}],"turnComplete":true}}
//! ```
//!
//! Server → client:
//!
//! ```json
//! {"serverContent":{"modelTurn":{"parts":[{"text":"…"},{"inlineData":{"mimeType":"audio/pcm;rate=16000","data":"…"}}]},"turnComplete":true}}
//! ```

use serde::{Deserialize, Serialize};

use super::SessionError;
use crate::audio::EncodedFrame;
use crate::config::{ResponseModality, SessionConfig};

// ---------------------------------------------------------------------------
// Shared content types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// One part of a turn: text, inline media, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn audio(frame: &EncodedFrame, mime_type: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(Blob {
                mime_type: mime_type.into(),
                data: frame.as_str().to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

// ---------------------------------------------------------------------------
// Client messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeInput {
    pub media: Blob,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

/// A message sent to the service.  Serialized with the variant name as the
/// single top-level key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ClientContent(ClientContent),
}

impl ClientMessage {
    pub fn setup(config: &SessionConfig) -> Self {
        ClientMessage::Setup(Setup {
            model: config.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: config.response_modalities.clone(),
            },
        })
    }

    /// One realtime audio chunk.
    pub fn audio(frame: &EncodedFrame, mime_type: &str) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media: Blob {
                mime_type: mime_type.to_string(),
                data: frame.as_str().to_string(),
            },
        })
    }

    /// A complete user text turn.
    pub fn text(text: &str) -> Self {
        ClientMessage::ClientContent(ClientContent {
            turns: vec![Content {
                role: Some("user".into()),
                parts: vec![Part::text(text)],
            }],
            turn_complete: true,
        })
    }

    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Encode(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, SessionError> {
        serde_json::from_str(text).map_err(|e| SessionError::Encode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Server messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

/// A message received from the service.  Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,
}

impl ServerMessage {
    /// Build a model turn from `parts`.
    pub fn model_turn(parts: Vec<Part>, turn_complete: bool) -> Self {
        Self {
            setup_complete: None,
            server_content: Some(ServerContent {
                model_turn: Some(Content { role: Some("model".into()), parts }),
                turn_complete,
                interrupted: false,
            }),
        }
    }

    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.server_content
            .iter()
            .filter_map(|c| c.model_turn.as_ref())
            .flat_map(|turn| turn.parts.iter())
    }

    /// Concatenated text parts, or `None` when the message has no text.
    pub fn text(&self) -> Option<String> {
        let text: String = self.parts().filter_map(|p| p.text.as_deref()).collect();
        (!text.is_empty()).then_some(text)
    }

    /// Inline PCM audio parts, in message order.
    pub fn audio_frames(&self) -> Vec<EncodedFrame> {
        self.parts()
            .filter_map(|p| p.inline_data.as_ref())
            .filter(|blob| blob.mime_type.starts_with("audio/pcm"))
            .map(|blob| EncodedFrame::from_base64(blob.data.clone()))
            .collect()
    }

    pub fn turn_complete(&self) -> bool {
        self.server_content.as_ref().is_some_and(|c| c.turn_complete)
    }

    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Encode(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, SessionError> {
        serde_json::from_str(text).map_err(|e| SessionError::Encode(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

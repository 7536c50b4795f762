//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Missing keys fall back to their defaults, so a partial `settings.toml`
//! is valid.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::audio::{CaptureConstraints, TARGET_SAMPLE_RATE};

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate every captured frame is resampled to before encoding.
    pub target_sample_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Encoded frames buffered between the audio thread and the frame sink
    /// before new frames are dropped.
    pub frame_queue_capacity: usize,
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: TARGET_SAMPLE_RATE,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            frame_queue_capacity: 64,
            input_device: None,
        }
    }
}

impl AudioConfig {
    /// Stream constraints requested from the audio source.
    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            echo_cancellation: self.echo_cancellation,
            noise_suppression: self.noise_suppression,
            auto_gain_control: self.auto_gain_control,
            preferred_sample_rate: self.target_sample_rate,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Settings for playing back response audio.
///
/// Response audio is fixed at 16 kHz mono, so there is no rate or channel
/// setting here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Play audio parts of server responses.
    pub enabled: bool,
    /// Output device name; `None` means the system default.
    pub output_device: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Kind of content the model is asked to respond with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Text,
    Audio,
}

/// Settings for the live model session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Model identifier sent in the session setup.
    pub model: String,
    pub response_modalities: Vec<ResponseModality>,
    /// Environment variable holding the API key.  The key itself is never
    /// written to `settings.toml`.
    pub api_key_env: String,
    /// MIME type attached to every realtime audio chunk.
    pub audio_mime_type: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash-latest".into(),
            response_modalities: vec![ResponseModality::Text, ResponseModality::Audio],
            api_key_env: "GEMINI_API_KEY".into(),
            audio_mime_type: format!("audio/pcm;rate={TARGET_SAMPLE_RATE}"),
        }
    }
}

impl SessionConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use safechat_voice::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// println!("capturing at {} Hz", config.audio.target_sample_rate);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub playback: PlaybackConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Configuration module for safechat-voice.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for capture,
//! playback and the live session, `AppPaths` for the platform config
//! directory, and TOML persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, AudioConfig, PlaybackConfig, ResponseModality, SessionConfig};

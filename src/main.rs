//! Command-line entry point: a short live voice conversation.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (defaults on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the capture controller and the shared playback context.
//! 5. Connect the live session.
//! 6. Spawn the voice loop, talk for `--seconds`, then shut down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use safechat_voice::{
    audio::{CaptureController, CpalPlayback, CpalSource, SharedPlayback},
    config::AppConfig,
    pipeline::{new_shared_state, Speaker, VoiceCommand, VoiceLoop},
    session::LoopbackTransport,
};

#[derive(Debug, Parser)]
#[command(name = "safechat-voice", about = "Live voice session over the microphone")]
struct Args {
    /// Settings file to use instead of the per-user one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// How long to keep the microphone open.
    #[arg(long, default_value_t = 5)]
    seconds: u64,

    /// Text turn to send after talking.
    #[arg(long)]
    text: Option<String>,

    /// Ignore response audio.
    #[arg(long)]
    no_playback: bool,
}

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    log::info!("safechat-voice starting up");

    // 2. Configuration
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::load().context("loading config")?,
    };

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(args, config))
}

async fn run(args: Args, config: AppConfig) -> Result<()> {
    if config.session.api_key().is_some() {
        log::info!("{} is set", config.session.api_key_env);
    } else {
        log::info!(
            "{} not set; using the in-process loopback session",
            config.session.api_key_env
        );
    }

    // 4. Capture + playback
    let state = new_shared_state(config.clone());
    let capture = Arc::new(CaptureController::new(
        Arc::new(CpalSource::new(config.audio.input_device.clone())),
        config.audio.clone(),
    ));
    let playback = (config.playback.enabled && !args.no_playback).then(|| {
        Arc::new(SharedPlayback::new(Arc::new(CpalPlayback::new(
            config.playback.output_device.clone(),
        ))))
    });

    // 5. Session
    let mut voice = VoiceLoop::new(Arc::clone(&state), capture, playback);
    voice
        .connect(&LoopbackTransport::default(), config.session.clone())
        .await
        .context("connecting live session")?;

    // 6. Voice loop
    let (tx, rx) = mpsc::channel::<VoiceCommand>(16);
    let runner = tokio::spawn(voice.run(rx));

    tx.send(VoiceCommand::RequestPermission).await?;
    tx.send(VoiceCommand::StartTalking).await?;
    tokio::time::sleep(Duration::from_secs(args.seconds)).await;
    tx.send(VoiceCommand::StopTalking).await?;

    if let Some(text) = args.text {
        tx.send(VoiceCommand::SendText(text)).await?;
        // Give the reply a moment to arrive.
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    tx.send(VoiceCommand::Shutdown).await?;
    runner.await.context("voice loop panicked")?;

    let st = state.lock();
    log::info!(
        "session {}: {} frames sent, {} frames played",
        st.session.label(),
        st.frames_sent,
        st.frames_played
    );
    for entry in &st.transcript {
        let who = match entry.speaker {
            Speaker::User => "you",
            Speaker::Model => "model",
        };
        log::info!("{who}: {}", entry.text);
    }
    if let Some(err) = &st.error_message {
        log::warn!("last error: {err}");
    }

    Ok(())
}

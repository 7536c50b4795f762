//! Speaker output via `cpal`.
//!
//! [`CpalPlayback`] opens the output device on a dedicated `audio-playback`
//! thread, since cpal streams may not move between threads.  Scheduled
//! samples are resampled from the context rate to the device rate and sent
//! over a channel; the output callback drains it with `try_recv` and writes
//! silence when nothing is queued.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};

use super::playback::{PlaybackBackend, PlaybackContext, PlaybackError};
use super::resample::resample_linear;

enum Control {
    Play,
    Stop,
}

// ---------------------------------------------------------------------------
// CpalPlayback
// ---------------------------------------------------------------------------

/// Output backend for the default cpal host.
#[derive(Debug, Clone, Default)]
pub struct CpalPlayback {
    /// Output device name; `None` selects the system default.
    device_name: Option<String>,
}

impl CpalPlayback {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl PlaybackBackend for CpalPlayback {
    fn create(&self, sample_rate: u32, channels: u16) -> Result<Box<dyn PlaybackContext>, PlaybackError> {
        let device_name = self.device_name.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16), PlaybackError>>();
        let (control_tx, control_rx) = mpsc::channel::<Control>();
        let (samples_tx, samples_rx) = mpsc::channel::<Vec<f32>>();

        let thread = thread::Builder::new()
            .name("audio-playback".into())
            .spawn(move || {
                let (stream, rate, device_channels) =
                    match build_output(device_name.as_deref(), sample_rate, samples_rx) {
                        Ok(built) => built,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(PlaybackError::Backend(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok((rate, device_channels)));

                while let Ok(control) = control_rx.recv() {
                    let result = match control {
                        Control::Play => stream.play().map_err(|e| e.to_string()),
                        Control::Stop => break,
                    };
                    if let Err(e) = result {
                        log::warn!("audio-playback: stream control failed: {e}");
                    }
                }
                drop(stream);
                log::debug!("audio-playback: stream released");
            })
            .map_err(|e| PlaybackError::Backend(format!("failed to spawn playback thread: {e}")))?;

        let mut context = CpalContext {
            source_rate: sample_rate,
            device_rate: sample_rate,
            samples_tx: Some(samples_tx),
            control_tx: Some(control_tx),
            thread: Some(thread),
        };

        match ready_rx.recv() {
            Ok(Ok((rate, device_channels))) => {
                log::info!(
                    "Audio playback started ({rate} Hz, {device_channels} ch; source {sample_rate} Hz, {channels} ch)"
                );
                context.device_rate = rate;
                Ok(Box::new(context))
            }
            Ok(Err(e)) => {
                context.close();
                Err(e)
            }
            Err(_) => {
                context.close();
                Err(PlaybackError::Backend("playback thread exited during startup".into()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CpalContext
// ---------------------------------------------------------------------------

struct CpalContext {
    source_rate: u32,
    device_rate: u32,
    samples_tx: Option<mpsc::Sender<Vec<f32>>>,
    control_tx: Option<mpsc::Sender<Control>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalContext {
    fn control(&self, control: Control) -> Result<(), PlaybackError> {
        self.control_tx
            .as_ref()
            .ok_or_else(|| PlaybackError::Backend("playback context closed".into()))?
            .send(control)
            .map_err(|_| PlaybackError::Backend("playback thread is gone".into()))
    }
}

impl PlaybackContext for CpalContext {
    fn sample_rate(&self) -> u32 {
        self.source_rate
    }

    /// cpal keeps output streams running once played.
    fn is_suspended(&self) -> bool {
        false
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        self.control(Control::Play)
    }

    fn schedule(&mut self, samples: Vec<f32>) -> Result<(), PlaybackError> {
        let tx = self
            .samples_tx
            .as_ref()
            .ok_or_else(|| PlaybackError::Backend("playback context closed".into()))?;

        let samples = if self.device_rate == self.source_rate {
            samples
        } else {
            resample_linear(&samples, self.source_rate, self.device_rate)
        };

        tx.send(samples)
            .map_err(|_| PlaybackError::Backend("playback thread is gone".into()))
    }

    fn close(&mut self) {
        self.samples_tx = None;
        if let Some(tx) = self.control_tx.take() {
            let _ = tx.send(Control::Stop);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("audio-playback thread panicked");
            }
        }
    }
}

impl Drop for CpalContext {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Stream construction
// ---------------------------------------------------------------------------

fn find_output_device(name: Option<&str>) -> Result<cpal::Device, PlaybackError> {
    let host = cpal::default_host();
    let device = match name {
        Some(wanted) => host
            .output_devices()
            .map_err(|e| PlaybackError::Backend(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false)),
        None => host.default_output_device(),
    };
    device.ok_or_else(|| match name {
        Some(wanted) => PlaybackError::Backend(format!("output device {wanted:?} not found")),
        None => PlaybackError::Backend("no output device found on the default audio host".into()),
    })
}

fn build_output(
    device_name: Option<&str>,
    preferred_rate: u32,
    samples: mpsc::Receiver<Vec<f32>>,
) -> Result<(cpal::Stream, u32, u16), PlaybackError> {
    let device = find_output_device(device_name)?;
    let default = device
        .default_output_config()
        .map_err(|e| PlaybackError::Backend(e.to_string()))?;

    // Ask for the source rate directly when the device offers it.
    let supported = device
        .supported_output_configs()
        .ok()
        .and_then(|mut ranges| {
            ranges
                .find(|r| {
                    r.sample_format() == default.sample_format()
                        && r.min_sample_rate().0 <= preferred_rate
                        && preferred_rate <= r.max_sample_rate().0
                })
                .map(|r| r.with_sample_rate(cpal::SampleRate(preferred_rate)))
        })
        .unwrap_or(default);

    let rate = supported.sample_rate().0;
    let channels = supported.channels();
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let stream = match format {
        cpal::SampleFormat::F32 => stream_for::<f32>(&device, &config, samples),
        cpal::SampleFormat::I16 => stream_for::<i16>(&device, &config, samples),
        cpal::SampleFormat::U16 => stream_for::<u16>(&device, &config, samples),
        other => Err(PlaybackError::Backend(format!(
            "output sample format {other:?} not supported"
        ))),
    }?;

    Ok((stream, rate, channels))
}

fn stream_for<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    samples: mpsc::Receiver<Vec<f32>>,
) -> Result<cpal::Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut queue = OutputQueue::new(samples);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels.max(1)) {
                    let value = T::from_sample(queue.next_sample());
                    for slot in frame.iter_mut() {
                        *slot = value;
                    }
                }
            },
            |err| log::error!("cpal output stream error: {err}"),
            None,
        )
        .map_err(|e| PlaybackError::Backend(e.to_string()))
}

/// FIFO of mono samples fed from the scheduling side.
struct OutputQueue {
    incoming: mpsc::Receiver<Vec<f32>>,
    pending: VecDeque<f32>,
}

impl OutputQueue {
    fn new(incoming: mpsc::Receiver<Vec<f32>>) -> Self {
        Self {
            incoming,
            pending: VecDeque::new(),
        }
    }

    /// Next sample in arrival order, or silence when starved.
    fn next_sample(&mut self) -> f32 {
        if self.pending.is_empty() {
            while let Ok(block) = self.incoming.try_recv() {
                self.pending.extend(block);
            }
        }
        self.pending.pop_front().unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_emits_blocks_in_order_then_silence() {
        let (tx, rx) = mpsc::channel();
        let mut queue = OutputQueue::new(rx);

        tx.send(vec![0.1, 0.2]).unwrap();
        tx.send(vec![0.3]).unwrap();

        let out: Vec<f32> = (0..5).map(|_| queue.next_sample()).collect();
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.0, 0.0]);
    }

    #[test]
    fn queue_picks_up_late_blocks() {
        let (tx, rx) = mpsc::channel();
        let mut queue = OutputQueue::new(rx);

        assert_eq!(queue.next_sample(), 0.0);
        tx.send(vec![0.5]).unwrap();
        assert_eq!(queue.next_sample(), 0.5);
    }

    #[test]
    fn queue_survives_sender_drop() {
        let (tx, rx) = mpsc::channel();
        let mut queue = OutputQueue::new(rx);
        tx.send(vec![0.25]).unwrap();
        drop(tx);

        assert_eq!(queue.next_sample(), 0.25);
        assert_eq!(queue.next_sample(), 0.0);
    }

    #[test]
    fn closed_context_rejects_samples() {
        let mut context = CpalContext {
            source_rate: 16_000,
            device_rate: 48_000,
            samples_tx: None,
            control_tx: None,
            thread: None,
        };
        assert!(context.schedule(vec![0.0; 4]).is_err());
        assert!(context.resume().is_err());
        context.close();
        context.close();
    }

    #[test]
    fn default_backend_uses_system_device() {
        assert!(CpalPlayback::default().device_name.is_none());
    }
}

//! Microphone capture via `cpal`.
//!
//! [`CpalSource`] implements [`AudioSource`] on top of the cpal
//! host/device/stream lifecycle.  cpal streams are not `Send` on every
//! platform, so each open stream lives on its own `audio-capture` thread;
//! the [`StreamHandle`] returned to the controller only holds a stop channel
//! and the thread's join handle.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};

use super::frame::AudioFrame;
use super::source::{ActiveStream, AudioSource, CaptureConstraints, FrameCallback, SourceError};

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// Handle to a running capture thread.
///
/// Dropping this value stops the stream and joins the thread.
pub struct StreamHandle {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ActiveStream for StreamHandle {
    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("audio-capture thread panicked");
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// CpalSource
// ---------------------------------------------------------------------------

/// Microphone provider backed by the default cpal host.
///
/// # Example
///
/// ```rust,no_run
/// use safechat_voice::audio::{AudioSource, CaptureConstraints, CpalSource};
///
/// let source = CpalSource::new(None);
/// source.request_access().unwrap();
/// let _stream = source
///     .open(&CaptureConstraints::default(), Box::new(|frame| {
///         println!("{} samples @ {} Hz", frame.samples.len(), frame.sample_rate);
///     }))
///     .unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct CpalSource {
    /// Input device name; `None` selects the system default.
    device_name: Option<String>,
}

impl CpalSource {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl AudioSource for CpalSource {
    /// Desktop hosts have no separate permission prompt; access is
    /// confirmed by resolving the device and its default configuration.
    fn request_access(&self) -> Result<(), SourceError> {
        let device = find_device(self.device_name.as_deref())?;
        device
            .default_input_config()
            .map_err(|e| SourceError::Denied(e.to_string()))?;
        Ok(())
    }

    fn supports_realtime(&self) -> Result<(), SourceError> {
        let device = find_device(self.device_name.as_deref())?;
        let supported = device
            .default_input_config()
            .map_err(|e| SourceError::Device(e.to_string()))?;

        match supported.sample_format() {
            cpal::SampleFormat::F32 | cpal::SampleFormat::I16 | cpal::SampleFormat::U16 => Ok(()),
            other => Err(SourceError::Unsupported(format!(
                "input sample format {other:?}"
            ))),
        }
    }

    fn open(
        &self,
        constraints: &CaptureConstraints,
        on_frame: FrameCallback,
    ) -> Result<Box<dyn ActiveStream>, SourceError> {
        let device_name = self.device_name.clone();
        let constraints = *constraints;
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u32, u16), SourceError>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let (stream, rate, channels) =
                    match build_stream(device_name.as_deref(), &constraints, on_frame) {
                        Ok(built) => built,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(SourceError::Device(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok((rate, channels)));

                // Park until stop() or the handle is dropped.
                let _ = stop_rx.recv();
                drop(stream);
                log::debug!("audio-capture: stream released");
            })
            .map_err(|e| SourceError::Device(format!("failed to spawn capture thread: {e}")))?;

        let mut handle = StreamHandle {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        };

        match ready_rx.recv() {
            Ok(Ok((rate, channels))) => {
                log::info!("Audio capture started ({rate} Hz, {channels} ch)");
                Ok(Box::new(handle))
            }
            Ok(Err(e)) => {
                handle.stop();
                Err(e)
            }
            Err(_) => {
                handle.stop();
                Err(SourceError::Device("capture thread exited during startup".into()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn find_device(name: Option<&str>) -> Result<cpal::Device, SourceError> {
    let host = cpal::default_host();
    let device = match name {
        Some(wanted) => host
            .input_devices()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false)),
        None => host.default_input_device(),
    };
    device.ok_or_else(|| match name {
        Some(wanted) => SourceError::Unavailable(format!("input device {wanted:?} not found")),
        None => SourceError::Unavailable("no input device found on the default audio host".into()),
    })
}

/// Prefer a mono configuration at the requested rate, otherwise take the
/// device default and let the pipeline resample.
fn pick_config(
    device: &cpal::Device,
    preferred_rate: u32,
) -> Result<cpal::SupportedStreamConfig, SourceError> {
    let default = device
        .default_input_config()
        .map_err(|e| SourceError::Device(e.to_string()))?;

    let preferred = device.supported_input_configs().ok().and_then(|mut ranges| {
        ranges
            .find(|r| {
                r.channels() == 1
                    && r.sample_format() == default.sample_format()
                    && r.min_sample_rate().0 <= preferred_rate
                    && preferred_rate <= r.max_sample_rate().0
            })
            .map(|r| r.with_sample_rate(cpal::SampleRate(preferred_rate)))
    });

    Ok(preferred.unwrap_or(default))
}

fn build_stream(
    device_name: Option<&str>,
    constraints: &CaptureConstraints,
    on_frame: FrameCallback,
) -> Result<(cpal::Stream, u32, u16), SourceError> {
    let device = find_device(device_name)?;
    let supported = pick_config(&device, constraints.preferred_sample_rate)?;

    if constraints.echo_cancellation || constraints.noise_suppression || constraints.auto_gain_control {
        log::debug!(
            "voice processing requested (aec={}, ns={}, agc={}); cpal input is unprocessed",
            constraints.echo_cancellation,
            constraints.noise_suppression,
            constraints.auto_gain_control
        );
    }

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => stream_for::<f32>(&device, &config, on_frame),
        cpal::SampleFormat::I16 => stream_for::<i16>(&device, &config, on_frame),
        cpal::SampleFormat::U16 => stream_for::<u16>(&device, &config, on_frame),
        other => Err(SourceError::Unsupported(format!(
            "input sample format {other:?}"
        ))),
    }?;

    Ok((stream, sample_rate, channels))
}

fn stream_for<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut on_frame: FrameCallback,
) -> Result<cpal::Stream, SourceError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                on_frame(AudioFrame {
                    samples: data.iter().map(|&s| f32::from_sample(s)).collect(),
                    sample_rate,
                    channels,
                });
            },
            |err| log::error!("cpal stream error: {err}"),
            None,
        )
        .map_err(|e| SourceError::Device(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Microphone acquisition and release via CPAL.
//!
//! The gateway is a pure resource-lifecycle wrapper: it negotiates a capture
//! format, wires the device callback to a bounded chunk channel, and hands the
//! session an exclusively-owned [`DeviceStream`]. Acquisition failures are not
//! retried here; they surface as terminal session failures that need user
//! action (re-grant permission, plug the device back in).

use super::chunk::AudioFormat;
use crate::error::VoiceError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Capture policy, fixed by the product: mono, 16 kHz target, echo
/// cancellation and noise suppression requested. The target rate is best
/// effort; the negotiated [`AudioFormat`] records what the hardware delivered.
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    pub preferred_device: Option<String>,
    pub target_sample_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    /// How much audio each emitted chunk spans.
    pub chunk_interval: Duration,
    /// Bounded-channel capacity between the device callback and the session.
    pub channel_capacity: usize,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            preferred_device: None,
            target_sample_rate: super::TARGET_RATE,
            echo_cancellation: true,
            noise_suppression: true,
            chunk_interval: Duration::from_millis(200),
            channel_capacity: 16,
        }
    }
}

/// Acquires and releases the microphone. A trait seam so the session state
/// machine can be exercised with a scripted gateway in tests.
pub trait AudioDeviceGateway {
    fn acquire(
        &self,
        constraints: &CaptureConstraints,
        chunks: Sender<Vec<u8>>,
    ) -> Result<DeviceStream, VoiceError>;
}

/// Internal control surface for whatever is producing audio behind a
/// [`DeviceStream`].
pub trait StreamControl {
    fn shutdown(&mut self);
}

/// Exclusively-owned handle to an active capture stream.
///
/// Owned by at most one session while active. `release()` is idempotent and
/// safe to call on an already-released stream; dropping the handle releases
/// too, so the OS microphone-in-use indicator cannot outlive the session.
pub struct DeviceStream {
    control: Option<Box<dyn StreamControl>>,
    format: AudioFormat,
    dropped_chunks: Arc<AtomicUsize>,
}

impl DeviceStream {
    pub fn new(
        control: Box<dyn StreamControl>,
        format: AudioFormat,
        dropped_chunks: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            control: Some(control),
            format,
            dropped_chunks,
        }
    }

    /// Format negotiated at acquire time; one per session.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Chunks the device callback could not hand off because the channel was
    /// full. Diagnostic only.
    pub fn dropped_chunks(&self) -> usize {
        self.dropped_chunks.load(Ordering::Relaxed)
    }

    /// Stop capture and free the device. Idempotent.
    pub fn release(&mut self) {
        if let Some(mut control) = self.control.take() {
            control.shutdown();
            debug!("device stream released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.control.is_none()
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Production gateway backed by the system's default audio host.
pub struct CpalDeviceGateway;

impl CpalDeviceGateway {
    pub fn new() -> Self {
        Self
    }

    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_input_devices() -> Result<Vec<String>, VoiceError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|err| VoiceError::DeviceUnavailable(err.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    fn pick_device(preferred: Option<&str>) -> Result<cpal::Device, VoiceError> {
        let host = cpal::default_host();
        match preferred {
            Some(name) => {
                let mut devices = host
                    .input_devices()
                    .map_err(|err| VoiceError::DeviceUnavailable(err.to_string()))?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| {
                        VoiceError::DeviceUnavailable(format!("input device '{name}' not found"))
                    })
            }
            None => host.default_input_device().ok_or_else(|| {
                VoiceError::DeviceUnavailable(format!(
                    "no default input device. {}",
                    mic_permission_hint()
                ))
            }),
        }
    }
}

impl Default for CpalDeviceGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDeviceGateway for CpalDeviceGateway {
    fn acquire(
        &self,
        constraints: &CaptureConstraints,
        chunks: Sender<Vec<u8>>,
    ) -> Result<DeviceStream, VoiceError> {
        let device = Self::pick_device(constraints.preferred_device.as_deref())?;
        let default_config = device
            .default_input_config()
            .map_err(|err| classify_device_error(&err.to_string()))?;
        let sample_format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let device_rate = device_config.sample_rate.0;
        let channels = usize::from(device_config.channels.max(1));

        if device_rate != constraints.target_sample_rate {
            debug!(
                requested = constraints.target_sample_rate,
                negotiated = device_rate,
                "device did not honor target sample rate; recording actual rate in format tag"
            );
        }
        if constraints.echo_cancellation || constraints.noise_suppression {
            // CPAL exposes no input-processing knobs; the request is
            // best-effort and depends on OS-level processing.
            debug!("echo cancellation / noise suppression requested (host best-effort)");
        }

        let format = AudioFormat::pcm_mono(device_rate);
        let chunk_bytes = chunk_size_bytes(device_rate, constraints.chunk_interval);
        let dropped = Arc::new(AtomicUsize::new(0));
        let packer = Arc::new(Mutex::new(ChunkPacker::new(
            chunk_bytes,
            chunks,
            dropped.clone(),
        )));

        let err_fn = |err| warn!("audio stream error: {err}");
        let stream = match sample_format {
            SampleFormat::F32 => {
                let packer = packer.clone();
                let dropped = dropped.clone();
                device.build_input_stream(
                    &device_config,
                    move |data: &[f32], _| {
                        if let Ok(mut packer) = packer.try_lock() {
                            packer.push(data, channels, |sample| sample);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::I16 => {
                let packer = packer.clone();
                let dropped = dropped.clone();
                device.build_input_stream(
                    &device_config,
                    move |data: &[i16], _| {
                        if let Ok(mut packer) = packer.try_lock() {
                            packer.push(data, channels, |sample| sample as f32 / 32_768.0);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::U16 => {
                let packer = packer.clone();
                let dropped = dropped.clone();
                device.build_input_stream(
                    &device_config,
                    move |data: &[u16], _| {
                        if let Ok(mut packer) = packer.try_lock() {
                            packer.push(data, channels, |sample| {
                                (sample as f32 - 32_768.0) / 32_768.0
                            });
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(VoiceError::DeviceUnavailable(format!(
                    "unsupported sample format: {other:?}"
                )))
            }
        }
        .map_err(|err| classify_device_error(&err.to_string()))?;

        stream
            .play()
            .map_err(|err| classify_device_error(&err.to_string()))?;
        debug!(rate = device_rate, channels, chunk_bytes, "capture stream started");

        Ok(DeviceStream::new(
            Box::new(CpalStreamControl {
                stream: Some(stream),
                packer,
            }),
            format,
            dropped,
        ))
    }
}

struct CpalStreamControl {
    stream: Option<cpal::Stream>,
    packer: Arc<Mutex<ChunkPacker>>,
}

impl StreamControl for CpalStreamControl {
    fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                warn!("failed to pause audio stream: {err}");
            }
            drop(stream);
        }
        // Push out whatever tail the packer is still holding so the final
        // partial chunk reaches the session before drain.
        if let Ok(mut packer) = self.packer.lock() {
            packer.flush();
        }
    }
}

/// Accumulates downmixed mono samples from the device callback and emits
/// interval-sized PCM byte chunks over a bounded channel. Never blocks the
/// audio callback: a full channel increments the dropped counter instead.
pub(super) struct ChunkPacker {
    chunk_bytes: usize,
    pending: Vec<u8>,
    sender: Sender<Vec<u8>>,
    dropped: Arc<AtomicUsize>,
}

impl ChunkPacker {
    pub(super) fn new(chunk_bytes: usize, sender: Sender<Vec<u8>>, dropped: Arc<AtomicUsize>) -> Self {
        Self {
            chunk_bytes: chunk_bytes.max(2),
            pending: Vec::with_capacity(chunk_bytes),
            sender,
            dropped,
        }
    }

    pub(super) fn push<T, F>(&mut self, data: &[T], channels: usize, mut convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        if channels <= 1 {
            for sample in data.iter().copied() {
                self.push_sample(convert(sample));
            }
        } else {
            // Average each interleaved frame down to mono.
            let mut acc = 0.0f32;
            let mut count = 0usize;
            for sample in data.iter().copied() {
                acc += convert(sample);
                count += 1;
                if count == channels {
                    self.push_sample(acc / channels as f32);
                    acc = 0.0;
                    count = 0;
                }
            }
            if count > 0 {
                self.push_sample(acc / count as f32);
            }
        }

        while self.pending.len() >= self.chunk_bytes {
            let chunk: Vec<u8> = self.pending.drain(..self.chunk_bytes).collect();
            self.send(chunk);
        }
    }

    fn push_sample(&mut self, sample: f32) {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = (clamped * f32::from(i16::MAX)) as i16;
        self.pending.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit any partial tail. Called at stream shutdown.
    pub(super) fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let chunk = std::mem::take(&mut self.pending);
        self.send(chunk);
    }

    fn send(&mut self, chunk: Vec<u8>) {
        match self.sender.try_send(chunk) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

fn chunk_size_bytes(sample_rate: u32, interval: Duration) -> usize {
    let samples = (f64::from(sample_rate) * interval.as_secs_f64()).ceil() as usize;
    (samples * 2).max(2)
}

fn classify_device_error(detail: &str) -> VoiceError {
    let lower = detail.to_ascii_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        VoiceError::PermissionDenied
    } else {
        VoiceError::DeviceUnavailable(format!("{detail}. {}", mic_permission_hint()))
    }
}

pub fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: System Settings > Privacy & Security > Microphone (enable this app)."
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio permissions and ensure the device is not muted."
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: Settings > Privacy & Security > Microphone (allow access for this app)."
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "Check OS microphone permissions."
    }
}

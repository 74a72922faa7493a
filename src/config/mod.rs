//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use crate::audio::{CaptureConstraints, EndpointMode};
use crate::session::{SessionConfig, SessionMode};
use clap::{Parser, ValueEnum};
use std::time::Duration;

pub use defaults::{
    DEFAULT_API_BASE_URL, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHUNK_INTERVAL_MS,
    DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_MAX_CAPTURE_MS, DEFAULT_MIN_CHUNK_BYTES, DEFAULT_SAMPLE_RATE,
    DEFAULT_SILENCE_TIMEOUT_MS, DEFAULT_VOICE_THRESHOLD_DB, MAX_CAPTURE_HARD_LIMIT_MS,
    MAX_CHUNK_INTERVAL_MS, MIN_CHUNK_INTERVAL_MS,
};

/// CLI options for the medivoice capture pipeline. Validated values keep the
/// capture and HTTP layers within safe ranges.
#[derive(Debug, Parser, Clone)]
#[command(about = "Voice capture and transcription for the assistant chat", author, version)]
pub struct AppConfig {
    /// Base URL of the transcription/synthesis service
    #[arg(
        long = "api-base-url",
        env = "MEDIVOICE_API_BASE_URL",
        default_value = DEFAULT_API_BASE_URL
    )]
    pub api_base_url: String,

    /// Voice identifier forwarded to the synthesis endpoint
    #[arg(long = "voice-id", env = "MEDIVOICE_VOICE_ID")]
    pub voice_id: Option<String>,

    /// How a capture ends: trailing silence or an explicit stop
    #[arg(long = "endpoint-mode", value_enum, default_value_t = EndpointModeArg::Silence)]
    pub endpoint_mode: EndpointModeArg,

    /// Trailing silence required before a capture auto-stops (milliseconds)
    #[arg(
        long = "silence-timeout-ms",
        env = "MEDIVOICE_SILENCE_TIMEOUT_MS",
        default_value_t = DEFAULT_SILENCE_TIMEOUT_MS
    )]
    pub silence_timeout_ms: u64,

    /// Maximum capture duration before a hard stop (milliseconds)
    #[arg(long = "max-capture-ms", default_value_t = DEFAULT_MAX_CAPTURE_MS)]
    pub max_capture_ms: u64,

    /// Target duration of each captured chunk (milliseconds)
    #[arg(long = "chunk-interval-ms", default_value_t = DEFAULT_CHUNK_INTERVAL_MS)]
    pub chunk_interval_ms: u64,

    /// RMS level (dBFS) a chunk must reach to count as voice for the silence
    /// endpoint
    #[arg(long = "voice-threshold-db", default_value_t = DEFAULT_VOICE_THRESHOLD_DB)]
    pub voice_threshold_db: f32,

    /// Chunks smaller than this many bytes are treated as silence padding
    #[arg(long = "min-chunk-bytes", default_value_t = DEFAULT_MIN_CHUNK_BYTES)]
    pub min_chunk_bytes: usize,

    /// Discard a lone sub-threshold final chunk instead of keeping it
    #[arg(long = "discard-short-final", default_value_t = false)]
    pub discard_short_final: bool,

    /// Keep listening for further utterances after each transcription
    #[arg(long = "continuous", default_value_t = false)]
    pub continuous: bool,

    /// Target capture sample rate (Hz); the device may negotiate another
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Chunk channel capacity between the capture callback and the session
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Preferred audio input device name
    #[arg(long = "input-device", env = "MEDIVOICE_INPUT_DEVICE")]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Disable echo cancellation on the capture stream
    #[arg(long = "no-echo-cancellation", default_value_t = false)]
    pub no_echo_cancellation: bool,

    /// Disable noise suppression on the capture stream
    #[arg(long = "no-noise-suppression", default_value_t = false)]
    pub no_noise_suppression: bool,

    /// HTTP timeout for transcription and synthesis calls (milliseconds)
    #[arg(long = "http-timeout-ms", default_value_t = DEFAULT_HTTP_TIMEOUT_MS)]
    pub http_timeout_ms: u64,

    /// Speak each transcribed sentence back through the synthesis endpoint
    #[arg(long = "speak", default_value_t = false)]
    pub speak: bool,

    /// Enable debug logging (MEDIVOICE_LOG overrides)
    #[arg(long = "verbose", default_value_t = false)]
    pub verbose: bool,
}

/// Runtime-selectable endpoint strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EndpointModeArg {
    Silence,
    Manual,
}

impl EndpointModeArg {
    pub fn label(self) -> &'static str {
        match self {
            EndpointModeArg::Silence => "silence",
            EndpointModeArg::Manual => "manual",
        }
    }
}

// clap re-parses the rendered default, so this must match the value names.
impl std::fmt::Display for EndpointModeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl AppConfig {
    /// Snapshot the CLI-controlled capture settings for one session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            mode: if self.continuous {
                SessionMode::Continuous
            } else {
                SessionMode::SingleShot
            },
            endpoint_mode: match self.endpoint_mode {
                EndpointModeArg::Silence => EndpointMode::SilenceTimeout,
                EndpointModeArg::Manual => EndpointMode::ExplicitStop,
            },
            silence_timeout: Duration::from_millis(self.silence_timeout_ms),
            max_capture: Duration::from_millis(self.max_capture_ms),
            min_chunk_bytes: self.min_chunk_bytes,
            keep_short_final: !self.discard_short_final,
            voice_threshold_db: self.voice_threshold_db,
            constraints: CaptureConstraints {
                preferred_device: self.input_device.clone(),
                target_sample_rate: self.sample_rate,
                echo_cancellation: !self.no_echo_cancellation,
                noise_suppression: !self.no_noise_suppression,
                chunk_interval: Duration::from_millis(self.chunk_interval_ms),
                channel_capacity: self.channel_capacity,
            },
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

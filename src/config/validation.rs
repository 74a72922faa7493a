use super::defaults::{MAX_CAPTURE_HARD_LIMIT_MS, MAX_CHUNK_INTERVAL_MS, MIN_CHUNK_INTERVAL_MS};
use super::{AppConfig, EndpointModeArg};
use anyhow::{bail, Result};
use clap::Parser;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize the service URL.
    pub fn validate(&mut self) -> Result<()> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            bail!("--api-base-url cannot be empty");
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            bail!("--api-base-url must start with http:// or https://, got '{base}'");
        }
        self.api_base_url = base.trim_end_matches('/').to_string();

        if !(8_000..=96_000).contains(&self.sample_rate) {
            bail!(
                "--sample-rate must be between 8000 and 96000 Hz, got {}",
                self.sample_rate
            );
        }
        if self.max_capture_ms == 0 || self.max_capture_ms > MAX_CAPTURE_HARD_LIMIT_MS {
            bail!(
                "--max-capture-ms must be between 1 and {MAX_CAPTURE_HARD_LIMIT_MS} ms, got {}",
                self.max_capture_ms
            );
        }
        if self.silence_timeout_ms < 200 || self.silence_timeout_ms > self.max_capture_ms {
            bail!(
                "--silence-timeout-ms must be >=200 and <= --max-capture-ms ({})",
                self.max_capture_ms
            );
        }
        if !(MIN_CHUNK_INTERVAL_MS..=MAX_CHUNK_INTERVAL_MS).contains(&self.chunk_interval_ms) {
            bail!(
                "--chunk-interval-ms must be between {MIN_CHUNK_INTERVAL_MS} and {MAX_CHUNK_INTERVAL_MS}, got {}",
                self.chunk_interval_ms
            );
        }
        // The quiet window is measured in chunk arrivals; a chunk as long as
        // the window leaves no margin to tell speech from silence.
        if self.endpoint_mode == EndpointModeArg::Silence
            && self.chunk_interval_ms >= self.silence_timeout_ms
        {
            bail!(
                "--chunk-interval-ms ({}) must be smaller than --silence-timeout-ms ({}) in silence endpoint mode",
                self.chunk_interval_ms,
                self.silence_timeout_ms
            );
        }
        if !(-120.0..=0.0).contains(&self.voice_threshold_db) {
            bail!(
                "--voice-threshold-db must be between -120.0 and 0.0 dB, got {}",
                self.voice_threshold_db
            );
        }
        if self.min_chunk_bytes > 1_000_000 {
            bail!(
                "--min-chunk-bytes must be at most 1000000, got {}",
                self.min_chunk_bytes
            );
        }
        if !(2..=1024).contains(&self.channel_capacity) {
            bail!(
                "--channel-capacity must be between 2 and 1024, got {}",
                self.channel_capacity
            );
        }
        if !(1_000..=120_000).contains(&self.http_timeout_ms) {
            bail!(
                "--http-timeout-ms must be between 1000 and 120000, got {}",
                self.http_timeout_ms
            );
        }

        if let Some(voice) = &self.voice_id {
            if voice.trim().is_empty() {
                bail!("--voice-id cannot be blank");
            }
            if voice.len() > 128 || voice.chars().any(|ch| ch.is_control()) {
                bail!("--voice-id must be <=128 characters with no control characters");
            }
        }

        // The microphone would capture the synthesized reply and feed it back
        // into transcription; single-shot sessions are idle before playback.
        if self.speak && self.continuous {
            bail!("--speak cannot be combined with --continuous");
        }

        if let Some(device) = &self.input_device {
            if device.trim().is_empty() {
                bail!("--input-device cannot be blank");
            }
            if device.len() > 256 || device.chars().any(|ch| ch.is_control()) {
                bail!("--input-device must be <=256 characters with no control characters");
            }
        }

        Ok(())
    }
}

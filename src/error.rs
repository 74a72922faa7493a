//! Error taxonomy for the voice pipeline.
//!
//! Every failure the session can observe is classified here so the state
//! machine can decide between "keep listening", "report and stay usable",
//! and "tear down". See the fatal/benign helpers below.

use thiserror::Error;

/// Classified failures surfaced by the capture, transcription, and playback
/// layers.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// The OS refused microphone access. User-actionable; the session moves to
    /// `Failed` and a fresh `start()` is required after the grant.
    #[error("microphone permission denied")]
    PermissionDenied,

    /// No usable input device, or the device vanished mid-session.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Nothing was captured between start and stop. Benign: the session
    /// returns to listening (continuous) or idle (single-shot).
    #[error("no audio captured")]
    EmptyCapture,

    /// The service answered but heard no speech. Benign, like `EmptyCapture`.
    #[error("no speech detected")]
    EmptyTranscript,

    /// Transport-level failure talking to the remote service.
    #[error("network error: {0}")]
    Network(String),

    /// The remote service returned a non-success status. The response body is
    /// kept as diagnostic detail.
    #[error("service returned status {status}: {detail}")]
    Service { status: u16, detail: String },

    /// Catch-all for anything not enumerated above; forces session teardown.
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl VoiceError {
    /// Benign errors are auto-recovered: the session resumes listening or
    /// returns to idle without surfacing a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, VoiceError::EmptyCapture | VoiceError::EmptyTranscript)
    }

    /// Transient errors are reported to the caller but leave the session
    /// usable for a retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, VoiceError::Network(_) | VoiceError::Service { .. })
    }

    /// Fatal errors end the session; the caller must construct a fresh one.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VoiceError::PermissionDenied
                | VoiceError::DeviceUnavailable(_)
                | VoiceError::Unexpected(_)
        )
    }
}

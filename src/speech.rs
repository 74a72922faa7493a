//! Synthesized-speech playback for agent replies.
//!
//! Remote synthesis first, pluggable local fallback second, silence last.
//! Playback problems are logged and suppressed, never allowed to block the
//! chat flow. At most one playback is audible at a time: starting a new one
//! stops whatever is still playing.
//!
//! Capture and playback share the audio boundary; callers must not start a
//! capture session while their own reply is still playing, or the microphone
//! may transcribe the agent's voice. That arbitration is the caller's
//! responsibility, documented here as part of the contract.

use crate::error::VoiceError;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Synthesized audio returned by a synthesizer, ready for a playback backend.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Text-to-speech capability. The remote client and any local fallback both
/// implement this, which is also where a "preferred voice" policy plugs in
/// instead of hard-coded voice-name matching.
pub trait SpeechSynthesizer {
    fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, VoiceError>;
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_id: Option<&'a str>,
}

/// Blocking HTTP client for the `/api/tts` endpoint. Success is a binary
/// audio body; any non-success status triggers the fallback path.
pub struct HttpSynthesisClient {
    base_url: String,
    voice_id: Option<String>,
    http: reqwest::blocking::Client,
}

impl HttpSynthesisClient {
    pub fn new(
        base_url: &str,
        voice_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, VoiceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| VoiceError::Unexpected(err.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            voice_id,
            http,
        })
    }
}

impl SpeechSynthesizer for HttpSynthesisClient {
    fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, VoiceError> {
        let url = format!("{}/api/tts", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&TtsRequest {
                text,
                voice_id: self.voice_id.as_deref(),
            })
            .send()
            .map_err(|err| VoiceError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(VoiceError::Service {
                status: status.as_u16(),
                detail,
            });
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/mpeg")
            .to_string();
        let bytes = response
            .bytes()
            .map_err(|err| VoiceError::Network(err.to_string()))?
            .to_vec();
        debug!(bytes = bytes.len(), mime, "synthesis response received");
        Ok(SynthesizedAudio { bytes, mime })
    }
}

/// Control surface for one in-flight playback.
pub trait PlaybackControl {
    fn stop(&mut self);
}

/// Represents one synthesized-speech playback. At most one handle is active
/// per coordinator; a superseded handle is stopped before its successor
/// starts.
pub struct PlaybackHandle {
    control: Box<dyn PlaybackControl + Send>,
}

impl PlaybackHandle {
    pub fn new(control: Box<dyn PlaybackControl + Send>) -> Self {
        Self { control }
    }

    pub fn stop(mut self) {
        self.control.stop();
    }
}

/// Turns synthesized audio into sound. A trait seam so tests can observe the
/// stop-previous/start-next ordering without an audio device.
///
/// Backends are not required to be `Send`: the rodio backend owns a
/// `cpal::Stream`, which cannot leave the thread it was created on. The
/// coordinator therefore lives on whichever thread built it.
pub trait PlaybackBackend {
    fn play(&mut self, audio: &SynthesizedAudio) -> Result<PlaybackHandle, VoiceError>;
}

/// Which path produced the audible reply, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Remote,
    Fallback,
    /// Both synthesis paths failed; the reply is shown but not spoken.
    Silent,
}

/// Plays agent replies and arbitrates the shared playback resource.
pub struct SpeechPlaybackCoordinator {
    remote: Box<dyn SpeechSynthesizer + Send>,
    fallback: Option<Box<dyn SpeechSynthesizer + Send>>,
    backend: Box<dyn PlaybackBackend>,
    active: Option<PlaybackHandle>,
}

impl SpeechPlaybackCoordinator {
    pub fn new(
        remote: Box<dyn SpeechSynthesizer + Send>,
        fallback: Option<Box<dyn SpeechSynthesizer + Send>>,
        backend: Box<dyn PlaybackBackend>,
    ) -> Self {
        Self {
            remote,
            fallback,
            backend,
            active: None,
        }
    }

    /// Speak agent text. Stops any playback still active, then tries remote
    /// synthesis, then the fallback synthesizer. Failures are logged, not
    /// propagated: a reply the user cannot hear still reaches the screen.
    pub fn speak(&mut self, text: &str) -> SpeakOutcome {
        if let Some(handle) = self.active.take() {
            handle.stop();
        }

        match self.remote.synthesize(text) {
            Ok(audio) => match self.backend.play(&audio) {
                Ok(handle) => {
                    self.active = Some(handle);
                    return SpeakOutcome::Remote;
                }
                Err(err) => warn!("playback failed for remote synthesis: {err}"),
            },
            Err(err) => warn!("remote synthesis failed, trying fallback: {err}"),
        }

        if let Some(fallback) = self.fallback.as_ref() {
            match fallback.synthesize(text) {
                Ok(audio) => match self.backend.play(&audio) {
                    Ok(handle) => {
                        self.active = Some(handle);
                        return SpeakOutcome::Fallback;
                    }
                    Err(err) => warn!("playback failed for fallback synthesis: {err}"),
                },
                Err(err) => warn!("fallback synthesis failed: {err}"),
            }
        }

        SpeakOutcome::Silent
    }

    /// Stop whatever is playing, if anything.
    pub fn stop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.stop();
        }
    }
}

#[cfg(feature = "playback")]
mod rodio_backend {
    use super::{PlaybackBackend, PlaybackControl, PlaybackHandle, SynthesizedAudio};
    use crate::error::VoiceError;
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
    use std::io::Cursor;

    /// System-audio backend. Keeps the output stream open for the life of the
    /// coordinator so successive replies reuse one device connection.
    pub struct RodioBackend {
        // Held for its side effect: dropping it closes the output device.
        _stream: OutputStream,
        handle: OutputStreamHandle,
    }

    impl RodioBackend {
        pub fn new() -> Result<Self, VoiceError> {
            let (stream, handle) = OutputStream::try_default()
                .map_err(|err| VoiceError::DeviceUnavailable(err.to_string()))?;
            Ok(Self {
                _stream: stream,
                handle,
            })
        }
    }

    struct SinkControl {
        sink: Sink,
    }

    impl PlaybackControl for SinkControl {
        fn stop(&mut self) {
            self.sink.stop();
        }
    }

    impl PlaybackBackend for RodioBackend {
        fn play(&mut self, audio: &SynthesizedAudio) -> Result<PlaybackHandle, VoiceError> {
            let sink = Sink::try_new(&self.handle)
                .map_err(|err| VoiceError::DeviceUnavailable(err.to_string()))?;
            let decoder = Decoder::new(Cursor::new(audio.bytes.clone()))
                .map_err(|err| VoiceError::Unexpected(format!("undecodable audio: {err}")))?;
            sink.append(decoder);
            Ok(PlaybackHandle::new(Box::new(SinkControl { sink })))
        }
    }
}

#[cfg(feature = "playback")]
pub use rodio_backend::RodioBackend;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type EventLog = Arc<Mutex<Vec<String>>>;

    struct ScriptedSynth {
        label: &'static str,
        fail: bool,
    }

    impl SpeechSynthesizer for ScriptedSynth {
        fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, VoiceError> {
            if self.fail {
                return Err(VoiceError::Service {
                    status: 502,
                    detail: "synthesis down".into(),
                });
            }
            Ok(SynthesizedAudio {
                bytes: format!("{}:{}", self.label, text).into_bytes(),
                mime: "audio/mpeg".into(),
            })
        }
    }

    struct LogControl {
        log: EventLog,
        id: String,
    }

    impl PlaybackControl for LogControl {
        fn stop(&mut self) {
            self.log.lock().unwrap().push(format!("stop:{}", self.id));
        }
    }

    struct LogBackend {
        log: EventLog,
    }

    impl PlaybackBackend for LogBackend {
        fn play(&mut self, audio: &SynthesizedAudio) -> Result<PlaybackHandle, VoiceError> {
            let id = String::from_utf8_lossy(&audio.bytes).to_string();
            self.log.lock().unwrap().push(format!("play:{id}"));
            Ok(PlaybackHandle::new(Box::new(LogControl {
                log: self.log.clone(),
                id,
            })))
        }
    }

    fn coordinator(
        remote_fails: bool,
        fallback: Option<bool>,
    ) -> (SpeechPlaybackCoordinator, EventLog) {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let coordinator = SpeechPlaybackCoordinator::new(
            Box::new(ScriptedSynth {
                label: "remote",
                fail: remote_fails,
            }),
            fallback.map(|fail| {
                Box::new(ScriptedSynth {
                    label: "local",
                    fail,
                }) as Box<dyn SpeechSynthesizer + Send>
            }),
            Box::new(LogBackend { log: log.clone() }),
        );
        (coordinator, log)
    }

    #[test]
    fn sequential_speaks_stop_the_previous_playback_first() {
        let (mut coordinator, log) = coordinator(false, None);
        assert_eq!(coordinator.speak("a"), SpeakOutcome::Remote);
        assert_eq!(coordinator.speak("b"), SpeakOutcome::Remote);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["play:remote:a", "stop:remote:a", "play:remote:b"]
        );
    }

    #[test]
    fn remote_failure_falls_back_to_local_synthesis() {
        let (mut coordinator, log) = coordinator(true, Some(false));
        assert_eq!(coordinator.speak("hello"), SpeakOutcome::Fallback);
        assert_eq!(*log.lock().unwrap(), vec!["play:local:hello"]);
    }

    #[test]
    fn both_paths_failing_is_silent_not_fatal() {
        let (mut coordinator, log) = coordinator(true, Some(true));
        assert_eq!(coordinator.speak("hello"), SpeakOutcome::Silent);
        assert!(log.lock().unwrap().is_empty());
        // The coordinator is still usable afterwards.
        assert_eq!(coordinator.speak("again"), SpeakOutcome::Silent);
    }

    #[test]
    fn no_fallback_configured_degrades_to_silent() {
        let (mut coordinator, _log) = coordinator(true, None);
        assert_eq!(coordinator.speak("hello"), SpeakOutcome::Silent);
    }

    #[test]
    fn coordinator_accepts_a_thread_bound_backend() {
        // Models the rodio backend, whose cpal stream pins it to one thread.
        struct ThreadBoundBackend {
            log: EventLog,
            _not_send: std::marker::PhantomData<*mut ()>,
        }

        impl PlaybackBackend for ThreadBoundBackend {
            fn play(&mut self, audio: &SynthesizedAudio) -> Result<PlaybackHandle, VoiceError> {
                let id = String::from_utf8_lossy(&audio.bytes).to_string();
                self.log.lock().unwrap().push(format!("play:{id}"));
                Ok(PlaybackHandle::new(Box::new(LogControl {
                    log: self.log.clone(),
                    id,
                })))
            }
        }

        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let mut coordinator = SpeechPlaybackCoordinator::new(
            Box::new(ScriptedSynth {
                label: "remote",
                fail: false,
            }),
            None,
            Box::new(ThreadBoundBackend {
                log: log.clone(),
                _not_send: std::marker::PhantomData,
            }),
        );
        assert_eq!(coordinator.speak("a"), SpeakOutcome::Remote);
        assert_eq!(*log.lock().unwrap(), vec!["play:remote:a"]);
    }

    #[test]
    fn explicit_stop_halts_the_active_playback() {
        let (mut coordinator, log) = coordinator(false, None);
        coordinator.speak("a");
        coordinator.stop();
        coordinator.stop();
        assert_eq!(*log.lock().unwrap(), vec!["play:remote:a", "stop:remote:a"]);
    }
}

//! The capture session state machine: the single public surface the chat
//! layer consumes.
//!
//! One session owns the microphone stream, the chunk accumulator, the endpoint
//! detector, and the sentence buffer. All transitions happen on one thread
//! (the runner in `voice.rs` pumps events into it), so no chunk is ever
//! processed while an endpoint transition is in progress.
//!
//! States: `Idle -> Acquiring -> Listening -> Stopping -> Assembling ->
//! Transcribing -> Idle`, with continuous mode looping back to `Listening`
//! instead of `Idle`, and a terminal `Failed` reachable on device or
//! permission errors.

use crate::audio::{
    assemble, chunk_dbfs, AudioDeviceGateway, CaptureConstraints, ChunkAccumulator, DeviceStream,
    EndpointCause, EndpointDetector, EndpointMode,
};
use crate::error::VoiceError;
use crate::sentence::{Ingest, SentenceBuffer};
use crate::transcribe::TranscriptionClient;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Whether the session idles after one utterance or keeps listening until an
/// explicit stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    SingleShot,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Acquiring,
    Listening,
    Stopping,
    Assembling,
    Transcribing,
    Failed,
}

/// Tunables for one capture session, projected from the CLI config.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: SessionMode,
    pub endpoint_mode: EndpointMode,
    pub silence_timeout: Duration,
    pub max_capture: Duration,
    pub min_chunk_bytes: usize,
    pub keep_short_final: bool,
    /// Chunks below this RMS level (dBFS) are kept but do not count as voice
    /// arrivals, so a silent microphone cannot postpone the silence endpoint.
    pub voice_threshold_db: f32,
    pub constraints: CaptureConstraints,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::SingleShot,
            endpoint_mode: EndpointMode::SilenceTimeout,
            silence_timeout: Duration::from_millis(2000),
            max_capture: Duration::from_millis(30_000),
            min_chunk_bytes: 2000,
            keep_short_final: true,
            voice_threshold_db: -55.0,
            constraints: CaptureConstraints::default(),
        }
    }
}

/// Callback invoked at most once per completed sentence.
pub type UtteranceCallback = Box<dyn FnMut(&str) + Send>;

pub struct CaptureSession {
    cfg: SessionConfig,
    state: SessionState,
    started_at: Option<Instant>,
    gateway: Box<dyn AudioDeviceGateway + Send>,
    client: Box<dyn TranscriptionClient + Send>,
    stream: Option<DeviceStream>,
    chunk_rx: Option<Receiver<Vec<u8>>>,
    accumulator: ChunkAccumulator,
    detector: Option<EndpointDetector>,
    sentences: SentenceBuffer,
    on_utterance: UtteranceCallback,
    /// Set when this session is discarded or replaced. Checked after the
    /// transcription call resolves so a stale result is never delivered.
    torn_down: Arc<AtomicBool>,
    late_chunks: usize,
    utterances_completed: u64,
}

impl CaptureSession {
    pub fn new(
        cfg: SessionConfig,
        gateway: Box<dyn AudioDeviceGateway + Send>,
        client: Box<dyn TranscriptionClient + Send>,
        on_utterance: UtteranceCallback,
    ) -> Self {
        Self::with_teardown_flag(
            cfg,
            gateway,
            client,
            on_utterance,
            Arc::new(AtomicBool::new(false)),
        )
    }

    /// Like [`CaptureSession::new`] but sharing a caller-owned teardown flag,
    /// so the owning job can discard the session while a transcription call
    /// is still in flight.
    pub fn with_teardown_flag(
        cfg: SessionConfig,
        gateway: Box<dyn AudioDeviceGateway + Send>,
        client: Box<dyn TranscriptionClient + Send>,
        on_utterance: UtteranceCallback,
        torn_down: Arc<AtomicBool>,
    ) -> Self {
        let accumulator = ChunkAccumulator::new(cfg.min_chunk_bytes, cfg.keep_short_final);
        Self {
            cfg,
            state: SessionState::Idle,
            started_at: None,
            gateway,
            client,
            stream: None,
            chunk_rx: None,
            accumulator,
            detector: None,
            sentences: SentenceBuffer::new(),
            on_utterance,
            torn_down,
            late_chunks: 0,
            utterances_completed: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Utterances that completed transcription this session.
    pub fn utterances_completed(&self) -> u64 {
        self.utterances_completed
    }

    /// Receiver for the active capture stream's chunks. Refreshed each time
    /// the device is (re)acquired; the runner re-reads it per iteration.
    pub fn chunk_receiver(&self) -> Option<Receiver<Vec<u8>>> {
        self.chunk_rx.clone()
    }

    /// Shared teardown flag; the owning job sets it when the session is
    /// discarded so in-flight results get dropped.
    pub fn teardown_flag(&self) -> Arc<AtomicBool> {
        self.torn_down.clone()
    }

    /// Begin capture. Valid only from `Idle`; calls from any other state are
    /// idempotent no-ops so a UI toggle cannot get out of sync with us. A
    /// gateway failure is terminal: the session moves to `Failed` and the
    /// caller must construct a fresh one after fixing permissions.
    pub fn start(&mut self) -> Result<(), VoiceError> {
        if self.state != SessionState::Idle {
            debug!(state = ?self.state, "start() ignored outside Idle");
            return Ok(());
        }
        self.started_at = Some(Instant::now());
        self.acquire()
    }

    fn acquire(&mut self) -> Result<(), VoiceError> {
        self.state = SessionState::Acquiring;
        let (tx, rx) = bounded(self.cfg.constraints.channel_capacity.max(1));
        match self.gateway.acquire(&self.cfg.constraints, tx) {
            Ok(stream) => {
                debug!(format = ?stream.format(), "listening");
                self.stream = Some(stream);
                self.chunk_rx = Some(rx);
                self.detector = Some(EndpointDetector::new(
                    self.cfg.endpoint_mode,
                    self.cfg.silence_timeout,
                    self.cfg.max_capture,
                ));
                self.accumulator.clear();
                self.state = SessionState::Listening;
                Ok(())
            }
            Err(err) => {
                self.fail_internal(&err);
                Err(err)
            }
        }
    }

    /// Feed one captured chunk. Chunks arriving outside `Listening` are the
    /// expected late-data race with device teardown; they are counted and
    /// ignored, never an error.
    ///
    /// A live microphone emits chunks continuously, so the chunk is measured
    /// before the detector hears about it: only chunks whose RMS level clears
    /// the voice threshold re-arm the silence deadline. Every chunk is still
    /// accumulated, loud or quiet, so trailing words are never dropped.
    pub fn on_chunk(&mut self, bytes: Vec<u8>) {
        if self.state != SessionState::Listening {
            self.late_chunks += 1;
            return;
        }
        let format = match self.stream.as_ref() {
            Some(stream) => stream.format(),
            None => return,
        };
        let level_db = chunk_dbfs(&bytes);
        self.accumulator.push(bytes, format);
        if level_db >= self.cfg.voice_threshold_db {
            if let Some(detector) = self.detector.as_mut() {
                detector.on_chunk(Instant::now());
            }
        }
    }

    /// Periodic check from the pump loop; fires the silence endpoint when the
    /// quiet window (or the hard cap) has elapsed.
    pub fn on_tick(&mut self, now: Instant) -> Result<(), VoiceError> {
        if self.state != SessionState::Listening {
            return Ok(());
        }
        let fired = self.detector.as_mut().and_then(|d| d.poll(now));
        match fired {
            Some(cause) => self.finish_utterance(cause),
            None => Ok(()),
        }
    }

    /// Explicit stop. Valid only from `Listening`; anywhere else it is an
    /// idempotent no-op, so pressing the toggle twice has the same effect as
    /// once.
    pub fn stop(&mut self) -> Result<(), VoiceError> {
        if self.state != SessionState::Listening {
            debug!(state = ?self.state, "stop() ignored outside Listening");
            return Ok(());
        }
        let fired = self.detector.as_mut().and_then(|d| d.on_stop());
        match fired {
            Some(cause) => self.finish_utterance(cause),
            None => Ok(()),
        }
    }

    /// `Listening -> Stopping -> Assembling -> Transcribing`, then back to
    /// `Listening` (continuous) or `Idle` (single-shot).
    fn finish_utterance(&mut self, cause: EndpointCause) -> Result<(), VoiceError> {
        self.state = SessionState::Stopping;

        // Release the microphone before transcription is even attempted, so
        // the OS indicator clears no matter what the network does. The packer
        // flushes its tail during release; drain those last chunks first so
        // nothing captured before the endpoint is lost.
        let dropped = self.release_stream_and_drain();

        self.state = SessionState::Assembling;
        let chunks = self.accumulator.drain_all();
        let discarded = self.accumulator.discarded();
        let elapsed_ms = self
            .started_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        info!(
            "capture_stats|cause={}|elapsed_ms={}|chunks={}|discarded={}|late={}|dropped={}",
            cause.label(),
            elapsed_ms,
            chunks.len(),
            discarded,
            self.late_chunks,
            dropped,
        );

        let utterance = match assemble(chunks) {
            Ok(utterance) => utterance,
            Err(err) if err.is_benign() => {
                debug!("nothing to transcribe; resuming");
                return self.after_utterance();
            }
            Err(err) => {
                self.fail_internal(&err);
                return Err(err);
            }
        };
        debug!(
            bytes = utterance.byte_len(),
            chunks = utterance.chunk_count,
            "utterance assembled"
        );

        self.state = SessionState::Transcribing;
        let outcome = self.client.transcribe(&utterance);

        // The call may have resolved after this session was discarded; a
        // stale result must never reach a newer session's callback.
        if self.torn_down.load(Ordering::SeqCst) {
            debug!("discarding transcription result for torn-down session");
            self.state = SessionState::Idle;
            return Ok(());
        }

        match outcome {
            Ok(result) => {
                self.utterances_completed += 1;
                if let Ingest::Emit(sentence) = self.sentences.ingest(&result.text) {
                    (self.on_utterance)(&sentence);
                }
                self.after_utterance()
            }
            Err(err) if err.is_benign() => {
                debug!("no speech detected; resuming");
                self.after_utterance()
            }
            Err(err) if err.is_transient() => {
                // Pending sentence text is preserved so a retry can still
                // complete the sentence.
                warn!("transcription failed: {err}");
                self.after_utterance()?;
                Err(err)
            }
            Err(err) => {
                self.fail_internal(&err);
                Err(err)
            }
        }
    }

    fn release_stream_and_drain(&mut self) -> usize {
        let mut dropped = 0;
        if let Some(mut stream) = self.stream.take() {
            let format = stream.format();
            stream.release();
            dropped = stream.dropped_chunks();
            if let Some(rx) = self.chunk_rx.take() {
                while let Ok(bytes) = rx.try_recv() {
                    self.accumulator.push(bytes, format);
                }
            }
        }
        dropped
    }

    /// Where to land after an utterance (or a benign miss): continuous mode
    /// reacquires the device and keeps listening, single-shot returns to idle.
    fn after_utterance(&mut self) -> Result<(), VoiceError> {
        match self.cfg.mode {
            SessionMode::Continuous => self.acquire(),
            SessionMode::SingleShot => {
                self.state = SessionState::Idle;
                Ok(())
            }
        }
    }

    fn fail_internal(&mut self, err: &VoiceError) {
        warn!("session failed: {err}");
        self.release_all();
        self.flush_pending();
        self.state = SessionState::Failed;
    }

    /// Tear the session down from any state: release the device, flush any
    /// pending sentence text through the callback (user input is never
    /// silently dropped), and mark the session so in-flight results are
    /// discarded.
    pub fn close(&mut self) {
        self.release_all();
        self.flush_pending();
        self.torn_down.store(true, Ordering::SeqCst);
        if self.state != SessionState::Failed {
            self.state = SessionState::Idle;
        }
    }

    fn release_all(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.release();
        }
        self.chunk_rx = None;
        self.detector = None;
    }

    fn flush_pending(&mut self) {
        if let Some(pending) = self.sentences.flush() {
            (self.on_utterance)(&pending);
        }
    }
}

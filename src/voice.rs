//! Background worker that owns a capture session and pumps its events.
//!
//! Keeps the caller's thread responsive: the session, its device stream, and
//! the blocking transcription calls all live on one worker thread, and chunk
//! arrivals and silence timeouts are funneled through a single bounded channel
//! (`recv_timeout` doubles as the silence clock). Results flow back over an
//! mpsc channel.

use crate::audio::AudioDeviceGateway;
use crate::error::VoiceError;
use crate::session::{CaptureSession, SessionConfig, SessionState};
use crate::transcribe::TranscriptionClient;
use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// How often the worker wakes to check the silence deadline and stop flag
/// when no chunks are arriving.
const PUMP_TICK: Duration = Duration::from_millis(50);

/// Messages sent from the worker back to the caller.
#[derive(Debug, PartialEq, Eq)]
pub enum VoiceEvent {
    /// One completed sentence, at most once per sentence.
    Utterance(String),
    /// A classified failure. Transient errors leave the job running in
    /// continuous mode; fatal ones end it.
    Error { message: String, fatal: bool },
    /// The worker finished and released all resources.
    SessionEnded { utterances: u64 },
}

/// Handle the caller uses to control the worker and collect results.
pub struct VoiceJob {
    pub receiver: mpsc::Receiver<VoiceEvent>,
    handle: Option<thread::JoinHandle<()>>,
    stop_flag: Arc<AtomicBool>,
    torn_down: Arc<AtomicBool>,
}

/// Clonable handle for requesting a stop from another thread.
#[derive(Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

impl VoiceJob {
    /// Ask the session to stop capturing and process what was recorded.
    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    /// Handle other threads can use to request a stop.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: self.stop_flag.clone(),
        }
    }

    /// Discard the job: stop capture and mark the session torn down so any
    /// transcription result still in flight is dropped instead of delivered.
    pub fn cancel(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    /// Wait for the worker to finish.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for VoiceJob {
    fn drop(&mut self) {
        // A dropped job is a discarded session; never let its late results
        // masquerade as a newer session's.
        self.cancel();
    }
}

/// Spawn a worker thread that runs one capture session to completion.
pub fn start_voice_job(
    cfg: SessionConfig,
    gateway: Box<dyn AudioDeviceGateway + Send>,
    client: Box<dyn TranscriptionClient + Send>,
) -> VoiceJob {
    let (tx, rx) = mpsc::channel();
    let stop_flag = Arc::new(AtomicBool::new(false));
    let torn_down = Arc::new(AtomicBool::new(false));

    let worker_stop = stop_flag.clone();
    let worker_torn_down = torn_down.clone();
    let handle = thread::spawn(move || {
        run_session(cfg, gateway, client, tx, worker_stop, worker_torn_down);
    });

    VoiceJob {
        receiver: rx,
        handle: Some(handle),
        stop_flag,
        torn_down,
    }
}

fn run_session(
    cfg: SessionConfig,
    gateway: Box<dyn AudioDeviceGateway + Send>,
    client: Box<dyn TranscriptionClient + Send>,
    tx: mpsc::Sender<VoiceEvent>,
    stop_flag: Arc<AtomicBool>,
    torn_down: Arc<AtomicBool>,
) {
    let callback_tx = tx.clone();
    let callback = Box::new(move |text: &str| {
        let _ = callback_tx.send(VoiceEvent::Utterance(text.to_string()));
    });
    let mut session = CaptureSession::with_teardown_flag(cfg, gateway, client, callback, torn_down);

    if let Err(err) = session.start() {
        report(&tx, &err);
    }

    loop {
        match session.state() {
            SessionState::Idle | SessionState::Failed => break,
            _ => {}
        }

        if stop_flag.load(Ordering::Relaxed) {
            debug!("stop requested; finishing utterance");
            if let Err(err) = session.stop() {
                report(&tx, &err);
            }
            break;
        }

        let chunk_rx = match session.chunk_receiver() {
            Some(rx) => rx,
            None => break,
        };
        match chunk_rx.recv_timeout(PUMP_TICK) {
            Ok(bytes) => session.on_chunk(bytes),
            Err(RecvTimeoutError::Timeout) => {
                if let Err(err) = session.on_tick(Instant::now()) {
                    report(&tx, &err);
                    if err.is_fatal() {
                        break;
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                // The device side went away without an endpoint transition on
                // this thread: the stream died underneath us.
                if session.state() == SessionState::Listening {
                    let err =
                        VoiceError::DeviceUnavailable("capture stream disconnected".to_string());
                    report(&tx, &err);
                    break;
                }
            }
        }
    }

    session.close();
    let _ = tx.send(VoiceEvent::SessionEnded {
        utterances: session.utterances_completed(),
    });
}

fn report(tx: &mpsc::Sender<VoiceEvent>, err: &VoiceError) {
    let _ = tx.send(VoiceEvent::Error {
        message: err.to_string(),
        fatal: err.is_fatal(),
    });
}

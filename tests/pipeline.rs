//! End-to-end pipeline tests through the public API: a scripted device
//! gateway and transcription client drive a real worker thread and session.

use crossbeam_channel::Sender;
use medivoice::audio::{
    AudioDeviceGateway, AudioFormat, CaptureConstraints, DeviceStream, EndpointMode, StreamControl,
    Utterance,
};
use medivoice::session::{SessionConfig, SessionMode};
use medivoice::transcribe::{TranscriptResult, TranscriptionClient};
use medivoice::voice::{start_voice_job, VoiceEvent};
use medivoice::VoiceError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct GatewayShared {
    sender: Mutex<Option<Sender<Vec<u8>>>>,
    acquires: AtomicUsize,
    releases: Arc<AtomicUsize>,
}

struct FakeGateway {
    shared: Arc<GatewayShared>,
    fail: bool,
}

impl FakeGateway {
    fn new() -> (Self, Arc<GatewayShared>) {
        let shared = Arc::new(GatewayShared {
            sender: Mutex::new(None),
            acquires: AtomicUsize::new(0),
            releases: Arc::new(AtomicUsize::new(0)),
        });
        (
            Self {
                shared: shared.clone(),
                fail: false,
            },
            shared,
        )
    }

    fn failing() -> Self {
        let (mut gateway, _) = Self::new();
        gateway.fail = true;
        gateway
    }
}

struct CountingControl(Arc<AtomicUsize>);

impl StreamControl for CountingControl {
    fn shutdown(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl AudioDeviceGateway for FakeGateway {
    fn acquire(
        &self,
        _constraints: &CaptureConstraints,
        chunks: Sender<Vec<u8>>,
    ) -> Result<DeviceStream, VoiceError> {
        if self.fail {
            return Err(VoiceError::PermissionDenied);
        }
        self.shared.acquires.fetch_add(1, Ordering::SeqCst);
        *self.shared.sender.lock().unwrap() = Some(chunks);
        Ok(DeviceStream::new(
            Box::new(CountingControl(self.shared.releases.clone())),
            AudioFormat::pcm_mono(16_000),
            Arc::new(AtomicUsize::new(0)),
        ))
    }
}

impl GatewayShared {
    fn wait_for_acquire(&self, min: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.acquires.load(Ordering::SeqCst) < min {
            assert!(Instant::now() < deadline, "gateway never acquired");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn send_chunk(&self, bytes: Vec<u8>) {
        self.sender
            .lock()
            .unwrap()
            .as_ref()
            .expect("stream acquired")
            .send(bytes)
            .expect("channel open");
    }
}

struct FakeClient {
    scripted: Mutex<VecDeque<Result<TranscriptResult, VoiceError>>>,
    utterance_sizes: Arc<Mutex<Vec<usize>>>,
}

impl FakeClient {
    fn scripted(
        results: Vec<Result<TranscriptResult, VoiceError>>,
    ) -> (Self, Arc<Mutex<Vec<usize>>>) {
        let sizes = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                scripted: Mutex::new(results.into()),
                utterance_sizes: sizes.clone(),
            },
            sizes,
        )
    }
}

impl TranscriptionClient for FakeClient {
    fn transcribe(&self, utterance: &Utterance) -> Result<TranscriptResult, VoiceError> {
        self.utterance_sizes
            .lock()
            .unwrap()
            .push(utterance.bytes.len());
        self.scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(VoiceError::EmptyTranscript))
    }
}

fn sentence(text: &str) -> Result<TranscriptResult, VoiceError> {
    Ok(TranscriptResult {
        text: text.to_string(),
        is_final_sentence: text.ends_with(['.', '!', '?']),
    })
}

fn manual_config() -> SessionConfig {
    SessionConfig {
        mode: SessionMode::SingleShot,
        endpoint_mode: EndpointMode::ExplicitStop,
        min_chunk_bytes: 4,
        ..SessionConfig::default()
    }
}

fn collect_events(job: medivoice::voice::VoiceJob) -> Vec<VoiceEvent> {
    let mut events = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match job.receiver.recv_timeout(remaining) {
            Ok(event) => {
                let done = matches!(event, VoiceEvent::SessionEnded { .. });
                events.push(event);
                if done {
                    break;
                }
            }
            Err(_) => panic!("worker did not finish in time: {events:?}"),
        }
    }
    job.join();
    events
}

#[test]
fn capture_stop_transcribe_emits_one_sentence() {
    let (gateway, shared) = FakeGateway::new();
    let (client, sizes) = FakeClient::scripted(vec![sentence("I cut my hand on glass.")]);
    let job = start_voice_job(manual_config(), Box::new(gateway), Box::new(client));

    shared.wait_for_acquire(1);
    shared.send_chunk(vec![1u8; 640]);
    shared.send_chunk(vec![2u8; 640]);
    std::thread::sleep(Duration::from_millis(150));
    job.request_stop();

    let events = collect_events(job);
    assert!(events.contains(&VoiceEvent::Utterance("I cut my hand on glass.".into())));
    assert!(events.contains(&VoiceEvent::SessionEnded { utterances: 1 }));
    assert_eq!(*sizes.lock().unwrap(), vec![1280]);
    assert_eq!(shared.releases.load(Ordering::SeqCst), 1);
}

#[test]
fn partial_fragments_join_into_one_sentence_across_utterances() {
    let (gateway, shared) = FakeGateway::new();
    let (client, _) = FakeClient::scripted(vec![
        Ok(TranscriptResult {
            text: "I cut my".into(),
            is_final_sentence: false,
        }),
        sentence("hand on glass."),
    ]);
    let cfg = SessionConfig {
        mode: SessionMode::Continuous,
        endpoint_mode: EndpointMode::SilenceTimeout,
        silence_timeout: Duration::from_millis(200),
        min_chunk_bytes: 4,
        ..SessionConfig::default()
    };
    let job = start_voice_job(cfg, Box::new(gateway), Box::new(client));

    shared.wait_for_acquire(1);
    shared.send_chunk(vec![1u8; 64]);
    // The silence timeout ends the first utterance; continuous mode then
    // reacquires the device for the second fragment.
    shared.wait_for_acquire(2);
    shared.send_chunk(vec![2u8; 64]);
    shared.wait_for_acquire(3);
    job.request_stop();

    let events = collect_events(job);
    let sentences: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            VoiceEvent::Utterance(text) => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(sentences, vec!["I cut my hand on glass."]);
}

#[test]
fn stopping_with_no_audio_ends_quietly() {
    let (gateway, shared) = FakeGateway::new();
    let (client, sizes) = FakeClient::scripted(vec![]);
    let job = start_voice_job(manual_config(), Box::new(gateway), Box::new(client));

    shared.wait_for_acquire(1);
    job.request_stop();

    let events = collect_events(job);
    assert!(events.contains(&VoiceEvent::SessionEnded { utterances: 0 }));
    assert!(!events
        .iter()
        .any(|event| matches!(event, VoiceEvent::Utterance(_))));
    assert!(sizes.lock().unwrap().is_empty(), "nothing was transcribed");
}

#[test]
fn permission_denied_surfaces_as_a_fatal_error() {
    let (client, _) = FakeClient::scripted(vec![]);
    let job = start_voice_job(
        manual_config(),
        Box::new(FakeGateway::failing()),
        Box::new(client),
    );

    let events = collect_events(job);
    assert!(events.iter().any(|event| matches!(
        event,
        VoiceEvent::Error { fatal: true, .. }
    )));
    assert!(events.contains(&VoiceEvent::SessionEnded { utterances: 0 }));
}

#[test]
fn cancelled_job_suppresses_in_flight_results() {
    let (gateway, shared) = FakeGateway::new();
    let (client, _) = FakeClient::scripted(vec![sentence("Too late.")]);
    let job = start_voice_job(manual_config(), Box::new(gateway), Box::new(client));

    shared.wait_for_acquire(1);
    shared.send_chunk(vec![1u8; 64]);
    std::thread::sleep(Duration::from_millis(100));
    job.cancel();

    let events = collect_events(job);
    assert!(
        !events.contains(&VoiceEvent::Utterance("Too late.".into())),
        "cancelled session must not deliver results: {events:?}"
    );
}

#[test]
fn silence_timeout_completes_the_utterance_without_a_stop() {
    let (gateway, shared) = FakeGateway::new();
    let (client, _) = FakeClient::scripted(vec![sentence("Hello there.")]);
    let cfg = SessionConfig {
        endpoint_mode: EndpointMode::SilenceTimeout,
        silence_timeout: Duration::from_millis(250),
        min_chunk_bytes: 4,
        ..SessionConfig::default()
    };
    let job = start_voice_job(cfg, Box::new(gateway), Box::new(client));

    shared.wait_for_acquire(1);
    shared.send_chunk(vec![1u8; 64]);

    let events = collect_events(job);
    assert!(events.contains(&VoiceEvent::Utterance("Hello there.".into())));
    assert!(events.contains(&VoiceEvent::SessionEnded { utterances: 1 }));
}

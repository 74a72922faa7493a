//! CLI entry point: capture speech, print transcribed sentences to stdout.

use anyhow::{Context, Result};
use medivoice::audio::{mic_permission_hint, CpalDeviceGateway};
use medivoice::config::AppConfig;
use medivoice::logging::init_tracing;
use medivoice::speech::SpeechPlaybackCoordinator;
use medivoice::transcribe::HttpTranscriptionClient;
use medivoice::voice::{start_voice_job, VoiceEvent};
use std::io::BufRead;
use std::thread;
use tracing::{error, info, warn};

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_tracing(config.verbose);

    if config.list_input_devices {
        return list_input_devices();
    }

    let speaker = if config.speak {
        Some(build_speaker(&config)?)
    } else {
        None
    };

    let gateway = Box::new(CpalDeviceGateway::new());
    let client = Box::new(
        HttpTranscriptionClient::new(&config.api_base_url, config.http_timeout())
            .context("failed to build transcription client")?,
    );
    let job = start_voice_job(config.session_config(), gateway, client);
    info!(
        mode = config.endpoint_mode.label(),
        continuous = config.continuous,
        "listening (press Enter to stop)"
    );

    spawn_stop_listener(job.stop_handle());
    run_event_loop(job, speaker)
}

fn run_event_loop(
    job: medivoice::voice::VoiceJob,
    mut speaker: Option<SpeechPlaybackCoordinator>,
) -> Result<()> {
    let mut saw_fatal = false;
    while let Ok(event) = job.receiver.recv() {
        match event {
            VoiceEvent::Utterance(text) => {
                println!("{text}");
                if let Some(speaker) = speaker.as_mut() {
                    speaker.speak(&text);
                }
            }
            VoiceEvent::Error { message, fatal } => {
                if fatal {
                    saw_fatal = true;
                    error!("{message}");
                    if message.contains("permission") {
                        eprintln!("{}", mic_permission_hint());
                    }
                } else {
                    warn!("{message}");
                }
            }
            VoiceEvent::SessionEnded { utterances } => {
                info!(utterances, "session ended");
                break;
            }
        }
    }
    if let Some(speaker) = speaker.as_mut() {
        speaker.stop();
    }
    job.join();
    if saw_fatal {
        anyhow::bail!("voice session failed");
    }
    Ok(())
}

/// Enter on stdin requests a stop; the worker finishes the current utterance.
fn spawn_stop_listener(stop: medivoice::voice::StopHandle) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_ok() {
            stop.request_stop();
        }
    });
}

fn list_input_devices() -> Result<()> {
    let devices =
        CpalDeviceGateway::list_input_devices().context("failed to enumerate input devices")?;
    if devices.is_empty() {
        println!("no input devices detected");
        eprintln!("{}", mic_permission_hint());
        return Ok(());
    }
    for name in devices {
        println!("{name}");
    }
    Ok(())
}

#[cfg(feature = "playback")]
fn build_speaker(config: &AppConfig) -> Result<SpeechPlaybackCoordinator> {
    use medivoice::speech::{HttpSynthesisClient, RodioBackend};
    let remote = Box::new(
        HttpSynthesisClient::new(
            &config.api_base_url,
            config.voice_id.clone(),
            config.http_timeout(),
        )
        .context("failed to build synthesis client")?,
    );
    let backend = Box::new(RodioBackend::new().context("failed to open audio output")?);
    Ok(SpeechPlaybackCoordinator::new(remote, None, backend))
}

#[cfg(not(feature = "playback"))]
fn build_speaker(_config: &AppConfig) -> Result<SpeechPlaybackCoordinator> {
    anyhow::bail!("--speak requires building with the 'playback' feature")
}

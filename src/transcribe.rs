//! Remote speech-to-text client.
//!
//! An assembled utterance is framed into a WAV container (container framing
//! only; the PCM is sent at the rate the device negotiated) and posted as
//! multipart form data. Failures are classified so the session can tell
//! "retry later" from "nothing was said".

use crate::audio::{Encoding, Utterance};
use crate::error::VoiceError;
use crate::sentence::ends_sentence;
use regex::Regex;
use serde::Deserialize;
use std::io::Cursor;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Text produced for one utterance. Ephemeral; consumed by the sentence
/// buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptResult {
    pub text: String,
    pub is_final_sentence: bool,
}

/// Speech-to-text capability. A trait seam so session tests can script
/// transcription outcomes without a network.
pub trait TranscriptionClient {
    fn transcribe(&self, utterance: &Utterance) -> Result<TranscriptResult, VoiceError>;
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
}

/// Blocking HTTP client for the `/api/transcribe` endpoint.
pub struct HttpTranscriptionClient {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl HttpTranscriptionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, VoiceError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| VoiceError::Unexpected(err.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

impl TranscriptionClient for HttpTranscriptionClient {
    fn transcribe(&self, utterance: &Utterance) -> Result<TranscriptResult, VoiceError> {
        let wav = wav_bytes(utterance)?;
        let url = format!("{}/api/transcribe", self.base_url);
        debug!(
            url,
            bytes = wav.len(),
            chunks = utterance.chunk_count,
            "sending utterance for transcription"
        );

        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|err| VoiceError::Unexpected(err.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&url)
            .multipart(form)
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

        let body: TranscribeResponse = response
            .json()
            .map_err(|err| VoiceError::Network(format!("invalid transcription body: {err}")))?;
        into_result(&body.text)
    }
}

/// Scrub and package raw service text. Blank output (after stripping
/// non-speech markers) is classified `EmptyTranscript`, which the session
/// treats as "keep listening", not a failure.
pub fn into_result(raw: &str) -> Result<TranscriptResult, VoiceError> {
    let text = sanitize_transcript(raw);
    if text.is_empty() {
        return Err(VoiceError::EmptyTranscript);
    }
    let is_final_sentence = ends_sentence(&text);
    Ok(TranscriptResult {
        text,
        is_final_sentence,
    })
}

/// Strip the non-speech markers speech services emit for silence and noise,
/// then collapse whitespace.
pub fn sanitize_transcript(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    static NON_SPEECH_RE: OnceLock<Regex> = OnceLock::new();
    let re = NON_SPEECH_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\[\s*\]|\(\s*\)|\[(?:\s*(?:silence|noise|inaudible|blank_audio|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background)\s*)\]|\((?:\s*(?:silence|noise|inaudible|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background)\s*)\)",
        )
        .expect("non-speech regex should compile")
    });
    let without_markers = re.replace_all(trimmed, " ");
    without_markers
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Frame the utterance's PCM into a WAV container at the negotiated rate.
fn wav_bytes(utterance: &Utterance) -> Result<Vec<u8>, VoiceError> {
    match utterance.format.encoding {
        Encoding::PcmI16 => {}
    }
    let spec = hound::WavSpec {
        channels: utterance.format.channels,
        sample_rate: utterance.format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|err| VoiceError::Unexpected(format!("wav writer: {err}")))?;
        for pair in utterance.bytes.chunks_exact(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            writer
                .write_sample(sample)
                .map_err(|err| VoiceError::Unexpected(format!("wav sample: {err}")))?;
        }
        writer
            .finalize()
            .map_err(|err| VoiceError::Unexpected(format!("wav finalize: {err}")))?;
    }
    Ok(cursor.into_inner())
}

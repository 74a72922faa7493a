//! Assembly of accumulated chunks into one complete utterance.

use super::chunk::{AudioChunk, AudioFormat};
use crate::error::VoiceError;

/// One complete unit of captured speech, ready for transcription.
///
/// Invariants: at least one chunk contributed, all chunks shared one format,
/// and sequence numbers were strictly increasing.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
    pub chunk_count: usize,
    pub first_seq: u64,
    pub last_seq: u64,
}

impl Utterance {
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

/// Merge drained chunks into a single encoded audio object.
///
/// Concatenation preserves arrival order; the format tag is taken from the
/// first chunk (one negotiated format per session, so no transcoding happens
/// here). An empty drain yields `EmptyCapture`, which is a normal, recoverable
/// condition: the user started and immediately stopped.
pub fn assemble(chunks: Vec<AudioChunk>) -> Result<Utterance, VoiceError> {
    let first = match chunks.first() {
        Some(first) => first,
        None => return Err(VoiceError::EmptyCapture),
    };
    let format = first.format;
    let first_seq = first.seq;
    let mut last_seq = first_seq;
    let mut total = 0usize;

    for chunk in &chunks {
        if chunk.format != format {
            return Err(VoiceError::Unexpected(format!(
                "chunk format changed mid-session ({:?} then {:?})",
                format, chunk.format
            )));
        }
        if chunk.seq < last_seq {
            return Err(VoiceError::Unexpected(format!(
                "chunk sequence went backwards ({} after {})",
                chunk.seq, last_seq
            )));
        }
        last_seq = chunk.seq;
        total += chunk.bytes.len();
    }

    let mut bytes = Vec::with_capacity(total);
    let chunk_count = chunks.len();
    for chunk in chunks {
        bytes.extend(chunk.bytes);
    }

    Ok(Utterance {
        bytes,
        format,
        chunk_count,
        first_seq,
        last_seq,
    })
}

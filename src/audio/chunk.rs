//! Audio chunk types and the per-session accumulator.
//!
//! The capture device emits fixed-interval byte chunks; the accumulator keeps
//! them in arrival order, assigns sequence numbers, and filters out warm-up
//! fragments too small to be worth a transcription round trip.

use std::time::Instant;

/// Wire format negotiated once per session at device-acquire time.
///
/// Capture requests 16 kHz mono but records whatever rate the hardware
/// actually delivered; downstream code must read the rate from here instead of
/// assuming the target was honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub encoding: Encoding,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Little-endian signed 16-bit PCM, no container.
    PcmI16,
}

impl AudioFormat {
    pub fn pcm_mono(sample_rate: u32) -> Self {
        Self {
            encoding: Encoding::PcmI16,
            sample_rate,
            channels: 1,
        }
    }
}

/// One captured audio fragment. Immutable once stored; sequence numbers are
/// assigned by the accumulator at push time and are strictly increasing within
/// a session.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub seq: u64,
    pub bytes: Vec<u8>,
    pub format: AudioFormat,
    pub arrived_at: Instant,
}

/// What happened to a pushed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Stored { seq: u64 },
    /// Below the minimum viable size; counted and set aside.
    TooSmall,
}

/// Ordered, append-only chunk buffer owned by one session.
///
/// Chunks smaller than `min_chunk_bytes` are treated as device warm-up noise
/// and set aside with a diagnostic counter. If nothing else was captured by
/// drain time and the keep-short-final policy is on, the most recent short
/// chunk is promoted instead, so a very short utterance is not lost entirely.
pub struct ChunkAccumulator {
    chunks: Vec<AudioChunk>,
    next_seq: u64,
    min_chunk_bytes: usize,
    keep_short_final: bool,
    held_short: Option<AudioChunk>,
    discarded: usize,
}

impl ChunkAccumulator {
    pub fn new(min_chunk_bytes: usize, keep_short_final: bool) -> Self {
        Self {
            chunks: Vec::new(),
            next_seq: 0,
            min_chunk_bytes,
            keep_short_final,
            held_short: None,
            discarded: 0,
        }
    }

    /// Append a chunk, assigning the next sequence number.
    pub fn push(&mut self, bytes: Vec<u8>, format: AudioFormat) -> PushOutcome {
        let chunk = AudioChunk {
            seq: self.next_seq,
            bytes,
            format,
            arrived_at: Instant::now(),
        };
        self.next_seq += 1;

        if chunk.bytes.len() < self.min_chunk_bytes {
            self.discarded += 1;
            // Keep only the latest short chunk as a last resort for drain time.
            self.held_short = Some(chunk);
            return PushOutcome::TooSmall;
        }
        self.chunks.push(chunk);
        PushOutcome::Stored {
            seq: self.next_seq - 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Count of chunks set aside as too small.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Empty the accumulator, returning chunks in arrival order.
    ///
    /// When no full-size chunk was stored but a short one was held and the
    /// keep-short-final policy is on, that short chunk is returned so the
    /// session-final fragment survives.
    pub fn drain_all(&mut self) -> Vec<AudioChunk> {
        let held = self.held_short.take();
        if self.chunks.is_empty() {
            if self.keep_short_final {
                if let Some(short) = held {
                    return vec![short];
                }
            }
            return Vec::new();
        }
        std::mem::take(&mut self.chunks)
    }

    /// Reset for the next utterance without disturbing sequence numbering,
    /// which stays monotonic across a continuous session.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.held_short = None;
    }
}

//! RMS level measurement for voiced/silent chunk classification.
//!
//! A live microphone produces chunks continuously whether or not anyone is
//! speaking, so arrival alone cannot mean "speech". The session measures each
//! chunk and only treats it as a voice arrival when its level clears the
//! configured threshold.

/// Level reported for empty or all-zero input, well below any usable
/// threshold.
pub const LEVEL_FLOOR_DB: f32 = -120.0;

/// Mean RMS level of little-endian i16 PCM, in dBFS.
pub fn chunk_dbfs(bytes: &[u8]) -> f32 {
    let mut energy = 0.0f32;
    let mut count = 0usize;
    for pair in bytes.chunks_exact(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0;
        energy += sample * sample;
        count += 1;
    }
    if count == 0 || energy == 0.0 {
        return LEVEL_FLOOR_DB;
    }
    let rms = (energy / count as f32).sqrt().max(1e-6);
    (20.0 * rms.log10()).max(LEVEL_FLOOR_DB)
}

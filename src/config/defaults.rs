//! Default values shared between the CLI definition and validation.

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5001";
pub const DEFAULT_SILENCE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_MAX_CAPTURE_MS: u64 = 30_000;
pub const DEFAULT_CHUNK_INTERVAL_MS: u64 = 200;
pub const DEFAULT_MIN_CHUNK_BYTES: usize = 2_000;
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_VOICE_THRESHOLD_DB: f32 = -55.0;

pub const MIN_CHUNK_INTERVAL_MS: u64 = 20;
pub const MAX_CHUNK_INTERVAL_MS: u64 = 6_000;
pub const MAX_CAPTURE_HARD_LIMIT_MS: u64 = 120_000;

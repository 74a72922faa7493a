//! Audio capture pipeline: device gateway, chunk accumulation, endpoint
//! detection, and utterance assembly.
//!
//! Capture requests 16 kHz mono from the device, but the negotiated format
//! records the actual hardware rate; nothing downstream may assume the target
//! was honored.

/// Sample rate requested from the capture device (best effort).
pub const TARGET_RATE: u32 = 16_000;

mod chunk;
mod device;
mod endpoint;
mod level;
mod utterance;

pub use chunk::{AudioChunk, AudioFormat, ChunkAccumulator, Encoding, PushOutcome};
pub use device::{
    mic_permission_hint, AudioDeviceGateway, CaptureConstraints, CpalDeviceGateway, DeviceStream,
    StreamControl,
};
pub use endpoint::{EndpointCause, EndpointDetector, EndpointMode};
pub use level::{chunk_dbfs, LEVEL_FLOOR_DB};
pub use utterance::{assemble, Utterance};

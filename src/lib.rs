pub mod audio;
pub mod config;
pub mod error;
pub mod logging;
pub mod sentence;
pub mod session;
pub mod speech;
pub mod transcribe;
pub mod voice;

pub use error::VoiceError;
pub use session::{CaptureSession, SessionConfig, SessionMode, SessionState};
pub use voice::{start_voice_job, VoiceEvent, VoiceJob};

//! Endpoint detection: deciding when the user has finished speaking.
//!
//! Two strategies share one detector so the session state machine does not
//! need a code path per policy. Explicit-stop waits for the caller; silence
//! mode re-arms a deadline on every voiced chunk and fires when the quiet
//! window elapses. The session decides what counts as "voiced" (it gates
//! arrivals on RMS level, since a silent microphone still produces chunks);
//! the detector only tracks time. It fires at most once per utterance.

use std::time::{Duration, Instant};

/// How an utterance is allowed to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointMode {
    /// The utterance ends only when the caller invokes `stop()`.
    ExplicitStop,
    /// The utterance ends automatically after a configured quiet window with
    /// no voiced chunk arrivals.
    SilenceTimeout,
}

/// Why the endpoint fired. Mirrors what the caller needs for logs and for the
/// assembler's trailing-silence decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointCause {
    ExplicitStop,
    Silence { quiet_ms: u64 },
    /// Hard cap so silence mode cannot hold the recorder open forever.
    MaxDuration,
}

impl EndpointCause {
    pub fn label(&self) -> &'static str {
        match self {
            EndpointCause::ExplicitStop => "explicit_stop",
            EndpointCause::Silence { .. } => "silence",
            EndpointCause::MaxDuration => "max_duration",
        }
    }
}

/// Single-fire endpoint detector.
///
/// All methods take `now` explicitly so tests can drive time deterministically.
pub struct EndpointDetector {
    mode: EndpointMode,
    quiet_window: Duration,
    max_capture: Duration,
    started_at: Instant,
    deadline: Option<Instant>,
    fired: bool,
}

impl EndpointDetector {
    pub fn new(mode: EndpointMode, quiet_window: Duration, max_capture: Duration) -> Self {
        Self::started_at(mode, quiet_window, max_capture, Instant::now())
    }

    pub fn started_at(
        mode: EndpointMode,
        quiet_window: Duration,
        max_capture: Duration,
        now: Instant,
    ) -> Self {
        let deadline = match mode {
            // Armed immediately: a user who never speaks still times out.
            EndpointMode::SilenceTimeout => Some(now + quiet_window),
            EndpointMode::ExplicitStop => None,
        };
        Self {
            mode,
            quiet_window,
            max_capture,
            started_at: now,
            deadline,
            fired: false,
        }
    }

    /// A voiced chunk arrived: re-arm (replace, never accumulate) the silence
    /// deadline. Arrivals after the endpoint fired are tolerated and ignored.
    pub fn on_chunk(&mut self, now: Instant) {
        if self.fired {
            return;
        }
        if self.mode == EndpointMode::SilenceTimeout {
            self.deadline = Some(now + self.quiet_window);
        }
    }

    /// Periodic check from the session's pump loop. Returns the endpoint cause
    /// the first time a deadline or the hard cap is crossed, `None` after.
    pub fn poll(&mut self, now: Instant) -> Option<EndpointCause> {
        if self.fired {
            return None;
        }
        if now.duration_since(self.started_at) >= self.max_capture {
            self.fired = true;
            return Some(EndpointCause::MaxDuration);
        }
        if let Some(deadline) = self.deadline {
            if now >= deadline {
                self.fired = true;
                return Some(EndpointCause::Silence {
                    quiet_ms: self.quiet_window.as_millis() as u64,
                });
            }
        }
        None
    }

    /// Explicit stop from the caller. Valid in both modes; cancels any armed
    /// deadline so it cannot fire a duplicate endpoint during teardown.
    pub fn on_stop(&mut self) -> Option<EndpointCause> {
        if self.fired {
            return None;
        }
        self.fired = true;
        self.deadline = None;
        Some(EndpointCause::ExplicitStop)
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

//! Sentence buffer: merges successive partial transcripts into one complete
//! sentence before the chat layer sees them.
//!
//! A long utterance spoken across several capture rounds surfaces as one
//! coherent message instead of fragment-by-fragment. Pending text is released
//! on terminal punctuation, or flushed wholesale when the session ends so user
//! input is never silently dropped.

/// Outcome of feeding one partial transcript into the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingest {
    /// The accumulated text forms a complete sentence; buffer state is cleared.
    Emit(String),
    /// Still waiting for a sentence boundary.
    Hold,
}

/// Accumulates partial transcript text for the current session. Mutated only
/// by the session's single processing path, never concurrently.
#[derive(Debug, Default)]
pub struct SentenceBuffer {
    pending: String,
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment (space-joined). Emits the accumulated text and clears
    /// state when the incoming fragment carries terminal punctuation.
    pub fn ingest(&mut self, text: &str) -> Ingest {
        let fragment = text.trim();
        if fragment.is_empty() {
            return Ingest::Hold;
        }
        if !self.pending.is_empty() {
            self.pending.push(' ');
        }
        self.pending.push_str(fragment);

        if ends_sentence(fragment) {
            Ingest::Emit(std::mem::take(&mut self.pending))
        } else {
            Ingest::Hold
        }
    }

    /// Release whatever is pending, complete sentence or not. Called at
    /// session end (explicit close or fatal error) so a trailing fragment
    /// still reaches the utterance callback.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Terminal punctuation check shared with the transcription client's
/// `is_final_sentence` flag. Trailing quotes and brackets are looked through
/// so `He said "stop."` counts as a boundary.
pub fn ends_sentence(text: &str) -> bool {
    text.trim_end()
        .chars()
        .rev()
        .find(|c| !matches!(c, '"' | '\'' | ')' | ']'))
        .map(|c| matches!(c, '.' | '!' | '?'))
        .unwrap_or(false)
}

//! Append-only committed transcript buffer
//!
//! One buffer per active utterance, owned exclusively by its adapter.
//! Committed segments are joined with a single space; interim text never
//! enters the buffer and is only used to compute preview strings.

use parking_lot::Mutex;

/// The committed-transcript accumulator for one utterance.
///
/// Repeated reads are monotonically non-decreasing in content until
/// [`TranscriptBuffer::clear`] is called.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    committed: Mutex<String>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a committed segment, separated from prior content by a single
    /// space. Empty segments are ignored.
    pub fn append_final(&self, segment: &str) {
        let segment = segment.trim();
        if segment.is_empty() {
            return;
        }
        let mut committed = self.committed.lock();
        if !committed.is_empty() {
            committed.push(' ');
        }
        committed.push_str(segment);
    }

    /// Trimmed committed transcript accumulated so far. Pure read.
    pub fn get(&self) -> String {
        self.committed.lock().trim().to_string()
    }

    /// Committed buffer plus pending interim text, for interim events.
    /// Never mutates the buffer.
    pub fn preview(&self, pending: &str) -> String {
        let committed = self.committed.lock();
        let pending = pending.trim();
        if committed.is_empty() {
            return pending.to_string();
        }
        if pending.is_empty() {
            return committed.trim().to_string();
        }
        format!("{} {}", committed.trim(), pending)
    }

    /// Reset to empty, used between utterances without touching the transport.
    pub fn clear(&self) {
        self.committed.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.committed.lock().is_empty()
    }
}

//! Session event surface
//!
//! Every adapter emits the same event set, keeping the orchestrator
//! provider-agnostic. Listeners are registered per event kind on an
//! [`EventBus`]; a panicking listener is isolated so the remaining listeners
//! still receive the event.

use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::warn;

use crate::types::TranscriptEvent;

/// Events emitted by a streaming STT session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Transport is ready; audio may be sent
    Connected,
    /// A recognized unit, interim or final
    Transcript(TranscriptEvent),
    /// Server-side end-of-speech detection, carrying the committed buffer.
    /// Only emitted by adapters whose protocol detects utterance boundaries.
    UtteranceEnd { text: String },
    /// Provider or transport error. `fatal` marks non-retriable failures
    /// (authentication rejection, quota exhaustion).
    Error { message: String, fatal: bool },
    /// Transport closed, for any reason
    Disconnected { reason: String },
}

/// Discriminant used to key listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    Connected,
    Transcript,
    UtteranceEnd,
    Error,
    Disconnected,
}

impl SessionEvent {
    pub fn kind(&self) -> SessionEventKind {
        match self {
            SessionEvent::Connected => SessionEventKind::Connected,
            SessionEvent::Transcript(_) => SessionEventKind::Transcript,
            SessionEvent::UtteranceEnd { .. } => SessionEventKind::UtteranceEnd,
            SessionEvent::Error { .. } => SessionEventKind::Error,
            SessionEvent::Disconnected { .. } => SessionEventKind::Disconnected,
        }
    }
}

/// Boxed listener callback. Must not block; adapters invoke listeners from
/// their transport reader task.
pub type EventListener = Box<dyn Fn(&SessionEvent) + Send + Sync>;

/// Publish/subscribe registry keyed by event kind.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<(Option<SessionEventKind>, EventListener)>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind.
    pub fn on(&self, kind: SessionEventKind, listener: EventListener) {
        self.listeners.lock().push((Some(kind), listener));
    }

    /// Register a listener for every event kind.
    pub fn on_any(&self, listener: EventListener) {
        self.listeners.lock().push((None, listener));
    }

    /// Deliver an event to all matching listeners. A listener panic is
    /// logged and does not prevent delivery to the others.
    pub fn emit(&self, event: &SessionEvent) {
        let listeners = self.listeners.lock();
        for (kind, listener) in listeners.iter() {
            if kind.is_some() && *kind != Some(event.kind()) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(kind = ?event.kind(), "Session event listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn listeners_filter_by_kind() {
        let bus = EventBus::new();
        let transcript_hits = Arc::new(AtomicUsize::new(0));
        let error_hits = Arc::new(AtomicUsize::new(0));

        let hits = transcript_hits.clone();
        bus.on(
            SessionEventKind::Transcript,
            Box::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let hits = error_hits.clone();
        bus.on(
            SessionEventKind::Error,
            Box::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        );

        bus.emit(&SessionEvent::Transcript(
            crate::types::TranscriptEvent::interim("hello"),
        ));
        bus.emit(&SessionEvent::Connected);

        assert_eq!(transcript_hits.load(Ordering::SeqCst), 1);
        assert_eq!(error_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_listener_does_not_block_delivery() {
        let bus = EventBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        bus.on_any(Box::new(|_| panic!("listener failure")));
        let hits = delivered.clone();
        bus.on_any(Box::new(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit(&SessionEvent::Connected);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn on_any_receives_every_kind() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        bus.on_any(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit(&SessionEvent::Connected);
        bus.emit(&SessionEvent::Disconnected {
            reason: "closed".into(),
        });
        bus.emit(&SessionEvent::Error {
            message: "boom".into(),
            fatal: false,
        });
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}

//! Shared connection plumbing for the WebSocket provider adapters
//!
//! Each live connection is serviced by a reader task (parses inbound frames
//! into session events) and a writer task (drains an unbounded channel into
//! the sink). `send_audio` is a channel push, never an await. Dropping the
//! outbound sender ends the writer, which sends a Close frame on its way
//! out, so closing an already-closed transport is inherently a no-op.

use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::events::{EventBus, SessionEvent};
use crate::finalize::FinalizeCell;
use crate::transcript::TranscriptBuffer;
use crate::types::{SessionMetrics, TranscriptEvent};
use wirevox_foundation::StateCell;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// State shared between an adapter handle and its spawned transport tasks.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    pub state: StateCell,
    pub transcript: TranscriptBuffer,
    pub events: EventBus,
    pub finalize: FinalizeCell,
    pub fatal: AtomicBool,
    pub metrics: Mutex<SessionMetrics>,
    pub outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a session event, updating the counters it implies.
    pub fn emit(&self, event: SessionEvent) {
        {
            let mut metrics = self.metrics.lock();
            match &event {
                SessionEvent::Transcript(t) if t.is_final => metrics.final_count += 1,
                SessionEvent::Transcript(_) => metrics.partial_count += 1,
                SessionEvent::Error { .. } => metrics.error_count += 1,
                _ => {}
            }
        }
        self.events.emit(&event);
    }

    /// Push a frame to the writer task. Returns false when no connection is
    /// live (the frame is dropped).
    pub fn send_frame(&self, message: Message) -> bool {
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Drop the outbound sender, ending the writer task.
    pub fn close_outbound(&self) {
        self.outbound.lock().take();
    }

    /// Emit an interim preview (committed buffer + pending text) without
    /// mutating the buffer.
    pub fn emit_interim(&self, pending: &str) {
        let preview = self.transcript.preview(pending);
        self.emit(SessionEvent::Transcript(TranscriptEvent::interim(preview)));
    }

    /// Append a committed segment, emit the final event with the full
    /// updated buffer, and return the trimmed buffer.
    pub fn commit_segment(&self, segment: &str, confidence: Option<f32>) -> String {
        self.transcript.append_final(segment);
        let full = self.transcript.get();
        self.emit(SessionEvent::Transcript(TranscriptEvent::final_with(
            full.clone(),
            confidence,
        )));
        full
    }

    /// Record that the transport closed from the server side or failed.
    /// No automatic reconnect is attempted; the orchestrator owns that
    /// policy and hears about the closure through the event.
    pub fn transport_closed(&self, reason: &str) {
        self.close_outbound();
        self.state.set(wirevox_foundation::ConnectionState::Disconnected);
        self.emit(SessionEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    pub fn set_fatal(&self, fatal: bool) {
        self.fatal.store(fatal, Ordering::SeqCst);
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }
}

/// Handles for the tasks servicing one live connection.
#[derive(Debug, Default)]
pub(crate) struct TransportTasks {
    pub reader: Option<JoinHandle<()>>,
    pub writer: Option<JoinHandle<()>>,
    pub keepalive: Option<JoinHandle<()>>,
}

impl TransportTasks {
    /// Cancel the tasks for this connection. The keep-alive timer goes
    /// first so it cannot fire against a closing transport, and the reader
    /// is aborted before the transport closes so an intentional shutdown
    /// emits no spurious error/close events. The writer is detached rather
    /// than aborted: once the outbound sender is dropped it drains, sends
    /// a Close frame, and exits on its own.
    pub fn shutdown(&mut self) {
        for handle in [self.keepalive.take(), self.reader.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
        self.writer.take();
    }
}

/// Spawn the writer task: drains `rx` into the sink, then closes the
/// transport when the channel ends or a write fails.
pub(crate) fn spawn_writer(
    mut sink: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = sink.send(message).await {
                debug!("Transport write failed: {}", e);
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    })
}

/// Encode 16-bit PCM samples as little-endian bytes for the wire.
pub(crate) fn pcm_to_le_bytes(pcm: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(pcm.len() * 2);
    for sample in pcm {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_encoding_is_little_endian() {
        let bytes = pcm_to_le_bytes(&[0x0102, -1]);
        assert_eq!(bytes, vec![0x02, 0x01, 0xFF, 0xFF]);
    }

    #[test]
    fn send_frame_without_connection_reports_drop() {
        let shared = SharedState::new();
        assert!(!shared.send_frame(Message::Text("{}".into())));
    }

    #[test]
    fn commit_segment_returns_full_buffer() {
        let shared = SharedState::new();
        shared.commit_segment("hello world", None);
        let full = shared.commit_segment("how are you", Some(0.9));
        assert_eq!(full, "hello world how are you");
        assert_eq!(shared.metrics.lock().final_count, 2);
    }
}

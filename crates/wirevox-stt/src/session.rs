//! The provider-agnostic streaming session contract
//!
//! Every adapter implements this trait; the orchestrator drives it without
//! knowing which vendor protocol is underneath. Any STT backend capable of
//! real-time streaming (WebSocket APIs, local engines, etc.) can sit behind
//! this interface.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::events::{EventListener, SessionEventKind};
use crate::types::SessionMetrics;
use wirevox_foundation::SessionError;

/// Abstract lifecycle of one streaming transcription session.
///
/// Lifecycle: `start` → repeated `send_audio` → `finalize` → `stop`.
/// All transport failures after a successful connect are reported through
/// session events; only the initial handshake rejects.
#[async_trait]
pub trait SttSession: Send + Sync + Debug {
    /// Establish the transport connection for a new utterance.
    ///
    /// Resets the transcript buffer. Closes a prior live connection first,
    /// and is a no-op when a connect attempt is already in flight. Resolves
    /// when the transport reports ready; rejects if it fails before then.
    async fn start(&self) -> Result<(), SessionError>;

    /// Non-blocking enqueue of one PCM chunk (16-bit mono) to the transport.
    ///
    /// Silently drops the chunk when not connected; callers are expected to
    /// check [`SttSession::connected`] or tolerate drops during reconnect
    /// windows rather than block.
    fn send_audio(&self, pcm: &[i16]);

    /// Trimmed committed transcript accumulated so far. Pure read.
    fn transcript(&self) -> String;

    /// Reset the committed transcript between utterances without tearing
    /// down the transport.
    fn clear_transcript(&self);

    /// Signal end-of-utterance and return the best available transcript.
    ///
    /// Bounded by a fixed per-protocol timeout; always returns the trimmed
    /// committed buffer, never errors on timeout.
    async fn finalize(&self) -> String;

    /// Tear down the transport, discard any pending finalize waiter, cancel
    /// timers, and reset to idle. Safe to call repeatedly and from any
    /// connection state.
    async fn stop(&self);

    /// True only while the transport is connected.
    fn connected(&self) -> bool;

    /// True if the most recent failure is non-retriable (authentication
    /// rejection, quota exhaustion). The orchestrator uses this to stop
    /// retrying the provider for the session.
    fn fatal(&self) -> bool;

    /// Register an event listener for one event kind.
    fn on_event(&self, kind: SessionEventKind, listener: EventListener);

    /// Register an event listener for every event kind.
    fn on_any_event(&self, listener: EventListener);

    /// Snapshot of the session counters.
    fn metrics(&self) -> SessionMetrics;
}

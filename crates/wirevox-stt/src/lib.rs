//! Streaming speech-to-text session layer for WireVox
//!
//! This crate provides the provider-agnostic session contract for real-time
//! transcription, the concrete WebSocket adapters that speak each vendor's
//! wire protocol, and the factory that selects one by name and credential.
//!
//! The owning voice-session orchestrator drives the contract
//! (`start` → repeated `send_audio` → `finalize` → `stop`) and consumes the
//! event stream to advance its conversation state machine. Reconnect and
//! retry policy live in the orchestrator, not here; adapters only report
//! connection state and flag non-retriable failures.

pub mod events;
pub mod finalize;
pub mod providers;
pub mod session;
pub mod transcript;
pub mod types;

pub use events::{EventBus, EventListener, SessionEvent, SessionEventKind};
pub use providers::{create_session, ProviderKind, SessionRequest};
pub use session::SttSession;
pub use transcript::TranscriptBuffer;
pub use types::{SessionConfig, SessionMetrics, TranscriptEvent};

pub use wirevox_foundation::{ConnectionState, SessionError};

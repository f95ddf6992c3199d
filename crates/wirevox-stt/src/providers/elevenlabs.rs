//! Commit-acknowledged streaming adapter (ElevenLabs realtime protocol)
//!
//! Audio chunks go out as discrete JSON messages carrying a `commit` flag.
//! A `commit: false` message is pure audio; a `commit: true` message with an
//! empty payload, sent by `finalize()`, asks the server to flush and return
//! a final segment for everything received so far. The committed-result
//! message is the primary exit path for `finalize()`; a short fixed timeout
//! bounds the wait when the server never acknowledges.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use super::common::{pcm_to_le_bytes, spawn_writer, SharedState, TransportTasks, WsStream};
use crate::events::{EventListener, SessionEvent, SessionEventKind};
use crate::session::SttSession;
use crate::types::{SessionConfig, SessionMetrics};
use wirevox_foundation::{ConnectionState, SessionError};

/// How long `finalize()` waits for the server to acknowledge a commit
/// before returning whatever has been committed so far.
const COMMIT_ACK_TIMEOUT: Duration = Duration::from_millis(500);

const DEFAULT_ENDPOINT: &str = "wss://api.elevenlabs.io/v1/speech-to-text/realtime";
const DEFAULT_MODEL: &str = "scribe_v1_realtime";

/// Outbound message: base64 audio payload plus the commit flag.
#[derive(Debug, Serialize)]
struct AudioMessage<'a> {
    message_type: &'static str,
    audio_base64: &'a str,
    commit: bool,
    sample_rate: u32,
}

/// Inbound server messages. Unknown message types deserialize to `Unknown`
/// and are ignored, for forward compatibility with protocol additions.
#[derive(Debug, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
enum ServerMessage {
    SessionStarted {
        session_id: Option<String>,
    },
    PartialTranscript {
        text: String,
    },
    CommittedTranscript {
        text: String,
        confidence: Option<f32>,
    },
    CommittedTranscriptWithTimestamps {
        text: String,
        confidence: Option<f32>,
    },
    Error {
        message: Option<String>,
    },
    AuthError {
        message: Option<String>,
    },
    QuotaExceeded {
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Streaming STT session speaking the segment-commit JSON protocol.
#[derive(Debug)]
pub struct ElevenLabsSession {
    config: SessionConfig,
    shared: Arc<SharedState>,
    tasks: Mutex<TransportTasks>,
}

impl ElevenLabsSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            shared: Arc::new(SharedState::new()),
            tasks: Mutex::new(TransportTasks::default()),
        }
    }

    fn endpoint(&self) -> String {
        if let Some(url) = &self.config.endpoint_override {
            return url.clone();
        }
        let base = match &self.config.region {
            Some(region) => {
                format!("wss://api.{region}.elevenlabs.io/v1/speech-to-text/realtime")
            }
            None => DEFAULT_ENDPOINT.to_string(),
        };
        let model = self.config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        format!(
            "{base}?model_id={model}&language_code={}",
            self.config.language
        )
    }

    fn teardown_transport(&self) {
        self.tasks.lock().shutdown();
        self.shared.close_outbound();
    }

    fn send_message(&self, audio_base64: &str, commit: bool) -> bool {
        let message = AudioMessage {
            message_type: "input_audio",
            audio_base64,
            commit,
            sample_rate: self.config.sample_rate,
        };
        match serde_json::to_string(&message) {
            Ok(json) => self.shared.send_frame(Message::Text(json)),
            Err(e) => {
                warn!("Failed to encode audio message: {}", e);
                false
            }
        }
    }
}

fn handle_message(shared: &SharedState, raw: &str) {
    let parsed: ServerMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            // Drop the single offending message; the session continues.
            warn!("Dropping unparseable server message: {}", e);
            return;
        }
    };

    match parsed {
        ServerMessage::SessionStarted { session_id } => {
            debug!(?session_id, "Transcription session started");
        }
        ServerMessage::PartialTranscript { text } => {
            shared.emit_interim(&text);
        }
        ServerMessage::CommittedTranscript { text, confidence }
        | ServerMessage::CommittedTranscriptWithTimestamps { text, confidence } => {
            let full = shared.commit_segment(&text, confidence);
            shared.finalize.resolve(full);
        }
        ServerMessage::Error { message } => {
            shared.emit(SessionEvent::Error {
                message: message.unwrap_or_else(|| "provider error".to_string()),
                fatal: false,
            });
        }
        ServerMessage::AuthError { message } => {
            shared.set_fatal(true);
            shared.emit(SessionEvent::Error {
                message: message.unwrap_or_else(|| "authentication rejected".to_string()),
                fatal: true,
            });
        }
        ServerMessage::QuotaExceeded { message } => {
            shared.set_fatal(true);
            shared.emit(SessionEvent::Error {
                message: message.unwrap_or_else(|| "quota exceeded".to_string()),
                fatal: true,
            });
        }
        ServerMessage::Unknown => {
            debug!("Ignoring unknown server message type");
        }
    }
}

fn spawn_reader(shared: Arc<SharedState>, mut stream: SplitStream<WsStream>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => handle_message(&shared, &text),
                Ok(Message::Close(_)) => {
                    shared.transport_closed("server closed the stream");
                    return;
                }
                Ok(_) => trace!("Ignoring non-text frame"),
                Err(e) => {
                    warn!("Transport error: {}", e);
                    shared.emit(SessionEvent::Error {
                        message: e.to_string(),
                        fatal: false,
                    });
                    shared.transport_closed("transport error");
                    return;
                }
            }
        }
        shared.transport_closed("stream ended");
    })
}

#[async_trait]
impl SttSession for ElevenLabsSession {
    async fn start(&self) -> Result<(), SessionError> {
        let Some(attempt) = self.shared.state.begin_connecting() else {
            debug!("start() ignored: connection attempt already in flight");
            return Ok(());
        };
        // A prior live connection is closed before reconnecting.
        self.teardown_transport();
        self.shared.transcript.clear();
        self.shared.set_fatal(false);

        let request = self
            .endpoint()
            .into_client_request()
            .map_err(|e| SessionError::Config(format!("invalid endpoint: {e}")))
            .and_then(|mut request| {
                let key = HeaderValue::from_str(&self.config.api_key)
                    .map_err(|e| SessionError::Config(format!("invalid credential: {e}")))?;
                request.headers_mut().insert("xi-api-key", key);
                Ok(request)
            });
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                self.shared.state.fail_connect(attempt);
                return Err(e);
            }
        };

        let (ws, _response) = match connect_async(request).await {
            Ok(ok) => ok,
            Err(e) => {
                self.shared.state.fail_connect(attempt);
                return Err(SessionError::Connection(e.to_string()));
            }
        };

        // stop() may have run while the handshake was in flight; the caller
        // has abandoned this attempt, so drop the socket without promoting.
        if !self.shared.state.complete_connect(attempt) {
            debug!("Discarding connection: session was stopped during handshake");
            drop(ws);
            return Ok(());
        }

        let (sink, stream) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.outbound.lock() = Some(tx);
        {
            let mut tasks = self.tasks.lock();
            tasks.writer = Some(spawn_writer(sink, rx));
            tasks.reader = Some(spawn_reader(self.shared.clone(), stream));
        }
        self.shared.emit(SessionEvent::Connected);
        Ok(())
    }

    fn send_audio(&self, pcm: &[i16]) {
        if !self.shared.state.is_connected() {
            trace!("Dropping audio chunk: not connected");
            self.shared.metrics.lock().chunks_dropped += 1;
            return;
        }
        let encoded = BASE64.encode(pcm_to_le_bytes(pcm));
        if self.send_message(&encoded, false) {
            self.shared.metrics.lock().chunks_sent += 1;
        } else {
            self.shared.metrics.lock().chunks_dropped += 1;
        }
    }

    fn transcript(&self) -> String {
        self.shared.transcript.get()
    }

    fn clear_transcript(&self) {
        self.shared.transcript.clear();
    }

    async fn finalize(&self) -> String {
        if !self.shared.state.is_connected() {
            return self.shared.transcript.get();
        }
        let Some(rx) = self.shared.finalize.arm() else {
            // A finalize request is already outstanding; do not create a
            // second waiter.
            return self.shared.transcript.get();
        };
        self.send_message("", true);
        match tokio::time::timeout(COMMIT_ACK_TIMEOUT, rx).await {
            Ok(Ok(text)) => text,
            // Timeout, or the waiter was discarded by stop(): return what
            // has been committed rather than waiting for a response that
            // may never arrive.
            _ => {
                self.shared.finalize.discard();
                self.shared.transcript.get()
            }
        }
    }

    async fn stop(&self) {
        self.shared.finalize.discard();
        self.teardown_transport();
        self.shared.state.set(ConnectionState::Idle);
    }

    fn connected(&self) -> bool {
        self.shared.state.is_connected()
    }

    fn fatal(&self) -> bool {
        self.shared.is_fatal()
    }

    fn on_event(&self, kind: SessionEventKind, listener: EventListener) {
        self.shared.events.on(kind, listener);
    }

    fn on_any_event(&self, listener: EventListener) {
        self.shared.events.on_any(listener);
    }

    fn metrics(&self) -> SessionMetrics {
        self.shared.metrics.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_transcript() {
        let raw = r#"{"message_type":"partial_transcript","text":"hello wor"}"#;
        let parsed: ServerMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            parsed,
            ServerMessage::PartialTranscript { ref text } if text == "hello wor"
        ));
    }

    #[test]
    fn parses_committed_variants() {
        let raw = r#"{"message_type":"committed_transcript","text":"hello","confidence":0.97}"#;
        let parsed: ServerMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            parsed,
            ServerMessage::CommittedTranscript { confidence: Some(_), .. }
        ));

        let raw = r#"{"message_type":"committed_transcript_with_timestamps","text":"hello"}"#;
        let parsed: ServerMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            parsed,
            ServerMessage::CommittedTranscriptWithTimestamps { confidence: None, .. }
        ));
    }

    #[test]
    fn unknown_message_types_parse_to_unknown() {
        let raw = r#"{"message_type":"some_future_thing","payload":42}"#;
        let parsed: ServerMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(parsed, ServerMessage::Unknown));
    }

    #[test]
    fn auth_error_marks_session_fatal() {
        let shared = SharedState::new();
        handle_message(
            &shared,
            r#"{"message_type":"auth_error","message":"bad key"}"#,
        );
        assert!(shared.is_fatal());
        assert_eq!(shared.metrics.lock().error_count, 1);
    }

    #[test]
    fn malformed_message_is_dropped_without_state_change() {
        let shared = SharedState::new();
        handle_message(&shared, "not json at all");
        assert!(!shared.is_fatal());
        assert!(shared.transcript.get().is_empty());
    }

    #[test]
    fn committed_message_resolves_pending_finalize() {
        let shared = SharedState::new();
        let rx = shared.finalize.arm().unwrap();
        handle_message(
            &shared,
            r#"{"message_type":"committed_transcript","text":"hello world"}"#,
        );
        assert_eq!(rx.blocking_recv().unwrap(), "hello world");
    }

    #[test]
    fn endpoint_honors_region_and_model() {
        let session = ElevenLabsSession::new(SessionConfig {
            api_key: "key".into(),
            region: Some("eu".into()),
            model: Some("scribe_v1".into()),
            ..Default::default()
        });
        let url = session.endpoint();
        assert!(url.starts_with("wss://api.eu.elevenlabs.io/"));
        assert!(url.contains("model_id=scribe_v1"));
        assert!(url.contains("language_code=en"));
    }

    #[test]
    fn audio_message_carries_commit_flag() {
        let message = AudioMessage {
            message_type: "input_audio",
            audio_base64: "",
            commit: true,
            sample_rate: 16_000,
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""commit":true"#));
        assert!(json.contains(r#""sample_rate":16000"#));
    }
}

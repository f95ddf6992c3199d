//! Implicit-end streaming adapter (Deepgram continuous protocol)
//!
//! A persistent bidirectional stream: raw PCM goes out as binary frames,
//! interim and final results come back as JSON events without any
//! client-issued commit, and the server separately signals end-of-utterance
//! when it detects a pause. Because there is no commit acknowledgment,
//! `finalize()` waits a short settle delay for in-flight results and then
//! returns the committed buffer unconditionally.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Deserialize;
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

/// Settle delay for `finalize()`: long enough for an already-in-flight
/// final result to land, short enough to bound perceived latency.
const FINALIZE_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Periodic no-op message preventing idle transport closure. The
/// commit-based protocol has no such concern since its commit messages
/// keep the link active.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);
const KEEPALIVE_MESSAGE: &str = r#"{"type":"KeepAlive"}"#;

const DEFAULT_ENDPOINT: &str = "wss://api.deepgram.com/v1/listen";
const DEFAULT_MODEL: &str = "nova-2";

/// Inbound server events. Unknown types deserialize to `Unknown` and are
/// ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ServerEvent {
    Results {
        is_final: Option<bool>,
        channel: Option<Channel>,
    },
    UtteranceEnd {},
    SpeechStarted {},
    Metadata {},
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct Channel {
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    transcript: String,
    confidence: Option<f32>,
}

/// Streaming STT session speaking the continuous binary-audio protocol
/// with server-side end-of-utterance detection.
#[derive(Debug)]
pub struct DeepgramSession {
    config: SessionConfig,
    shared: Arc<SharedState>,
    tasks: Mutex<TransportTasks>,
}

impl DeepgramSession {
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
        let model = self.config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        format!(
            "{DEFAULT_ENDPOINT}?model={model}&language={}&encoding=linear16&sample_rate={}&channels=1&interim_results=true&vad_events=true&utterance_end_ms=1000",
            self.config.language, self.config.sample_rate
        )
    }

    fn keepalive_interval(&self) -> Duration {
        self.config.keepalive_interval.unwrap_or(KEEPALIVE_INTERVAL)
    }

    fn teardown_transport(&self) {
        self.tasks.lock().shutdown();
        self.shared.close_outbound();
    }
}

fn handle_event(shared: &SharedState, raw: &str) {
    let parsed: ServerEvent = match serde_json::from_str(raw) {
        Ok(event) => event,
        Err(e) => {
            // Drop the single offending message; the session continues.
            warn!("Dropping unparseable server event: {}", e);
            return;
        }
    };

    match parsed {
        ServerEvent::Results { is_final, channel } => {
            let Some(alternative) = channel
                .and_then(|c| c.alternatives.into_iter().next())
                .filter(|a| !a.transcript.trim().is_empty())
            else {
                trace!("Result event with empty transcript");
                return;
            };
            if is_final.unwrap_or(false) {
                shared.commit_segment(&alternative.transcript, alternative.confidence);
            } else {
                shared.emit_interim(&alternative.transcript);
            }
        }
        ServerEvent::UtteranceEnd {} => {
            shared.emit(SessionEvent::UtteranceEnd {
                text: shared.transcript.get(),
            });
        }
        ServerEvent::SpeechStarted {} => debug!("Server detected speech start"),
        ServerEvent::Metadata {} => debug!("Stream metadata received"),
        ServerEvent::Unknown => debug!("Ignoring unknown server event type"),
    }
}

fn spawn_reader(shared: Arc<SharedState>, mut stream: SplitStream<WsStream>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => handle_event(&shared, &text),
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

fn spawn_keepalive(tx: mpsc::UnboundedSender<Message>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if tx.send(Message::Text(KEEPALIVE_MESSAGE.to_string())).is_err() {
                break;
            }
        }
    })
}

#[async_trait]
impl SttSession for DeepgramSession {
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
                let auth = HeaderValue::from_str(&format!("Token {}", self.config.api_key))
                    .map_err(|e| SessionError::Config(format!("invalid credential: {e}")))?;
                request.headers_mut().insert("Authorization", auth);
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
        *self.shared.outbound.lock() = Some(tx.clone());
        {
            let mut tasks = self.tasks.lock();
            tasks.writer = Some(spawn_writer(sink, rx));
            tasks.reader = Some(spawn_reader(self.shared.clone(), stream));
            tasks.keepalive = Some(spawn_keepalive(tx, self.keepalive_interval()));
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
        if self
            .shared
            .send_frame(Message::Binary(pcm_to_le_bytes(pcm)))
        {
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
        // No commit acknowledgment exists in this protocol, so there is
        // nothing to wait on; allow any in-flight final result to arrive,
        // then return the committed buffer.
        if self.shared.state.is_connected() {
            tokio::time::sleep(FINALIZE_SETTLE_DELAY).await;
        }
        self.shared.transcript.get()
    }

    async fn stop(&self) {
        self.shared.finalize.discard();
        // The keep-alive timer is cancelled before the transport goes.
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

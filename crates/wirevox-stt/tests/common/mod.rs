//! Shared helpers for the adapter integration tests
//!
//! Spins up in-process WebSocket servers that play scripted provider roles,
//! and collects session events for assertion.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, WebSocketStream};

use wirevox_stt::{SessionEvent, SttSession};

pub type ServerStream = WebSocketStream<TcpStream>;

/// Install the test log subscriber once per test binary.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Bind a local WebSocket server and run `handler` for every connection.
/// Returns the `ws://` URL and a counter of accepted connections.
pub async fn spawn_server<F, Fut>(handler: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(ServerStream) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let handler = handler.clone();
            tokio::spawn(async move {
                if let Ok(ws) = accept_async(stream).await {
                    handler(ws).await;
                }
            });
        }
    });

    (format!("ws://{addr}"), connections)
}

/// Like [`spawn_server`], but delays the WebSocket handshake by `delay_ms`
/// so callers can race other operations against an in-flight `start()`.
/// Connections are held open and drained after the handshake.
pub async fn spawn_slow_server(delay_ms: u64) -> (String, Arc<AtomicUsize>) {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                if let Ok(mut ws) = accept_async(stream).await {
                    while ws.next().await.is_some() {}
                }
            });
        }
    });

    (format!("ws://{addr}"), connections)
}

/// Record every event the session emits.
pub fn collect_events(session: &dyn SttSession) -> Arc<Mutex<Vec<SessionEvent>>> {
    let store: Arc<Mutex<Vec<SessionEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = store.clone();
    session.on_any_event(Box::new(move |event| sink.lock().push(event.clone())));
    store
}

/// Extract the transcript events seen so far as `(text, is_final)` pairs.
pub fn transcript_pairs(events: &Mutex<Vec<SessionEvent>>) -> Vec<(String, bool)> {
    events
        .lock()
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Transcript(t) => Some((t.text.clone(), t.is_final)),
            _ => None,
        })
        .collect()
}

/// Poll `cond` until it holds or `timeout_ms` elapses.
pub async fn wait_until<F: Fn() -> bool>(cond: F, timeout_ms: u64) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

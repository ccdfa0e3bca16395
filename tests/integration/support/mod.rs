//! In-process relay fixtures shared by the integration tests.
//!
//! [`TestRelay`] speaks the chat relay protocol: it greets every connection
//! with `{"status":"welcome"}`, acknowledges each message to its author
//! with a `delivered` envelope, and forwards it to every other connection.
//! Forwarding is a broadcast; filtering by identity is the client's job.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use relaychat::chat::ChatSession;
use relaychat::connection::ConnectionSettings;
use relaychat_proto::codec;
use relaychat_proto::envelope::InboundEnvelope;

/// Relay-side timestamp stamped on every acknowledgment and forward.
pub const RELAY_TIME: &str = "12:00";

/// A running in-process relay.
pub struct TestRelay {
    /// `ws://` URL clients should connect to.
    pub url: String,
    accepted: Arc<AtomicUsize>,
    connections: Arc<Mutex<Vec<JoinHandle<()>>>>,
    accept_handle: JoinHandle<()>,
}

impl TestRelay {
    /// Bind to an ephemeral port and start accepting.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));
        let connections = Arc::new(Mutex::new(Vec::new()));
        let (forward, _) = broadcast::channel::<(usize, String)>(256);

        let counter = Arc::clone(&accepted);
        let tracked = Arc::clone(&connections);
        let accept_handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let id = counter.fetch_add(1, Ordering::SeqCst);
                let handle = tokio::spawn(serve(stream, id, forward.clone()));
                tracked.lock().push(handle);
            }
        });

        Self {
            url,
            accepted,
            connections,
            accept_handle,
        }
    }

    /// TCP connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Tear down every open connection without a close handshake.
    pub fn drop_connections(&self) {
        for handle in self.connections.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.accept_handle.abort();
        self.drop_connections();
    }
}

async fn serve(stream: TcpStream, id: usize, forward: broadcast::Sender<(usize, String)>) {
    // Subscribe before the handshake so nothing sent after the client sees
    // the socket open is missed.
    let mut forwarded = forward.subscribe();
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let welcome = codec::encode_inbound(&InboundEnvelope::welcome()).unwrap();
    if ws.send(Message::Text(welcome.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Ok(outbound) = codec::decode_outbound(text.as_str()) else {
                        continue;
                    };
                    let ack = InboundEnvelope::delivered(&outbound, RELAY_TIME);
                    let ack = codec::encode_inbound(&ack).unwrap();
                    if ws.send(Message::Text(ack.into())).await.is_err() {
                        return;
                    }
                    let fwd = InboundEnvelope::forwarded(&outbound, RELAY_TIME);
                    let _ = forward.send((id, codec::encode_inbound(&fwd).unwrap()));
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            relayed = forwarded.recv() => match relayed {
                Ok((from, frame)) if from != id => {
                    if ws.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

/// A listener that accepts TCP and hangs up at once, so every WebSocket
/// handshake fails. Returns its URL, the accept counter, and the task.
pub async fn start_refusing_relay() -> (String, Arc<AtomicUsize>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });
    (url, accepted, handle)
}

/// Settings with short timers for tests.
pub fn fast_settings(url: &str) -> ConnectionSettings {
    ConnectionSettings {
        relay_url: url.to_string(),
        connect_timeout: Duration::from_secs(2),
        reconnect_delay: Duration::from_millis(20),
        max_reconnect_attempts: 5,
        event_buffer: 64,
    }
}

/// Apply notifications to `session` until `done` holds. Panics after 5s.
pub async fn pump_until(session: &mut ChatSession, done: impl Fn(&ChatSession) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done(session) {
        let event = tokio::time::timeout_at(deadline, session.next_event())
            .await
            .expect("condition not reached in time")
            .expect("notification channel closed");
        session.apply(event);
    }
}

/// Apply whatever arrives within `window`.
pub async fn settle(session: &mut ChatSession, window: Duration) {
    tokio::time::sleep(window).await;
    session.drain_events();
}

/// Wait until `counter` reaches `target`. Panics after 5s.
pub async fn wait_for_count(counter: &AtomicUsize, target: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while counter.load(Ordering::SeqCst) < target {
        assert!(
            tokio::time::Instant::now() < deadline,
            "count stuck at {}",
            counter.load(Ordering::SeqCst)
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

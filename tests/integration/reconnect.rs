// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for the fixed-interval reconnect policy.
//!
//! These tests validate:
//! - An unreachable relay gets one initial attempt plus exactly the
//!   configured number of reconnects, then nothing
//! - `close()` during the reconnect delay stops the pending attempt
//! - A dropped connection is re-established and the attempt counter resets
//!
//! ## Failure simulation
//!
//! `start_refusing_relay` accepts TCP and hangs up immediately, so every
//! WebSocket handshake fails while still being countable. Dropped live
//! connections come from `TestRelay::drop_connections`, which aborts the
//! relay's per-connection tasks.

mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;

use relaychat::chat::ChatSession;
use relaychat::chat::transcript::IndicatorLevel;
use relaychat::connection::{ConnectionEvent, ConnectionManager, ConnectionState};

use support::{TestRelay, fast_settings, pump_until, start_refusing_relay, wait_for_count};

#[tokio::test]
async fn reconnect_budget_is_five_after_the_first_attempt() {
    let (url, accepted, _server) = start_refusing_relay().await;
    let mut settings = fast_settings(&url);
    settings.connect_timeout = Duration::from_millis(500);
    let (manager, mut rx) = ConnectionManager::new(settings, "alice");

    assert!(!manager.connect(Some("bob")).await);

    wait_for_count(&accepted, 6).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 6);
    assert_eq!(manager.reconnect_attempts(), 5);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    let mut disconnects = 0;
    while let Ok(event) = rx.try_recv() {
        if let ConnectionEvent::StatusChanged {
            status: ConnectionState::Disconnected,
            ..
        } = event
        {
            disconnects += 1;
        }
    }
    assert_eq!(disconnects, 6);
}

#[tokio::test]
async fn close_during_delay_prevents_reconnect() {
    let (url, accepted, _server) = start_refusing_relay().await;
    let mut settings = fast_settings(&url);
    settings.connect_timeout = Duration::from_millis(100);
    settings.reconnect_delay = Duration::from_millis(400);
    let (manager, _rx) = ConnectionManager::new(settings, "alice");

    assert!(!manager.connect(Some("bob")).await);
    wait_for_count(&accepted, 1).await;

    manager.close();
    tokio::time::sleep(Duration::from_millis(700)).await;

    assert_eq!(accepted.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn dropped_connection_is_restored() {
    let relay = TestRelay::start().await;
    let mut session = ChatSession::new(fast_settings(&relay.url), "alice", "bob");
    assert!(session.open().await);
    pump_until(&mut session, |s| s.indicator().tooltip == "Connected to server").await;

    relay.drop_connections();

    pump_until(&mut session, |s| {
        s.indicator().level == IndicatorLevel::Disconnected
    })
    .await;
    pump_until(&mut session, |s| {
        s.indicator().level == IndicatorLevel::Connected
            && s.connection().state() == ConnectionState::Connected
    })
    .await;

    assert_eq!(relay.accepted(), 2);
    assert_eq!(session.connection().reconnect_attempts(), 0);

    // The restored socket carries traffic.
    session.send_message("back").await.unwrap();
    pump_until(&mut session, |s| s.pending().is_empty()).await;
}

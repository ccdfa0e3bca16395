// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

//! Integration tests for chat sessions talking through a live relay.
//!
//! Two (or three) `ChatSession`s connect to an in-process relay that
//! acknowledges, forwards, and greets exactly like the production relay.
//! These tests validate:
//! - A sent message is acknowledged back to its author and rendered once
//!   at the peer
//! - Sessions ignore traffic between other identity pairs
//! - The relay greeting never shows up in the transcript
//! - Identical texts in flight are acknowledged in order

mod support;

use std::time::Duration;

use relaychat::chat::ChatSession;
use relaychat::chat::transcript::{Author, Delivery, Entry, IndicatorLevel};
use relaychat::connection::ConnectionState;

use support::{RELAY_TIME, TestRelay, fast_settings, pump_until, settle};

async fn open_pair(relay: &TestRelay) -> (ChatSession, ChatSession) {
    let mut alice = ChatSession::new(fast_settings(&relay.url), "alice", "bob");
    let mut bob = ChatSession::new(fast_settings(&relay.url), "bob", "alice");
    assert!(alice.open().await);
    assert!(bob.open().await);
    (alice, bob)
}

fn peer_entries<'a>(session: &'a ChatSession, text: &str) -> Vec<&'a Entry> {
    session
        .transcript()
        .entries()
        .iter()
        .filter(|e| matches!(e.author, Author::Peer(_)) && e.text == text)
        .collect()
}

#[tokio::test]
async fn ping_is_acknowledged_and_delivered_once() {
    let relay = TestRelay::start().await;
    let (mut alice, mut bob) = open_pair(&relay).await;

    alice.send_message("ping").await.unwrap();
    assert_eq!(alice.pending().len(), 1);

    pump_until(&mut alice, |s| s.pending().is_empty()).await;
    let own = &alice.transcript().entries()[0];
    assert_eq!(own.author, Author::Own);
    assert_eq!(own.delivery, Delivery::Delivered);
    assert_eq!(own.time_label, RELAY_TIME);
    assert_eq!(alice.indicator().tooltip, "Message delivered");

    pump_until(&mut bob, |s| !peer_entries(s, "ping").is_empty()).await;
    settle(&mut bob, Duration::from_millis(100)).await;
    let received = peer_entries(&bob, "ping");
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].author, Author::Peer("alice".to_string()));
    assert_eq!(received[0].time_label, RELAY_TIME);

    // The author never sees its own message as a peer message.
    settle(&mut alice, Duration::from_millis(50)).await;
    assert!(peer_entries(&alice, "ping").is_empty());
}

#[tokio::test]
async fn welcome_leaves_transcript_empty() {
    let relay = TestRelay::start().await;
    let (mut alice, _bob) = open_pair(&relay).await;

    pump_until(&mut alice, |s| s.indicator().tooltip == "Connected to server").await;
    assert_eq!(alice.indicator().level, IndicatorLevel::Connected);
    settle(&mut alice, Duration::from_millis(100)).await;

    assert!(alice.transcript().is_empty());
    assert_eq!(alice.connection().state(), ConnectionState::Connected);
}

#[tokio::test]
async fn other_pairs_are_filtered_out() {
    let relay = TestRelay::start().await;
    let (mut alice, mut bob) = open_pair(&relay).await;
    let mut carol = ChatSession::new(fast_settings(&relay.url), "carol", "dave");
    assert!(carol.open().await);

    alice.send_message("for bob only").await.unwrap();
    pump_until(&mut bob, |s| !peer_entries(s, "for bob only").is_empty()).await;

    settle(&mut carol, Duration::from_millis(150)).await;
    assert!(carol.transcript().is_empty());

    // Carol's own traffic does not resolve anything pending at alice.
    alice.send_message("same text").await.unwrap();
    carol.send_message("same text").await.unwrap();
    pump_until(&mut carol, |s| s.pending().is_empty()).await;
    pump_until(&mut alice, |s| s.pending().is_empty()).await;
    let delivered = alice
        .transcript()
        .entries()
        .iter()
        .filter(|e| e.author == Author::Own && e.delivery == Delivery::Delivered)
        .count();
    assert_eq!(delivered, 2);
}

#[tokio::test]
async fn identical_messages_resolve_in_order() {
    let relay = TestRelay::start().await;
    let (mut alice, mut bob) = open_pair(&relay).await;

    alice.send_message("again").await.unwrap();
    alice.send_message("again").await.unwrap();
    assert_eq!(alice.pending().entries_for("again").len(), 2);

    pump_until(&mut alice, |s| s.pending().is_empty()).await;
    assert!(
        alice
            .transcript()
            .entries()
            .iter()
            .filter(|e| e.author == Author::Own)
            .all(|e| e.delivery == Delivery::Delivered)
    );

    pump_until(&mut bob, |s| peer_entries(s, "again").len() == 2).await;
}

#[tokio::test]
async fn close_abandons_pending_and_disconnects() {
    let relay = TestRelay::start().await;
    let (mut alice, _bob) = open_pair(&relay).await;

    alice.send_message("bye").await.unwrap();
    alice.close();

    assert!(alice.pending().is_empty());
    assert_eq!(alice.connection().state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(relay.accepted(), 2);
}

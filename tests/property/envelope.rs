#![allow(clippy::unwrap_used)]

//! Property-based tests for the relay envelope codec.
//!
//! Uses proptest to verify:
//! 1. Arbitrary text and bytes never make `decode` panic.
//! 2. Outbound frames always carry exactly the three routing fields,
//!    with the strings passed through untouched.
//! 3. Classification depends only on `status`.
//! 4. Acknowledgments built for an outbound envelope decode back to the
//!    same routing fields.

use proptest::prelude::*;
use relaychat_proto::codec;
use relaychat_proto::envelope::{EnvelopeKind, InboundEnvelope, OutboundEnvelope};

/// Strategy for identity and message strings, including empty ones and
/// characters JSON must escape.
fn arb_field() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[a-z]{1,16}",
        ".{0,256}",
        "[\"\\\\\n\t{}]{1,16}",
    ]
}

fn arb_outbound() -> impl Strategy<Value = OutboundEnvelope> {
    (arb_field(), arb_field(), arb_field())
        .prop_map(|(sender, receiver, message)| OutboundEnvelope::new(sender, receiver, message))
}

fn arb_status() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("welcome".to_string())),
        Just(Some("delivered".to_string())),
        "[a-z]{0,12}".prop_map(Some),
    ]
}

proptest! {
    #[test]
    fn random_text_decode_no_panic(text in ".{0,512}") {
        let _ = codec::decode(&text);
    }

    #[test]
    fn random_bytes_decode_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode_bytes(&bytes);
    }

    #[test]
    fn outbound_frame_has_exactly_three_fields(envelope in arb_outbound()) {
        let frame = codec::encode(&envelope).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        let object = value.as_object().unwrap();
        prop_assert_eq!(object.len(), 3);
        prop_assert_eq!(object["sender"].as_str(), Some(envelope.sender.as_str()));
        prop_assert_eq!(object["receiver"].as_str(), Some(envelope.receiver.as_str()));
        prop_assert_eq!(object["message"].as_str(), Some(envelope.message.as_str()));
    }

    #[test]
    fn kind_follows_status_only(status in arb_status(), envelope in arb_outbound()) {
        let inbound = InboundEnvelope {
            status: status.clone(),
            ..InboundEnvelope::forwarded(&envelope, "now")
        };
        let expected = match status.as_deref() {
            Some("welcome") => EnvelopeKind::Welcome,
            Some("delivered") => EnvelopeKind::Delivered,
            _ => EnvelopeKind::Other,
        };
        prop_assert_eq!(inbound.kind(), expected);
    }

    #[test]
    fn acknowledgment_keeps_routing(envelope in arb_outbound(), time in "[0-9:T-]{0,19}") {
        let ack = InboundEnvelope::delivered(&envelope, time.clone());
        let decoded = codec::decode(&codec::encode_inbound(&ack).unwrap()).unwrap();
        prop_assert_eq!(decoded.kind(), EnvelopeKind::Delivered);
        prop_assert!(decoded.is_between(&envelope.sender, &envelope.receiver));
        prop_assert_eq!(decoded.message.as_deref(), Some(envelope.message.as_str()));
        prop_assert_eq!(decoded.time, Some(time));
    }
}

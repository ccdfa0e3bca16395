//! Shared wire definitions for the `RelayChat` relay protocol.
//!
//! The relay speaks JSON text frames. Outbound frames carry a sender,
//! receiver and message body; inbound frames add a `status` and `time`.

pub mod codec;
pub mod envelope;

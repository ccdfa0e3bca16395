//! `RelayChat`: persistent WebSocket chat client library.

pub mod api;
pub mod chat;
pub mod config;
pub mod connection;
pub mod format;

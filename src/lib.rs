//! Core of a desktop MQTT debugging tool: one broker connection, one
//! active subscription, persistent message history, and remembered
//! connection values. Presentation layers consume it through the
//! [`session::SessionNotifier`] callback contract.
//!
//! Connections on the conventional secure port (8883) use TLS with
//! certificate and hostname verification disabled, which fits debugging
//! self-signed broker setups and nothing else.

pub mod config;
pub mod history;
pub mod prefs;
pub mod session;
pub mod storage;

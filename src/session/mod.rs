//! # Session Module
//!
//! Owns the MQTT connection lifecycle for one local debugging session.
//! This is the core of the tool: everything else is storage underneath it
//! or presentation on top of it.
//!
//! ## Why This Module Exists
//!
//! A broker connection is full of asynchronous edges: connect
//! acknowledgements, unsolicited disconnects, messages arriving while the
//! user is mid-click. The session module folds all of that into one owned
//! [`SessionManager`] with explicit state transitions, so a presentation
//! layer only ever issues commands and reacts to notifications. It never
//! touches the transport.
//!
//! ## Module Architecture
//!
//! ```text
//! session/
//! ├── config.rs           - connection options structure
//! ├── events.rs           - notification contract and reason-code mapping
//! ├── session_handler.rs  - connection state machine and event loop
//! └── error.rs            - error definitions
//! ```
//!
//! ## Design Philosophy
//!
//! - **Single owner**: one client, one subscription, one event-loop task
//!   at a time; a new connect always replaces the previous session
//! - **Non-blocking commands**: operations enqueue transport requests and
//!   return; results arrive through the [`SessionNotifier`] callbacks
//! - **Explicit retry**: a lost connection stays lost until the user
//!   connects again; there is no background reconnect
//! - **Nothing crosses the callback boundary as a panic**: every failure
//!   becomes a status notification

pub mod config;
pub mod error;
pub mod events;
pub mod session_handler;

pub use config::SessionOptions;
pub use error::SessionError;
pub use events::{SessionNotifier, StatusKind};
pub use session_handler::{ConnectionState, SessionManager, SessionState};

pub use rumqttc::QoS;

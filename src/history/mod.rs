//! # Message History Module
//!
//! ## Why This Module Exists
//! Every message observed on (or published through) a broker connection is
//! worth keeping for debugging sessions: what arrived, when, and on which
//! topic. This module owns that history as an append-only SQLite log and is
//! the only component allowed to mutate it. Consumers read, clear, or
//! export; they never edit individual records.
//!
//! ## Key Abstractions
//! - [`MessageRecord`]: one immutable `(timestamp, topic, payload,
//!   direction)` row
//! - [`MessageStore`]: the locked connection wrapper with save, query,
//!   clear, and JSON export operations
//!
//! ## Concurrency
//! Saves arrive from the network event task while queries and exports come
//! from the presentation side. A single mutex per store serializes both;
//! no lock is held across anything but the one database operation.
//!
//! ## Schema Evolution
//! The `direction` column was added after the first release. Databases
//! written before it are migrated in place on open, and old rows read back
//! as `received`.

pub mod message_store;
pub mod record;

pub use message_store::{MessageStore, SortOrder, StoreError};
pub use record::{now_stamp, payload_to_text, Direction, MessageRecord};

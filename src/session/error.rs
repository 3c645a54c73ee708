//! Error definitions for the session module.

use thiserror::Error;

/// Failures of the synchronous portion of session operations. Everything
/// asynchronous arrives through the notification interface instead.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connection options failed validation
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Operation requires an established connection
    #[error("not connected to broker")]
    NotConnected,

    /// Unsubscribe without an explicit topic or active subscription
    #[error("no active subscription")]
    NoSubscription,

    /// The request could not be handed to the transport
    #[error("request failed: {0}")]
    Request(String),
}

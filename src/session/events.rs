//! The callback contract between the session manager and its consumer,
//! plus the mapping from transport reason codes to human-readable detail.

use std::fmt;

use rumqttc::{ConnectReturnCode, ConnectionError};

/// Connection status kinds delivered through [`SessionNotifier::on_status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusKind {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusKind::Connecting => "connecting",
            StatusKind::Connected => "connected",
            StatusKind::Disconnected => "disconnected",
            StatusKind::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Implemented by whoever consumes session events: a UI, the headless
/// monitor, or a test stub. Both callbacks fire on the network event task
/// and must not block; nothing may panic across this boundary.
pub trait SessionNotifier: Send + Sync {
    fn on_message(&self, topic: &str, payload: &str, timestamp: &str);
    fn on_status(&self, kind: StatusKind, detail: &str);
}

/// Human-readable reason for a CONNACK return code.
pub(crate) fn describe_connack(code: ConnectReturnCode) -> String {
    match code {
        ConnectReturnCode::Success => "Connected successfully".to_string(),
        ConnectReturnCode::RefusedProtocolVersion => {
            "Connection refused - incorrect protocol version".to_string()
        }
        ConnectReturnCode::BadClientId => {
            "Connection refused - invalid client identifier".to_string()
        }
        ConnectReturnCode::ServiceUnavailable => {
            "Connection refused - server unavailable".to_string()
        }
        ConnectReturnCode::BadUserNamePassword => {
            "Connection refused - bad username or password".to_string()
        }
        ConnectReturnCode::NotAuthorized => "Connection refused - not authorized".to_string(),
    }
}

/// Human-readable reason for an event-loop error. Codes without a specific
/// mapping still surface with their debug form rather than being dropped.
pub(crate) fn describe_connection_error(err: &ConnectionError) -> String {
    match err {
        ConnectionError::ConnectionRefused(code) => describe_connack(*code),
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => {
            "Connection timed out or network error".to_string()
        }
        ConnectionError::Io(io_err) => format!("Connection lost: {io_err}"),
        other => format!("Unknown error ({other})"),
    }
}

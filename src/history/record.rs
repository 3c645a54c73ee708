use serde::{Deserialize, Serialize};

/// Timestamp format shared by history records and the notification
/// interface. Sorts lexicographically in chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Whether a record was received from the broker or sent by us.
///
/// Records written before this field existed carry no direction and are
/// treated as `Received` when read back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Received,
    Sent,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Received => "received",
            Direction::Sent => "sent",
        }
    }

    /// Maps a raw database value back to a direction. `None` and unknown
    /// values come from rows older than the direction column.
    pub(crate) fn from_db(value: Option<&str>) -> Self {
        match value {
            Some("sent") => Direction::Sent,
            _ => Direction::Received,
        }
    }
}

/// One observed or sent MQTT message, immutable once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub timestamp: String,
    pub topic: String,
    #[serde(rename = "message")]
    pub payload: String,
    #[serde(default)]
    pub direction: Direction,
}

impl MessageRecord {
    pub fn received(timestamp: String, topic: String, payload: String) -> Self {
        Self {
            timestamp,
            topic,
            payload,
            direction: Direction::Received,
        }
    }

    pub fn sent(timestamp: String, topic: String, payload: String) -> Self {
        Self {
            timestamp,
            topic,
            payload,
            direction: Direction::Sent,
        }
    }
}

/// Renders a payload for storage and display. Payloads that are not valid
/// UTF-8 become a stable hex placeholder instead of raw bytes.
pub fn payload_to_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary data: {}>", hex::encode(bytes)),
    }
}

/// Current local time in the shared record format.
pub fn now_stamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::{debug, info};

use super::record::{Direction, MessageRecord};

const EXPORT_PREFIX: &str = "mqtt_export_";
const EXPORT_STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("export serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage lock poisoned")]
    Lock,
}

/// Query order for [`MessageStore::all`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// SQLite-backed append-only log of MQTT messages.
///
/// One `Mutex<Connection>` serializes access between the presentation side
/// (queries, clear, export) and the network event task (saves). The lock is
/// held per operation only.
pub struct MessageStore {
    conn: Mutex<Connection>,
    export_dir: PathBuf,
}

impl MessageStore {
    /// Opens (or creates) the message database at `path`, creating missing
    /// parent directories and applying schema migration.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let export_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let store = Self {
            conn: Mutex::new(conn),
            export_dir,
        };
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            export_dir: std::env::temp_dir(),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Creates the messages table if absent and adds the `direction`
    /// column to databases written by older versions. Existing rows keep
    /// reading as `received`.
    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (timestamp TEXT, topic TEXT, message TEXT)",
            [],
        )?;

        let mut has_direction = false;
        {
            let mut stmt = conn.prepare("PRAGMA table_info(messages)")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let name: String = row.get(1)?;
                if name == "direction" {
                    has_direction = true;
                }
            }
        }
        if !has_direction {
            conn.execute(
                "ALTER TABLE messages ADD COLUMN direction TEXT DEFAULT 'received'",
                [],
            )?;
            debug!("added direction column to message history");
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }

    /// Appends one record.
    pub fn save(&self, record: &MessageRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (timestamp, topic, message, direction) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.timestamp,
                record.topic,
                record.payload,
                record.direction.as_str()
            ],
        )?;
        Ok(())
    }

    /// Returns the full record set ordered by timestamp.
    pub fn all(&self, order: SortOrder) -> Result<Vec<MessageRecord>, StoreError> {
        let conn = self.lock()?;
        let sql = match order {
            SortOrder::Ascending => {
                "SELECT timestamp, topic, message, direction FROM messages ORDER BY timestamp ASC"
            }
            SortOrder::Descending => {
                "SELECT timestamp, topic, message, direction FROM messages ORDER BY timestamp DESC"
            }
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Returns the newest `limit` records.
    pub fn recent(&self, limit: usize) -> Result<Vec<MessageRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, topic, message, direction FROM messages \
             ORDER BY timestamp DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Deletes all records. Irreversible; callers are expected to confirm
    /// with the user first.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM messages", [])?;
        info!(removed, "message history cleared");
        Ok(removed)
    }

    /// Serializes all records in chronological order to a JSON file and
    /// returns the path written. Without an explicit path the file lands
    /// in the store's directory under a timestamped name. Missing parent
    /// directories are created.
    pub fn export_json(&self, path: Option<&Path>) -> Result<PathBuf, StoreError> {
        let records = self.all(SortOrder::Ascending)?;

        let target = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let stamp = chrono::Local::now().format(EXPORT_STAMP_FORMAT);
                self.export_dir
                    .join(format!("{EXPORT_PREFIX}{stamp}.json"))
            }
        };
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&records)?;
        fs::write(&target, json)?;
        info!(count = records.len(), path = %target.display(), "history exported");
        Ok(target)
    }

    /// Explicitly closes the underlying connection.
    pub fn close(self) -> Result<(), StoreError> {
        let conn = self.conn.into_inner().map_err(|_| StoreError::Lock)?;
        conn.close().map_err(|(_, err)| StoreError::Database(err))
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    let direction: Option<String> = row.get(3)?;
    Ok(MessageRecord {
        timestamp: row.get(0)?,
        topic: row.get(1)?,
        payload: row.get(2)?,
        direction: Direction::from_db(direction.as_deref()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::record::payload_to_text;

    fn record(stamp: &str, topic: &str, payload: &str) -> MessageRecord {
        MessageRecord::received(stamp.into(), topic.into(), payload.into())
    }

    #[test]
    fn roundtrip_preserves_count_and_order() {
        let store = MessageStore::open_in_memory().expect("open");
        let records = vec![
            record("2024-01-01 10:00:00", "a", "first"),
            record("2024-01-01 10:00:01", "b", "second"),
            record("2024-01-01 10:00:02", "c", "third"),
        ];
        for r in &records {
            store.save(r).expect("save");
        }

        let descending = store.all(SortOrder::Descending).expect("query");
        assert_eq!(descending.len(), 3);
        assert_eq!(descending[0].payload, "third");

        let ascending = store.all(SortOrder::Ascending).expect("query");
        let mut reversed = descending.clone();
        reversed.reverse();
        assert_eq!(ascending, reversed);
        assert_eq!(ascending, records);
    }

    #[test]
    fn recent_returns_newest_first() {
        let store = MessageStore::open_in_memory().expect("open");
        for i in 0..5 {
            store
                .save(&record(&format!("2024-01-01 10:00:0{i}"), "t", &i.to_string()))
                .expect("save");
        }
        let recent = store.recent(2).expect("recent");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].payload, "4");
        assert_eq!(recent[1].payload, "3");
    }

    #[test]
    fn clear_removes_everything() {
        let store = MessageStore::open_in_memory().expect("open");
        store
            .save(&record("2024-01-01 10:00:00", "t", "x"))
            .expect("save");
        assert_eq!(store.clear().expect("clear"), 1);
        assert!(store.all(SortOrder::Descending).expect("query").is_empty());
    }

    #[test]
    fn sent_direction_survives_roundtrip() {
        let store = MessageStore::open_in_memory().expect("open");
        store
            .save(&MessageRecord::sent(
                "2024-01-01 10:00:00".into(),
                "out".into(),
                "ping".into(),
            ))
            .expect("save");
        let all = store.all(SortOrder::Descending).expect("query");
        assert_eq!(all[0].direction, Direction::Sent);
    }

    #[test]
    fn binary_placeholder_survives_roundtrip() {
        let store = MessageStore::open_in_memory().expect("open");
        let payload = payload_to_text(&[0xFF, 0xFE]);
        store
            .save(&record("2024-01-01 10:00:00", "bin", &payload))
            .expect("save");
        let all = store.all(SortOrder::Descending).expect("query");
        assert_eq!(all[0].payload, "<binary data: fffe>");
    }

    #[test]
    fn migrates_legacy_database_without_direction() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).expect("open raw");
            conn.execute(
                "CREATE TABLE messages (timestamp TEXT, topic TEXT, message TEXT)",
                [],
            )
            .expect("create");
            conn.execute(
                "INSERT INTO messages VALUES ('2023-12-31 09:00:00', 'old/topic', 'legacy')",
                [],
            )
            .expect("insert");
        }

        let store = MessageStore::open(&path).expect("open migrated");
        let all = store.all(SortOrder::Descending).expect("query");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].topic, "old/topic");
        assert_eq!(all[0].direction, Direction::Received);

        // New saves carry an explicit direction alongside legacy rows.
        store
            .save(&record("2024-01-01 10:00:00", "new/topic", "fresh"))
            .expect("save");
        assert_eq!(store.all(SortOrder::Descending).expect("query").len(), 2);
    }

    #[test]
    fn export_matches_query_field_for_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MessageStore::open(&dir.path().join("messages.db")).expect("open");
        store
            .save(&record("2024-01-01 10:00:00", "a", "first"))
            .expect("save");
        store
            .save(&MessageRecord::sent(
                "2024-01-01 10:00:01".into(),
                "b".into(),
                "second".into(),
            ))
            .expect("save");

        let queried = store.all(SortOrder::Ascending).expect("query");
        let path = store.export_json(None).expect("export");
        assert!(path.starts_with(dir.path()));

        let raw = std::fs::read_to_string(&path).expect("read export");
        let exported: Vec<MessageRecord> = serde_json::from_str(&raw).expect("parse export");
        assert_eq!(exported, queried);
    }

    #[test]
    fn export_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MessageStore::open_in_memory().expect("open");
        store
            .save(&record("2024-01-01 10:00:00", "a", "x"))
            .expect("save");

        let target = dir.path().join("nested").join("deep").join("out.json");
        let written = store.export_json(Some(&target)).expect("export");
        assert_eq!(written, target);
        assert!(target.exists());
    }
}

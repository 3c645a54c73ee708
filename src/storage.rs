//! Storage directory resolution and startup checks.

use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{eyre, Result};
use tracing::info;

const APP_DIR: &str = "mqttscope";
pub const HISTORY_DB_FILE: &str = "mqtt_messages.db";

/// Platform data directory for this tool, falling back to a local
/// directory when the platform gives us nothing.
pub fn default_storage_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./storage"))
}

/// Creates the storage directory. Failing here is fatal at startup: no
/// storage means no history and no preferences.
pub fn ensure_storage_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|err| eyre!("cannot create storage directory {}: {}", dir.display(), err))?;
    info!(dir = %dir.display(), "storage directory ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_creates_nested_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("a").join("b");
        ensure_storage_dir(&target).expect("create");
        assert!(target.is_dir());
    }

    #[test]
    fn default_dir_ends_with_app_name() {
        assert!(default_storage_dir().ends_with(APP_DIR));
    }
}

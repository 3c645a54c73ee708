//! Remembered broker/port/topic lists, one JSON file per category.
//!
//! The lists feed the presentation layer's comboboxes. They are ordered by
//! first use, deduplicated on insert, and written through on every change
//! so a crash between sessions loses nothing. A missing or corrupt file
//! degrades to an empty list instead of an error.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("preference file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("preference serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreferenceCategory {
    Brokers,
    Ports,
    Topics,
}

impl PreferenceCategory {
    fn file_name(&self) -> &'static str {
        match self {
            PreferenceCategory::Brokers => "brokers.json",
            PreferenceCategory::Ports => "ports.json",
            PreferenceCategory::Topics => "topics.json",
        }
    }
}

/// Flat-file store for previously used connection values.
pub struct PreferenceStore {
    dir: PathBuf,
}

impl PreferenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, category: PreferenceCategory) -> PathBuf {
        self.dir.join(category.file_name())
    }

    /// Appends `value` to the category list if absent and persists the
    /// list immediately. Returns whether the value was new. Empty values
    /// are ignored.
    pub fn remember(
        &self,
        category: PreferenceCategory,
        value: &str,
    ) -> Result<bool, PreferenceError> {
        if value.trim().is_empty() {
            return Ok(false);
        }

        let mut values = self.list(category);
        if values.iter().any(|existing| existing == value) {
            return Ok(false);
        }
        values.push(value.to_string());

        fs::create_dir_all(&self.dir)?;
        fs::write(self.path(category), serde_json::to_string_pretty(&values)?)?;
        debug!(?category, value, "preference remembered");
        Ok(true)
    }

    /// Returns the full ordered list for a category. Never fails: an
    /// absent, unreadable, or mis-shaped file yields an empty list.
    pub fn list(&self, category: PreferenceCategory) -> Vec<String> {
        let path = self.path(category);
        let Ok(raw) = fs::read_to_string(&path) else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(values) => values,
            Err(err) => {
                warn!(path = %path.display(), %err, "corrupt preference file, treating as empty");
                Vec::new()
            }
        }
    }
}

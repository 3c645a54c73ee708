use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::SessionOptions;

/// Configuration for the headless monitor binary, loaded from TOML.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct MonitorConfig {
    #[serde(default)]
    pub session: SessionOptions,
    /// Topic to subscribe to after connecting; wildcards allowed.
    pub topic: Option<String>,
    /// Also persist published messages to the history.
    #[serde(default)]
    pub record_sent: bool,
    /// Overrides the platform storage directory.
    pub storage_dir: Option<PathBuf>,
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| eyre!("cannot read config {}: {}", path.display(), err))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|err| eyre!("cannot parse config {}: {}", path.display(), err))?;
        debug!(path = %path.display(), "monitor config loaded");
        Ok(config)
    }
}

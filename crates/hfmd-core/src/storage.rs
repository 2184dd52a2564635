//! Storage layer for persistent settings

use crate::error::HfmdError;
use hfmd_types::Settings;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const SETTINGS_FILE: &str = "settings.json";

/// Storage manager for hfmd data
#[derive(Clone, Debug)]
pub struct Storage {
    /// Data directory
    data_dir: PathBuf,
}

impl Storage {
    /// Create a new storage instance
    pub async fn new(data_dir: PathBuf) -> Result<Self, HfmdError> {
        fs::create_dir_all(&data_dir).await?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    /// Load settings, falling back to defaults when the file is missing or unreadable
    pub async fn load_settings(&self) -> Result<Settings, HfmdError> {
        let path = self.settings_path();
        if !fs::try_exists(&path).await? {
            debug!("No settings at {:?}, using defaults", path);
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&path).await?;
        match serde_json::from_str::<Settings>(&content) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!("Ignoring malformed settings file {:?}: {}", path, e);
                Ok(Settings::default())
            }
        }
    }

    /// Save settings, replacing the file atomically
    pub async fn save_settings(&self, settings: &Settings) -> Result<(), HfmdError> {
        let path = self.settings_path();
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        Ok(())
    }
}

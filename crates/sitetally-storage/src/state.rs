//! JSON run-state directory.

use crate::sink::CheckpointSink;
use crate::{Result, StorageConfig, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sitetally_catalog::{Catalog, MergePolicy};
use std::path::{Path, PathBuf};

pub const CURRENT_FILE: &str = "current.json";
pub const DEFAULT_FILE: &str = "default.json";
pub const SETTINGS_FILE: &str = "settings.json";

/// What the last run was started with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunSettings {
    pub mode: MergePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct StateDir {
    config: StorageConfig,
}

impl StateDir {
    /// Open the directory, creating it when missing.
    pub async fn open(config: StorageConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.state_dir)
            .await
            .map_err(|source| StorageError::Io {
                path: config.state_dir.clone(),
                source,
            })?;
        Ok(Self { config })
    }

    pub fn path(&self) -> &Path {
        &self.config.state_dir
    }

    pub fn current_path(&self) -> PathBuf {
        self.config.state_dir.join(CURRENT_FILE)
    }

    pub fn default_path(&self) -> PathBuf {
        self.config.state_dir.join(DEFAULT_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.config.state_dir.join(SETTINGS_FILE)
    }

    // ========================================================================
    // Catalogs
    // ========================================================================

    /// Latest checkpoint, if a run ever wrote one.
    pub async fn load_checkpoint(&self) -> Result<Option<Catalog>> {
        read_json(&self.current_path()).await
    }

    pub async fn load_default(&self) -> Result<Option<Catalog>> {
        read_json(&self.default_path()).await
    }

    pub async fn save_default(&self, catalog: &Catalog) -> Result<()> {
        let bytes = self.encode(catalog, "default catalog")?;
        write_atomic(&self.default_path(), &bytes).await
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Saved settings, or the defaults when none were saved yet.
    pub async fn load_settings(&self) -> Result<RunSettings> {
        Ok(read_json(&self.settings_path()).await?.unwrap_or_default())
    }

    pub async fn save_settings(&self, settings: &RunSettings) -> Result<()> {
        let stamped = RunSettings {
            saved_at: Some(Utc::now()),
            ..settings.clone()
        };
        let bytes = serde_json::to_vec_pretty(&stamped).map_err(|source| StorageError::Encode {
            what: "settings",
            source,
        })?;
        write_atomic(&self.settings_path(), &bytes).await
    }

    fn encode<T: Serialize>(&self, value: &T, what: &'static str) -> Result<Vec<u8>> {
        let encoded = if self.config.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        encoded.map_err(|source| StorageError::Encode { what, source })
    }
}

#[async_trait]
impl CheckpointSink for StateDir {
    async fn persist(&self, catalog: &Catalog) -> Result<()> {
        let bytes = self.encode(catalog, "checkpoint")?;
        write_atomic(&self.current_path(), &bytes).await?;
        tracing::trace!(path = %self.current_path().display(), bytes = bytes.len(), "checkpoint written");
        Ok(())
    }

    fn name(&self) -> &str {
        "state-dir"
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StorageError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Write to a sibling temp file, then rename over `path`, so readers never
/// see a half-written file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })
}

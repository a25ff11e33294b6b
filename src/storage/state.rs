use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::DaemonState;
use crate::storage::StateStore;

pub struct JsonStateStore {
    file_path: PathBuf,
}

impl JsonStateStore {
    /// Create a store backed by `<data_dir>/daemon.json`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            file_path: data_dir.join("daemon.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    /// Load the state from disk.
    ///
    /// A missing file yields the default state (first run). If the file is
    /// corrupted, a backup is written to `daemon.json.bak`, a warning is
    /// logged and the default state is returned.
    async fn load(&self) -> Result<DaemonState> {
        let content = match tokio::fs::read_to_string(&self.file_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DaemonState::default());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read {}", self.file_path.display())
                });
            }
        };

        match serde_json::from_str::<DaemonState>(&content) {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!(
                    "{} is corrupted ({}), creating backup and starting fresh",
                    self.file_path.display(),
                    e
                );
                let backup_path = self.file_path.with_extension("json.bak");
                if let Err(backup_err) = tokio::fs::copy(&self.file_path, &backup_path).await {
                    tracing::error!(
                        "Failed to create backup of corrupted daemon state: {}",
                        backup_err
                    );
                }
                Ok(DaemonState::default())
            }
        }
    }

    /// Atomically write the state to disk.
    /// Writes to a .tmp file first, then renames to the actual file.
    async fn save(&self, state: &DaemonState) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create state directory")?;
        }

        let tmp_path = self.file_path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state).context("Failed to serialize state")?;

        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .context("Failed to write temporary state file")?;

        tokio::fs::rename(&tmp_path, &self.file_path)
            .await
            .context("Failed to rename temporary state file")?;

        Ok(())
    }
}

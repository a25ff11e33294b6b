// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::errors::DaemonError;
use crate::models::DaemonConfig;

/// Source of the daemon's configuration.
///
/// `load(false)` may return a cached copy; `load(true)` must re-read durable
/// storage so that an operator disabling the daemon is noticed on the next
/// poll cycle.
pub trait ConfigSource: Send + Sync {
    fn load(&self, fresh: bool) -> Result<DaemonConfig>;
}

/// Config backed by the layered file lookup in [`load_config`].
pub struct FileConfigSource {
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    cached: Mutex<Option<DaemonConfig>>,
}

impl FileConfigSource {
    pub fn new(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Self {
        Self {
            config_path,
            data_dir,
            cached: Mutex::new(None),
        }
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self, fresh: bool) -> Result<DaemonConfig> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| anyhow::anyhow!("config cache lock poisoned"))?;

        if !fresh {
            if let Some(config) = cached.as_ref() {
                return Ok(config.clone());
            }
        }

        let config = load_config(self.config_path.as_deref(), self.data_dir.as_deref())?;
        *cached = Some(config.clone());
        Ok(config)
    }
}

fn read_config_file(path: &Path) -> Result<DaemonConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: DaemonConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    tracing::debug!("Loaded config from: {}", path.display());
    Ok(config)
}

/// Load the DaemonConfig using this resolution order:
///   1. --config CLI flag (passed as config_path)
///   2. PUD_CONFIG_DIR environment variable
///   3. Platform config dir (dirs::config_dir()/pud/config.json)
///   4. Fall back to {data_dir}/config.json, where data_dir is the
///      --data-dir override if given
///   5. If no config file exists, use DaemonConfig::default()
pub fn load_config(config_path: Option<&Path>, data_dir: Option<&Path>) -> Result<DaemonConfig> {
    // 1. Explicit config path
    if let Some(path) = config_path {
        if path.exists() {
            return read_config_file(path);
        }
        return Err(DaemonError::Config(format!(
            "Config file not found: {}",
            path.display()
        ))
        .into());
    }

    // 2. PUD_CONFIG_DIR env var
    if let Ok(config_dir) = std::env::var("PUD_CONFIG_DIR") {
        let path = PathBuf::from(&config_dir).join("config.json");
        if path.exists() {
            return read_config_file(&path);
        }
    }

    // 3. Platform config dir
    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("pud").join("config.json");
        if path.exists() {
            return read_config_file(&path);
        }
    }

    // 4. Fall back to data_dir/config.json
    let path = resolve_data_dir(data_dir).join("config.json");
    if path.exists() {
        return read_config_file(&path);
    }

    // 5. Use defaults
    tracing::debug!("No config file found, using defaults");
    Ok(DaemonConfig::default())
}

/// Resolve the data directory. If `override_dir` is Some, use it.
/// Otherwise `PUD_DATA_DIR`, then the platform default
/// (`~/.local/share/pud` on Linux via `dirs::data_dir()`).
pub fn resolve_data_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }

    if let Ok(d) = std::env::var("PUD_DATA_DIR") {
        return PathBuf::from(d);
    }

    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pud")
}

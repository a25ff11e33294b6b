use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_updates_enabled")]
    pub updates_enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: u64,
    /// Package name the daemon itself is published under.
    #[serde(default = "default_package")]
    pub package: String,
    #[serde(default = "default_registry_url")]
    pub registry_url: String,
    #[serde(default = "default_lookup_timeout_secs")]
    pub lookup_timeout_secs: u64,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub user: Option<String>,
}

fn default_updates_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    900
}

fn default_warmup_secs() -> u64 {
    5
}

fn default_package() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_registry_url() -> String {
    "https://registry.npmjs.org".to_string()
}

fn default_lookup_timeout_secs() -> u64 {
    30
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            updates_enabled: default_updates_enabled(),
            interval_secs: default_interval_secs(),
            warmup_secs: default_warmup_secs(),
            package: default_package(),
            registry_url: default_registry_url(),
            lookup_timeout_secs: default_lookup_timeout_secs(),
            data_dir: None,
            user: None,
        }
    }
}

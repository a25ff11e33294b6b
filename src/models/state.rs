use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::version::dist_tag_for;

/// dist tag -> package name -> last observed latest version.
///
/// An empty version string means "unknown": never checked, or the last
/// lookup failed.
pub type LatestVersions = BTreeMap<String, BTreeMap<String, String>>;

/// Durable bookkeeping shared between the CLI and the update daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonState {
    #[serde(default)]
    pub daemon_version: String,
    #[serde(default)]
    pub latest_versions: LatestVersions,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl DaemonState {
    /// Latest recorded version of `package` under `tag`, if one is known.
    pub fn latest_version(&self, tag: &str, package: &str) -> Option<&str> {
        self.latest_versions
            .get(tag)
            .and_then(|pkgs| pkgs.get(package))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Start tracking `package` under `tag`. Returns false if already tracked.
    pub fn track(&mut self, tag: &str, package: &str) -> bool {
        let pkgs = self.latest_versions.entry(tag.to_string()).or_default();
        if pkgs.contains_key(package) {
            return false;
        }
        pkgs.insert(package.to_string(), String::new());
        true
    }

    /// Record the running build and make sure its own package is tracked on
    /// its own dist tag so the daemon can notice when it goes stale.
    pub fn adopt_daemon_version(&mut self, version: &str, package: &str) {
        self.daemon_version = version.to_string();
        let tag = dist_tag_for(version);
        self.track(&tag, package);
    }

    /// Number of (tag, package) entries being tracked.
    pub fn tracked_count(&self) -> usize {
        self.latest_versions.values().map(BTreeMap::len).sum()
    }
}

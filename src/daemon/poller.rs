use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::future::join_all;

use crate::daemon::config::ConfigSource;
use crate::daemon::pidfile::PidFileStore;
use crate::daemon::policy::{self, PolicyInput, ShutdownReason};
use crate::errors::DaemonError;
use crate::registry::RegistryClient;
use crate::storage::StateStore;

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Continue(CycleReport),
    Shutdown(ShutdownReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub checked: usize,
    pub failed: usize,
}

/// Periodically refreshes the latest-version table.
///
/// Fires once after `warmup`, then sleeps `interval` after each completed
/// cycle, so cycles never overlap no matter how slow the registry is.
pub struct UpdatePoller {
    config: Arc<dyn ConfigSource>,
    pidfile: PidFileStore,
    state_store: Arc<dyn StateStore>,
    registry: Arc<dyn RegistryClient>,
    own_pid: u32,
    warmup: Duration,
    interval: Duration,
}

impl UpdatePoller {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        pidfile: PidFileStore,
        state_store: Arc<dyn StateStore>,
        registry: Arc<dyn RegistryClient>,
        own_pid: u32,
    ) -> Self {
        Self {
            config,
            pidfile,
            state_store,
            registry,
            own_pid,
            warmup: Duration::from_secs(5),
            interval: Duration::from_secs(900),
        }
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until the shutdown policy fires. I/O failures propagate.
    pub async fn run(&self) -> Result<ShutdownReason> {
        tracing::info!(
            "Update poller started (first check in {}s, then every {}s)",
            self.warmup.as_secs(),
            self.interval.as_secs()
        );
        tokio::time::sleep(self.warmup).await;

        loop {
            match self.poll_once().await? {
                CycleOutcome::Shutdown(reason) => return Ok(reason),
                CycleOutcome::Continue(report) => {
                    tracing::debug!(
                        "Poll cycle complete: {} checked, {} failed",
                        report.checked,
                        report.failed
                    );
                }
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One reload -> decide -> refresh-and-persist cycle.
    pub async fn poll_once(&self) -> Result<CycleOutcome> {
        let config = self.config.load(true).context("Failed to reload config")?;
        let recorded_pid = match self.pidfile.read() {
            Ok(pid) => pid,
            Err(DaemonError::InvalidPidFile { contents, .. }) => {
                tracing::warn!("PID file contains invalid data ({:?})", contents.trim());
                None
            }
            Err(e) => return Err(e).context("Failed to read PID file"),
        };
        let mut state = self
            .state_store
            .load()
            .await
            .context("Failed to reload daemon state")?;

        let decision = policy::evaluate(&PolicyInput {
            state: &state,
            recorded_pid,
            updates_enabled: config.updates_enabled,
            own_pid: self.own_pid,
            package: &config.package,
        });
        if let Some(reason) = decision {
            tracing::info!("Daemon shutting down--{}", reason);
            return Ok(CycleOutcome::Shutdown(reason));
        }

        let entries: Vec<(String, String)> = state
            .latest_versions
            .iter()
            .flat_map(|(tag, pkgs)| pkgs.keys().map(move |pkg| (tag.clone(), pkg.clone())))
            .collect();

        let results = join_all(
            entries
                .iter()
                .map(|(tag, pkg)| self.registry.latest_version(pkg, tag)),
        )
        .await;

        let mut report = CycleReport::default();
        for ((tag, pkg), result) in entries.into_iter().zip(results) {
            report.checked += 1;
            let version = match result {
                Ok(version) => version,
                Err(e) => {
                    tracing::warn!("{}", e);
                    report.failed += 1;
                    String::new()
                }
            };
            state
                .latest_versions
                .entry(tag)
                .or_default()
                .insert(pkg, version);
        }

        state.last_checked_at = Some(Utc::now());
        tracing::info!("Writing daemon file.");
        self.state_store
            .save(&state)
            .await
            .context("Failed to persist daemon state")?;

        Ok(CycleOutcome::Continue(report))
    }
}

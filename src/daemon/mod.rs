// Daemon module: pid-file ownership, shutdown policy, the update poller and
// the bootstrap that wires them together.

pub mod admission;
pub mod config;
pub mod logging;
pub mod pidfile;
pub mod poller;
pub mod policy;
pub mod signals;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::daemon::admission::{resolve_startup, Admission};
use crate::daemon::config::{resolve_data_dir, ConfigSource, FileConfigSource};
use crate::daemon::pidfile::PidFileStore;
use crate::daemon::poller::UpdatePoller;
use crate::daemon::signals::SignalGuard;
use crate::models::DaemonConfig;
use crate::registry::HttpRegistry;
use crate::storage::state::JsonStateStore;
use crate::storage::StateStore;

pub const PID_FILE_NAME: &str = "daemon.pid";

/// Operator-facing knobs for `pud daemon`.
#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    pub config_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    /// Overrides `interval_secs` from the config file.
    pub interval_secs: Option<u64>,
    pub kill_existing: bool,
    /// Log at debug level unless `RUST_LOG` says otherwise.
    pub verbose: bool,
}

/// Why the launcher returned without becoming the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Disabled,
    AlreadyRunning { pid: u32 },
}

impl LaunchOutcome {
    /// Exit status reported to whoever spawned us.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchOutcome::Disabled => 1,
            LaunchOutcome::AlreadyRunning { .. } => 0,
        }
    }
}

/// Pick the data directory: CLI flag, then config, then env/platform default.
pub fn data_dir_for(override_dir: Option<&Path>, config: &DaemonConfig) -> PathBuf {
    match (override_dir, config.data_dir.as_deref()) {
        (Some(d), _) => d.to_path_buf(),
        (None, Some(d)) => d.to_path_buf(),
        (None, None) => resolve_data_dir(None),
    }
}

pub fn pid_file_for(data_dir: &Path) -> PidFileStore {
    PidFileStore::new(data_dir.join(PID_FILE_NAME))
}

/// Create the data directory if needed.
pub async fn create_data_dirs(data_dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;
    tracing::debug!("Data directory ensured at: {}", data_dir.display());
    Ok(())
}

/// Run the update daemon.
///
/// Returns only when this process does not become the daemon (feature
/// disabled, or another live daemon already owns the pid file). Once admitted,
/// the process ends through the [`SignalGuard`]: on a shutdown-policy
/// decision, a termination signal, or a fatal I/O error.
///
/// 1. Load config; bail out with `Disabled` if updates are turned off
/// 2. Create the data directory and set up logging
/// 3. Resolve admission against the pid file
/// 4. Install the signal guard
/// 5. Record our version in the daemon state
/// 6. Poll until told to stop
pub async fn run_daemon(options: DaemonOptions) -> Result<LaunchOutcome> {
    let config_source = Arc::new(FileConfigSource::new(
        options.config_path.clone(),
        options.data_dir.clone(),
    ));
    let config = config_source.load(false)?;

    let data_dir = data_dir_for(options.data_dir.as_deref(), &config);
    create_data_dirs(&data_dir).await?;
    let level = if options.verbose { "debug" } else { "info" };
    logging::init_daemon_logging(&data_dir, level);

    if !config.updates_enabled {
        tracing::info!("Daemon is disabled.");
        return Ok(LaunchOutcome::Disabled);
    }

    let pidfile = pid_file_for(&data_dir);
    let own_pid = std::process::id();

    match resolve_startup(&pidfile, own_pid, options.kill_existing)? {
        Admission::AlreadyRunning { pid } => {
            tracing::info!("Daemon already running and up-to-date (PID {}).", pid);
            return Ok(LaunchOutcome::AlreadyRunning { pid });
        }
        Admission::TookOver { previous } => {
            tracing::info!("Took over daemon role from PID {}", previous)
        }
        Admission::RecoveredStale { .. } | Admission::Acquired => {}
    }

    let guard = SignalGuard::new(pidfile.clone(), own_pid);
    if let Err(e) = guard.install() {
        tracing::error!("Failed to install signal handlers: {}", e);
        guard.exit(1);
    }

    let interval = options.interval_secs.unwrap_or(config.interval_secs);
    let result = poll_until_shutdown(
        config_source,
        &config,
        &data_dir,
        pidfile,
        own_pid,
        interval,
    )
    .await;

    match result {
        Ok(_) => guard.exit(0),
        Err(e) => {
            tracing::error!("Daemon failed: {:#}", e);
            guard.exit(1)
        }
    }
}

async fn poll_until_shutdown(
    config_source: Arc<FileConfigSource>,
    config: &DaemonConfig,
    data_dir: &Path,
    pidfile: PidFileStore,
    own_pid: u32,
    interval_secs: u64,
) -> Result<policy::ShutdownReason> {
    let state_store = Arc::new(JsonStateStore::new(data_dir));

    let mut state = state_store.load().await?;
    state.adopt_daemon_version(env!("CARGO_PKG_VERSION"), &config.package);
    state_store.save(&state).await?;
    tracing::info!(
        "Daemon {} started (PID {}), tracking {} package(s)",
        state.daemon_version,
        own_pid,
        state.tracked_count()
    );

    let registry = Arc::new(HttpRegistry::new(
        &config.registry_url,
        Duration::from_secs(config.lookup_timeout_secs),
    )?);

    let poller = UpdatePoller::new(config_source, pidfile, state_store, registry, own_pid)
        .with_warmup(Duration::from_secs(config.warmup_secs))
        .with_interval(Duration::from_secs(interval_secs));

    poller.run().await
}

// CLI daemon commands: daemon, status, stop, track

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::daemon::config::load_config;
use crate::daemon::logging::flush_daemon_log;
use crate::daemon::pidfile::{is_process_alive, terminate_process};
use crate::daemon::{create_data_dirs, data_dir_for, pid_file_for, run_daemon, DaemonOptions};
use crate::errors::DaemonError;
use crate::models::{DaemonConfig, LatestVersions};
use crate::storage::state::JsonStateStore;
use crate::storage::StateStore;

/// How long `pud stop` waits for the daemon to go away.
const STOP_WAIT: Duration = Duration::from_secs(5);
const STOP_POLL: Duration = Duration::from_millis(100);

/// Config and data directory for commands that don't take `--config`.
fn resolve_cli_context(override_dir: Option<&Path>) -> (DaemonConfig, PathBuf) {
    let config = load_config(None, override_dir).unwrap_or_else(|e| {
        tracing::debug!("Ignoring unreadable config: {:#}", e);
        DaemonConfig::default()
    });
    let data_dir = data_dir_for(override_dir, &config);
    (config, data_dir)
}

/// pud daemon
pub async fn cmd_daemon(
    config: Option<PathBuf>,
    data_dir: Option<&Path>,
    interval: Option<u64>,
    kill_existing: bool,
    verbose: bool,
) -> anyhow::Result<i32> {
    let outcome = run_daemon(DaemonOptions {
        config_path: config,
        data_dir: data_dir.map(Path::to_path_buf),
        interval_secs: interval,
        kill_existing,
        verbose,
    })
    .await;
    flush_daemon_log();
    Ok(outcome?.exit_code())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    Running,
    Stopped,
    /// A pid record exists but no live process owns it.
    Stale,
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonStatus::Running => write!(f, "running"),
            DaemonStatus::Stopped => write!(f, "stopped"),
            DaemonStatus::Stale => write!(f, "stale (PID file left behind)"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: DaemonStatus,
    pub pid: Option<u32>,
    pub data_dir: PathBuf,
    pub updates_enabled: bool,
    pub user: Option<String>,
    pub daemon_version: String,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub latest_versions: LatestVersions,
}

pub async fn build_status_report(
    data_dir: &Path,
    config: &DaemonConfig,
) -> anyhow::Result<StatusReport> {
    let (status, pid) = match pid_file_for(data_dir).read() {
        Ok(Some(pid)) if is_process_alive(pid) => (DaemonStatus::Running, Some(pid)),
        Ok(Some(pid)) => (DaemonStatus::Stale, Some(pid)),
        Ok(None) => (DaemonStatus::Stopped, None),
        Err(DaemonError::InvalidPidFile { .. }) => (DaemonStatus::Stale, None),
        Err(e) => return Err(e).context("Failed to read PID file"),
    };

    let state = JsonStateStore::new(data_dir).load().await?;

    Ok(StatusReport {
        status,
        pid,
        data_dir: data_dir.to_path_buf(),
        updates_enabled: config.updates_enabled,
        user: config.user.clone(),
        daemon_version: state.daemon_version,
        last_checked_at: state.last_checked_at,
        latest_versions: state.latest_versions,
    })
}

/// pud status
pub async fn cmd_status(data_dir: Option<&Path>, json: bool) -> anyhow::Result<i32> {
    let (config, data_dir) = resolve_cli_context(data_dir);
    let report = build_status_report(&data_dir, &config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    println!("Daemon Status: {}", report.status);
    if let Some(pid) = report.pid {
        println!("  PID:         {}", pid);
    }
    println!("  Data Dir:    {}", report.data_dir.display());
    if let Some(user) = &report.user {
        println!("  User:        {}", user);
    }
    println!(
        "  Updates:     {}",
        if report.updates_enabled { "enabled" } else { "disabled" }
    );
    if !report.daemon_version.is_empty() {
        println!("  Version:     {}", report.daemon_version);
    }
    match report.last_checked_at {
        Some(at) => println!("  Last Check:  {}", at.to_rfc3339()),
        None => println!("  Last Check:  never"),
    }

    if report.latest_versions.values().all(|pkgs| pkgs.is_empty()) {
        println!("  Tracked:     none");
    } else {
        println!("  Tracked:");
        for (tag, pkgs) in &report.latest_versions {
            for (package, version) in pkgs {
                let shown = if version.is_empty() { "unknown" } else { version };
                println!("    {} ({}): {}", package, tag, shown);
            }
        }
    }

    Ok(0)
}

/// pud stop
pub async fn cmd_stop(data_dir: Option<&Path>) -> anyhow::Result<i32> {
    let (_, data_dir) = resolve_cli_context(data_dir);
    let pidfile = pid_file_for(&data_dir);

    let pid = match pidfile.read() {
        Ok(Some(pid)) => pid,
        Ok(None) => {
            println!("No PID file found. Daemon may not be running.");
            return Ok(0);
        }
        Err(DaemonError::InvalidPidFile { contents, .. }) => {
            pidfile.remove()?;
            println!("Removed invalid PID file ({:?}).", contents.trim());
            return Ok(0);
        }
        Err(e) => return Err(e).context("Failed to read PID file"),
    };

    if !is_process_alive(pid) {
        pidfile.remove_if_owned(pid)?;
        println!("Daemon (PID {}) is not running. Removed stale PID file.", pid);
        return Ok(0);
    }

    println!("Stopping daemon (PID {})...", pid);
    terminate_process(pid).with_context(|| format!("Failed to stop daemon (PID {})", pid))?;

    let deadline = tokio::time::Instant::now() + STOP_WAIT;
    while is_process_alive(pid) {
        if tokio::time::Instant::now() >= deadline {
            eprintln!(
                "Daemon (PID {}) did not exit within {}s.",
                pid,
                STOP_WAIT.as_secs()
            );
            return Ok(1);
        }
        tokio::time::sleep(STOP_POLL).await;
    }

    // A daemon that died without cleaning up leaves its record behind
    pidfile.remove_if_owned(pid)?;
    println!("Daemon stopped.");
    Ok(0)
}

/// pud track
pub async fn cmd_track(data_dir: Option<&Path>, package: &str, tag: &str) -> anyhow::Result<i32> {
    let package = package.trim();
    let tag = tag.trim();
    if package.is_empty() {
        anyhow::bail!("Package name must not be empty");
    }
    if tag.is_empty() {
        anyhow::bail!("Dist tag must not be empty");
    }

    let (_, data_dir) = resolve_cli_context(data_dir);
    create_data_dirs(&data_dir).await?;

    let store = JsonStateStore::new(&data_dir);
    let mut state = store.load().await?;
    if !state.track(tag, package) {
        println!("Already tracking {} ({}).", package, tag);
        return Ok(0);
    }
    store.save(&state).await?;

    println!("Now tracking {} ({}).", package, tag);
    Ok(0)
}

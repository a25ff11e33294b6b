//! Update poller scenarios against the library, on tokio's paused clock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::time::Instant;

use pud::daemon::config::ConfigSource;
use pud::daemon::pidfile::PidFileStore;
use pud::daemon::poller::UpdatePoller;
use pud::daemon::policy::ShutdownReason;
use pud::errors::DaemonError;
use pud::models::{DaemonConfig, DaemonState};
use pud::registry::RegistryClient;
use pud::storage::StateStore;

const OWN: u32 = 4242;
const WARMUP: Duration = Duration::from_secs(5);
const INTERVAL: Duration = Duration::from_secs(900);

struct StaticConfig(Mutex<DaemonConfig>);

impl StaticConfig {
    fn enabled() -> Arc<Self> {
        Arc::new(Self(Mutex::new(DaemonConfig::default())))
    }
}

impl ConfigSource for StaticConfig {
    fn load(&self, _fresh: bool) -> Result<DaemonConfig> {
        Ok(self.0.lock().unwrap().clone())
    }
}

/// Keeps the state in memory so the paused clock never waits on file I/O.
#[derive(Default)]
struct MemoryStore {
    state: Mutex<DaemonState>,
    saves: AtomicUsize,
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self) -> Result<DaemonState> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn save(&self, state: &DaemonState) -> Result<()> {
        *self.state.lock().unwrap() = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingStore;

#[async_trait]
impl StateStore for FailingStore {
    async fn load(&self) -> Result<DaemonState> {
        let mut state = DaemonState::default();
        state.daemon_version = "1.0.0".to_string();
        state.track("latest", "a");
        Ok(state)
    }

    async fn save(&self, _state: &DaemonState) -> Result<()> {
        anyhow::bail!("disk full")
    }
}

/// Answers from a fixed table, records when each lookup happened and deletes
/// the pid file once `remove_pid_on_call` lookups have been made.
struct ScriptedRegistry {
    versions: HashMap<String, String>,
    calls: Mutex<Vec<(String, Instant)>>,
    remove_pid_on_call: usize,
    pidfile: PidFileStore,
}

#[async_trait]
impl RegistryClient for ScriptedRegistry {
    async fn latest_version(&self, package: &str, tag: &str) -> Result<String, DaemonError> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((package.to_string(), Instant::now()));
            calls.len()
        };
        if count == self.remove_pid_on_call {
            self.pidfile.remove().expect("remove pid file");
        }
        self.versions
            .get(package)
            .cloned()
            .ok_or_else(|| DaemonError::Lookup {
                package: package.to_string(),
                tag: tag.to_string(),
                message: "503 Service Unavailable".to_string(),
            })
    }
}

/// Each lookup takes longer than the poll interval.
struct SlowRegistry {
    active: AtomicUsize,
    max_active: AtomicUsize,
    spans: Mutex<Vec<(Instant, Instant)>>,
    remove_pid_after: usize,
    pidfile: PidFileStore,
}

#[async_trait]
impl RegistryClient for SlowRegistry {
    async fn latest_version(&self, _package: &str, _tag: &str) -> Result<String, DaemonError> {
        let started = Instant::now();
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(2000)).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        let finished = {
            let mut spans = self.spans.lock().unwrap();
            spans.push((started, Instant::now()));
            spans.len()
        };
        if finished == self.remove_pid_after {
            self.pidfile.remove().expect("remove pid file");
        }
        Ok("1.0.0".to_string())
    }
}

fn owned_pidfile(tmp: &TempDir) -> PidFileStore {
    let pidfile = PidFileStore::new(tmp.path().join("daemon.pid"));
    pidfile.write(OWN).expect("write pid");
    pidfile
}

fn seeded_store(packages: &[&str]) -> Arc<MemoryStore> {
    let store = MemoryStore::default();
    {
        let mut state = store.state.lock().unwrap();
        state.daemon_version = "1.0.0".to_string();
        for package in packages {
            state.track("latest", package);
        }
    }
    Arc::new(store)
}

fn elapsed_secs(start: Instant, at: Instant) -> u64 {
    at.duration_since(start).as_secs()
}

#[tokio::test(start_paused = true)]
async fn test_warmup_then_interval_until_pid_file_disappears() {
    let tmp = TempDir::new().expect("create temp dir");
    let pidfile = owned_pidfile(&tmp);
    let store = seeded_store(&["a", "b"]);
    let registry = Arc::new(ScriptedRegistry {
        versions: HashMap::from([("a".to_string(), "2.0.0".to_string())]),
        calls: Mutex::new(Vec::new()),
        // First lookup of the second cycle
        remove_pid_on_call: 3,
        pidfile: pidfile.clone(),
    });

    let poller = UpdatePoller::new(
        StaticConfig::enabled(),
        pidfile.clone(),
        store.clone(),
        registry.clone(),
        OWN,
    )
    .with_warmup(WARMUP)
    .with_interval(INTERVAL);

    let start = Instant::now();
    let reason = poller.run().await.expect("run");
    let stopped_at = Instant::now();

    assert_eq!(reason, ShutdownReason::PidFileMissing);

    let calls = registry.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 4, "two cycles of two lookups");
    for (_, at) in &calls[..2] {
        assert_eq!(elapsed_secs(start, *at), 5);
    }
    for (_, at) in &calls[2..] {
        assert_eq!(elapsed_secs(start, *at), 905);
    }
    // Third firing notices the missing pid file and stops
    assert_eq!(elapsed_secs(start, stopped_at), 1805);

    let state = store.state.lock().unwrap().clone();
    assert_eq!(state.latest_version("latest", "a"), Some("2.0.0"));
    assert_eq!(state.latest_versions["latest"]["b"], "");
    assert!(state.last_checked_at.is_some());
    assert_eq!(store.saves.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_cycles_never_overlap() {
    let tmp = TempDir::new().expect("create temp dir");
    let pidfile = owned_pidfile(&tmp);
    let store = seeded_store(&["slow"]);
    let registry = Arc::new(SlowRegistry {
        active: AtomicUsize::new(0),
        max_active: AtomicUsize::new(0),
        spans: Mutex::new(Vec::new()),
        remove_pid_after: 3,
        pidfile: pidfile.clone(),
    });

    let poller = UpdatePoller::new(
        StaticConfig::enabled(),
        pidfile,
        store,
        registry.clone(),
        OWN,
    )
    .with_warmup(WARMUP)
    .with_interval(INTERVAL);

    let reason = poller.run().await.expect("run");
    assert_eq!(reason, ShutdownReason::PidFileMissing);
    assert_eq!(registry.max_active.load(Ordering::SeqCst), 1);

    let spans = registry.spans.lock().unwrap().clone();
    assert_eq!(spans.len(), 3);
    for pair in spans.windows(2) {
        let (_, previous_end) = pair[0];
        let (next_start, _) = pair[1];
        assert!(
            next_start.duration_since(previous_end) >= INTERVAL,
            "next cycle must start a full interval after the previous one ends"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_disabled_before_first_cycle_skips_lookups() {
    let tmp = TempDir::new().expect("create temp dir");
    let pidfile = owned_pidfile(&tmp);
    let store = seeded_store(&["a"]);
    let config = StaticConfig::enabled();
    config.0.lock().unwrap().updates_enabled = false;
    let registry = Arc::new(ScriptedRegistry {
        versions: HashMap::new(),
        calls: Mutex::new(Vec::new()),
        remove_pid_on_call: usize::MAX,
        pidfile: pidfile.clone(),
    });

    let poller = UpdatePoller::new(config, pidfile.clone(), store.clone(), registry.clone(), OWN)
        .with_warmup(WARMUP)
        .with_interval(INTERVAL);

    let start = Instant::now();
    assert_eq!(poller.run().await.expect("run"), ShutdownReason::Disabled);
    assert_eq!(elapsed_secs(start, Instant::now()), 5);
    assert!(registry.calls.lock().unwrap().is_empty());
    assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    // The poller never deletes the pid file itself
    assert!(pidfile.path().exists());
}

#[tokio::test(start_paused = true)]
async fn test_persist_failure_ends_the_run() {
    let tmp = TempDir::new().expect("create temp dir");
    let pidfile = owned_pidfile(&tmp);
    let registry = Arc::new(ScriptedRegistry {
        versions: HashMap::from([("a".to_string(), "1.0.0".to_string())]),
        calls: Mutex::new(Vec::new()),
        remove_pid_on_call: usize::MAX,
        pidfile: pidfile.clone(),
    });

    let poller = UpdatePoller::new(
        StaticConfig::enabled(),
        pidfile,
        Arc::new(FailingStore),
        registry,
        OWN,
    )
    .with_warmup(WARMUP)
    .with_interval(INTERVAL);

    let err = poller.run().await.expect_err("save failure propagates");
    let message = format!("{:#}", err);
    assert!(message.contains("Failed to persist daemon state"), "{}", message);
    assert!(message.contains("disk full"), "{}", message);
}

#[test]
fn test_pid_path_is_under_data_dir() {
    let tmp = TempDir::new().expect("create temp dir");
    let store = pud::daemon::pid_file_for(tmp.path());
    assert_eq!(store.path(), PathBuf::from(tmp.path()).join("daemon.pid"));
}

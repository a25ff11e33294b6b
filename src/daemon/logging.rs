// ---------------------------------------------------------------------------
// Daemon logging: stderr plus a rotated daemon.log
// ---------------------------------------------------------------------------

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_appender::non_blocking::WorkerGuard;

/// daemon.log is rotated once it grows past this (10 MB).
const DAEMON_LOG_MAX_BYTES: u64 = 10_485_760;

/// Keeps the non-blocking writer alive until the process flushes it on exit.
static LOG_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// Appends to `daemon.log`. Past `max_bytes` the file is renamed to
/// `daemon.log.old` (replacing the previous one) and a fresh file started,
/// so at most two generations are kept on disk.
pub(crate) struct RotatingLogWriter {
    file: std::fs::File,
    path: PathBuf,
    written: u64,
    max_bytes: u64,
}

fn open_append(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

impl RotatingLogWriter {
    pub(crate) fn new(path: PathBuf, max_bytes: u64) -> std::io::Result<Self> {
        let file = open_append(&path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            file,
            path,
            written,
            max_bytes,
        })
    }

    fn previous_generation(&self) -> PathBuf {
        self.path.with_extension("log.old")
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        self.file.flush()?;
        std::fs::rename(&self.path, self.previous_generation())?;
        self.file = open_append(&self.path)?;
        Ok(())
    }
}

impl Write for RotatingLogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.file.write(buf)?;
        self.written += n as u64;
        if self.written >= self.max_bytes {
            if let Err(e) = self.rotate() {
                // Keep logging to the current file; retry after another cap's worth
                eprintln!("WARNING: daemon.log rotation failed: {}", e);
            }
            self.written = 0;
        }
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

/// Set up tracing for the daemon process: always stderr, plus
/// `<data_dir>/daemon.log` when it can be opened.
///
/// Honors `RUST_LOG`, defaulting to `default_level`. Safe to call when a
/// subscriber is already installed (the second install is ignored).
pub fn init_daemon_logging(data_dir: &Path, default_level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_level.into());
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let log_path = data_dir.join("daemon.log");

    match RotatingLogWriter::new(log_path.clone(), DAEMON_LOG_MAX_BYTES) {
        Ok(writer) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(writer);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);

            let result = tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init();

            if result.is_ok() {
                if let Ok(mut slot) = LOG_GUARD.lock() {
                    *slot = Some(guard);
                }
                tracing::debug!("Logging to stderr and {}", log_path.display());
            }
        }
        Err(e) => {
            let result = tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .try_init();

            if result.is_ok() {
                tracing::warn!(
                    "Could not open log file {}: {}. Logging to stderr only.",
                    log_path.display(),
                    e
                );
            }
        }
    }
}

/// Flush buffered daemon.log lines. Called right before the process exits,
/// since `std::process::exit` skips destructors.
pub fn flush_daemon_log() {
    if let Ok(mut slot) = LOG_GUARD.lock() {
        drop(slot.take());
    }
}

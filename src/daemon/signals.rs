// ---------------------------------------------------------------------------
// SignalGuard: remove our pid file exactly once before the process exits
// ---------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use tokio::task::JoinHandle;

use crate::daemon::logging::flush_daemon_log;
use crate::daemon::pidfile::PidFileStore;
use crate::errors::DaemonError;

/// Owns the "delete own pid file, then exit" action.
///
/// Every exit path of the daemon (policy shutdown, fatal error, termination
/// signal, drop during unwinding) funnels through [`SignalGuard::cleanup`],
/// which performs its effect at most once. Callers racing the first cleanup
/// block until it has finished, so nobody exits while the pid file is half
/// handled. Only the first caller of [`SignalGuard::exit`] terminates the
/// process; later callers park until it is gone.
pub struct SignalGuard {
    pidfile: PidFileStore,
    own_pid: u32,
    once: Once,
    exiting: AtomicBool,
}

impl SignalGuard {
    pub fn new(pidfile: PidFileStore, own_pid: u32) -> Arc<Self> {
        Arc::new(Self {
            pidfile,
            own_pid,
            once: Once::new(),
            exiting: AtomicBool::new(false),
        })
    }

    /// Run the cleanup action if nobody has yet.
    ///
    /// Returns `Ok(true)` for the call that performed it and `Ok(false)` for
    /// every later call. The pid file is only removed while it still names
    /// our pid, so a superseded daemon leaves its successor's record alone.
    pub fn cleanup(&self) -> Result<bool, DaemonError> {
        let mut outcome = Ok(false);
        self.once.call_once(|| {
            outcome = match self.pidfile.remove_if_owned(self.own_pid) {
                Ok(removed) => {
                    if removed {
                        tracing::info!("PID file released: {}", self.pidfile.path().display());
                    }
                    Ok(true)
                }
                Err(e) => Err(e),
            };
        });
        outcome
    }

    /// True once the cleanup action has run (successfully or not).
    pub fn is_cleaned_up(&self) -> bool {
        self.once.is_completed()
    }

    /// True for exactly one caller: the one allowed to end the process.
    fn claim_exit(&self) -> bool {
        !self.exiting.swap(true, Ordering::SeqCst)
    }

    /// Clean up, then terminate the process with `code`.
    ///
    /// A failed pid-file deletion is reported and turns the exit status into 1.
    /// If another thread is already exiting, this one parks instead, so the
    /// process ends with the first caller's status.
    pub fn exit(&self, code: i32) -> ! {
        if !self.claim_exit() {
            loop {
                std::thread::park();
            }
        }
        let code = match self.cleanup() {
            Ok(_) => code,
            Err(e) => {
                tracing::error!("Failed to remove PID file during shutdown: {}", e);
                1
            }
        };
        flush_daemon_log();
        std::process::exit(code)
    }

    /// Register termination handlers and spawn the task that waits on them.
    ///
    /// Unix: SIGINT, SIGTERM and SIGHUP. Windows: Ctrl+C and Ctrl+Break.
    /// The first signal to arrive triggers [`SignalGuard::exit`] with status 0.
    pub fn install(self: &Arc<Self>) -> Result<JoinHandle<()>, DaemonError> {
        let guard = Arc::clone(self);

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let install = |kind: SignalKind, name: &str| {
                signal(kind).map_err(|e| DaemonError::Signal(format!("{}: {}", name, e)))
            };
            let mut sigint = install(SignalKind::interrupt(), "SIGINT")?;
            let mut sigterm = install(SignalKind::terminate(), "SIGTERM")?;
            let mut sighup = install(SignalKind::hangup(), "SIGHUP")?;

            Ok(tokio::spawn(async move {
                let name = tokio::select! {
                    _ = sigint.recv() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sighup.recv() => "SIGHUP",
                };
                tracing::info!("Received {} signal, shutting down", name);
                guard.exit(0);
            }))
        }

        #[cfg(windows)]
        {
            use tokio::signal::windows::{ctrl_break, ctrl_c};

            let mut ctrlc = ctrl_c().map_err(|e| DaemonError::Signal(format!("Ctrl+C: {}", e)))?;
            let mut ctrlbreak =
                ctrl_break().map_err(|e| DaemonError::Signal(format!("Ctrl+Break: {}", e)))?;

            Ok(tokio::spawn(async move {
                let name = tokio::select! {
                    _ = ctrlc.recv() => "Ctrl+C",
                    _ = ctrlbreak.recv() => "Ctrl+Break",
                };
                tracing::info!("Received {} signal, shutting down", name);
                guard.exit(0);
            }))
        }
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            tracing::error!("Failed to remove PID file on drop: {}", e);
        }
    }
}

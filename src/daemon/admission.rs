// Startup conflict resolution: decide whether this process may become the
// daemon, based only on the pid file and OS liveness queries.

use crate::daemon::pidfile::{is_process_alive, terminate_process, PidFileStore};
use crate::errors::DaemonError;

/// What the pid file said before we touched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerState {
    NoExistingOwner,
    OwnerRecordedAndLive(u32),
    /// `None` when the record was unreadable garbage.
    OwnerRecordedButDead(Option<u32>),
}

/// Outcome of a start attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Acquired,
    RecoveredStale { previous: Option<u32> },
    TookOver { previous: u32 },
    AlreadyRunning { pid: u32 },
}

impl Admission {
    /// True when the caller now owns the daemon role.
    pub fn is_owner(&self) -> bool {
        !matches!(self, Admission::AlreadyRunning { .. })
    }
}

/// Classify the current pid record from `own_pid`'s point of view.
pub fn inspect_owner(store: &PidFileStore, own_pid: u32) -> Result<OwnerState, DaemonError> {
    match store.read() {
        Ok(None) => Ok(OwnerState::NoExistingOwner),
        Ok(Some(pid)) if pid == own_pid => Ok(OwnerState::NoExistingOwner),
        Ok(Some(pid)) if is_process_alive(pid) => Ok(OwnerState::OwnerRecordedAndLive(pid)),
        Ok(Some(pid)) => Ok(OwnerState::OwnerRecordedButDead(Some(pid))),
        Err(DaemonError::InvalidPidFile { contents, .. }) => {
            tracing::warn!("PID file contains invalid data ({:?})", contents.trim());
            Ok(OwnerState::OwnerRecordedButDead(None))
        }
        Err(e) => Err(e),
    }
}

/// Resolve a start attempt for `own_pid`.
///
/// The whole read-decide-write sequence runs under the pid-file lock, so two
/// concurrent start attempts cannot both observe "no owner".
pub fn resolve_startup(
    store: &PidFileStore,
    own_pid: u32,
    force: bool,
) -> Result<Admission, DaemonError> {
    let lock = store.lock()?;

    let admission = match inspect_owner(store, own_pid)? {
        OwnerState::NoExistingOwner => Admission::Acquired,
        OwnerState::OwnerRecordedButDead(previous) => {
            match previous {
                Some(pid) => tracing::info!(
                    "Process {} not found, deleting pid file {}",
                    pid,
                    store.path().display()
                ),
                None => tracing::info!(
                    "Deleting unreadable pid file {}",
                    store.path().display()
                ),
            }
            lock.remove()?;
            Admission::RecoveredStale { previous }
        }
        OwnerState::OwnerRecordedAndLive(pid) if force => {
            tracing::info!("Killing existing daemon process {}", pid);
            lock.remove()?;
            terminate_process(pid)?;
            Admission::TookOver { previous: pid }
        }
        OwnerState::OwnerRecordedAndLive(pid) => {
            tracing::info!(
                "Daemon pid file found: {} (PID {})",
                store.path().display(),
                pid
            );
            return Ok(Admission::AlreadyRunning { pid });
        }
    };

    tracing::info!(
        "Writing {} to daemon pid file ({})",
        own_pid,
        store.path().display()
    );
    lock.write(own_pid)?;
    Ok(admission)
}

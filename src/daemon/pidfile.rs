// ---------------------------------------------------------------------------
// PidFileStore: durable record of which process owns the daemon role
// ---------------------------------------------------------------------------

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use crate::errors::DaemonError;

/// The pid file plus its sidecar lock file.
///
/// Reads never block: writes go through a temp file and a rename, so a reader
/// sees either the old pid or the new one. Every mutation holds an exclusive
/// advisory lock on `<path>.lock` for its duration, which serializes a
/// signal-driven cleanup against a competing process's read-decide-write.
#[derive(Debug, Clone)]
pub struct PidFileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Held while mutating the pid file. The advisory lock is released on drop.
pub struct PidLock<'a> {
    store: &'a PidFileStore,
    _file: File,
}

impl PidFileStore {
    pub fn new(path: PathBuf) -> Self {
        let mut lock_name = path.clone().into_os_string();
        lock_name.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_name),
        }
    }

    /// Return the path to the pid file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the exclusive pid-file lock, blocking until it is available.
    pub fn lock(&self) -> Result<PidLock<'_>, DaemonError> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        file.lock_exclusive()?;
        Ok(PidLock {
            store: self,
            _file: file,
        })
    }

    /// Read the recorded pid. A missing file is `Ok(None)`.
    pub fn read(&self) -> Result<Option<u32>, DaemonError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        content
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| DaemonError::InvalidPidFile {
                path: self.path.clone(),
                contents: content,
            })
    }

    pub fn write(&self, pid: u32) -> Result<(), DaemonError> {
        self.lock()?.write(pid)
    }

    /// Remove the pid file. Returns false if there was nothing to remove.
    pub fn remove(&self) -> Result<bool, DaemonError> {
        self.lock()?.remove()
    }

    /// Remove the pid file only if it still names `pid`.
    pub fn remove_if_owned(&self, pid: u32) -> Result<bool, DaemonError> {
        let lock = self.lock()?;
        match self.read() {
            Ok(Some(recorded)) if recorded == pid => lock.remove(),
            Ok(_) | Err(DaemonError::InvalidPidFile { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl PidLock<'_> {
    pub fn read(&self) -> Result<Option<u32>, DaemonError> {
        self.store.read()
    }

    /// Write `pid` via temp file + rename.
    pub fn write(&self, pid: u32) -> Result<(), DaemonError> {
        let path = &self.store.path;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp_name = path.clone().into_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut file = File::create(&tmp_path)?;
        write!(file, "{}", pid)?;
        file.flush()?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp_path, path)?;
        tracing::debug!("Wrote PID {} to {}", pid, path.display());
        Ok(())
    }

    pub fn remove(&self) -> Result<bool, DaemonError> {
        match std::fs::remove_file(&self.store.path) {
            Ok(()) => {
                tracing::debug!("Removed PID file {}", self.store.path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Check whether a process with the given PID is alive.
///
/// - Unix: uses kill(pid, 0); signal 0 checks existence without sending a
///   signal. EPERM means the process exists but belongs to someone else.
/// - Windows: uses OpenProcess with PROCESS_QUERY_LIMITED_INFORMATION.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // pid 0 and anything past i32::MAX would address process groups
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        if raw <= 0 {
            return false;
        }
        if unsafe { libc::kill(raw, 0) } == 0 {
            return true;
        }
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(windows)]
    {
        // PROCESS_QUERY_LIMITED_INFORMATION = 0x1000
        const PROCESS_QUERY_LIMITED_INFORMATION: u32 = 0x1000;

        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle.is_null() {
                false
            } else {
                CloseHandle(handle);
                true
            }
        }
    }
}

/// Ask the process with the given PID to terminate.
///
/// A process that is already gone counts as success.
pub fn terminate_process(pid: u32) -> Result<(), DaemonError> {
    #[cfg(unix)]
    {
        let raw = i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 0)
            .ok_or_else(|| DaemonError::OwnershipConflict(format!("Invalid PID {}", pid)))?;

        if unsafe { libc::kill(raw, libc::SIGTERM) } == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            tracing::debug!("Process {} not found (already dead)", pid);
            return Ok(());
        }
        Err(DaemonError::OwnershipConflict(format!(
            "Failed to kill process {}: {}",
            pid, err
        )))
    }

    #[cfg(windows)]
    {
        let status = std::process::Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .status()?;
        if status.success() || !is_process_alive(pid) {
            Ok(())
        } else {
            Err(DaemonError::OwnershipConflict(format!(
                "taskkill failed for process {}",
                pid
            )))
        }
    }
}

#[cfg(windows)]
extern "system" {
    fn OpenProcess(
        dwDesiredAccess: u32,
        bInheritHandle: i32,
        dwProcessId: u32,
    ) -> *mut std::ffi::c_void;
    fn CloseHandle(hObject: *mut std::ffi::c_void) -> i32;
}

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Ownership conflict: {0}")]
    OwnershipConflict(String),

    #[error("Invalid PID file {}: {contents:?}", path.display())]
    InvalidPidFile { path: PathBuf, contents: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lookup failed for {package}@{tag}: {message}")]
    Lookup {
        package: String,
        tag: String,
        message: String,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Signal error: {0}")]
    Signal(String),
}

impl From<serde_json::Error> for DaemonError {
    fn from(err: serde_json::Error) -> Self {
        DaemonError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}

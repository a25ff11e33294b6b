use std::fmt;

use crate::models::{dist_tag_for, has_update, DaemonState};

/// Why the daemon decided to stop. Every reason is a clean shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    PidFileMissing,
    PidMismatch { recorded: u32, own: u32 },
    Disabled,
    OutOfDate { current: String, latest: String },
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::PidFileMissing => write!(f, "pid file missing"),
            ShutdownReason::PidMismatch { recorded, own } => {
                write!(f, "mismatch with pid file. ({} vs {})", recorded, own)
            }
            ShutdownReason::Disabled => write!(f, "daemon was disabled"),
            ShutdownReason::OutOfDate { current, latest } => {
                write!(f, "out-of-date. ({} vs {})", current, latest)
            }
        }
    }
}

/// Everything the policy looks at, reloaded fresh on each tick.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    pub state: &'a DaemonState,
    pub recorded_pid: Option<u32>,
    pub updates_enabled: bool,
    pub own_pid: u32,
    /// Package the daemon build is published under.
    pub package: &'a str,
}

/// Decide whether the daemon should stop. First matching condition wins.
pub fn evaluate(input: &PolicyInput<'_>) -> Option<ShutdownReason> {
    let recorded = match input.recorded_pid {
        None => return Some(ShutdownReason::PidFileMissing),
        Some(pid) => pid,
    };

    if recorded != input.own_pid {
        return Some(ShutdownReason::PidMismatch {
            recorded,
            own: input.own_pid,
        });
    }

    if !input.updates_enabled {
        return Some(ShutdownReason::Disabled);
    }

    let current = input.state.daemon_version.as_str();
    let tag = dist_tag_for(current);
    let latest = input
        .state
        .latest_version(&tag, input.package)
        .unwrap_or(current);

    if has_update(current, latest) {
        return Some(ShutdownReason::OutOfDate {
            current: current.to_string(),
            latest: latest.to_string(),
        });
    }

    None
}

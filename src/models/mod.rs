pub mod config;
pub mod state;
pub mod version;

pub use config::DaemonConfig;
pub use state::{DaemonState, LatestVersions};
pub use version::{dist_tag_for, has_update, STABLE_TAG};

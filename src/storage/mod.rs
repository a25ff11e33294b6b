pub mod state;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::DaemonState;

/// Whole-record persistence for [`DaemonState`].
///
/// Implementations must not cache: every `load` reflects what is on disk now,
/// so a competing process's writes are always observed.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<DaemonState>;
    async fn save(&self, state: &DaemonState) -> Result<()>;
}

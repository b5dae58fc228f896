//! Node-wide context passed into every operation.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use basalt_core::config::ConfigHelper;
use basalt_core::RegionRegistry;
use basalt_storage::KvEngine;

/// Shared collaborators of one store node, constructed once at startup
/// and passed explicitly.
pub struct ServerContext {
    config: ConfigHelper,
    regions: Arc<RegionRegistry>,
    engine: Arc<dyn KvEngine>,
    checkpoint_root: PathBuf,
    /// Set from the coordinator via store heartbeat; when one store goes
    /// read-only, every store does.
    read_only: AtomicBool,
}

impl ServerContext {
    pub fn new(
        config: ConfigHelper,
        regions: Arc<RegionRegistry>,
        engine: Arc<dyn KvEngine>,
        checkpoint_root: impl Into<PathBuf>,
    ) -> Self {
        ServerContext {
            config,
            regions,
            engine,
            checkpoint_root: checkpoint_root.into(),
            read_only: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ConfigHelper {
        &self.config
    }

    pub fn regions(&self) -> &Arc<RegionRegistry> {
        &self.regions
    }

    pub fn engine(&self) -> &Arc<dyn KvEngine> {
        &self.engine
    }

    pub fn checkpoint_root(&self) -> &PathBuf {
        &self.checkpoint_root
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    /// Applied by the heartbeat task when the coordinator flips the
    /// cluster switch.
    pub fn set_read_only(&self, read_only: bool) {
        let prev = self.read_only.swap(read_only, Ordering::Release);
        if prev != read_only {
            info!(read_only, "cluster read-only flag changed by coordinator");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_storage::MemEngine;

    fn context() -> ServerContext {
        ServerContext::new(
            ConfigHelper::default(),
            Arc::new(RegionRegistry::new()),
            Arc::new(MemEngine::new()),
            "/tmp/checkpoints",
        )
    }

    #[test]
    fn test_read_only_flag() {
        let ctx = context();
        assert!(!ctx.is_read_only());
        ctx.set_read_only(true);
        assert!(ctx.is_read_only());
        ctx.set_read_only(false);
        assert!(!ctx.is_read_only());
    }
}

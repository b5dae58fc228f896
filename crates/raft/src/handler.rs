//! Raft-facing entry points.
//!
//! The raft layer asks the handler to save or load; the handler picks the
//! configured strategy. Checkpoint saves are cheap (they only link files)
//! and run on the calling thread; scan saves capture a read view up front
//! and run on the background worker pool, reporting through a completion
//! callback that fires exactly once.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use tracing::{error, info};

use basalt_core::config::{ConfigHelper, SnapshotPolicy};
use basalt_core::{Error, Region, Result};
use basalt_storage::{CancellationToken, KvEngine, TaskScheduler};

use crate::snapshot::{RaftSnapshot, SnapshotProducer, SnapshotStrategy};
use crate::writer::{SnapshotReader, SnapshotWriter};

/// Completion callback for an asynchronous save.
pub type SnapshotDone = Box<dyn FnOnce(Result<()>) + Send>;

pub struct RaftSnapshotHandler {
    engine: Arc<dyn KvEngine>,
    scheduler: Arc<TaskScheduler>,
    checkpoint_root: PathBuf,
    config: ConfigHelper,
}

fn to_save_error(e: Error) -> Error {
    match e {
        Error::Canceled => Error::Canceled,
        other => Error::raft_save_snapshot(other.to_string()),
    }
}

impl RaftSnapshotHandler {
    pub fn new(
        engine: Arc<dyn KvEngine>,
        scheduler: Arc<TaskScheduler>,
        checkpoint_root: impl Into<PathBuf>,
        config: ConfigHelper,
    ) -> Self {
        RaftSnapshotHandler {
            engine,
            scheduler,
            checkpoint_root: checkpoint_root.into(),
            config,
        }
    }

    /// Save a snapshot using the configured policy.
    ///
    /// Returns the cancellation token registered for the save. `done` is
    /// invoked exactly once: `Ok` on success, `RaftSaveSnapshot` on
    /// failure, `Canceled` when the token fired or the region vanished.
    pub fn handle_save(
        &self,
        region: &Arc<Region>,
        mut writer: Box<dyn SnapshotWriter>,
        producer: Option<Arc<dyn SnapshotProducer>>,
        done: SnapshotDone,
    ) -> CancellationToken {
        let token = CancellationToken::new();
        match self.config.snapshot_policy() {
            SnapshotPolicy::Checkpoint => {
                let snapshot = RaftSnapshot::new(Arc::clone(&self.engine), &self.checkpoint_root);
                let result = snapshot
                    .save_snapshot(
                        writer.as_mut(),
                        region,
                        SnapshotStrategy::Checkpoint,
                        Some(&token),
                        producer.as_deref(),
                    )
                    .map_err(to_save_error);
                if let Err(e) = &result {
                    error!(region_id = region.id(), error = %e, "save snapshot failed");
                }
                done(result);
            }
            SnapshotPolicy::Scan => {
                // Capture the read view on the calling thread so the scan
                // observes the state at request time.
                let snapshot =
                    RaftSnapshot::with_read_view(Arc::clone(&self.engine), &self.checkpoint_root);
                let weak_region: Weak<Region> = Arc::downgrade(region);
                let task_token = token.clone();

                let submitted = self.scheduler.submit(move || {
                    let mut writer = writer;
                    let result = match weak_region.upgrade() {
                        // Region removed while the task waited in queue.
                        None => Err(Error::Canceled),
                        Some(region) => snapshot
                            .save_snapshot(
                                writer.as_mut(),
                                &region,
                                SnapshotStrategy::Scan,
                                Some(&task_token),
                                producer.as_deref(),
                            )
                            .map_err(to_save_error),
                    };
                    if let Err(e) = &result {
                        error!(error = %e, "async save snapshot failed");
                    }
                    done(result);
                });
                if let Err(e) = submitted {
                    // The closure (and `done` with it) never ran.
                    error!(region_id = region.id(), error = %e, "submit snapshot save failed");
                }
            }
        }
        token
    }

    /// Apply a received snapshot on the calling thread.
    pub fn handle_load(&self, region: &Region, reader: &dyn SnapshotReader) -> Result<()> {
        let snapshot = RaftSnapshot::new(Arc::clone(&self.engine), &self.checkpoint_root);
        let result = snapshot.load_snapshot(reader, region);
        match &result {
            Ok(()) => info!(region_id = region.id(), "load snapshot done"),
            Err(e) => error!(region_id = region.id(), error = %e, "load snapshot failed"),
        }
        result
    }
}

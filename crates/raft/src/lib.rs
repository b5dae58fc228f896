//! Raft snapshot pipeline.
//!
//! Captures a region's persisted data as a transportable directory of
//! files and restores it on the receiving peer:
//!
//! - [`meta`] — the `region_meta` file carrying the snapshot's epoch and
//!   range, always written first and parsed first.
//! - [`writer`] — the writer/reader seam toward the raft transport, with
//!   directory-backed implementations.
//! - [`snapshot`] — save (scan or checkpoint strategy) and load
//!   (merge-and-ingest), plus the handler entry points that choose the
//!   strategy and run scan saves on the background worker pool.

pub mod handler;
pub mod meta;
pub mod snapshot;
pub mod writer;

pub use handler::{RaftSnapshotHandler, SnapshotDone};
pub use meta::{RaftSnapshotRegionMeta, REGION_META_FILE_NAME};
pub use snapshot::{filter_sst_files, RaftSnapshot, SnapshotProducer, SnapshotStrategy};
pub use writer::{DirSnapshotReader, DirSnapshotWriter, SnapshotReader, SnapshotWriter};

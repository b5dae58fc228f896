//! Storage abstractions for the region engine.
//!
//! The ordered key-value engine itself is an external collaborator; this
//! crate defines the narrow interface the snapshot pipeline and the
//! service layer program against ([`KvEngine`]), the transportable sst
//! file format the pipeline exchanges, an in-memory engine used by tests,
//! and the background worker scheduler that runs scan-path snapshot saves.

pub mod engine;
pub mod memory;
pub mod scheduler;
pub mod sst;

pub use engine::{KvEngine, SnapshotView, SstFileInfo, CF_DEFAULT};
pub use memory::MemEngine;
pub use scheduler::{CancellationToken, TaskScheduler};
pub use sst::{read_sst_file, SstFileWriter};

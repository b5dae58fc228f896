//! # BasaltDB
//!
//! The per-region state engine of a distributed key-value and vector
//! store node: raft snapshot save/load, the in-memory vector index
//! lifecycle, and the pushed-down filter bytecode VM, together with the
//! region metadata and request validation that gate them.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use basaltdb::{
//!     KvEngine, MemEngine, Range, Region, RegionEpoch, RegionType, CF_DEFAULT,
//! };
//!
//! fn main() -> basaltdb::Result<()> {
//!     let engine = Arc::new(MemEngine::new());
//!     engine.put(CF_DEFAULT, b"\x01".to_vec(), b"a".to_vec())?;
//!
//!     let region = Region::new(
//!         1,
//!         RegionType::Store,
//!         RegionEpoch::new(1, 1),
//!         Range::new(vec![0x01], vec![0x03]),
//!         vec![],
//!     );
//!     println!("{:?}", region);
//!     Ok(())
//! }
//! ```
//!
//! # Layout
//!
//! | Crate | Concern |
//! |-------|---------|
//! | `basalt-core` | errors, ranges, key codec, region metadata, config |
//! | `basalt-expr` | filter bytecode decode and evaluation |
//! | `basalt-storage` | KV-engine interface, sst files, worker pool |
//! | `basalt-raft` | snapshot save/load pipeline |
//! | `basalt-vector` | FLAT / IVF_FLAT / HNSW indexes and their snapshots |
//! | `basalt-server` | request validation, server context |

pub use basalt_core::{
    codec, config, failpoint, range, region, util, Error, ErrorCode, Range, Region, RegionEpoch,
    RegionRegistry, RegionState, RegionType, Result,
};
pub use basalt_expr::{Evaluator, Operand, OperandType, OperatorVector, ProgramBuilder};
pub use basalt_raft::{
    DirSnapshotReader, DirSnapshotWriter, RaftSnapshot, RaftSnapshotHandler, SnapshotProducer,
    SnapshotReader, SnapshotStrategy, SnapshotWriter,
};
pub use basalt_server::{validate, ServerContext};
pub use basalt_storage::{
    CancellationToken, KvEngine, MemEngine, SnapshotView, SstFileInfo, TaskScheduler, CF_DEFAULT,
};
pub use basalt_vector::{
    FilterFunctor, ListFilterFunctor, MetricType, SearchParams, SnapshotMeta, SnapshotMetaSet,
    VectorIndex, VectorIndexParameter, VectorIndexType, VectorWithDistance, VectorWithId,
};

//! In-memory approximate-nearest-neighbor indexes.
//!
//! Each vector-indexed region owns one [`VectorIndex`] living alongside
//! the on-disk key-value data. Three variants are supported: exhaustive
//! FLAT, inverted-list IVF_FLAT, and the HNSW proximity graph. Writers
//! take the index's exclusive write lease; searches share a read lease
//! and run concurrently.
//!
//! Durability comes from index snapshots: [`snapshot::SnapshotMetaSet`]
//! catalogs the on-disk snapshots of one index and plugs into the raft
//! snapshot pipeline as a [`basalt_raft::SnapshotProducer`].

pub mod distance;
pub mod filter;
pub mod flat;
pub mod hnsw;
pub mod index;
pub mod ivf_flat;
pub mod persist;
pub mod snapshot;
pub mod types;

pub use filter::{FilterFunctor, ListFilterFunctor};
pub use index::VectorIndex;
pub use snapshot::{SnapshotMeta, SnapshotMetaSet};
pub use types::{
    MetricType, SearchParams, VectorIndexParameter, VectorIndexType, VectorWithDistance,
    VectorWithId,
};

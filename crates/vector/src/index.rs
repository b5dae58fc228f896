//! The index seam: algorithm trait, shared helpers and the leased
//! wrapper handed to the rest of the node.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};
use tracing::info;

use basalt_core::{Error, Result};

use crate::distance::rank_score;
use crate::filter::FilterFunctor;
use crate::flat::FlatIndex;
use crate::hnsw::HnswIndex;
use crate::ivf_flat::IvfFlatIndex;
use crate::types::{
    MetricType, SearchParams, VectorIndexParameter, VectorIndexType, VectorWithDistance,
    VectorWithId,
};

/// One index variant behind the wrapper's lease.
///
/// `&mut` methods are writers, `&` methods are readers; the wrapper maps
/// them onto its write and read leases.
pub trait IndexAlgorithm: Send + Sync {
    fn parameter(&self) -> VectorIndexParameter;

    fn add(&mut self, vectors: &[VectorWithId]) -> Result<()>;

    fn delete(&mut self, ids: &[u64]) -> Result<()>;

    fn train(&mut self, vectors: &[VectorWithId]) -> Result<()>;

    fn search(
        &self,
        queries: &[VectorWithId],
        topk: usize,
        filters: &[Arc<dyn FilterFunctor>],
        params: &SearchParams,
    ) -> Result<Vec<Vec<VectorWithDistance>>>;

    fn count(&self) -> u64;

    fn memory_size(&self) -> u64;

    fn is_trained(&self) -> bool;

    fn need_to_rebuild(&self) -> bool {
        false
    }

    fn support_save(&self) -> bool {
        true
    }

    fn is_exceeds_max_elements(&self) -> bool {
        false
    }

    fn resize_max_elements(&mut self, _new_max: usize) -> Result<()> {
        Err(Error::illegal_parameters(
            "resize_max_elements is only supported by HNSW",
        ))
    }

    fn save(&self, path: &Path) -> Result<()>;

    fn load(&mut self, path: &Path) -> Result<()>;
}

/// Reject empty and wrong-dimension vectors before they reach a variant.
pub(crate) fn validate_vectors(dimension: usize, vectors: &[VectorWithId]) -> Result<()> {
    for v in vectors {
        if v.vector.is_empty() {
            return Err(Error::vector_invalid(format!(
                "vector {} is empty",
                v.id
            )));
        }
        if v.vector.len() != dimension {
            return Err(Error::vector_invalid(format!(
                "vector {} length {} not match dimension {}",
                v.id,
                v.vector.len(),
                dimension
            )));
        }
    }
    Ok(())
}

/// Rank candidates (higher rank score first, then ascending id) and keep
/// the best `topk`.
pub(crate) fn select_top_k(
    metric: MetricType,
    mut candidates: Vec<VectorWithDistance>,
    topk: usize,
) -> Vec<VectorWithDistance> {
    candidates.sort_by(|a, b| {
        rank_score(metric, b.distance)
            .partial_cmp(&rank_score(metric, a.distance))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates.truncate(topk);
    candidates
}

/// A region's vector index: variant chosen at construction, guarded by a
/// read/write lease.
///
/// Searches run concurrently under the read lease; add/upsert/delete/
/// train/save/load are mutually exclusive under the write lease.
pub struct VectorIndex {
    id: u64,
    parameter: VectorIndexParameter,
    inner: RwLock<Box<dyn IndexAlgorithm>>,
}

impl VectorIndex {
    /// Construct the variant named by `parameter`.
    pub fn new(id: u64, parameter: VectorIndexParameter) -> Result<Self> {
        parameter.validate()?;
        let inner: Box<dyn IndexAlgorithm> = match &parameter {
            VectorIndexParameter::Flat { dimension, metric } => {
                Box::new(FlatIndex::new(*dimension, *metric))
            }
            VectorIndexParameter::IvfFlat {
                dimension,
                metric,
                ncentroids,
            } => Box::new(IvfFlatIndex::new(*dimension, *metric, *ncentroids)),
            VectorIndexParameter::Hnsw {
                dimension,
                metric,
                m,
                ef_construction,
                max_elements,
            } => Box::new(HnswIndex::new(
                *dimension,
                *metric,
                *m,
                *ef_construction,
                *max_elements,
            )),
        };
        info!(vector_index_id = id, index_type = %parameter.index_type(), "new vector index");
        Ok(VectorIndex {
            id,
            parameter,
            inner: RwLock::new(inner),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn index_type(&self) -> VectorIndexType {
        self.parameter.index_type()
    }

    pub fn parameter(&self) -> &VectorIndexParameter {
        &self.parameter
    }

    /// Explicit scoped write acquisition for callers performing
    /// multi-step atomic sequences; the lease releases on drop.
    pub fn lock_write(&self) -> RwLockWriteGuard<'_, Box<dyn IndexAlgorithm>> {
        self.inner.write()
    }

    pub fn add(&self, vectors: &[VectorWithId]) -> Result<()> {
        self.inner.write().add(vectors)
    }

    /// Delete-then-add under one write lease: at most one live entry per
    /// id afterwards.
    pub fn upsert(&self, vectors: &[VectorWithId]) -> Result<()> {
        let mut inner = self.inner.write();
        let ids: Vec<u64> = vectors.iter().map(|v| v.id).collect();
        inner.delete(&ids)?;
        inner.add(vectors)
    }

    pub fn delete(&self, ids: &[u64]) -> Result<()> {
        self.inner.write().delete(ids)
    }

    pub fn train(&self, vectors: &[VectorWithId]) -> Result<()> {
        self.inner.write().train(vectors)
    }

    pub fn search(
        &self,
        queries: &[VectorWithId],
        topk: usize,
        filters: &[Arc<dyn FilterFunctor>],
        params: &SearchParams,
    ) -> Result<Vec<Vec<VectorWithDistance>>> {
        if topk == 0 {
            return Ok(vec![Vec::new(); queries.len()]);
        }
        self.inner.read().search(queries, topk, filters, params)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.inner.write().save(path)
    }

    pub fn load(&self, path: &Path) -> Result<()> {
        self.inner.write().load(path)
    }

    pub fn get_dimension(&self) -> usize {
        self.parameter.dimension()
    }

    pub fn get_count(&self) -> u64 {
        self.inner.read().count()
    }

    pub fn get_memory_size(&self) -> u64 {
        self.inner.read().memory_size()
    }

    pub fn is_trained(&self) -> bool {
        self.inner.read().is_trained()
    }

    pub fn need_to_rebuild(&self) -> bool {
        self.inner.read().need_to_rebuild()
    }

    pub fn support_save(&self) -> bool {
        self.inner.read().support_save()
    }

    pub fn is_exceeds_max_elements(&self) -> bool {
        self.inner.read().is_exceeds_max_elements()
    }

    pub fn resize_max_elements(&self, new_max: usize) -> Result<()> {
        self.inner.write().resize_max_elements(new_max)
    }
}

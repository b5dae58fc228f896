//! Exhaustive FLAT index.
//!
//! Brute-force scan over every stored vector. No training, no capacity
//! limit; the baseline the approximate variants are judged against.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use basalt_core::Result;

use crate::distance::{distance, normalize};
use crate::filter::{passes_filters, FilterFunctor};
use crate::index::{select_top_k, validate_vectors, IndexAlgorithm};
use crate::persist::{
    read_index_file, read_meta_sidecar, validate_loaded, write_index_file, write_meta_sidecar,
    IndexFileData, IndexMeta,
};
use crate::types::{
    MetricType, SearchParams, VectorIndexParameter, VectorIndexType, VectorWithDistance,
    VectorWithId,
};

pub struct FlatIndex {
    dimension: usize,
    metric: MetricType,
    vectors: BTreeMap<u64, Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dimension: usize, metric: MetricType) -> Self {
        FlatIndex {
            dimension,
            metric,
            vectors: BTreeMap::new(),
        }
    }

    fn prepared(&self, v: &VectorWithId) -> Vec<f32> {
        let mut vector = v.vector.clone();
        if self.metric == MetricType::Cosine {
            normalize(&mut vector);
        }
        vector
    }
}

impl IndexAlgorithm for FlatIndex {
    fn parameter(&self) -> VectorIndexParameter {
        VectorIndexParameter::Flat {
            dimension: self.dimension,
            metric: self.metric,
        }
    }

    fn add(&mut self, vectors: &[VectorWithId]) -> Result<()> {
        validate_vectors(self.dimension, vectors)?;
        for v in vectors {
            self.vectors.insert(v.id, self.prepared(v));
        }
        Ok(())
    }

    fn delete(&mut self, ids: &[u64]) -> Result<()> {
        for id in ids {
            self.vectors.remove(id);
        }
        Ok(())
    }

    fn train(&mut self, _vectors: &[VectorWithId]) -> Result<()> {
        Ok(())
    }

    fn search(
        &self,
        queries: &[VectorWithId],
        topk: usize,
        filters: &[Arc<dyn FilterFunctor>],
        _params: &SearchParams,
    ) -> Result<Vec<Vec<VectorWithDistance>>> {
        validate_vectors(self.dimension, queries)?;

        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            let prepared = self.prepared(query);
            let candidates: Vec<VectorWithDistance> = self
                .vectors
                .iter()
                .filter(|(id, _)| passes_filters(filters, **id))
                .map(|(id, stored)| VectorWithDistance {
                    id: *id,
                    distance: distance(self.metric, &prepared, stored),
                })
                .collect();
            results.push(select_top_k(self.metric, candidates, topk));
        }
        Ok(results)
    }

    fn count(&self) -> u64 {
        self.vectors.len() as u64
    }

    fn memory_size(&self) -> u64 {
        (self.vectors.len() * (8 + self.dimension * 4)) as u64
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn save(&self, path: &Path) -> Result<()> {
        let data = IndexFileData {
            index_type: VectorIndexType::Flat,
            metric: self.metric,
            dimension: self.dimension,
            entries: self
                .vectors
                .iter()
                .map(|(id, v)| VectorWithId::new(*id, v.clone()))
                .collect(),
            ivf: None,
        };
        write_index_file(path, &data)?;
        write_meta_sidecar(
            path,
            &IndexMeta {
                index_type: VectorIndexType::Flat,
                parameter: self.parameter(),
                dimension: self.dimension,
                count: self.count(),
            },
        )
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        if let Some(meta) = read_meta_sidecar(path)? {
            if meta.index_type != VectorIndexType::Flat || meta.dimension != self.dimension {
                return Err(basalt_core::Error::illegal_parameters(
                    "index meta sidecar does not match this index",
                ));
            }
        }
        let data = read_index_file(path)?;
        validate_loaded(&data, VectorIndexType::Flat, self.dimension)?;

        self.vectors.clear();
        for entry in data.entries {
            self.vectors.insert(entry.id, entry.vector);
        }
        Ok(())
    }
}

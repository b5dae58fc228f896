//! IVF_FLAT index.
//!
//! Vectors are partitioned into inverted lists by nearest centroid;
//! a search probes the `nprobe` lists whose centroids rank closest to
//! the query. Training (k-means over a sample) is mandatory before any
//! add; training with fewer samples than `ncentroids` is accepted but
//! coerces the index to a single list.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use basalt_core::{Error, Result};

use crate::distance::{distance, l2_squared, normalize};
use crate::filter::{passes_filters, FilterFunctor};
use crate::index::{select_top_k, validate_vectors, IndexAlgorithm};
use crate::persist::{
    read_index_file, read_meta_sidecar, validate_loaded, write_index_file, write_meta_sidecar,
    IndexFileData, IndexMeta, IvfBlock,
};
use crate::types::{
    MetricType, SearchParams, VectorIndexParameter, VectorIndexType, VectorWithDistance,
    VectorWithId,
};

/// Lists probed per query when the request does not say.
pub const DEFAULT_NPROBE: usize = 10;

const KMEANS_ITERATIONS: usize = 10;

pub struct IvfFlatIndex {
    dimension: usize,
    metric: MetricType,
    ncentroids: usize,
    centroids: Vec<Vec<f32>>,
    lists: Vec<BTreeMap<u64, Vec<f32>>>,
    trained: bool,
}

impl IvfFlatIndex {
    pub fn new(dimension: usize, metric: MetricType, ncentroids: usize) -> Self {
        IvfFlatIndex {
            dimension,
            metric,
            ncentroids,
            centroids: Vec::new(),
            lists: Vec::new(),
            trained: false,
        }
    }

    fn prepared(&self, vector: &[f32]) -> Vec<f32> {
        let mut v = vector.to_vec();
        if self.metric == MetricType::Cosine {
            normalize(&mut v);
        }
        v
    }

    /// Nearest centroid by L2; clustering space is L2 for every metric
    /// (cosine inputs are already normalized).
    fn assign(&self, vector: &[f32]) -> usize {
        let mut best = 0usize;
        let mut best_dist = f32::INFINITY;
        for (i, centroid) in self.centroids.iter().enumerate() {
            let d = l2_squared(vector, centroid);
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        best
    }

    fn remove_id(&mut self, id: u64) {
        for list in &mut self.lists {
            list.remove(&id);
        }
    }
}

impl IndexAlgorithm for IvfFlatIndex {
    fn parameter(&self) -> VectorIndexParameter {
        VectorIndexParameter::IvfFlat {
            dimension: self.dimension,
            metric: self.metric,
            ncentroids: self.ncentroids,
        }
    }

    fn train(&mut self, vectors: &[VectorWithId]) -> Result<()> {
        if vectors.is_empty() {
            return Err(Error::internal("ivf_flat train data is empty"));
        }
        if vectors.iter().any(|v| v.vector.len() != self.dimension) {
            return Err(Error::internal(format!(
                "ivf_flat train data not aligned with dimension {}",
                self.dimension
            )));
        }

        let samples: Vec<Vec<f32>> = vectors.iter().map(|v| self.prepared(&v.vector)).collect();

        let mut nlist = self.ncentroids;
        if samples.len() < nlist {
            warn!(
                samples = samples.len(),
                ncentroids = self.ncentroids,
                "train data smaller than ncentroids, coerce to one list"
            );
            nlist = 1;
        }

        // Deterministic init: evenly spaced samples.
        let mut centroids: Vec<Vec<f32>> = (0..nlist)
            .map(|i| samples[i * samples.len() / nlist].clone())
            .collect();

        for _ in 0..KMEANS_ITERATIONS {
            let mut sums = vec![vec![0.0f32; self.dimension]; nlist];
            let mut counts = vec![0usize; nlist];
            for sample in &samples {
                let mut best = 0usize;
                let mut best_dist = f32::INFINITY;
                for (i, centroid) in centroids.iter().enumerate() {
                    let d = l2_squared(sample, centroid);
                    if d < best_dist {
                        best_dist = d;
                        best = i;
                    }
                }
                counts[best] += 1;
                for (acc, x) in sums[best].iter_mut().zip(sample.iter()) {
                    *acc += x;
                }
            }
            for i in 0..nlist {
                // An empty cluster keeps its previous centroid.
                if counts[i] > 0 {
                    for (c, acc) in centroids[i].iter_mut().zip(sums[i].iter()) {
                        *c = acc / counts[i] as f32;
                    }
                }
            }
        }

        self.centroids = centroids;
        self.lists = vec![BTreeMap::new(); nlist];
        self.trained = true;
        Ok(())
    }

    fn add(&mut self, vectors: &[VectorWithId]) -> Result<()> {
        if !self.trained {
            return Err(Error::internal("ivf_flat index not trained"));
        }
        validate_vectors(self.dimension, vectors)?;
        for v in vectors {
            let prepared = self.prepared(&v.vector);
            self.remove_id(v.id);
            let list = self.assign(&prepared);
            self.lists[list].insert(v.id, prepared);
        }
        Ok(())
    }

    fn delete(&mut self, ids: &[u64]) -> Result<()> {
        for id in ids {
            self.remove_id(*id);
        }
        Ok(())
    }

    fn search(
        &self,
        queries: &[VectorWithId],
        topk: usize,
        filters: &[Arc<dyn FilterFunctor>],
        params: &SearchParams,
    ) -> Result<Vec<Vec<VectorWithDistance>>> {
        if !self.trained {
            return Err(Error::internal("ivf_flat index not trained"));
        }
        validate_vectors(self.dimension, queries)?;

        let nprobe = params
            .nprobe
            .unwrap_or(DEFAULT_NPROBE)
            .clamp(1, self.lists.len().max(1));

        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            let prepared = self.prepared(&query.vector);

            // Rank lists by centroid distance, probe the closest nprobe.
            let mut ranked: Vec<(usize, f32)> = self
                .centroids
                .iter()
                .enumerate()
                .map(|(i, c)| (i, l2_squared(&prepared, c)))
                .collect();
            ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            ranked.truncate(nprobe);

            let mut candidates = Vec::new();
            for (list_idx, _) in &ranked {
                for (id, stored) in &self.lists[*list_idx] {
                    if !passes_filters(filters, *id) {
                        continue;
                    }
                    candidates.push(VectorWithDistance {
                        id: *id,
                        distance: distance(self.metric, &prepared, stored),
                    });
                }
            }

            let mut hits = select_top_k(self.metric, candidates, topk);
            // Exact results pass through the filters once more.
            hits.retain(|h| passes_filters(filters, h.id));
            results.push(hits);
        }
        Ok(results)
    }

    fn count(&self) -> u64 {
        self.lists.iter().map(|l| l.len() as u64).sum()
    }

    fn memory_size(&self) -> u64 {
        let entries: u64 = self
            .lists
            .iter()
            .map(|l| (l.len() * (8 + self.dimension * 4)) as u64)
            .sum();
        entries + (self.centroids.len() * self.dimension * 4) as u64
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn save(&self, path: &Path) -> Result<()> {
        let mut entries = BTreeMap::new();
        for list in &self.lists {
            for (id, v) in list {
                entries.insert(*id, v.clone());
            }
        }
        let data = IndexFileData {
            index_type: VectorIndexType::IvfFlat,
            metric: self.metric,
            dimension: self.dimension,
            entries: entries
                .into_iter()
                .map(|(id, v)| VectorWithId::new(id, v))
                .collect(),
            ivf: Some(IvfBlock {
                trained: self.trained,
                centroids: self.centroids.clone(),
            }),
        };
        write_index_file(path, &data)?;
        write_meta_sidecar(
            path,
            &IndexMeta {
                index_type: VectorIndexType::IvfFlat,
                parameter: self.parameter(),
                dimension: self.dimension,
                count: self.count(),
            },
        )
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        if let Some(meta) = read_meta_sidecar(path)? {
            if meta.index_type != VectorIndexType::IvfFlat || meta.dimension != self.dimension {
                return Err(Error::illegal_parameters(
                    "index meta sidecar does not match this index",
                ));
            }
        }
        let data = read_index_file(path)?;
        validate_loaded(&data, VectorIndexType::IvfFlat, self.dimension)?;
        let block = data
            .ivf
            .ok_or_else(|| Error::internal("ivf_flat index file missing centroid block"))?;

        self.centroids = block.centroids;
        self.trained = block.trained;
        self.lists = vec![BTreeMap::new(); self.centroids.len()];
        if self.trained {
            for entry in data.entries {
                // Entries were normalized before save; assignment only.
                let list = self.assign(&entry.vector);
                self.lists[list].insert(entry.id, entry.vector);
            }
        }
        Ok(())
    }
}

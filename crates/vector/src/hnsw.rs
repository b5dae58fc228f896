//! HNSW index.
//!
//! Multi-layer proximity graph: layer 0 holds every element with up to
//! `2*M` links, higher layers hold a thinning subset with up to `M`
//! links. A search greedily descends from the top layer, then runs a
//! beam search of width `ef` at layer 0.
//!
//! Determinism: level assignment uses a fixed-seed splitmix64 counter,
//! node and neighbor storage is BTree-ordered, and ties rank by
//! ascending id — identical insert sequences build identical graphs.
//!
//! Deletes are soft: the node stays as a graph waypoint but is excluded
//! from results. COSINE is realized by normalizing vectors on insert and
//! on query. Capacity is bounded by `max_elements`;
//! [`HnswIndex::resize_max_elements`] grows it, never shrinks.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use basalt_core::{Error, Result};

use crate::distance::{distance, normalize, rank_score};
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

/// Search beam width when the request does not say.
pub const DEFAULT_EF_SEARCH: usize = 50;

const RNG_SEED: u64 = 42;

#[derive(Debug, Clone)]
struct HnswNode {
    /// `neighbors[layer]` is the link set at that layer.
    neighbors: Vec<BTreeSet<u64>>,
    max_layer: usize,
    deleted: bool,
}

impl HnswNode {
    fn new(max_layer: usize) -> Self {
        HnswNode {
            neighbors: (0..=max_layer).map(|_| BTreeSet::new()).collect(),
            max_layer,
            deleted: false,
        }
    }
}

/// Candidate ordered by score, tie-broken toward the lower id.
#[derive(Debug, Clone, PartialEq)]
struct ScoredId {
    score: f32,
    id: u64,
}

impl Eq for ScoredId {}

impl PartialOrd for ScoredId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.id.cmp(&self.id))
    }
}

pub struct HnswIndex {
    dimension: usize,
    metric: MetricType,
    m: usize,
    ef_construction: usize,
    max_elements: usize,
    /// Level multiplier `1 / ln(m)`.
    ml: f64,
    /// Vectors for live and soft-deleted nodes alike; waypoints need
    /// their coordinates.
    vectors: BTreeMap<u64, Vec<f32>>,
    nodes: BTreeMap<u64, HnswNode>,
    entry_point: Option<u64>,
    max_level: usize,
    rng_counter: u64,
    deleted_count: usize,
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

impl HnswIndex {
    pub fn new(
        dimension: usize,
        metric: MetricType,
        m: usize,
        ef_construction: usize,
        max_elements: usize,
    ) -> Self {
        HnswIndex {
            dimension,
            metric,
            m,
            ef_construction: ef_construction.max(1),
            max_elements,
            ml: 1.0 / (m.max(2) as f64).ln(),
            vectors: BTreeMap::new(),
            nodes: BTreeMap::new(),
            entry_point: None,
            max_level: 0,
            rng_counter: 0,
            deleted_count: 0,
        }
    }

    fn prepared(&self, vector: &[f32]) -> Vec<f32> {
        let mut v = vector.to_vec();
        if self.metric == MetricType::Cosine {
            normalize(&mut v);
        }
        v
    }

    fn score(&self, query: &[f32], id: u64) -> Option<f32> {
        let stored = self.vectors.get(&id)?;
        Some(rank_score(self.metric, distance(self.metric, query, stored)))
    }

    fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m * 2
        } else {
            self.m
        }
    }

    fn assign_level(&mut self) -> usize {
        self.rng_counter += 1;
        let hash = splitmix64(RNG_SEED.wrapping_add(self.rng_counter));
        let uniform = ((hash as f64) / (u64::MAX as f64)).max(1e-15);
        (-uniform.ln() * self.ml) as usize
    }

    /// Greedy walk toward the query down to `to_layer`, evaluating every
    /// neighbor and moving to the best one.
    fn greedy_descend(&self, query: &[f32], entry: u64, from_layer: usize, to_layer: usize) -> u64 {
        let mut current = entry;
        for layer in (to_layer..=from_layer).rev() {
            loop {
                let mut best = current;
                let mut best_score = match self.score(query, current) {
                    Some(s) => s,
                    None => return current,
                };
                if let Some(node) = self.nodes.get(&current) {
                    if layer < node.neighbors.len() {
                        for &neighbor in &node.neighbors[layer] {
                            if let Some(s) = self.score(query, neighbor) {
                                if s > best_score || (s == best_score && neighbor < best) {
                                    best_score = s;
                                    best = neighbor;
                                }
                            }
                        }
                    }
                }
                if best == current {
                    break;
                }
                current = best;
            }
        }
        current
    }

    /// Beam search at one layer. Deleted nodes are traversed as
    /// waypoints but never returned. Results sort score-desc, id-asc.
    fn search_layer(&self, query: &[f32], entry: u64, ef: usize, layer: usize) -> Vec<ScoredId> {
        let entry_score = match self.score(query, entry) {
            Some(s) => s,
            None => return Vec::new(),
        };

        let mut visited = BTreeSet::new();
        visited.insert(entry);

        let mut candidates = BinaryHeap::new();
        candidates.push(ScoredId {
            score: entry_score,
            id: entry,
        });

        let mut results: BinaryHeap<std::cmp::Reverse<ScoredId>> = BinaryHeap::new();
        let entry_deleted = self.nodes.get(&entry).map(|n| n.deleted).unwrap_or(true);
        if !entry_deleted {
            results.push(std::cmp::Reverse(ScoredId {
                score: entry_score,
                id: entry,
            }));
        }

        while let Some(nearest) = candidates.pop() {
            let worst = results
                .peek()
                .map(|r| r.0.score)
                .unwrap_or(f32::NEG_INFINITY);
            if nearest.score < worst && results.len() >= ef {
                break;
            }

            if let Some(node) = self.nodes.get(&nearest.id) {
                if layer < node.neighbors.len() {
                    for &neighbor in &node.neighbors[layer] {
                        if !visited.insert(neighbor) {
                            continue;
                        }
                        let Some(score) = self.score(query, neighbor) else {
                            continue;
                        };
                        let worst = results
                            .peek()
                            .map(|r| r.0.score)
                            .unwrap_or(f32::NEG_INFINITY);
                        if results.len() < ef || score > worst {
                            candidates.push(ScoredId {
                                score,
                                id: neighbor,
                            });
                            let deleted = self
                                .nodes
                                .get(&neighbor)
                                .map(|n| n.deleted)
                                .unwrap_or(true);
                            if !deleted {
                                results.push(std::cmp::Reverse(ScoredId {
                                    score,
                                    id: neighbor,
                                }));
                                if results.len() > ef {
                                    results.pop();
                                }
                            }
                        }
                    }
                }
            }
        }

        let mut out: Vec<ScoredId> = results.into_iter().map(|r| r.0).collect();
        out.sort_by(|a, b| b.cmp(a));
        out
    }

    /// Hard-remove a node: unlink it everywhere and re-seat the entry
    /// point. Used when an id is re-inserted.
    fn detach(&mut self, id: u64) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        if node.deleted {
            self.deleted_count -= 1;
        }
        self.vectors.remove(&id);
        for other in self.nodes.values_mut() {
            for layer in &mut other.neighbors {
                layer.remove(&id);
            }
        }
        if self.entry_point == Some(id) {
            self.entry_point = None;
            self.max_level = 0;
            for (other_id, other) in &self.nodes {
                if self.entry_point.is_none() || other.max_layer > self.max_level {
                    self.entry_point = Some(*other_id);
                    self.max_level = other.max_layer;
                }
            }
        }
    }

    fn insert(&mut self, id: u64, prepared: Vec<f32>) -> Result<()> {
        if self.nodes.contains_key(&id) {
            self.detach(id);
        }
        if self.nodes.len() >= self.max_elements {
            return Err(Error::internal(format!(
                "hnsw element count exceeds max_elements {}",
                self.max_elements
            )));
        }

        let level = self.assign_level();
        self.vectors.insert(id, prepared.clone());

        let Some(entry) = self.entry_point else {
            self.nodes.insert(id, HnswNode::new(level));
            self.entry_point = Some(id);
            self.max_level = level;
            return Ok(());
        };

        self.nodes.insert(id, HnswNode::new(level));

        let mut ep = entry;
        if level < self.max_level {
            ep = self.greedy_descend(&prepared, ep, self.max_level, level + 1);
        }

        for layer in (0..=level.min(self.max_level)).rev() {
            let cands = self.search_layer(&prepared, ep, self.ef_construction, layer);
            let neighbors: Vec<u64> = cands
                .iter()
                .filter(|c| c.id != id)
                .take(self.m)
                .map(|c| c.id)
                .collect();

            for &neighbor in &neighbors {
                self.link(id, neighbor, layer);
            }
            if let Some(best) = cands.first() {
                ep = best.id;
            }
        }

        if level > self.max_level {
            self.entry_point = Some(id);
            self.max_level = level;
        }
        Ok(())
    }

    /// Bidirectional link with per-side pruning to the layer's capacity.
    fn link(&mut self, a: u64, b: u64, layer: usize) {
        for (from, to) in [(a, b), (b, a)] {
            if let Some(node) = self.nodes.get_mut(&from) {
                if layer < node.neighbors.len() {
                    node.neighbors[layer].insert(to);
                }
            }
            self.prune(from, layer);
        }
    }

    /// Keep only the closest links when a node exceeds its capacity.
    fn prune(&mut self, id: u64, layer: usize) {
        let cap = self.max_connections(layer);
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if layer >= node.neighbors.len() || node.neighbors[layer].len() <= cap {
            return;
        }
        let base = match self.vectors.get(&id) {
            Some(v) => v.clone(),
            None => return,
        };
        let mut scored: Vec<ScoredId> = node.neighbors[layer]
            .iter()
            .filter_map(|&n| self.score(&base, n).map(|score| ScoredId { score, id: n }))
            .collect();
        scored.sort_by(|a, b| b.cmp(a));
        scored.truncate(cap);
        let keep: BTreeSet<u64> = scored.into_iter().map(|s| s.id).collect();
        if let Some(node) = self.nodes.get_mut(&id) {
            node.neighbors[layer] = keep;
        }
    }

    /// Grow the capacity; shrinking is refused quietly.
    pub fn resize(&mut self, new_max_elements: usize) {
        if new_max_elements <= self.max_elements {
            warn!(
                current = self.max_elements,
                requested = new_max_elements,
                "hnsw max_elements never shrinks"
            );
            return;
        }
        self.max_elements = new_max_elements;
    }

    pub fn max_elements(&self) -> usize {
        self.max_elements
    }
}

impl IndexAlgorithm for HnswIndex {
    fn parameter(&self) -> VectorIndexParameter {
        VectorIndexParameter::Hnsw {
            dimension: self.dimension,
            metric: self.metric,
            m: self.m,
            ef_construction: self.ef_construction,
            max_elements: self.max_elements,
        }
    }

    fn add(&mut self, vectors: &[VectorWithId]) -> Result<()> {
        validate_vectors(self.dimension, vectors)?;
        for v in vectors {
            let prepared = self.prepared(&v.vector);
            self.insert(v.id, prepared)?;
        }
        Ok(())
    }

    fn delete(&mut self, ids: &[u64]) -> Result<()> {
        for id in ids {
            match self.nodes.get_mut(id) {
                Some(node) if !node.deleted => {
                    node.deleted = true;
                    self.deleted_count += 1;
                }
                _ => {}
            }
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
        params: &SearchParams,
    ) -> Result<Vec<Vec<VectorWithDistance>>> {
        validate_vectors(self.dimension, queries)?;

        let ef = params.ef.unwrap_or(DEFAULT_EF_SEARCH).max(topk);

        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            let Some(entry) = self.entry_point else {
                results.push(Vec::new());
                continue;
            };
            let prepared = self.prepared(&query.vector);

            let ep = self.greedy_descend(&prepared, entry, self.max_level, 1);
            let found = self.search_layer(&prepared, ep, ef, 0);

            let candidates: Vec<VectorWithDistance> = found
                .into_iter()
                .filter(|c| passes_filters(filters, c.id))
                .filter_map(|c| {
                    self.vectors.get(&c.id).map(|stored| VectorWithDistance {
                        id: c.id,
                        distance: distance(self.metric, &prepared, stored),
                    })
                })
                .collect();

            let mut hits = select_top_k(self.metric, candidates, topk);
            hits.retain(|h| passes_filters(filters, h.id));
            results.push(hits);
        }
        Ok(results)
    }

    fn count(&self) -> u64 {
        (self.nodes.len() - self.deleted_count) as u64
    }

    fn memory_size(&self) -> u64 {
        let vectors = self.vectors.len() * (8 + self.dimension * 4);
        let links: usize = self
            .nodes
            .values()
            .map(|n| n.neighbors.iter().map(|l| l.len() * 8).sum::<usize>())
            .sum();
        (vectors + links) as u64
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn need_to_rebuild(&self) -> bool {
        !self.nodes.is_empty() && self.deleted_count * 2 > self.nodes.len()
    }

    fn is_exceeds_max_elements(&self) -> bool {
        self.nodes.len() >= self.max_elements
    }

    fn resize_max_elements(&mut self, new_max: usize) -> Result<()> {
        self.resize(new_max);
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        let entries: Vec<VectorWithId> = self
            .nodes
            .iter()
            .filter(|(_, node)| !node.deleted)
            .filter_map(|(id, _)| {
                self.vectors
                    .get(id)
                    .map(|v| VectorWithId::new(*id, v.clone()))
            })
            .collect();
        let data = IndexFileData {
            index_type: VectorIndexType::Hnsw,
            metric: self.metric,
            dimension: self.dimension,
            entries,
            ivf: None,
        };
        write_index_file(path, &data)?;
        write_meta_sidecar(
            path,
            &IndexMeta {
                index_type: VectorIndexType::Hnsw,
                parameter: self.parameter(),
                dimension: self.dimension,
                count: self.count(),
            },
        )
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        if let Some(meta) = read_meta_sidecar(path)? {
            if meta.index_type != VectorIndexType::Hnsw || meta.dimension != self.dimension {
                return Err(Error::illegal_parameters(
                    "index meta sidecar does not match this index",
                ));
            }
        }
        let data = read_index_file(path)?;
        validate_loaded(&data, VectorIndexType::Hnsw, self.dimension)?;

        self.vectors.clear();
        self.nodes.clear();
        self.entry_point = None;
        self.max_level = 0;
        self.rng_counter = 0;
        self.deleted_count = 0;
        if data.entries.len() > self.max_elements {
            self.max_elements = data.entries.len();
        }
        // The graph is rebuilt deterministically from the saved entries.
        for entry in data.entries {
            self.insert(entry.id, entry.vector)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(max_elements: usize) -> HnswIndex {
        HnswIndex::new(2, MetricType::L2, 8, 40, max_elements)
    }

    fn grid(n: usize) -> Vec<VectorWithId> {
        (0..n)
            .map(|i| VectorWithId::new(i as u64, vec![i as f32, (i * i % 7) as f32]))
            .collect()
    }

    fn search_one(idx: &HnswIndex, query: Vec<f32>, topk: usize) -> Vec<VectorWithDistance> {
        idx.search(
            &[VectorWithId::new(0, query)],
            topk,
            &[],
            &SearchParams::default(),
        )
        .unwrap()
        .remove(0)
    }

    #[test]
    fn test_add_and_exact_search() {
        let mut idx = index(100);
        idx.add(&grid(50)).unwrap();
        assert_eq!(idx.count(), 50);

        let hits = search_one(&idx, vec![10.0, 2.0], 1);
        assert_eq!(hits[0].id, 10);
        assert_eq!(hits[0].distance, 0.0);
    }

    #[test]
    fn test_search_empty_index() {
        let idx = index(10);
        assert!(search_one(&idx, vec![1.0, 1.0], 3).is_empty());
    }

    #[test]
    fn test_capacity_and_resize() {
        let mut idx = index(4);
        idx.add(&grid(4)).unwrap();
        assert!(idx.is_exceeds_max_elements());
        let err = idx
            .add(&[VectorWithId::new(99, vec![1.0, 1.0])])
            .unwrap_err();
        assert_eq!(err.code(), basalt_core::ErrorCode::Internal);

        idx.resize_max_elements(8).unwrap();
        assert!(!idx.is_exceeds_max_elements());
        let more: Vec<VectorWithId> = (10..14)
            .map(|i| VectorWithId::new(i, vec![i as f32, 0.0]))
            .collect();
        idx.add(&more).unwrap();
        assert_eq!(idx.count(), 8);
        assert!(idx.is_exceeds_max_elements());
    }

    #[test]
    fn test_resize_never_shrinks() {
        let mut idx = index(16);
        idx.resize_max_elements(4).unwrap();
        assert_eq!(idx.max_elements(), 16);
        idx.resize_max_elements(32).unwrap();
        assert_eq!(idx.max_elements(), 32);
    }

    #[test]
    fn test_soft_delete_excluded_from_results() {
        let mut idx = index(100);
        idx.add(&grid(20)).unwrap();
        idx.delete(&[5]).unwrap();
        assert_eq!(idx.count(), 19);

        let hits = search_one(&idx, vec![5.0, 4.0], 20);
        assert!(hits.iter().all(|h| h.id != 5));
        // Double delete is a no-op.
        idx.delete(&[5]).unwrap();
        assert_eq!(idx.count(), 19);
    }

    #[test]
    fn test_reinsert_after_delete_restores() {
        let mut idx = index(100);
        idx.add(&grid(10)).unwrap();
        idx.delete(&[3]).unwrap();
        idx.add(&[VectorWithId::new(3, vec![3.0, 2.0])]).unwrap();
        assert_eq!(idx.count(), 10);
        let hits = search_one(&idx, vec![3.0, 2.0], 1);
        assert_eq!(hits[0].id, 3);
        assert_eq!(hits[0].distance, 0.0);
    }

    #[test]
    fn test_need_to_rebuild_after_many_deletes() {
        let mut idx = index(100);
        idx.add(&grid(10)).unwrap();
        assert!(!idx.need_to_rebuild());
        idx.delete(&(0..6).map(|i| i as u64).collect::<Vec<_>>())
            .unwrap();
        assert!(idx.need_to_rebuild());
    }

    #[test]
    fn test_cosine_normalizes_both_sides() {
        let mut idx = HnswIndex::new(2, MetricType::Cosine, 8, 40, 100);
        idx.add(&[
            VectorWithId::new(1, vec![10.0, 0.0]),
            VectorWithId::new(2, vec![0.0, 3.0]),
        ])
        .unwrap();
        let hits = idx
            .search(
                &[VectorWithId::new(0, vec![2.0, 0.0])],
                1,
                &[],
                &SearchParams::default(),
            )
            .unwrap()
            .remove(0);
        assert_eq!(hits[0].id, 1);
        // Cosine similarity of parallel vectors, regardless of scale.
        assert!(hits[0].distance >= 1.0 - 1e-5);
    }

    #[test]
    fn test_filters_at_candidate_and_result_stage() {
        use crate::filter::ListFilterFunctor;
        let mut idx = index(100);
        idx.add(&grid(30)).unwrap();
        let filters: Vec<Arc<dyn FilterFunctor>> =
            vec![Arc::new(ListFilterFunctor::new(vec![7, 8]))];
        let hits = idx
            .search(
                &[VectorWithId::new(0, vec![7.0, 0.0])],
                10,
                &filters,
                &SearchParams::default(),
            )
            .unwrap()
            .remove(0);
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.id == 7 || h.id == 8));
    }

    #[test]
    fn test_deterministic_rebuild() {
        let mut a = index(100);
        let mut b = index(100);
        a.add(&grid(40)).unwrap();
        b.add(&grid(40)).unwrap();
        for q in [[3.0, 1.0], [17.0, 4.0], [39.0, 0.0]] {
            assert_eq!(search_one(&a, q.to_vec(), 5), search_one(&b, q.to_vec(), 5));
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index_9_3.idx");

        let mut idx = index(100);
        idx.add(&grid(25)).unwrap();
        idx.delete(&[11]).unwrap();
        idx.save(&path).unwrap();

        let mut loaded = index(100);
        loaded.load(&path).unwrap();
        // Soft-deleted entries are not persisted.
        assert_eq!(loaded.count(), 24);
        let hits = search_one(&loaded, vec![6.0, 1.0], 1);
        assert_eq!(hits[0].id, 6);
        assert!(search_one(&loaded, vec![11.0, 2.0], 25)
            .iter()
            .all(|h| h.id != 11));
    }

    #[test]
    fn test_recall_on_line_data() {
        // Well-separated points on a line: the graph search must find the
        // true nearest neighbor for every probe.
        let mut idx = HnswIndex::new(2, MetricType::L2, 16, 100, 300);
        let points: Vec<VectorWithId> = (0..200)
            .map(|i| VectorWithId::new(i as u64, vec![(i * 10) as f32, 0.0]))
            .collect();
        idx.add(&points).unwrap();

        for probe in [0u64, 37, 100, 199] {
            let hits = search_one(&idx, vec![(probe * 10) as f32 + 1.0, 0.0], 1);
            assert_eq!(hits[0].id, probe, "probe {}", probe);
        }
    }
}

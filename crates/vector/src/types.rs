//! Vector index parameter and payload types.

use serde::{Deserialize, Serialize};

use basalt_core::{Error, Result};

/// Distance metric of an index, chosen at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    L2,
    InnerProduct,
    Cosine,
}

/// Index variant tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorIndexType {
    Flat,
    IvfFlat,
    Hnsw,
}

impl std::fmt::Display for VectorIndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VectorIndexType::Flat => "FLAT",
            VectorIndexType::IvfFlat => "IVF_FLAT",
            VectorIndexType::Hnsw => "HNSW",
        };
        f.write_str(s)
    }
}

/// Variant-specific construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VectorIndexParameter {
    Flat {
        dimension: usize,
        metric: MetricType,
    },
    IvfFlat {
        dimension: usize,
        metric: MetricType,
        ncentroids: usize,
    },
    Hnsw {
        dimension: usize,
        metric: MetricType,
        m: usize,
        ef_construction: usize,
        max_elements: usize,
    },
}

impl VectorIndexParameter {
    pub fn index_type(&self) -> VectorIndexType {
        match self {
            VectorIndexParameter::Flat { .. } => VectorIndexType::Flat,
            VectorIndexParameter::IvfFlat { .. } => VectorIndexType::IvfFlat,
            VectorIndexParameter::Hnsw { .. } => VectorIndexType::Hnsw,
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            VectorIndexParameter::Flat { dimension, .. }
            | VectorIndexParameter::IvfFlat { dimension, .. }
            | VectorIndexParameter::Hnsw { dimension, .. } => *dimension,
        }
    }

    pub fn metric(&self) -> MetricType {
        match self {
            VectorIndexParameter::Flat { metric, .. }
            | VectorIndexParameter::IvfFlat { metric, .. }
            | VectorIndexParameter::Hnsw { metric, .. } => *metric,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension() == 0 {
            return Err(Error::illegal_parameters("dimension must be positive"));
        }
        match self {
            VectorIndexParameter::IvfFlat { ncentroids, .. } if *ncentroids == 0 => {
                Err(Error::illegal_parameters("ncentroids must be positive"))
            }
            VectorIndexParameter::Hnsw {
                m, max_elements, ..
            } if *m == 0 || *max_elements == 0 => Err(Error::illegal_parameters(
                "hnsw m and max_elements must be positive",
            )),
            _ => Ok(()),
        }
    }
}

/// One owned element of an index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorWithId {
    pub id: u64,
    pub vector: Vec<f32>,
}

impl VectorWithId {
    pub fn new(id: u64, vector: Vec<f32>) -> Self {
        VectorWithId { id, vector }
    }
}

/// One search hit. `distance` follows the metric's native convention:
/// squared L2 (lower is closer), `1 - dot` for inner product (lower is
/// closer), cosine similarity (higher is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorWithDistance {
    pub id: u64,
    pub distance: f32,
}

/// Per-request search knobs; each variant reads its own field.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchParams {
    /// IVF_FLAT: inverted lists probed per query.
    pub nprobe: Option<usize>,
    /// HNSW: search beam width.
    pub ef: Option<usize>,
}

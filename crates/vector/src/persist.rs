//! Index persistence.
//!
//! An index saves to one `.idx` data file plus a bincode `meta` sidecar
//! in the same directory describing `{variant, parameters, dimension,
//! element_count}`. Loaders validate variant and dimension before
//! touching the data.
//!
//! # `.idx` Binary Format
//!
//! ```text
//! magic("BVIX", 4) + version(u32 BE) + variant(u8) + metric(u8)
//! + dimension(u32 BE) + count(u64 BE)
//! + [id(u64 BE) + dimension * f32(BE)]*
//! + ivf_present(u8) [+ trained(u8) + nlist(u32 BE) + nlist * dimension * f32(BE)]
//! + crc32(u32 BE)
//! ```
//!
//! Graph and list structure is not persisted; variants rebuild it
//! deterministically from the entries on load.

use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use basalt_core::{Error, Result};

use crate::types::{MetricType, VectorIndexParameter, VectorIndexType, VectorWithId};

pub const INDEX_MAGIC: &[u8; 4] = b"BVIX";
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Sidecar file name, written next to the `.idx` file.
pub const META_SIDECAR_FILE_NAME: &str = "meta";

/// The sidecar contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub index_type: VectorIndexType,
    pub parameter: VectorIndexParameter,
    pub dimension: usize,
    pub count: u64,
}

/// Everything a variant persists.
pub struct IndexFileData {
    pub index_type: VectorIndexType,
    pub metric: MetricType,
    pub dimension: usize,
    pub entries: Vec<VectorWithId>,
    pub ivf: Option<IvfBlock>,
}

/// IVF-specific persisted state.
pub struct IvfBlock {
    pub trained: bool,
    pub centroids: Vec<Vec<f32>>,
}

fn variant_byte(t: VectorIndexType) -> u8 {
    match t {
        VectorIndexType::Flat => 1,
        VectorIndexType::IvfFlat => 2,
        VectorIndexType::Hnsw => 3,
    }
}

fn variant_from_byte(b: u8) -> Option<VectorIndexType> {
    match b {
        1 => Some(VectorIndexType::Flat),
        2 => Some(VectorIndexType::IvfFlat),
        3 => Some(VectorIndexType::Hnsw),
        _ => None,
    }
}

fn metric_byte(m: MetricType) -> u8 {
    match m {
        MetricType::L2 => 1,
        MetricType::InnerProduct => 2,
        MetricType::Cosine => 3,
    }
}

fn metric_from_byte(b: u8) -> Option<MetricType> {
    match b {
        1 => Some(MetricType::L2),
        2 => Some(MetricType::InnerProduct),
        3 => Some(MetricType::Cosine),
        _ => None,
    }
}

/// Reject unusable save/load targets: an empty path is a caller bug, a
/// missing parent directory a filesystem problem.
pub fn check_index_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::illegal_parameters("index path is empty"));
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(Error::internal(format!(
                "index path directory not exist: {}",
                parent.display()
            )))
        }
        _ => Ok(()),
    }
}

fn push_f32s(buf: &mut Vec<u8>, values: &[f32]) {
    let mut b4 = [0u8; 4];
    for v in values {
        BigEndian::write_f32(&mut b4, *v);
        buf.extend_from_slice(&b4);
    }
}

pub fn write_index_file(path: &Path, data: &IndexFileData) -> Result<()> {
    check_index_path(path)?;

    let mut buf = Vec::new();
    buf.extend_from_slice(INDEX_MAGIC);
    let mut b4 = [0u8; 4];
    let mut b8 = [0u8; 8];
    BigEndian::write_u32(&mut b4, INDEX_FORMAT_VERSION);
    buf.extend_from_slice(&b4);
    buf.push(variant_byte(data.index_type));
    buf.push(metric_byte(data.metric));
    BigEndian::write_u32(&mut b4, data.dimension as u32);
    buf.extend_from_slice(&b4);
    BigEndian::write_u64(&mut b8, data.entries.len() as u64);
    buf.extend_from_slice(&b8);

    for entry in &data.entries {
        BigEndian::write_u64(&mut b8, entry.id);
        buf.extend_from_slice(&b8);
        push_f32s(&mut buf, &entry.vector);
    }

    match &data.ivf {
        None => buf.push(0),
        Some(block) => {
            buf.push(1);
            buf.push(u8::from(block.trained));
            BigEndian::write_u32(&mut b4, block.centroids.len() as u32);
            buf.extend_from_slice(&b4);
            for centroid in &block.centroids {
                push_f32s(&mut buf, centroid);
            }
        }
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf);
    BigEndian::write_u32(&mut b4, hasher.finalize());
    buf.extend_from_slice(&b4);

    fs::write(path, &buf)
        .map_err(|e| Error::internal(format!("write index file {}: {}", path.display(), e)))
}

pub fn read_index_file(path: &Path) -> Result<IndexFileData> {
    check_index_path(path)?;
    let data = fs::read(path)
        .map_err(|e| Error::internal(format!("read index file {}: {}", path.display(), e)))?;

    if data.len() < 26 || &data[0..4] != INDEX_MAGIC {
        return Err(Error::internal(format!(
            "bad index file magic in {}",
            path.display()
        )));
    }
    let version = BigEndian::read_u32(&data[4..8]);
    if version != INDEX_FORMAT_VERSION {
        return Err(Error::internal(format!(
            "unsupported index format version {}",
            version
        )));
    }

    let payload_end = data.len() - 4;
    let stored_crc = BigEndian::read_u32(&data[payload_end..]);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[..payload_end]);
    if hasher.finalize() != stored_crc {
        return Err(Error::internal(format!(
            "index file checksum mismatch in {}",
            path.display()
        )));
    }

    let index_type = variant_from_byte(data[8])
        .ok_or_else(|| Error::internal("unknown index variant byte"))?;
    let metric =
        metric_from_byte(data[9]).ok_or_else(|| Error::internal("unknown metric byte"))?;
    let dimension = BigEndian::read_u32(&data[10..14]) as usize;
    let count = BigEndian::read_u64(&data[14..22]);

    let truncated = || Error::internal(format!("truncated index file {}", path.display()));

    let mut pos = 22usize;
    let mut entries = Vec::with_capacity(count as usize);
    let vec_bytes = dimension * 4;
    for _ in 0..count {
        if pos + 8 + vec_bytes > payload_end {
            return Err(truncated());
        }
        let id = BigEndian::read_u64(&data[pos..pos + 8]);
        pos += 8;
        let mut vector = Vec::with_capacity(dimension);
        for i in 0..dimension {
            vector.push(BigEndian::read_f32(&data[pos + i * 4..pos + i * 4 + 4]));
        }
        pos += vec_bytes;
        entries.push(VectorWithId::new(id, vector));
    }

    if pos >= payload_end {
        return Err(truncated());
    }
    let ivf = match data[pos] {
        0 => None,
        1 => {
            pos += 1;
            if pos + 5 > payload_end {
                return Err(truncated());
            }
            let trained = data[pos] == 1;
            let nlist = BigEndian::read_u32(&data[pos + 1..pos + 5]) as usize;
            pos += 5;
            let mut centroids = Vec::with_capacity(nlist);
            for _ in 0..nlist {
                if pos + vec_bytes > payload_end {
                    return Err(truncated());
                }
                let mut centroid = Vec::with_capacity(dimension);
                for i in 0..dimension {
                    centroid.push(BigEndian::read_f32(&data[pos + i * 4..pos + i * 4 + 4]));
                }
                pos += vec_bytes;
                centroids.push(centroid);
            }
            Some(IvfBlock { trained, centroids })
        }
        _ => return Err(Error::internal("bad ivf block marker")),
    };

    Ok(IndexFileData {
        index_type,
        metric,
        dimension,
        entries,
        ivf,
    })
}

/// Path of the sidecar next to an index file.
pub fn sidecar_path(index_path: &Path) -> PathBuf {
    match index_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(META_SIDECAR_FILE_NAME),
        _ => PathBuf::from(META_SIDECAR_FILE_NAME),
    }
}

pub fn write_meta_sidecar(index_path: &Path, meta: &IndexMeta) -> Result<()> {
    let bytes = bincode::serialize(meta)
        .map_err(|e| Error::internal(format!("serialize index meta: {}", e)))?;
    fs::write(sidecar_path(index_path), bytes)?;
    Ok(())
}

pub fn read_meta_sidecar(index_path: &Path) -> Result<Option<IndexMeta>> {
    let path = sidecar_path(index_path);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path)?;
    let meta = bincode::deserialize(&bytes)
        .map_err(|e| Error::internal(format!("parse index meta sidecar: {}", e)))?;
    Ok(Some(meta))
}

/// The common load-time guard every variant applies.
pub fn validate_loaded(
    data: &IndexFileData,
    expect_type: VectorIndexType,
    expect_dimension: usize,
) -> Result<()> {
    if data.index_type != expect_type {
        return Err(Error::illegal_parameters(format!(
            "index variant mismatch: file holds {}, index is {}",
            data.index_type, expect_type
        )));
    }
    if data.dimension != expect_dimension {
        return Err(Error::illegal_parameters(format!(
            "index dimension mismatch: file holds {}, index is {}",
            data.dimension, expect_dimension
        )));
    }
    Ok(())
}

//! The opaque KV-engine interface.
//!
//! The real storage back end is swappable; the snapshot pipeline and the
//! service layer only see this trait. The contract mirrors what the
//! pipeline needs: snapshot-isolated reads, range deletes, atomic external
//! file ingestion, and a checkpoint that exposes its files for hard
//! linking.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use basalt_core::{Range, Result};

use crate::sst::{read_sst_file, SstFileWriter};

/// Column family holding region data. Vector payloads and their scalar
/// sidecar entries share this family under distinct key tags.
pub const CF_DEFAULT: &str = "default";

/// Descriptor of one sst file produced by a checkpoint or a scan.
///
/// `level == -1` marks files the snapshot filter must always retain
/// regardless of range overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SstFileInfo {
    pub level: i32,
    pub name: String,
    pub path: PathBuf,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
}

impl SstFileInfo {
    /// Range form of `[start_key, end_key)` for overlap checks.
    pub fn range(&self) -> Range {
        Range::new(self.start_key.clone(), self.end_key.clone())
    }
}

/// A snapshot-isolated read view.
pub trait SnapshotView: Send + Sync {
    fn get(&self, cf: &str, key: &[u8]) -> Option<Vec<u8>>;

    /// All entries with keys in `[range.start_key, range.end_key)`,
    /// ascending.
    fn scan_range(&self, cf: &str, range: &Range) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// The ordered key-value engine fronted as an abstract interface.
pub trait KvEngine: Send + Sync {
    fn put(&self, cf: &str, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn delete(&self, cf: &str, key: &[u8]) -> Result<()>;

    fn scan_range(&self, cf: &str, range: &Range) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// An isolated read view of the current state.
    fn snapshot(&self) -> Arc<dyn SnapshotView>;

    /// Delete every key in each `[start, end)` range.
    fn batch_delete_range(&self, cf: &str, ranges: &[Range]) -> Result<()>;

    /// Atomically ingest previously written sst files.
    fn ingest_external_files(&self, cf: &str, files: &[PathBuf]) -> Result<()>;

    /// Materialize an atomic checkpoint of `cf` into `dir` and report the
    /// candidate files. The directory also receives the engine's
    /// `CURRENT`/`MANIFEST-*` markers, which is how loaders recognize a
    /// checkpoint-produced snapshot.
    fn checkpoint(&self, cf: &str, dir: &Path) -> Result<Vec<SstFileInfo>>;

    /// Merge the checkpoint ssts under `checkpoint_dir` into one
    /// ingestible sst restricted to `range`.
    ///
    /// Checkpoint-native files cannot be ingested directly; the merged
    /// file can. Returns `NoEntries` when nothing falls inside `range`.
    fn merge_checkpoint_files(
        &self,
        checkpoint_dir: &Path,
        range: &Range,
        out: &Path,
    ) -> Result<()> {
        let mut merged = std::collections::BTreeMap::new();
        for entry in std::fs::read_dir(checkpoint_dir)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            // Earlier per-range merge outputs live in the same directory
            // and are not part of the checkpoint.
            if !name.ends_with(".sst") || name.starts_with("merge_") {
                continue;
            }
            for (key, value) in read_sst_file(&path)? {
                if range.contains_key(&key) {
                    merged.insert(key, value);
                }
            }
        }
        SstFileWriter::new(out).save_from_iter(merged.into_iter())?;
        Ok(())
    }
}

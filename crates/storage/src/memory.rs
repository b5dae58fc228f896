//! In-memory KV engine.
//!
//! A BTreeMap-per-column-family engine implementing the full [`KvEngine`]
//! contract, including checkpointing to real sst files on disk. The
//! snapshot pipeline is developed and tested against this engine; a
//! persistent engine slots in behind the same trait.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use basalt_core::{Range, Result};

use crate::engine::{KvEngine, SnapshotView, SstFileInfo};
use crate::sst::{read_sst_file, SstFileWriter};

type CfMap = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Default)]
pub struct MemEngine {
    cfs: RwLock<HashMap<String, CfMap>>,
}

struct MemSnapshot {
    cfs: HashMap<String, CfMap>,
}

impl SnapshotView for MemSnapshot {
    fn get(&self, cf: &str, key: &[u8]) -> Option<Vec<u8>> {
        self.cfs.get(cf)?.get(key).cloned()
    }

    fn scan_range(&self, cf: &str, range: &Range) -> Vec<(Vec<u8>, Vec<u8>)> {
        scan_cf(self.cfs.get(cf), range)
    }
}

fn scan_cf(cf: Option<&CfMap>, range: &Range) -> Vec<(Vec<u8>, Vec<u8>)> {
    let Some(map) = cf else {
        return Vec::new();
    };
    map.range((
        Bound::Included(range.start_key.clone()),
        Bound::Excluded(range.end_key.clone()),
    ))
    .map(|(k, v)| (k.clone(), v.clone()))
    .collect()
}

impl MemEngine {
    pub fn new() -> Self {
        MemEngine::default()
    }

    /// Total entry count in a column family, for tests and metrics.
    pub fn len(&self, cf: &str) -> usize {
        self.cfs.read().get(cf).map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, cf: &str) -> bool {
        self.len(cf) == 0
    }
}

impl KvEngine for MemEngine {
    fn put(&self, cf: &str, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.cfs
            .write()
            .entry(cf.to_string())
            .or_default()
            .insert(key, value);
        Ok(())
    }

    fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.cfs.read().get(cf).and_then(|m| m.get(key).cloned()))
    }

    fn delete(&self, cf: &str, key: &[u8]) -> Result<()> {
        if let Some(map) = self.cfs.write().get_mut(cf) {
            map.remove(key);
        }
        Ok(())
    }

    fn scan_range(&self, cf: &str, range: &Range) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(scan_cf(self.cfs.read().get(cf), range))
    }

    fn snapshot(&self) -> Arc<dyn SnapshotView> {
        Arc::new(MemSnapshot {
            cfs: self.cfs.read().clone(),
        })
    }

    fn batch_delete_range(&self, cf: &str, ranges: &[Range]) -> Result<()> {
        let mut cfs = self.cfs.write();
        if let Some(map) = cfs.get_mut(cf) {
            for range in ranges {
                let doomed: Vec<Vec<u8>> = map
                    .range((
                        Bound::Included(range.start_key.clone()),
                        Bound::Excluded(range.end_key.clone()),
                    ))
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in doomed {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn ingest_external_files(&self, cf: &str, files: &[PathBuf]) -> Result<()> {
        // Read and verify everything before touching the column family so
        // a bad file cannot leave a partial ingest behind.
        let mut batches = Vec::with_capacity(files.len());
        for file in files {
            batches.push(read_sst_file(file)?);
        }

        let mut cfs = self.cfs.write();
        let map = cfs.entry(cf.to_string()).or_default();
        let mut total = 0usize;
        for batch in batches {
            total += batch.len();
            for (key, value) in batch {
                map.insert(key, value);
            }
        }
        debug!(cf, files = files.len(), entries = total, "ingest external files");
        Ok(())
    }

    fn checkpoint(&self, cf: &str, dir: &Path) -> Result<Vec<SstFileInfo>> {
        std::fs::create_dir_all(dir)?;

        // The auxiliary files of a checkpoint report `level == -1`: the
        // snapshot filter must always retain them, and their presence is
        // how loaders recognize a checkpoint-produced snapshot.
        std::fs::write(dir.join("CURRENT"), b"MANIFEST-000001\n")?;
        std::fs::write(dir.join("MANIFEST-000001"), b"")?;
        let aux = |name: &str| SstFileInfo {
            level: -1,
            name: name.to_string(),
            path: dir.join(name),
            start_key: Vec::new(),
            end_key: Vec::new(),
        };
        let mut files = vec![aux("CURRENT"), aux("MANIFEST-000001")];

        let data: Vec<(Vec<u8>, Vec<u8>)> = {
            let cfs = self.cfs.read();
            cfs.get(cf)
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default()
        };
        if data.is_empty() {
            return Ok(files);
        }

        let start_key = data.first().map(|(k, _)| k.clone()).unwrap_or_default();
        // Exclusive upper bound just past the last present key.
        let mut end_key = data.last().map(|(k, _)| k.clone()).unwrap_or_default();
        end_key.push(0x00);

        let name = format!("{}_000001.sst", cf);
        let path = dir.join(&name);
        SstFileWriter::new(&path).save_from_iter(data.into_iter())?;

        files.push(SstFileInfo {
            level: 0,
            name,
            path,
            start_key,
            end_key,
        });
        Ok(files)
    }
}

impl MemEngine {
    /// Convenience used widely in tests.
    pub fn put_default(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put(crate::engine::CF_DEFAULT, key.to_vec(), value.to_vec())
    }
}

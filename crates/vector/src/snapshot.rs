//! Durable catalog of vector-index snapshots.
//!
//! Each snapshot of an index lives in its own directory named
//! `snapshot_<20-digit-zero-padded-log-id>` — the raft log index at
//! which it was taken, which totally orders snapshots. A
//! [`SnapshotMetaSet`] holds at most one active snapshot per index:
//! adding a newer one collapses everything older, and a
//! [`SnapshotMeta`] removes its directory from disk when dropped.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use basalt_core::{Error, Result};
use basalt_raft::SnapshotProducer;

use crate::index::VectorIndex;

/// Canonical directory name for a snapshot at `snapshot_log_id`.
pub fn snapshot_dir_name(snapshot_log_id: u64) -> String {
    format!("snapshot_{:020}", snapshot_log_id)
}

/// Parse a directory name of the exact canonical form; anything else is
/// rejected.
pub fn parse_snapshot_log_id(name: &str) -> Option<u64> {
    let digits = name.strip_prefix("snapshot_")?;
    if digits.len() != 20 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// One on-disk snapshot of one vector index.
///
/// Dropping the last handle removes the snapshot directory.
pub struct SnapshotMeta {
    vector_index_id: u64,
    snapshot_log_id: u64,
    path: PathBuf,
}

impl SnapshotMeta {
    /// Wrap an existing snapshot directory; the log id is parsed from
    /// the directory name.
    pub fn new(vector_index_id: u64, path: impl Into<PathBuf>) -> Result<Arc<Self>> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let snapshot_log_id = parse_snapshot_log_id(name).ok_or_else(|| {
            Error::internal(format!(
                "parse snapshot log id failed from snapshot name, {}",
                path.display()
            ))
        })?;
        info!(
            vector_index_id,
            snapshot_log_id,
            path = %path.display(),
            "load vector index snapshot meta"
        );
        Ok(Arc::new(SnapshotMeta {
            vector_index_id,
            snapshot_log_id,
            path,
        }))
    }

    pub fn vector_index_id(&self) -> u64 {
        self.vector_index_id
    }

    pub fn snapshot_log_id(&self) -> u64 {
        self.snapshot_log_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta_path(&self) -> PathBuf {
        self.path.join("meta")
    }

    pub fn index_data_path(&self) -> PathBuf {
        self.path.join(format!(
            "index_{}_{}.idx",
            self.vector_index_id, self.snapshot_log_id
        ))
    }

    pub fn list_file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.path)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Drop for SnapshotMeta {
    fn drop(&mut self) {
        info!(path = %self.path.display(), "delete vector index snapshot directory");
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "remove snapshot directory failed");
        }
    }
}

/// Per-index snapshot catalog: `snapshot_log_id -> SnapshotMeta`,
/// serialized under one mutex.
pub struct SnapshotMetaSet {
    vector_index_id: u64,
    home_path: PathBuf,
    snapshots: Mutex<BTreeMap<u64, Arc<SnapshotMeta>>>,
}

impl SnapshotMetaSet {
    pub fn new(vector_index_id: u64, home_path: impl Into<PathBuf>) -> Self {
        SnapshotMetaSet {
            vector_index_id,
            home_path: home_path.into(),
            snapshots: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn vector_index_id(&self) -> u64 {
        self.vector_index_id
    }

    pub fn home_path(&self) -> &Path {
        &self.home_path
    }

    /// Scan the home directory at startup. Directories not matching the
    /// canonical name are ignored with a warning; of the rest, only the
    /// newest survives (stale ones are collapsed, removing them from
    /// disk).
    pub fn init_from_disk(&self) -> Result<()> {
        if !self.home_path.exists() {
            fs::create_dir_all(&self.home_path)?;
            return Ok(());
        }

        let mut found: BTreeMap<u64, PathBuf> = BTreeMap::new();
        for entry in fs::read_dir(&self.home_path)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            match parse_snapshot_log_id(name) {
                Some(log_id) => {
                    found.insert(log_id, path);
                }
                None => {
                    warn!(path = %path.display(), "ignore mis-named snapshot directory");
                }
            }
        }

        for (_, path) in found {
            let snapshot = SnapshotMeta::new(self.vector_index_id, path)?;
            self.add_snapshot(snapshot);
        }
        Ok(())
    }

    /// Newest wins: a snapshot with an unseen log id replaces the whole
    /// catalog; a duplicate id is refused.
    pub fn add_snapshot(&self, snapshot: Arc<SnapshotMeta>) -> bool {
        let mut snapshots = self.snapshots.lock();
        if snapshots.contains_key(&snapshot.snapshot_log_id()) {
            warn!(
                vector_index_id = snapshot.vector_index_id(),
                snapshot_log_id = snapshot.snapshot_log_id(),
                "already exist vector index snapshot"
            );
            return false;
        }
        // Delete stale snapshots.
        snapshots.clear();
        snapshots.insert(snapshot.snapshot_log_id(), snapshot);
        true
    }

    pub fn get_last_snapshot(&self) -> Option<Arc<SnapshotMeta>> {
        self.snapshots
            .lock()
            .iter()
            .next_back()
            .map(|(_, s)| Arc::clone(s))
    }

    pub fn get_snapshots(&self) -> Vec<Arc<SnapshotMeta>> {
        self.snapshots.lock().values().cloned().collect()
    }

    /// A snapshot at `snapshot_log_id` is covered once any snapshot at
    /// that id or newer exists.
    pub fn is_exist_snapshot(&self, snapshot_log_id: u64) -> bool {
        match self.get_last_snapshot() {
            Some(last) => snapshot_log_id <= last.snapshot_log_id(),
            None => false,
        }
    }

    pub fn clear_snapshot(&self) {
        self.snapshots.lock().clear();
    }
}

impl SnapshotProducer for SnapshotMetaSet {
    /// Hard-link the files of the newest snapshot into a raft snapshot
    /// directory.
    fn export_snapshot(&self, dir: &Path) -> Result<Vec<String>> {
        let Some(last) = self.get_last_snapshot() else {
            return Ok(Vec::new());
        };
        let mut names = Vec::new();
        for name in last.list_file_names() {
            let target = dir.join(&name);
            fs::hard_link(last.path().join(&name), &target).map_err(|e| {
                Error::internal_with_source(format!("link vector index snapshot file {}", name), e)
            })?;
            names.push(name);
        }
        Ok(names)
    }
}

/// Persist the index at `snapshot_log_id` and publish it in the catalog.
pub fn save_vector_index_snapshot(
    index: &VectorIndex,
    set: &SnapshotMetaSet,
    snapshot_log_id: u64,
) -> Result<Arc<SnapshotMeta>> {
    let dir = set.home_path().join(snapshot_dir_name(snapshot_log_id));
    fs::create_dir_all(&dir)?;

    let snapshot = SnapshotMeta::new(index.id(), &dir)?;
    index.save(&snapshot.index_data_path())?;

    if !set.add_snapshot(Arc::clone(&snapshot)) {
        // Dropping the refused handle removes the directory again.
        return Err(Error::internal(format!(
            "vector index {} already has snapshot {}",
            index.id(),
            snapshot_log_id
        )));
    }
    info!(
        vector_index_id = index.id(),
        snapshot_log_id,
        "vector index snapshot saved"
    );
    Ok(snapshot)
}

/// Restore the index from the newest cataloged snapshot, if any.
pub fn load_last_vector_index_snapshot(
    index: &VectorIndex,
    set: &SnapshotMetaSet,
) -> Result<Option<u64>> {
    let Some(last) = set.get_last_snapshot() else {
        return Ok(None);
    };
    index.load(&last.index_data_path())?;
    Ok(Some(last.snapshot_log_id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MetricType, SearchParams, VectorIndexParameter, VectorWithId};

    fn make_snapshot_dir(home: &Path, log_id: u64) -> PathBuf {
        let dir = home.join(snapshot_dir_name(log_id));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("meta"), b"m").unwrap();
        dir
    }

    #[test]
    fn test_dir_name_format() {
        assert_eq!(snapshot_dir_name(7), "snapshot_00000000000000000007");
        assert_eq!(parse_snapshot_log_id("snapshot_00000000000000000007"), Some(7));
        assert_eq!(parse_snapshot_log_id("snapshot_7"), None);
        assert_eq!(parse_snapshot_log_id("snapshot_0000000000000000000x"), None);
        assert_eq!(parse_snapshot_log_id("checkpoint_00000000000000000007"), None);
        // 21 digits is not the canonical form either.
        assert_eq!(parse_snapshot_log_id("snapshot_000000000000000000007"), None);
    }

    #[test]
    fn test_snapshot_meta_paths() {
        let home = tempfile::tempdir().unwrap();
        let dir = make_snapshot_dir(home.path(), 12);
        let meta = SnapshotMeta::new(3, &dir).unwrap();
        assert_eq!(meta.snapshot_log_id(), 12);
        assert!(meta
            .index_data_path()
            .ends_with("snapshot_00000000000000000012/index_3_12.idx"));
        assert_eq!(meta.list_file_names(), vec!["meta".to_string()]);
    }

    #[test]
    fn test_drop_removes_directory() {
        let home = tempfile::tempdir().unwrap();
        let dir = make_snapshot_dir(home.path(), 5);
        let meta = SnapshotMeta::new(1, &dir).unwrap();
        assert!(dir.exists());
        drop(meta);
        assert!(!dir.exists());
    }

    #[test]
    fn test_add_snapshot_newest_wins_and_duplicates_refused() {
        let home = tempfile::tempdir().unwrap();
        let set = SnapshotMetaSet::new(1, home.path());

        let dir_a = make_snapshot_dir(home.path(), 10);
        let a = SnapshotMeta::new(1, &dir_a).unwrap();
        assert!(set.add_snapshot(a));
        assert_eq!(set.get_last_snapshot().unwrap().snapshot_log_id(), 10);

        // Newer snapshot collapses the older one; its directory goes away.
        let dir_b = make_snapshot_dir(home.path(), 20);
        let b = SnapshotMeta::new(1, &dir_b).unwrap();
        assert!(set.add_snapshot(b));
        assert_eq!(set.get_last_snapshot().unwrap().snapshot_log_id(), 20);
        assert_eq!(set.get_snapshots().len(), 1);
        assert!(!dir_a.exists());
        assert!(dir_b.exists());

        // Same id again is refused.
        let dir_b2 = home.path().join(snapshot_dir_name(20));
        let b2 = SnapshotMeta {
            vector_index_id: 1,
            snapshot_log_id: 20,
            path: dir_b2,
        };
        assert!(!set.add_snapshot(Arc::new(b2)));
    }

    #[test]
    fn test_monotone_adds_track_the_max_id() {
        // Raft log ids only grow, so the catalog always ends at the max.
        let home = tempfile::tempdir().unwrap();
        let set = SnapshotMetaSet::new(1, home.path());
        for id in [3u64, 6, 9] {
            let dir = make_snapshot_dir(home.path(), id);
            assert!(set.add_snapshot(SnapshotMeta::new(1, &dir).unwrap()));
            assert_eq!(set.get_last_snapshot().unwrap().snapshot_log_id(), id);
        }
        assert_eq!(set.get_last_snapshot().unwrap().snapshot_log_id(), 9);
    }

    #[test]
    fn test_out_of_order_add_keeps_latest_accepted() {
        // A fresh id always replaces the whole catalog, even a lower one.
        let home = tempfile::tempdir().unwrap();
        let set = SnapshotMetaSet::new(1, home.path());
        for id in [9u64, 6] {
            let dir = make_snapshot_dir(home.path(), id);
            assert!(set.add_snapshot(SnapshotMeta::new(1, &dir).unwrap()));
        }
        assert_eq!(set.get_last_snapshot().unwrap().snapshot_log_id(), 6);
    }

    #[test]
    fn test_is_exist_snapshot() {
        let home = tempfile::tempdir().unwrap();
        let set = SnapshotMetaSet::new(1, home.path());
        assert!(!set.is_exist_snapshot(1));
        let dir = make_snapshot_dir(home.path(), 15);
        set.add_snapshot(SnapshotMeta::new(1, &dir).unwrap());
        assert!(set.is_exist_snapshot(15));
        assert!(set.is_exist_snapshot(3));
        assert!(!set.is_exist_snapshot(16));
    }

    #[test]
    fn test_init_from_disk_ignores_misnamed() {
        let home = tempfile::tempdir().unwrap();
        make_snapshot_dir(home.path(), 4);
        make_snapshot_dir(home.path(), 9);
        fs::create_dir_all(home.path().join("snapshot_9")).unwrap();
        fs::create_dir_all(home.path().join("garbage")).unwrap();

        let set = SnapshotMetaSet::new(2, home.path());
        set.init_from_disk().unwrap();

        let last = set.get_last_snapshot().unwrap();
        assert_eq!(last.snapshot_log_id(), 9);
        // The older canonical snapshot was collapsed and deleted; the
        // mis-named directories are left alone.
        assert!(!home.path().join(snapshot_dir_name(4)).exists());
        assert!(home.path().join("snapshot_9").exists());
        assert!(home.path().join("garbage").exists());
    }

    fn flat_index(id: u64) -> VectorIndex {
        let index = VectorIndex::new(
            id,
            VectorIndexParameter::Flat {
                dimension: 2,
                metric: MetricType::L2,
            },
        )
        .unwrap();
        index
            .add(&[
                VectorWithId::new(1, vec![1.0, 0.0]),
                VectorWithId::new(2, vec![0.0, 1.0]),
            ])
            .unwrap();
        index
    }

    #[test]
    fn test_save_and_load_index_snapshot() {
        let home = tempfile::tempdir().unwrap();
        let set = SnapshotMetaSet::new(7, home.path());
        let index = flat_index(7);

        let snapshot = save_vector_index_snapshot(&index, &set, 42).unwrap();
        assert!(snapshot.index_data_path().exists());
        assert!(snapshot.meta_path().exists());

        // Restore into a fresh index.
        let restored = VectorIndex::new(
            7,
            VectorIndexParameter::Flat {
                dimension: 2,
                metric: MetricType::L2,
            },
        )
        .unwrap();
        let log_id = load_last_vector_index_snapshot(&restored, &set).unwrap();
        assert_eq!(log_id, Some(42));
        assert_eq!(restored.get_count(), 2);
        let hits = restored
            .search(
                &[VectorWithId::new(0, vec![1.0, 0.0])],
                1,
                &[],
                &SearchParams::default(),
            )
            .unwrap()
            .remove(0);
        assert_eq!(hits[0].id, 1);
    }

    #[test]
    fn test_load_without_snapshot_is_none() {
        let home = tempfile::tempdir().unwrap();
        let set = SnapshotMetaSet::new(7, home.path());
        let index = flat_index(7);
        assert_eq!(load_last_vector_index_snapshot(&index, &set).unwrap(), None);
    }

    #[test]
    fn test_export_snapshot_links_files() {
        let home = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let set = SnapshotMetaSet::new(7, home.path());
        let index = flat_index(7);
        save_vector_index_snapshot(&index, &set, 8).unwrap();

        let names = set.export_snapshot(out.path()).unwrap();
        assert_eq!(names.len(), 2);
        assert!(out.path().join("index_7_8.idx").exists());
        assert!(out.path().join("meta").exists());
    }

    #[test]
    fn test_export_without_snapshot_is_empty() {
        let home = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let set = SnapshotMetaSet::new(7, home.path());
        assert!(set.export_snapshot(out.path()).unwrap().is_empty());
    }
}

//! Snapshot save and load.
//!
//! Saving produces a directory holding `region_meta` plus the sst files
//! covering the region's range, via one of two strategies:
//!
//! - **scan**: iterate the snapshot-isolated read view over the raw range
//!   and write a single `<region_id>.sst`. An empty region yields a
//!   meta-only snapshot.
//! - **checkpoint**: take an engine checkpoint, keep the files overlapping
//!   the region's physics ranges (or marked always-retain), and hard-link
//!   them into the writer. Cheap enough to run on the calling thread.
//!
//! Loading parses `region_meta`, reconciles the epoch, clears the region's
//! physics ranges, and ingests: checkpoint-produced snapshots (recognized
//! by their `CURRENT` file) are first merged into per-range
//! `merge_<n>.sst` files, scan-produced snapshots ingest as-is. Ingest
//! failure leaves the region empty — snapshot wins, the caller retries.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use basalt_core::util::timestamp_ns;
use basalt_core::{failpoint, Error, Range, Region, Result};
use basalt_storage::{
    CancellationToken, KvEngine, SnapshotView, SstFileInfo, SstFileWriter, CF_DEFAULT,
};

use crate::meta::{RaftSnapshotRegionMeta, REGION_META_FILE_NAME};
use crate::writer::{SnapshotReader, SnapshotWriter};

/// Auxiliary snapshot content supplied by another subsystem (the vector
/// index catalog exports its index files through this seam).
pub trait SnapshotProducer: Send + Sync {
    /// Write extra files into `dir`, returning the created file names.
    fn export_snapshot(&self, dir: &Path) -> Result<Vec<String>>;
}

/// Which generation strategy a save uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStrategy {
    Scan,
    Checkpoint,
}

/// One snapshot operation against one engine.
pub struct RaftSnapshot {
    engine: Arc<dyn KvEngine>,
    /// Captured at construction for scan saves so the scan observes the
    /// state at request time, not at worker-execution time.
    read_view: Option<Arc<dyn SnapshotView>>,
    checkpoint_root: PathBuf,
}

/// Keep files marked always-retain (`level == -1`) or overlapping any of
/// the given ranges.
pub fn filter_sst_files(files: Vec<SstFileInfo>, ranges: &[Range]) -> Vec<SstFileInfo> {
    files
        .into_iter()
        .filter(|file| file.level == -1 || ranges.iter().any(|r| file.range().intersects(r)))
        .collect()
}

impl RaftSnapshot {
    pub fn new(engine: Arc<dyn KvEngine>, checkpoint_root: impl Into<PathBuf>) -> Self {
        RaftSnapshot {
            engine,
            read_view: None,
            checkpoint_root: checkpoint_root.into(),
        }
    }

    /// Capture the engine read view now; scan saves use it later on the
    /// worker thread.
    pub fn with_read_view(engine: Arc<dyn KvEngine>, checkpoint_root: impl Into<PathBuf>) -> Self {
        let read_view = engine.snapshot();
        RaftSnapshot {
            engine,
            read_view: Some(read_view),
            checkpoint_root: checkpoint_root.into(),
        }
    }

    /// Scan the region range into a single sst under `checkpoint_path`.
    fn gen_snapshot_file_by_scan(
        &self,
        checkpoint_path: &Path,
        region: &Region,
        token: Option<&CancellationToken>,
    ) -> Result<Vec<SstFileInfo>> {
        fs::create_dir_all(checkpoint_path)?;

        if token.map(|t| t.is_canceled()).unwrap_or(false) {
            return Err(Error::Canceled);
        }

        let raw_range = region.raw_range();
        let view = match &self.read_view {
            Some(view) => Arc::clone(view),
            None => self.engine.snapshot(),
        };
        let entries = view.scan_range(CF_DEFAULT, &raw_range);

        if token.map(|t| t.is_canceled()).unwrap_or(false) {
            return Err(Error::Canceled);
        }

        let sst_name = format!("{}.sst", region.id());
        let sst_path = checkpoint_path.join(&sst_name);
        let count = SstFileWriter::new(&sst_path).save_from_iter(entries.into_iter())?;

        let sst_file = SstFileInfo {
            level: 0,
            name: sst_name,
            path: sst_path,
            start_key: raw_range.start_key.clone(),
            end_key: raw_range.end_key.clone(),
        };
        info!(
            region_id = region.id(),
            entries = count,
            file = %sst_file.path.display(),
            "scan snapshot sst generated"
        );
        Ok(vec![sst_file])
    }

    /// Checkpoint the data column family and keep the region's files.
    fn gen_snapshot_file_by_checkpoint(
        &self,
        checkpoint_path: &Path,
        region: &Region,
    ) -> Result<Vec<SstFileInfo>> {
        let candidates = self.engine.checkpoint(CF_DEFAULT, checkpoint_path)?;
        let sst_files = filter_sst_files(candidates, &region.physics_range());
        for sst_file in &sst_files {
            info!(
                region_id = region.id(),
                name = %sst_file.name,
                range = %sst_file.range().to_hex_string(),
                "checkpoint snapshot sst retained"
            );
        }
        Ok(sst_files)
    }

    /// Produce the full snapshot into `writer`.
    ///
    /// `region_meta` always lands first. A scan that finds no entries
    /// still succeeds with a meta-only snapshot. The temporary checkpoint
    /// directory is removed on every path out of this function.
    pub fn save_snapshot(
        &self,
        writer: &mut dyn SnapshotWriter,
        region: &Region,
        strategy: SnapshotStrategy,
        token: Option<&CancellationToken>,
        producer: Option<&dyn SnapshotProducer>,
    ) -> Result<()> {
        let raw_range = region.raw_range();
        if raw_range.start_key.is_empty() || raw_range.end_key.is_empty() {
            return Err(Error::range_invalid(format!(
                "region {} save snapshot failed, range is invalid",
                region.id()
            )));
        }

        info!(
            region_id = region.id(),
            range = %raw_range.to_hex_string(),
            ?strategy,
            "save snapshot"
        );

        let meta = RaftSnapshotRegionMeta::new(region.epoch(), raw_range);
        meta.write_to_dir(writer.path())?;
        writer.add_file(REGION_META_FILE_NAME)?;

        let checkpoint_path = self
            .checkpoint_root
            .join(format!("{}_{}", region.id(), timestamp_ns()));

        let generated = match strategy {
            SnapshotStrategy::Scan => {
                self.gen_snapshot_file_by_scan(&checkpoint_path, region, token)
            }
            SnapshotStrategy::Checkpoint => {
                self.gen_snapshot_file_by_checkpoint(&checkpoint_path, region)
            }
        };
        let sst_files = match generated {
            Ok(files) => files,
            Err(Error::NoEntries) => Vec::new(),
            Err(e) => {
                remove_dir_quiet(&checkpoint_path);
                return Err(e);
            }
        };

        for sst_file in &sst_files {
            let target = writer.path().join(&sst_file.name);
            if let Err(e) = fs::hard_link(&sst_file.path, &target) {
                error!(
                    region_id = region.id(),
                    from = %sst_file.path.display(),
                    to = %target.display(),
                    "link snapshot file failed"
                );
                remove_dir_quiet(&checkpoint_path);
                return Err(Error::internal_with_source(
                    format!("link snapshot file {}", sst_file.name),
                    e,
                ));
            }

            let blob = bincode::serialize(sst_file)
                .map_err(|e| Error::internal(format!("serialize sst file info: {}", e)))?;
            writer.add_file_with_meta(&sst_file.name, blob)?;
        }

        if let Some(producer) = producer {
            match producer.export_snapshot(writer.path()) {
                Ok(names) => {
                    for name in names {
                        writer.add_file(&name)?;
                    }
                }
                Err(e) => {
                    remove_dir_quiet(&checkpoint_path);
                    return Err(e);
                }
            }
        }

        remove_dir_quiet(&checkpoint_path);
        Ok(())
    }

    /// Check `region_meta`, reconcile the epoch and clear existing data.
    fn handle_region_meta(&self, reader: &dyn SnapshotReader, region: &Region) -> Result<()> {
        let meta = RaftSnapshotRegionMeta::parse_from_dir(reader.path())?;

        info!(
            region_id = region.id(),
            region_version = region.epoch().version,
            snapshot_version = meta.epoch.version,
            "load snapshot region meta"
        );

        if meta.epoch.version < region.epoch().version {
            return Err(Error::region_version(
                region.id(),
                "snapshot version abnormal, abandon load snapshot",
            ));
        } else if meta.epoch.version > region.epoch().version {
            region.set_raw_range(meta.range.clone());
            region.update_epoch_version(meta.epoch.version)?;
        }

        // Delete old region data across every physical range.
        self.engine
            .batch_delete_range(CF_DEFAULT, &region.physics_range())
    }

    /// Apply a received snapshot to the region.
    pub fn load_snapshot(&self, reader: &dyn SnapshotReader, region: &Region) -> Result<()> {
        info!(region_id = region.id(), path = %reader.path().display(), "load snapshot");

        let files = reader.list_files();
        if files.is_empty() {
            warn!(region_id = region.id(), "snapshot not include file");
        }

        self.handle_region_meta(reader, region)?;

        let mut sst_files: Vec<PathBuf> = Vec::new();
        let current_path = reader.path().join("CURRENT");
        if current_path.exists() {
            // Checkpoint-produced: merge into one ingestible sst per
            // physics range.
            let mut count = 0;
            for range in region.physics_range() {
                count += 1;
                let merge_sst_path = reader.path().join(format!("merge_{}.sst", count));
                match self
                    .engine
                    .merge_checkpoint_files(reader.path(), &range, &merge_sst_path)
                {
                    Ok(()) => sst_files.push(merge_sst_path),
                    Err(Error::NoEntries) => {
                        info!(
                            region_id = region.id(),
                            range = %range.to_hex_string(),
                            "merge sst file success with no entries"
                        );
                    }
                    Err(e) => {
                        error!(
                            region_id = region.id(),
                            merge_sst_path = %merge_sst_path.display(),
                            "merge sst file failed"
                        );
                        return Err(e);
                    }
                }
            }
        } else {
            // Scan-produced: ingest the sst files; the region meta and any
            // vector-index snapshot files ride along for other consumers.
            for file in &files {
                if file == REGION_META_FILE_NAME || !file.ends_with(".sst") {
                    continue;
                }
                sst_files.push(reader.path().join(file));
            }
        }

        failpoint::trigger("load_snapshot_suspend");

        if !sst_files.is_empty() {
            let ingest_result = self.engine.ingest_external_files(CF_DEFAULT, &sst_files);

            // Merge temp files are consumed either way.
            for sst_file in &sst_files {
                let is_merge = sst_file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("merge_"))
                    .unwrap_or(false);
                if is_merge {
                    let _ = fs::remove_file(sst_file);
                }
            }

            if let Err(e) = ingest_result {
                error!(
                    region_id = region.id(),
                    files = sst_files.len(),
                    "ingest sst file failed"
                );
                return Err(e);
            }
            info!(
                region_id = region.id(),
                files = sst_files.len(),
                "ingest sst file"
            );
        } else {
            info!(region_id = region.id(), "no sst file need to ingest");
        }

        info!(region_id = region.id(), "load snapshot success");
        Ok(())
    }
}

fn remove_dir_quiet(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_dir_all(path) {
            warn!(path = %path.display(), error = %e, "remove checkpoint directory failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{DirSnapshotReader, DirSnapshotWriter};
    use basalt_core::region::{RegionEpoch, RegionType};
    use basalt_storage::MemEngine;

    fn new_region(id: u64, epoch: RegionEpoch, range: Range) -> Region {
        let region = Region::new(id, RegionType::Store, epoch, range, vec![]);
        region.set_state(basalt_core::RegionState::Standby).unwrap();
        region.set_state(basalt_core::RegionState::Normal).unwrap();
        region
    }

    fn engine_with(keys: &[(&[u8], &[u8])]) -> Arc<MemEngine> {
        let engine = Arc::new(MemEngine::new());
        for (k, v) in keys {
            engine.put_default(k, v).unwrap();
        }
        engine
    }

    struct TestDirs {
        _root: tempfile::TempDir,
        snapshot_dir: PathBuf,
        checkpoint_root: PathBuf,
    }

    fn test_dirs() -> TestDirs {
        let root = tempfile::tempdir().unwrap();
        let snapshot_dir = root.path().join("snapshot");
        let checkpoint_root = root.path().join("checkpoints");
        fs::create_dir_all(&checkpoint_root).unwrap();
        TestDirs {
            _root: root,
            snapshot_dir,
            checkpoint_root,
        }
    }

    #[test]
    fn test_scan_save_and_load_roundtrip() {
        let dirs = test_dirs();
        let engine = engine_with(&[(b"\x01", b"a"), (b"\x02", b"b"), (b"\x09", b"out")]);
        let region = new_region(
            1,
            RegionEpoch::new(1, 5),
            Range::new(vec![0x01], vec![0x03]),
        );

        let snapshot = RaftSnapshot::with_read_view(engine.clone(), &dirs.checkpoint_root);
        let mut writer = DirSnapshotWriter::create(&dirs.snapshot_dir).unwrap();
        snapshot
            .save_snapshot(&mut writer, &region, SnapshotStrategy::Scan, None, None)
            .unwrap();

        // region_meta plus exactly one sst named <region_id>.sst.
        let files = writer.list_files();
        assert_eq!(files, vec!["1.sst".to_string(), "region_meta".to_string()]);
        assert!(writer.file_meta("1.sst").is_some());

        let meta = RaftSnapshotRegionMeta::parse_from_dir(&dirs.snapshot_dir).unwrap();
        assert_eq!(meta.range, Range::new(vec![0x01], vec![0x03]));
        assert_eq!(meta.epoch.version, 5);

        // The temp checkpoint dir is gone.
        assert_eq!(fs::read_dir(&dirs.checkpoint_root).unwrap().count(), 0);

        // Load into an empty region on a fresh engine.
        let target_engine = Arc::new(MemEngine::new());
        let target_region = new_region(
            1,
            RegionEpoch::new(1, 5),
            Range::new(vec![0x01], vec![0x03]),
        );
        let loader = RaftSnapshot::new(target_engine.clone(), &dirs.checkpoint_root);
        loader
            .load_snapshot(&DirSnapshotReader::open(&dirs.snapshot_dir), &target_region)
            .unwrap();

        assert_eq!(
            target_engine.get(CF_DEFAULT, b"\x01").unwrap(),
            Some(b"a".to_vec())
        );
        assert_eq!(
            target_engine.get(CF_DEFAULT, b"\x02").unwrap(),
            Some(b"b".to_vec())
        );
        // The out-of-range key was not captured.
        assert_eq!(target_engine.get(CF_DEFAULT, b"\x09").unwrap(), None);
        assert_eq!(target_engine.len(CF_DEFAULT), 2);
    }

    #[test]
    fn test_scan_save_empty_region_is_meta_only() {
        let dirs = test_dirs();
        let engine = Arc::new(MemEngine::new());
        let region = new_region(
            2,
            RegionEpoch::new(1, 1),
            Range::new(vec![0x01], vec![0x03]),
        );

        let snapshot = RaftSnapshot::with_read_view(engine.clone(), &dirs.checkpoint_root);
        let mut writer = DirSnapshotWriter::create(&dirs.snapshot_dir).unwrap();
        snapshot
            .save_snapshot(&mut writer, &region, SnapshotStrategy::Scan, None, None)
            .unwrap();
        assert_eq!(writer.list_files(), vec!["region_meta".to_string()]);

        // Loading a meta-only snapshot succeeds with an empty region.
        let target_engine = engine_with(&[(b"\x02", b"stale")]);
        let target_region = new_region(
            2,
            RegionEpoch::new(1, 1),
            Range::new(vec![0x01], vec![0x03]),
        );
        RaftSnapshot::new(target_engine.clone(), &dirs.checkpoint_root)
            .load_snapshot(&DirSnapshotReader::open(&dirs.snapshot_dir), &target_region)
            .unwrap();
        assert_eq!(target_engine.len(CF_DEFAULT), 0);
    }

    #[test]
    fn test_checkpoint_save_and_load_roundtrip() {
        let dirs = test_dirs();
        let engine = engine_with(&[(b"\x01", b"a"), (b"\x04", b"d"), (b"\x09", b"out")]);
        let region = new_region(
            3,
            RegionEpoch::new(2, 7),
            Range::new(vec![0x01], vec![0x05]),
        );

        let snapshot = RaftSnapshot::new(engine.clone(), &dirs.checkpoint_root);
        let mut writer = DirSnapshotWriter::create(&dirs.snapshot_dir).unwrap();
        snapshot
            .save_snapshot(
                &mut writer,
                &region,
                SnapshotStrategy::Checkpoint,
                None,
                None,
            )
            .unwrap();

        // The always-retained CURRENT marker is linked alongside the ssts,
        // which is how the loader recognizes the checkpoint strategy.
        assert!(dirs.snapshot_dir.join("CURRENT").exists());
        assert!(writer.list_files().contains(&"region_meta".to_string()));

        let target_engine = Arc::new(MemEngine::new());
        let target_region = new_region(
            3,
            RegionEpoch::new(2, 7),
            Range::new(vec![0x01], vec![0x05]),
        );
        RaftSnapshot::new(target_engine.clone(), &dirs.checkpoint_root)
            .load_snapshot(&DirSnapshotReader::open(&dirs.snapshot_dir), &target_region)
            .unwrap();

        assert_eq!(
            target_engine.get(CF_DEFAULT, b"\x01").unwrap(),
            Some(b"a".to_vec())
        );
        assert_eq!(
            target_engine.get(CF_DEFAULT, b"\x04").unwrap(),
            Some(b"d".to_vec())
        );
        // Out-of-range data from the whole-engine checkpoint is excluded
        // by the per-range merge.
        assert_eq!(target_engine.get(CF_DEFAULT, b"\x09").unwrap(), None);
    }

    #[test]
    fn test_filter_sst_files_by_overlap() {
        let file = |level: i32, start: u8, end: u8| SstFileInfo {
            level,
            name: format!("{}_{}.sst", start, end),
            path: PathBuf::from("/nonexistent"),
            start_key: vec![start],
            end_key: vec![end],
        };
        let region_ranges = vec![Range::new(vec![0x03], vec![0x05])];

        let kept = filter_sst_files(
            vec![
                file(0, 0x00, 0x10), // spans the region: kept
                file(0, 0x00, 0x02), // left of the region: dropped
                file(0, 0x05, 0x08), // starts at exclusive end: dropped
                file(0, 0x04, 0x06), // overlaps: kept
                file(-1, 0x70, 0x80), // always retained
            ],
            &region_ranges,
        );
        let names: Vec<&str> = kept.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["0_16.sst", "4_6.sst", "112_128.sst"]);
        assert!(kept.iter().all(|f| f.level == -1
            || f.range().intersects(&region_ranges[0])));
    }

    #[test]
    fn test_load_stale_version_rejected_and_data_untouched() {
        let dirs = test_dirs();
        let engine = engine_with(&[(b"\x01", b"a")]);
        let source_region = new_region(
            4,
            RegionEpoch::new(1, 7),
            Range::new(vec![0x01], vec![0x03]),
        );
        RaftSnapshot::with_read_view(engine.clone(), &dirs.checkpoint_root)
            .save_snapshot(
                &mut DirSnapshotWriter::create(&dirs.snapshot_dir).unwrap(),
                &source_region,
                SnapshotStrategy::Scan,
                None,
                None,
            )
            .unwrap();

        // The target region has already advanced to version 9.
        let target_engine = engine_with(&[(b"\x02", b"keep")]);
        let target_region = new_region(
            4,
            RegionEpoch::new(1, 9),
            Range::new(vec![0x01], vec![0x03]),
        );
        let err = RaftSnapshot::new(target_engine.clone(), &dirs.checkpoint_root)
            .load_snapshot(&DirSnapshotReader::open(&dirs.snapshot_dir), &target_region)
            .unwrap_err();
        assert_eq!(err.code(), basalt_core::ErrorCode::RegionVersion);
        // Data was not deleted.
        assert_eq!(
            target_engine.get(CF_DEFAULT, b"\x02").unwrap(),
            Some(b"keep".to_vec())
        );
        assert_eq!(target_region.epoch().version, 9);
    }

    #[test]
    fn test_load_newer_version_upgrades_region() {
        let dirs = test_dirs();
        let engine = engine_with(&[(b"\x01", b"a")]);
        let source_region = new_region(
            5,
            RegionEpoch::new(1, 9),
            Range::new(vec![0x01], vec![0x04]),
        );
        RaftSnapshot::with_read_view(engine.clone(), &dirs.checkpoint_root)
            .save_snapshot(
                &mut DirSnapshotWriter::create(&dirs.snapshot_dir).unwrap(),
                &source_region,
                SnapshotStrategy::Scan,
                None,
                None,
            )
            .unwrap();

        let target_engine = Arc::new(MemEngine::new());
        let target_region = new_region(
            5,
            RegionEpoch::new(1, 3),
            Range::new(vec![0x01], vec![0x02]),
        );
        RaftSnapshot::new(target_engine, &dirs.checkpoint_root)
            .load_snapshot(&DirSnapshotReader::open(&dirs.snapshot_dir), &target_region)
            .unwrap();

        assert_eq!(target_region.epoch().version, 9);
        assert_eq!(target_region.raw_range(), Range::new(vec![0x01], vec![0x04]));
    }

    #[test]
    fn test_load_missing_meta_fails() {
        let dirs = test_dirs();
        fs::create_dir_all(&dirs.snapshot_dir).unwrap();
        let engine = Arc::new(MemEngine::new());
        let region = new_region(
            6,
            RegionEpoch::new(1, 1),
            Range::new(vec![0x01], vec![0x03]),
        );
        let err = RaftSnapshot::new(engine, &dirs.checkpoint_root)
            .load_snapshot(&DirSnapshotReader::open(&dirs.snapshot_dir), &region)
            .unwrap_err();
        assert!(err.to_string().contains("not exist"));
    }

    #[test]
    fn test_save_invalid_range_rejected() {
        let dirs = test_dirs();
        let engine = Arc::new(MemEngine::new());
        let region = Region::new(
            7,
            RegionType::Store,
            RegionEpoch::new(1, 1),
            Range::default(),
            vec![],
        );
        let err = RaftSnapshot::new(engine, &dirs.checkpoint_root)
            .save_snapshot(
                &mut DirSnapshotWriter::create(&dirs.snapshot_dir).unwrap(),
                &region,
                SnapshotStrategy::Scan,
                None,
                None,
            )
            .unwrap_err();
        assert_eq!(err.code(), basalt_core::ErrorCode::RangeInvalid);
    }

    #[test]
    fn test_canceled_scan_cleans_up() {
        let dirs = test_dirs();
        let engine = engine_with(&[(b"\x01", b"a")]);
        let region = new_region(
            8,
            RegionEpoch::new(1, 1),
            Range::new(vec![0x01], vec![0x03]),
        );

        let token = CancellationToken::new();
        token.cancel();
        let err = RaftSnapshot::with_read_view(engine, &dirs.checkpoint_root)
            .save_snapshot(
                &mut DirSnapshotWriter::create(&dirs.snapshot_dir).unwrap(),
                &region,
                SnapshotStrategy::Scan,
                Some(&token),
                None,
            )
            .unwrap_err();
        assert_eq!(err.code(), basalt_core::ErrorCode::Canceled);
        // No leftover temp checkpoint directory.
        assert_eq!(fs::read_dir(&dirs.checkpoint_root).unwrap().count(), 0);
    }

    #[test]
    fn test_snapshot_wins_when_ingest_fails() {
        let dirs = test_dirs();
        let engine = engine_with(&[(b"\x01", b"a")]);
        let source_region = new_region(
            9,
            RegionEpoch::new(1, 2),
            Range::new(vec![0x01], vec![0x03]),
        );
        RaftSnapshot::with_read_view(engine, &dirs.checkpoint_root)
            .save_snapshot(
                &mut DirSnapshotWriter::create(&dirs.snapshot_dir).unwrap(),
                &source_region,
                SnapshotStrategy::Scan,
                None,
                None,
            )
            .unwrap();

        // Corrupt the sst so ingest fails after the delete phase.
        let sst_path = dirs.snapshot_dir.join("9.sst");
        let mut data = fs::read(&sst_path).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0xFF;
        fs::write(&sst_path, data).unwrap();

        let target_engine = engine_with(&[(b"\x02", b"old")]);
        let target_region = new_region(
            9,
            RegionEpoch::new(1, 2),
            Range::new(vec![0x01], vec![0x03]),
        );
        let err = RaftSnapshot::new(target_engine.clone(), &dirs.checkpoint_root)
            .load_snapshot(&DirSnapshotReader::open(&dirs.snapshot_dir), &target_region)
            .unwrap_err();
        assert_eq!(err.code(), basalt_core::ErrorCode::Internal);
        // The pre-delete is not rolled back: the region is left empty.
        assert_eq!(target_engine.len(CF_DEFAULT), 0);
    }

    #[test]
    fn test_load_suspend_failpoint_runs_between_merge_and_ingest() {
        use std::sync::atomic::{AtomicBool, Ordering};
        static SUSPENDED: AtomicBool = AtomicBool::new(false);

        let dirs = test_dirs();
        let engine = engine_with(&[(b"\x01", b"a")]);
        let region = new_region(
            10,
            RegionEpoch::new(1, 2),
            Range::new(vec![0x01], vec![0x03]),
        );
        RaftSnapshot::with_read_view(engine, &dirs.checkpoint_root)
            .save_snapshot(
                &mut DirSnapshotWriter::create(&dirs.snapshot_dir).unwrap(),
                &region,
                SnapshotStrategy::Scan,
                None,
                None,
            )
            .unwrap();

        failpoint::set_hook("load_snapshot_suspend", || {
            SUSPENDED.store(true, Ordering::SeqCst);
        });
        let target_engine = Arc::new(MemEngine::new());
        let target_region = new_region(
            10,
            RegionEpoch::new(1, 2),
            Range::new(vec![0x01], vec![0x03]),
        );
        RaftSnapshot::new(target_engine, &dirs.checkpoint_root)
            .load_snapshot(&DirSnapshotReader::open(&dirs.snapshot_dir), &target_region)
            .unwrap();
        failpoint::remove_hook("load_snapshot_suspend");
        assert!(SUSPENDED.load(Ordering::SeqCst));
    }

    #[test]
    fn test_merge_temp_files_removed_after_checkpoint_load() {
        let dirs = test_dirs();
        let engine = engine_with(&[(b"\x01", b"a"), (b"\x02", b"b")]);
        let region = new_region(
            11,
            RegionEpoch::new(1, 2),
            Range::new(vec![0x01], vec![0x05]),
        );
        RaftSnapshot::new(engine, &dirs.checkpoint_root)
            .save_snapshot(
                &mut DirSnapshotWriter::create(&dirs.snapshot_dir).unwrap(),
                &region,
                SnapshotStrategy::Checkpoint,
                None,
                None,
            )
            .unwrap();

        let target_engine = Arc::new(MemEngine::new());
        let target_region = new_region(
            11,
            RegionEpoch::new(1, 2),
            Range::new(vec![0x01], vec![0x05]),
        );
        RaftSnapshot::new(target_engine.clone(), &dirs.checkpoint_root)
            .load_snapshot(&DirSnapshotReader::open(&dirs.snapshot_dir), &target_region)
            .unwrap();

        assert_eq!(target_engine.len(CF_DEFAULT), 2);
        let leftover: Vec<String> = fs::read_dir(&dirs.snapshot_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| n.starts_with("merge_"))
            .collect();
        assert!(leftover.is_empty(), "merge temp files left: {:?}", leftover);
    }
}

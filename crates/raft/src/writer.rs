//! Snapshot writer/reader seam.
//!
//! The raft transport hands the pipeline a writer when producing a
//! snapshot and a reader when applying one. The pipeline only relies on
//! this narrow interface; the directory-backed implementations below are
//! what the transport (and every test) uses.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use basalt_core::{Error, Result};

/// Sink for the files of a snapshot under production.
pub trait SnapshotWriter: Send {
    /// Directory the snapshot files are placed in.
    fn path(&self) -> &Path;

    /// Register a file already present under `path()`.
    fn add_file(&mut self, name: &str) -> Result<()>;

    /// Register a file together with an opaque metadata blob that travels
    /// with it (the serialized sst descriptor used for range routing at
    /// load time).
    fn add_file_with_meta(&mut self, name: &str, meta: Vec<u8>) -> Result<()>;

    fn list_files(&self) -> Vec<String>;
}

/// Source for the files of a received snapshot.
pub trait SnapshotReader: Send {
    fn path(&self) -> &Path;

    fn list_files(&self) -> Vec<String>;
}

/// Writer backed by a plain directory.
pub struct DirSnapshotWriter {
    dir: PathBuf,
    files: BTreeMap<String, Option<Vec<u8>>>,
}

impl DirSnapshotWriter {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(DirSnapshotWriter {
            dir,
            files: BTreeMap::new(),
        })
    }

    /// The metadata blob registered with a file, if any.
    pub fn file_meta(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name)?.as_deref()
    }
}

impl SnapshotWriter for DirSnapshotWriter {
    fn path(&self) -> &Path {
        &self.dir
    }

    fn add_file(&mut self, name: &str) -> Result<()> {
        if !self.dir.join(name).exists() {
            return Err(Error::internal(format!(
                "snapshot file {} not present under {}",
                name,
                self.dir.display()
            )));
        }
        self.files.insert(name.to_string(), None);
        Ok(())
    }

    fn add_file_with_meta(&mut self, name: &str, meta: Vec<u8>) -> Result<()> {
        if !self.dir.join(name).exists() {
            return Err(Error::internal(format!(
                "snapshot file {} not present under {}",
                name,
                self.dir.display()
            )));
        }
        self.files.insert(name.to_string(), Some(meta));
        Ok(())
    }

    fn list_files(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}

/// Reader backed by a plain directory; lists whatever is on disk.
pub struct DirSnapshotReader {
    dir: PathBuf,
}

impl DirSnapshotReader {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        DirSnapshotReader { dir: dir.into() }
    }
}

impl SnapshotReader for DirSnapshotReader {
    fn path(&self) -> &Path {
        &self.dir
    }

    fn list_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_file())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

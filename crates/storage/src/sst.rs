//! Transportable sst files.
//!
//! Snapshots move region data between nodes as self-contained sorted
//! files. The format is deliberately simple; these files exist to be
//! written once, shipped, verified and ingested.
//!
//! # Binary Format
//!
//! ```text
//! magic("BSST", 4) + version(u32 BE) + entry_count(u64 BE)
//! + [key_len(u32 BE) + val_len(u32 BE) + key + val]*
//! + crc32(u32 BE, over everything before it)
//! ```
//!
//! Entries are sorted ascending by key. An empty file is never written:
//! the writer reports [`Error::NoEntries`] instead and leaves nothing on
//! disk.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use basalt_core::{Error, Result};

pub const SST_MAGIC: &[u8; 4] = b"BSST";
pub const SST_FORMAT_VERSION: u32 = 1;

/// Streams sorted entries into an sst file.
///
/// The file is written to a `.tmp` sibling and renamed into place so a
/// crashed writer never leaves a half-written sst behind.
pub struct SstFileWriter {
    path: PathBuf,
}

impl SstFileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SstFileWriter { path: path.into() }
    }

    /// Write every entry the iterator yields; returns the entry count.
    ///
    /// An empty iterator is reported as [`Error::NoEntries`] with no file
    /// created.
    pub fn save_from_iter(
        &self,
        entries: impl Iterator<Item = (Vec<u8>, Vec<u8>)>,
    ) -> Result<u64> {
        let mut entries = entries.peekable();
        if entries.peek().is_none() {
            return Err(Error::NoEntries);
        }

        let mut buf4 = [0u8; 4];
        let mut count: u64 = 0;
        let mut body = Vec::new();
        for (key, value) in entries {
            BigEndian::write_u32(&mut buf4, key.len() as u32);
            body.extend_from_slice(&buf4);
            BigEndian::write_u32(&mut buf4, value.len() as u32);
            body.extend_from_slice(&buf4);
            body.extend_from_slice(&key);
            body.extend_from_slice(&value);
            count += 1;
        }

        let mut header = Vec::with_capacity(16);
        header.extend_from_slice(SST_MAGIC);
        BigEndian::write_u32(&mut buf4, SST_FORMAT_VERSION);
        header.extend_from_slice(&buf4);
        let mut buf8 = [0u8; 8];
        BigEndian::write_u64(&mut buf8, count);
        header.extend_from_slice(&buf8);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header);
        hasher.update(&body);
        BigEndian::write_u32(&mut buf4, hasher.finalize());

        let temp_path = self.path.with_extension("sst.tmp");
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&header)?;
        writer.write_all(&body)?;
        writer.write_all(&buf4)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| {
            Error::internal(format!("flush sst file {}: {}", temp_path.display(), e))
        })?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        Ok(count)
    }
}

/// Read and verify an entire sst file.
pub fn read_sst_file(path: &Path) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut data = Vec::new();
    File::open(path)
        .map_err(|e| Error::internal(format!("open sst file {}: {}", path.display(), e)))?
        .read_to_end(&mut data)?;

    if data.len() < 20 || &data[0..4] != SST_MAGIC {
        return Err(Error::internal(format!(
            "bad sst magic in {}",
            path.display()
        )));
    }
    let version = BigEndian::read_u32(&data[4..8]);
    if version != SST_FORMAT_VERSION {
        return Err(Error::internal(format!(
            "unsupported sst format version {} in {}",
            version,
            path.display()
        )));
    }

    let payload_end = data.len() - 4;
    let stored_crc = BigEndian::read_u32(&data[payload_end..]);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[..payload_end]);
    if hasher.finalize() != stored_crc {
        return Err(Error::internal(format!(
            "sst checksum mismatch in {}",
            path.display()
        )));
    }

    let count = BigEndian::read_u64(&data[8..16]);
    let mut entries = Vec::with_capacity(count as usize);
    let mut pos = 16usize;
    for _ in 0..count {
        if pos + 8 > payload_end {
            return Err(Error::internal(format!(
                "truncated sst entry in {}",
                path.display()
            )));
        }
        let klen = BigEndian::read_u32(&data[pos..pos + 4]) as usize;
        let vlen = BigEndian::read_u32(&data[pos + 4..pos + 8]) as usize;
        pos += 8;
        if pos + klen + vlen > payload_end {
            return Err(Error::internal(format!(
                "truncated sst entry in {}",
                path.display()
            )));
        }
        let key = data[pos..pos + klen].to_vec();
        pos += klen;
        let value = data[pos..pos + vlen].to_vec();
        pos += vlen;
        entries.push((key, value));
    }

    Ok(entries)
}

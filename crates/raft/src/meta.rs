//! The `region_meta` snapshot file.
//!
//! Every snapshot directory starts with a `region_meta` file recording the
//! epoch and raw range the snapshot was taken at. The load path parses it
//! before touching any data: a stale snapshot is rejected on this file
//! alone, a newer one upgrades the region's range and epoch.
//!
//! # Binary Format
//!
//! ```text
//! magic("BRSM", 4) + version(u32 BE) + conf_version(u64 BE)
//! + epoch_version(u64 BE) + start_len(u32 BE) + start_key
//! + end_len(u32 BE) + end_key + crc32(u32 BE)
//! ```

use std::fs;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};

use basalt_core::region::RegionEpoch;
use basalt_core::{Error, Range, Result};

pub const REGION_META_FILE_NAME: &str = "region_meta";

pub const REGION_META_MAGIC: &[u8; 4] = b"BRSM";
pub const REGION_META_VERSION: u32 = 1;

/// Epoch and range of the region at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaftSnapshotRegionMeta {
    pub epoch: RegionEpoch,
    pub range: Range,
}

impl RaftSnapshotRegionMeta {
    pub fn new(epoch: RegionEpoch, range: Range) -> Self {
        RaftSnapshotRegionMeta { epoch, range }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            4 + 4 + 8 + 8 + 4 + self.range.start_key.len() + 4 + self.range.end_key.len() + 4,
        );
        buf.extend_from_slice(REGION_META_MAGIC);

        let mut b4 = [0u8; 4];
        let mut b8 = [0u8; 8];
        BigEndian::write_u32(&mut b4, REGION_META_VERSION);
        buf.extend_from_slice(&b4);
        BigEndian::write_u64(&mut b8, self.epoch.conf_version);
        buf.extend_from_slice(&b8);
        BigEndian::write_u64(&mut b8, self.epoch.version);
        buf.extend_from_slice(&b8);
        BigEndian::write_u32(&mut b4, self.range.start_key.len() as u32);
        buf.extend_from_slice(&b4);
        buf.extend_from_slice(&self.range.start_key);
        BigEndian::write_u32(&mut b4, self.range.end_key.len() as u32);
        buf.extend_from_slice(&b4);
        buf.extend_from_slice(&self.range.end_key);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf);
        BigEndian::write_u32(&mut b4, hasher.finalize());
        buf.extend_from_slice(&b4);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 36 || &data[0..4] != REGION_META_MAGIC {
            return Err(Error::internal("bad region meta magic"));
        }
        let version = BigEndian::read_u32(&data[4..8]);
        if version != REGION_META_VERSION {
            return Err(Error::internal(format!(
                "unsupported region meta version {}",
                version
            )));
        }

        let payload_end = data.len() - 4;
        let stored_crc = BigEndian::read_u32(&data[payload_end..]);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data[..payload_end]);
        if hasher.finalize() != stored_crc {
            return Err(Error::internal("region meta checksum mismatch"));
        }

        let conf_version = BigEndian::read_u64(&data[8..16]);
        let epoch_version = BigEndian::read_u64(&data[16..24]);

        let mut pos = 24usize;
        let read_key = |pos: &mut usize| -> Result<Vec<u8>> {
            if *pos + 4 > payload_end {
                return Err(Error::internal("truncated region meta"));
            }
            let len = BigEndian::read_u32(&data[*pos..*pos + 4]) as usize;
            *pos += 4;
            if *pos + len > payload_end {
                return Err(Error::internal("truncated region meta"));
            }
            let key = data[*pos..*pos + len].to_vec();
            *pos += len;
            Ok(key)
        };
        let start_key = read_key(&mut pos)?;
        let end_key = read_key(&mut pos)?;

        Ok(RaftSnapshotRegionMeta {
            epoch: RegionEpoch::new(conf_version, epoch_version),
            range: Range::new(start_key, end_key),
        })
    }

    /// Write the `region_meta` file into a snapshot directory.
    pub fn write_to_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(REGION_META_FILE_NAME), self.to_bytes())?;
        Ok(())
    }

    /// Parse the `region_meta` file from a snapshot directory.
    pub fn parse_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(REGION_META_FILE_NAME);
        if !path.exists() {
            return Err(Error::internal(format!(
                "region meta file not exist, filepath: {}",
                path.display()
            )));
        }
        let data = fs::read(&path)?;
        Self::from_bytes(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RaftSnapshotRegionMeta {
        RaftSnapshotRegionMeta::new(
            RegionEpoch::new(3, 11),
            Range::new(vec![0x01, 0x02], vec![0x03]),
        )
    }

    #[test]
    fn test_bytes_roundtrip() {
        let meta = sample();
        let parsed = RaftSnapshotRegionMeta::from_bytes(&meta.to_bytes()).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_bytes_are_stable() {
        // The wire form is a contract; lock the prefix down.
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[0..4], b"BRSM");
        assert_eq!(BigEndian::read_u32(&bytes[4..8]), 1);
        assert_eq!(BigEndian::read_u64(&bytes[8..16]), 3);
        assert_eq!(BigEndian::read_u64(&bytes[16..24]), 11);
    }

    #[test]
    fn test_dir_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let meta = sample();
        meta.write_to_dir(dir.path()).unwrap();
        let parsed = RaftSnapshotRegionMeta::parse_from_dir(dir.path()).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RaftSnapshotRegionMeta::parse_from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not exist"));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        sample().write_to_dir(dir.path()).unwrap();
        let path = dir.path().join(REGION_META_FILE_NAME);
        let mut data = fs::read(&path).unwrap();
        let last = data.len() - 6;
        data[last] ^= 0x01;
        fs::write(&path, data).unwrap();
        assert!(RaftSnapshotRegionMeta::parse_from_dir(dir.path()).is_err());
    }

    #[test]
    fn test_empty_keys_roundtrip() {
        let meta = RaftSnapshotRegionMeta::new(RegionEpoch::default(), Range::default());
        let parsed = RaftSnapshotRegionMeta::from_bytes(&meta.to_bytes()).unwrap();
        assert_eq!(parsed, meta);
    }
}

//! Node configuration.
//!
//! Raw values deserialize from TOML into [`NodeConfig`]; consumers go
//! through [`ConfigHelper`], which applies defaults, floors and range
//! clamps. An out-of-range value never fails startup — it falls back to the
//! default with a warning.

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

pub const DEFAULT_SNAPSHOT_POLICY: &str = "checkpoint";
pub const DEFAULT_ELECTION_TIMEOUT_S: u32 = 7;
pub const DEFAULT_SPLIT_STRATEGY: SplitStrategy = SplitStrategy::PreCreateRegion;
pub const DEFAULT_REGION_MAX_SIZE: u64 = 67_108_864; // 64 MiB
pub const DEFAULT_SPLIT_POLICY: &str = "HALF";
pub const DEFAULT_SPLIT_CHUNK_SIZE: u64 = 1_048_576; // 1 MiB
pub const DEFAULT_SPLIT_SIZE_RATIO: f64 = 0.5;
pub const DEFAULT_SPLIT_KEYS_NUMBER: u64 = 100_000;
pub const DEFAULT_SPLIT_KEYS_RATIO: f64 = 0.5;

/// Snapshot generation policy for the raft pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicy {
    /// Hard-link an engine checkpoint; cheap, runs on the calling thread.
    Checkpoint,
    /// Scan the region range into a fresh sst; runs on a background worker.
    Scan,
}

/// How a split creates the new region relative to applying the split log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStrategy {
    PreCreateRegion,
    PostCreateRegion,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RaftSection {
    pub snapshot_policy: Option<String>,
    pub election_timeout_s: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegionSection {
    pub split_strategy: Option<String>,
    pub region_max_size: Option<i64>,
    pub split_policy: Option<String>,
    pub split_chunk_size: Option<i64>,
    pub split_size_ratio: Option<f64>,
    pub split_keys_number: Option<i64>,
    pub split_keys_ratio: Option<f64>,
}

/// Raw node configuration as written in the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub raft: RaftSection,
    #[serde(default)]
    pub region: RegionSection,
}

impl NodeConfig {
    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::illegal_parameters(format!("parse config: {}", e)))
    }
}

/// Typed accessors with defaults and clamping.
#[derive(Debug, Clone, Default)]
pub struct ConfigHelper {
    config: NodeConfig,
}

impl ConfigHelper {
    pub fn new(config: NodeConfig) -> Self {
        ConfigHelper { config }
    }

    pub fn snapshot_policy(&self) -> SnapshotPolicy {
        match self.config.raft.snapshot_policy.as_deref() {
            Some("scan") => SnapshotPolicy::Scan,
            Some("checkpoint") | None => SnapshotPolicy::Checkpoint,
            Some(other) => {
                warn!(
                    value = other,
                    default = DEFAULT_SNAPSHOT_POLICY,
                    "unknown raft.snapshot_policy, set default value"
                );
                SnapshotPolicy::Checkpoint
            }
        }
    }

    pub fn election_timeout_s(&self) -> u32 {
        match self.config.raft.election_timeout_s {
            Some(v) if v > 0 => v as u32,
            Some(_) => {
                warn!(
                    default = DEFAULT_ELECTION_TIMEOUT_S,
                    "raft.election_timeout_s is too small, set default value"
                );
                DEFAULT_ELECTION_TIMEOUT_S
            }
            None => DEFAULT_ELECTION_TIMEOUT_S,
        }
    }

    pub fn split_strategy(&self) -> SplitStrategy {
        match self.config.region.split_strategy.as_deref() {
            Some("POST_CREATE_REGION") => SplitStrategy::PostCreateRegion,
            Some("PRE_CREATE_REGION") | None => SplitStrategy::PreCreateRegion,
            Some(other) => {
                warn!(
                    value = other,
                    "unknown region.split_strategy, set default value"
                );
                DEFAULT_SPLIT_STRATEGY
            }
        }
    }

    pub fn region_max_size(&self) -> u64 {
        self.floored_u64(
            self.config.region.region_max_size,
            DEFAULT_REGION_MAX_SIZE,
            "region.region_max_size",
        )
    }

    pub fn split_policy(&self) -> String {
        match self.config.region.split_policy.as_deref() {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => DEFAULT_SPLIT_POLICY.to_string(),
        }
    }

    pub fn split_chunk_size(&self) -> u64 {
        self.floored_u64(
            self.config.region.split_chunk_size,
            DEFAULT_SPLIT_CHUNK_SIZE,
            "region.split_chunk_size",
        )
    }

    pub fn split_size_ratio(&self) -> f64 {
        self.clamped_ratio(
            self.config.region.split_size_ratio,
            DEFAULT_SPLIT_SIZE_RATIO,
            "region.split_size_ratio",
        )
    }

    pub fn split_keys_number(&self) -> u64 {
        self.floored_u64(
            self.config.region.split_keys_number,
            DEFAULT_SPLIT_KEYS_NUMBER,
            "region.split_keys_number",
        )
    }

    pub fn split_keys_ratio(&self) -> f64 {
        self.clamped_ratio(
            self.config.region.split_keys_ratio,
            DEFAULT_SPLIT_KEYS_RATIO,
            "region.split_keys_ratio",
        )
    }

    /// Values below the compiled-in floor are clamped up to the default.
    fn floored_u64(&self, value: Option<i64>, floor: u64, key: &str) -> u64 {
        match value {
            Some(v) if v >= floor as i64 => v as u64,
            Some(_) => {
                warn!(key, default = floor, "value is too small, set default value");
                floor
            }
            None => floor,
        }
    }

    /// Ratios are only meaningful in [0.1, 0.9].
    fn clamped_ratio(&self, value: Option<f64>, default: f64, key: &str) -> f64 {
        match value {
            Some(v) if (0.1..=0.9).contains(&v) => v,
            Some(_) => {
                warn!(key, default, "value out of range, set default value");
                default
            }
            None => default,
        }
    }
}

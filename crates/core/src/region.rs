//! In-memory region metadata.
//!
//! A [`Region`] is a key-range shard with its own raft group. The metadata
//! here is what request validation and the snapshot pipeline consult: the
//! epoch, the raw key range, the peer set and the lifecycle state.
//!
//! Mutation goes through a narrow contract: the epoch only moves forward
//! ([`Region::update_epoch_version`] rejects regressions) and state changes
//! must follow the transition diagram enforced by
//! [`RegionState::can_transition_to`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::codec;
use crate::error::{Error, Result};
use crate::range::Range;

/// `(conf_version, version)` pair.
///
/// `conf_version` counts membership changes; `version` counts splits and
/// merges. Both are monotone non-decreasing over the life of a region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEpoch {
    pub conf_version: u64,
    pub version: u64,
}

impl RegionEpoch {
    pub fn new(conf_version: u64, version: u64) -> Self {
        RegionEpoch {
            conf_version,
            version,
        }
    }
}

impl std::fmt::Display for RegionEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.conf_version, self.version)
    }
}

/// Region lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionState {
    New,
    Standby,
    Normal,
    Splitting,
    Merging,
    Deleting,
    Deleted,
    Orphan,
    Tombstone,
}

impl RegionState {
    /// Transition diagram:
    /// `NEW -> STANDBY -> NORMAL`, `NORMAL -> {SPLITTING, MERGING, DELETING}`,
    /// split/merge return to NORMAL, `DELETING -> DELETED -> TOMBSTONE`.
    /// ORPHAN is reachable from any state by coordinator command.
    pub fn can_transition_to(self, next: RegionState) -> bool {
        use RegionState::*;
        if next == Orphan {
            return true;
        }
        matches!(
            (self, next),
            (New, Standby)
                | (Standby, Normal)
                | (Normal, Splitting)
                | (Normal, Merging)
                | (Normal, Deleting)
                | (Splitting, Normal)
                | (Merging, Normal)
                | (Deleting, Deleted)
                | (Deleted, Tombstone)
        )
    }

    /// Only NORMAL (and the transient split/merge states on top of it)
    /// serves reads and writes.
    pub fn is_serving(self) -> bool {
        matches!(
            self,
            RegionState::Normal | RegionState::Splitting | RegionState::Merging
        )
    }
}

impl std::fmt::Display for RegionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RegionState::New => "new",
            RegionState::Standby => "standby",
            RegionState::Normal => "normal",
            RegionState::Splitting => "splitting",
            RegionState::Merging => "merging",
            RegionState::Deleting => "deleting",
            RegionState::Deleted => "deleted",
            RegionState::Orphan => "orphan",
            RegionState::Tombstone => "tombstone",
        };
        f.write_str(s)
    }
}

/// Whether the region stores plain data or a vector index partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionType {
    Store,
    Index,
}

/// A raft peer address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub store_id: u64,
    pub addr: String,
}

struct RegionInner {
    epoch: RegionEpoch,
    raw_range: Range,
    peers: Vec<Peer>,
    state: RegionState,
}

/// Shared, interior-mutable region metadata.
///
/// Handed around as `Arc<Region>`; background tasks hold `Weak<Region>`
/// and drop their work when the region is gone.
pub struct Region {
    id: u64,
    region_type: RegionType,
    inner: RwLock<RegionInner>,
}

impl Region {
    pub fn new(
        id: u64,
        region_type: RegionType,
        epoch: RegionEpoch,
        raw_range: Range,
        peers: Vec<Peer>,
    ) -> Self {
        Region {
            id,
            region_type,
            inner: RwLock::new(RegionInner {
                epoch,
                raw_range,
                peers,
                state: RegionState::New,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn region_type(&self) -> RegionType {
        self.region_type
    }

    pub fn epoch(&self) -> RegionEpoch {
        self.inner.read().epoch
    }

    pub fn raw_range(&self) -> Range {
        self.inner.read().raw_range.clone()
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.inner.read().peers.clone()
    }

    pub fn state(&self) -> RegionState {
        self.inner.read().state
    }

    /// All physical column-family ranges covered by this region: the raw
    /// data range, plus the scalar sidecar range for index regions.
    pub fn physics_range(&self) -> Vec<Range> {
        let raw = self.raw_range();
        match self.region_type {
            RegionType::Store => vec![raw],
            RegionType::Index => {
                let scalar = codec::scalar_range(&raw);
                vec![raw, scalar]
            }
        }
    }

    /// Replace the raw range. Used when a loaded snapshot carries a newer
    /// epoch, and by split/merge.
    pub fn set_raw_range(&self, range: Range) {
        self.inner.write().raw_range = range;
    }

    /// Advance `epoch.version`; regressions are rejected.
    pub fn update_epoch_version(&self, version: u64) -> Result<()> {
        let mut inner = self.inner.write();
        if version < inner.epoch.version {
            return Err(Error::illegal_parameters(format!(
                "region {} epoch version regress: {} -> {}",
                self.id, inner.epoch.version, version
            )));
        }
        if version > inner.epoch.version {
            info!(
                region_id = self.id,
                from = inner.epoch.version,
                to = version,
                "update region epoch version"
            );
            inner.epoch.version = version;
        }
        Ok(())
    }

    /// Advance `epoch.conf_version` together with a peer change.
    pub fn update_peers(&self, conf_version: u64, peers: Vec<Peer>) -> Result<()> {
        let mut inner = self.inner.write();
        if conf_version < inner.epoch.conf_version {
            return Err(Error::illegal_parameters(format!(
                "region {} epoch conf_version regress: {} -> {}",
                self.id, inner.epoch.conf_version, conf_version
            )));
        }
        inner.epoch.conf_version = conf_version;
        inner.peers = peers;
        Ok(())
    }

    /// Apply a state transition, enforcing the lifecycle diagram.
    ///
    /// A region may not become NORMAL without a valid range.
    pub fn set_state(&self, next: RegionState) -> Result<()> {
        let mut inner = self.inner.write();
        if !inner.state.can_transition_to(next) {
            return Err(Error::illegal_parameters(format!(
                "region {} invalid state transition {} -> {}",
                self.id, inner.state, next
            )));
        }
        if next == RegionState::Normal && !inner.raw_range.is_valid() {
            return Err(Error::range_invalid(format!(
                "region {} range {} is invalid for serving",
                self.id,
                inner.raw_range.to_hex_string()
            )));
        }
        info!(region_id = self.id, from = %inner.state, to = %next, "region state transition");
        inner.state = next;
        Ok(())
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Region")
            .field("id", &self.id)
            .field("type", &self.region_type)
            .field("epoch", &inner.epoch)
            .field("range", &inner.raw_range.to_hex_string())
            .field("state", &inner.state)
            .finish()
    }
}

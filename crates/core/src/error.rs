//! Error types for the Basalt region engine.
//!
//! One unified [`Error`] enum is used across all crates. Every variant maps
//! to a stable wire code (see [`ErrorCode`]) so services can return the
//! numeric form while logs keep the human-readable message.
//!
//! ## Categories
//!
//! - **Validation**: bad request parameters (`IllegalParameters`,
//!   `RangeInvalid`, `KeyOutOfRange`, `VectorInvalid`) — returned verbatim,
//!   never retried.
//! - **Region**: metadata gating (`RegionNotFound`, `RegionUnavailable`,
//!   `RegionVersion`) — `RegionUnavailable` carries whether a retry can
//!   succeed.
//! - **Snapshot**: pipeline statuses (`NoEntries`, `RaftSaveSnapshot`,
//!   `Canceled`) — `NoEntries` is not a failure at the caller level, it
//!   signals an empty-but-valid snapshot payload.
//! - **Internal**: everything that indicates a bug or an I/O failure.

use std::io;
use thiserror::Error;

/// Result type alias for Basalt operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable numeric codes produced on the wire.
///
/// The numbering groups codes by subsystem: 1xxxx general, 2xxxx region,
/// 3xxxx vector, 4xxxx raft/snapshot. `Canceled` never leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    Ok = 0,
    Internal = 10001,
    IllegalParameters = 10002,
    RegionNotFound = 20001,
    RegionUnavailable = 20002,
    RegionVersion = 20003,
    RangeInvalid = 20004,
    KeyOutOfRange = 20005,
    ClusterReadOnly = 20006,
    VectorInvalid = 30001,
    NoEntries = 40001,
    RaftSaveSnapshot = 40002,
    Canceled = 40003,
}

/// Unified error type for the region engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Unexpected internal failure (I/O, corruption, bugs).
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Request parameters are invalid; fix the input, do not retry.
    #[error("illegal parameters: {message}")]
    IllegalParameters { message: String },

    /// No region with this id in the registry.
    #[error("not found region {region_id}")]
    RegionNotFound { region_id: u64 },

    /// Region exists but does not serve requests in its current state.
    #[error("region {region_id} unavailable: {reason}")]
    RegionUnavailable {
        region_id: u64,
        reason: String,
        /// NEW/STANDBY regions become available later; DELETING/DELETED/
        /// ORPHAN never do.
        retryable: bool,
    },

    /// Epoch mismatch between the request (or snapshot) and the region.
    #[error("region {region_id} version mismatch: {message}")]
    RegionVersion { region_id: u64, message: String },

    /// `start_key >= end_key`.
    #[error("range is invalid: {message}")]
    RangeInvalid { message: String },

    /// Key (or requested range) falls outside the region range.
    #[error("key out of range: {message}")]
    KeyOutOfRange { message: String },

    /// Coordinator has switched the whole cluster to read-only.
    #[error("cluster is set to read-only from coordinator")]
    ClusterReadOnly,

    /// Vector payload is empty or has the wrong dimension.
    #[error("vector invalid: {message}")]
    VectorInvalid { message: String },

    /// A scan or merge produced zero entries. Success-with-empty-payload.
    #[error("no entries")]
    NoEntries,

    /// Raft snapshot save failed; the raft layer retries on the next cycle.
    #[error("save raft snapshot failed: {message}")]
    RaftSaveSnapshot { message: String },

    /// Background task was canceled via its token.
    #[error("canceled")]
    Canceled,
}

impl Error {
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn illegal_parameters(message: impl Into<String>) -> Self {
        Error::IllegalParameters {
            message: message.into(),
        }
    }

    pub fn region_not_found(region_id: u64) -> Self {
        Error::RegionNotFound { region_id }
    }

    pub fn region_unavailable(region_id: u64, reason: impl Into<String>, retryable: bool) -> Self {
        Error::RegionUnavailable {
            region_id,
            reason: reason.into(),
            retryable,
        }
    }

    pub fn region_version(region_id: u64, message: impl Into<String>) -> Self {
        Error::RegionVersion {
            region_id,
            message: message.into(),
        }
    }

    pub fn range_invalid(message: impl Into<String>) -> Self {
        Error::RangeInvalid {
            message: message.into(),
        }
    }

    pub fn key_out_of_range(message: impl Into<String>) -> Self {
        Error::KeyOutOfRange {
            message: message.into(),
        }
    }

    pub fn vector_invalid(message: impl Into<String>) -> Self {
        Error::VectorInvalid {
            message: message.into(),
        }
    }

    pub fn raft_save_snapshot(message: impl Into<String>) -> Self {
        Error::RaftSaveSnapshot {
            message: message.into(),
        }
    }

    /// The wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Internal { .. } => ErrorCode::Internal,
            Error::IllegalParameters { .. } => ErrorCode::IllegalParameters,
            Error::RegionNotFound { .. } => ErrorCode::RegionNotFound,
            Error::RegionUnavailable { .. } => ErrorCode::RegionUnavailable,
            Error::RegionVersion { .. } => ErrorCode::RegionVersion,
            Error::RangeInvalid { .. } => ErrorCode::RangeInvalid,
            Error::KeyOutOfRange { .. } => ErrorCode::KeyOutOfRange,
            Error::ClusterReadOnly => ErrorCode::ClusterReadOnly,
            Error::VectorInvalid { .. } => ErrorCode::VectorInvalid,
            Error::NoEntries => ErrorCode::NoEntries,
            Error::RaftSaveSnapshot { .. } => ErrorCode::RaftSaveSnapshot,
            Error::Canceled => ErrorCode::Canceled,
        }
    }

    /// Whether retrying the same request can succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RegionUnavailable {
                retryable: true,
                ..
            }
        )
    }

    /// `NoEntries` flows through the snapshot pipeline as a status, not a
    /// failure.
    pub fn is_no_entries(&self) -> bool {
        matches!(self, Error::NoEntries)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Internal {
            message: format!("io error: {}", e),
            source: Some(Box::new(e)),
        }
    }
}

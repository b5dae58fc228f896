//! Core types for the Basalt region engine.
//!
//! This crate defines what every other layer speaks in terms of: the unified
//! [`Error`] type with its wire codes, byte ranges and the vector-id key
//! codec, region metadata with its state machine, the process-wide region
//! registry, and the configuration helper.
//!
//! Nothing here performs I/O beyond reading configuration; the storage and
//! snapshot layers build on these types.

pub mod codec;
pub mod config;
pub mod error;
pub mod failpoint;
pub mod range;
pub mod region;
pub mod registry;
pub mod util;

pub use error::{Error, ErrorCode, Result};
pub use range::Range;
pub use region::{Region, RegionEpoch, RegionState, RegionType};
pub use registry::RegionRegistry;

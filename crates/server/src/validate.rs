//! Request-entry validation.
//!
//! Ported gate-by-gate from the service entry path: epoch equality,
//! region-state availability, half-open range membership, the
//! prefix-normalized range-in-range comparison and the cluster read-only
//! switch. Every rejection message carries the region id and the
//! relevant keys in hex.

use basalt_core::codec::decode_vector_id;
use basalt_core::range::prefix_next;
use basalt_core::region::RegionEpoch;
use basalt_core::util::to_hex;
use basalt_core::{Error, Range, Region, RegionState, Result};

use crate::context::ServerContext;

/// Both epoch components must match exactly.
pub fn validate_region_epoch(req_epoch: RegionEpoch, region: &Region) -> Result<()> {
    let epoch = region.epoch();
    if epoch.conf_version != req_epoch.conf_version || epoch.version != req_epoch.version {
        return Err(Error::region_version(
            region.id(),
            format!(
                "epoch is not match, region_epoch({}) req_epoch({})",
                epoch, req_epoch
            ),
        ));
    }
    Ok(())
}

/// Registry lookup plus epoch check.
pub fn validate_region_epoch_by_id(
    ctx: &ServerContext,
    req_epoch: RegionEpoch,
    region_id: u64,
) -> Result<()> {
    let region = ctx
        .regions()
        .get(region_id)
        .ok_or_else(|| Error::region_not_found(region_id))?;
    validate_region_epoch(req_epoch, &region)
}

/// Only NORMAL (and split/merge on top of it) serves requests. NEW and
/// STANDBY resolve with time; DELETING, DELETED, ORPHAN and TOMBSTONE
/// never do.
pub fn validate_region_state(region: &Region) -> Result<()> {
    match region.state() {
        state if state.is_serving() => Ok(()),
        RegionState::New => Err(Error::region_unavailable(
            region.id(),
            "region is new, waiting later",
            true,
        )),
        RegionState::Standby => Err(Error::region_unavailable(
            region.id(),
            "region is standby, waiting later",
            true,
        )),
        state => Err(Error::region_unavailable(
            region.id(),
            format!("region is {}", state),
            false,
        )),
    }
}

/// Keys non-empty and `start < end`.
pub fn validate_range(range: &Range) -> Result<()> {
    if range.start_key.is_empty() || range.end_key.is_empty() {
        return Err(Error::illegal_parameters("range key is empty"));
    }
    if range.start_key >= range.end_key {
        return Err(Error::range_invalid(format!(
            "range is invalid {}",
            range.to_hex_string()
        )));
    }
    Ok(())
}

/// Every key must fall in `[start, end)`.
pub fn validate_key_in_range(range: &Range, keys: &[&[u8]]) -> Result<()> {
    for key in keys {
        if !range.contains_key(key) {
            return Err(Error::key_out_of_range(format!(
                "region range {} key[{}]",
                range.to_hex_string(),
                to_hex(key)
            )));
        }
    }
    Ok(())
}

/// Range containment under truncated-prefix comparison.
///
/// The shorter side of each bound is compared against the longer side
/// truncated to the same length; the side that was truncated away from a
/// longer key is promoted with `prefix_next` so that a request reaching
/// past the region's end key is rejected.
pub fn validate_range_in_range(region_range: &Range, req_range: &Range) -> Result<()> {
    let reject = || {
        Err(Error::key_out_of_range(format!(
            "region range {} req range {}",
            region_range.to_hex_string(),
            req_range.to_hex_string()
        )))
    };

    // Start keys: the request must not begin before the region.
    let min_len = region_range.start_key.len().min(req_range.start_key.len());
    if req_range.start_key[..min_len] < region_range.start_key[..min_len] {
        return reject();
    }

    // End keys: truncate to the shorter side, promoting the longer one.
    let min_len = region_range.end_key.len().min(req_range.end_key.len());
    let mut req_end = req_range.end_key[..min_len].to_vec();
    let mut region_end = region_range.end_key[..min_len].to_vec();
    if req_range.end_key.len() > region_range.end_key.len() {
        req_end = prefix_next(&req_end);
    } else if req_range.end_key.len() < region_range.end_key.len() {
        region_end = prefix_next(&region_end);
    }

    // An exhausted prefix_next means "past every key with this prefix".
    let req_unbounded = req_end.is_empty() && !req_range.end_key.is_empty() && min_len > 0;
    if req_unbounded {
        return if region_end.is_empty() { Ok(()) } else { reject() };
    }
    if !region_end.is_empty() && req_end > region_end {
        return reject();
    }
    Ok(())
}

/// State gate plus key membership for a data request.
pub fn validate_region(ctx: &ServerContext, region_id: u64, keys: &[&[u8]]) -> Result<()> {
    let region = ctx
        .regions()
        .get(region_id)
        .ok_or_else(|| Error::region_not_found(region_id))?;
    validate_region_state(&region)?;
    validate_key_in_range(&region.raw_range(), keys)
}

/// State gate plus vector-id window membership for an index request.
///
/// The region's keys embed vector ids; an end key that decodes to zero
/// means the window is unbounded above.
pub fn validate_index_region(region: &Region, vector_ids: &[u64]) -> Result<()> {
    validate_region_state(region)?;

    let range = region.raw_range();
    let min_vector_id = decode_vector_id(&range.start_key);
    let mut max_vector_id = decode_vector_id(&range.end_key);
    if max_vector_id == 0 {
        max_vector_id = u64::MAX;
    }
    for vector_id in vector_ids {
        if *vector_id < min_vector_id || *vector_id >= max_vector_id {
            return Err(Error::key_out_of_range(format!(
                "region range {} / [{}-{}) req vector id {}",
                range.to_hex_string(),
                min_vector_id,
                max_vector_id,
                vector_id
            )));
        }
    }
    Ok(())
}

/// Writes are refused while the coordinator holds the cluster read-only.
pub fn validate_cluster_read_only(ctx: &ServerContext) -> Result<()> {
    if ctx.is_read_only() {
        tracing::warn!("cluster is set to read-only from coordinator");
        return Err(Error::ClusterReadOnly);
    }
    Ok(())
}

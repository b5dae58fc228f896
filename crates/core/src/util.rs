//! Small helpers shared across the workspace.

use std::time::{SystemTime, UNIX_EPOCH};

/// Lowercase hex rendering of raw key bytes for logs and error messages.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Nanoseconds since the Unix epoch; 0 if the clock is before it.
pub fn timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

//! Wall-clock helpers for timestamps carried on the wire.

use crate::error::{constants, BridgeError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch.
///
/// # Errors
/// Returns `BridgeError::Internal` if the system clock is before the epoch.
pub fn current_timestamp_millis() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|_| BridgeError::Internal(constants::ERR_SYSTEM_TIME.into()))
}

/// Seconds since the UNIX epoch, as used by JWT `iat`/`exp` claims.
pub fn current_timestamp_secs() -> Result<u64> {
    Ok(current_timestamp_millis()? / 1000)
}

// src/util.rs
// Small shared helpers

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as fractional epoch seconds.
///
/// Health payloads and the coherence deadline use epoch seconds so they
/// serialize directly into JSON without a datetime layer.
pub fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

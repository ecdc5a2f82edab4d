// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wall-stamp helpers over `prost_types::Timestamp`.

use std::time::{SystemTime, UNIX_EPOCH};

use prost_types::Timestamp;

/// Current wall time as a proto timestamp.
pub fn now() -> Timestamp {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    Timestamp {
        seconds: elapsed.as_secs() as i64,
        nanos: elapsed.subsec_nanos() as i32,
    }
}

/// Whole milliseconds since the epoch.
pub fn to_millis(ts: &Timestamp) -> i64 {
    ts.seconds * 1_000 + i64::from(ts.nanos) / 1_000_000
}

/// Whole microseconds since the epoch.
pub fn to_micros(ts: &Timestamp) -> i64 {
    ts.seconds * 1_000_000 + i64::from(ts.nanos) / 1_000
}

/// Timestamp from microseconds since the epoch.
pub fn from_micros(micros: i64) -> Timestamp {
    Timestamp {
        seconds: micros.div_euclid(1_000_000),
        nanos: (micros.rem_euclid(1_000_000) * 1_000) as i32,
    }
}

/// Seconds elapsed from `earlier` to `later`; negative if `later` precedes it.
pub fn seconds_between(earlier: &Timestamp, later: &Timestamp) -> f64 {
    (to_micros(later) - to_micros(earlier)) as f64 * 1e-6
}

#[cfg(test)]
#[path = "stamp_tests.rs"]
mod tests;

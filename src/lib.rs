//! Traffic signal decision backend.
//!
//! A lane-selection service for a four-way intersection: per-cycle sensor
//! snapshots come in over HTTP, the decision engine picks which lane gets the
//! green and for how long, and the response carries a full reason trace. The
//! engine is pure and stateless per call; downstream congestion data is
//! resolved by the maps adapter before every cycle.

pub mod config;
pub mod engine;
pub mod fallback;
pub mod maps;
pub mod models;

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch as a float, the wire format for timestamps.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

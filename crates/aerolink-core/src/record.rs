//! Telemetry record model.
//!
//! One record is the average of a sampling batch, persisted remotely
//! under a time-derived key so repeated writes of the same batch are
//! idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Averaged sensor readings for one sampling batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub pm1_0: f32,
    pub pm2_5: f32,
    pub pm4_0: f32,
    pub pm10_0: f32,
    pub voc_index: f32,
    pub nox_index: f32,
    pub co2_ppm: u16,
    pub temperature_c: f32,
    pub humidity_pct: f32,
    /// Calendar date of the batch, `YYYY-MM-DD`.
    pub date: String,
    /// Wall-clock time of the batch, `HH:MM:SS`.
    pub time: String,
    /// Device location, sent on the first record of a session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Boot wall-clock time, sent on the first record of a session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_time: Option<String>,
}

/// Storage key for a record taken at `at`: `yy-mm-dd_HH-MM-SS`.
///
/// Keys sort lexicographically in chronological order, which the
/// key-ordered retention pass relies on.
pub fn storage_key(at: &DateTime<Utc>) -> String {
    at.format("%y-%m-%d_%H-%M-%S").to_string()
}

/// Live metrics snapshots.
///
/// The executor can write a JSON snapshot after every block so an external
/// viewer (or a test) can follow a launch in progress. Writes are atomic
/// (write to .tmp then rename) to avoid torn reads.
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct LiveMetrics {
    /// "idle" | "running" | "complete"
    pub status: String,
    pub kernel_name: String,
    /// Grid dimensions [x, y, z]
    pub grid: [u32; 3],
    /// Block dimensions [x, y, z]
    pub block: [u32; 3],
    pub warp_size: u32,
    /// Total blocks in the grid
    pub blocks_total: u32,
    /// Blocks completed so far
    pub blocks_executed: u32,
    pub warps_executed: u32,
    pub threads_executed: u32,
    #[serde(default)]
    pub instructions_issued: u64,
    #[serde(default)]
    pub atomics_delivered: u64,
    /// Blocks executed per SM — index = SM id
    pub sm_blocks_executed: Vec<u32>,
    /// Unix timestamp in ms when this snapshot was written
    pub timestamp_ms: u64,
}

/// Atomically write metrics to `path`.
/// Failures are logged and otherwise ignored; metrics never stop a run.
pub fn write_metrics_to(path: &Path, metrics: &LiveMetrics) {
    let json = match serde_json::to_string(metrics) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize metrics");
            return;
        }
    };
    let tmp = path.with_extension("json.tmp");
    if let Err(e) = std::fs::write(&tmp, &json).and_then(|_| std::fs::rename(&tmp, path)) {
        tracing::warn!(path = %path.display(), error = %e, "failed to write metrics");
    }
}

/// Read a metrics snapshot. Returns None if the file doesn't exist
/// or can't be parsed (e.g. no simulation has run yet).
pub fn read_metrics_from(path: &Path) -> Option<LiveMetrics> {
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

/// Returns current Unix time in milliseconds.
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

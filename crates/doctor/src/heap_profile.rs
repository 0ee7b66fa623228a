//! Heap snapshot writer
//!
//! The snapshot is a JSON document: the allocator counters, the live
//! size-class table and process memory, stamped with wall-clock time and
//! doctor uptime. The file is created (or truncated) on every call.

use crate::error::DoctorError;
use crate::memory_stats::{MemStats, memory_snapshot};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Serialize)]
pub struct HeapSnapshot {
    pub taken_at_unix_ms: u64,
    pub uptime_ms: u64,
    pub memory: MemStats,
}

impl HeapSnapshot {
    pub fn capture(uptime: Duration) -> Self {
        Self {
            taken_at_unix_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            uptime_ms: uptime.as_millis() as u64,
            memory: memory_snapshot(),
        }
    }
}

/// Create or overwrite `path` with a fresh snapshot
pub fn write_heap_profile(path: &Path, uptime: Duration) -> Result<(), DoctorError> {
    let file = File::create(path).map_err(|e| DoctorError::create(path, e))?;
    let mut out = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut out, &HeapSnapshot::capture(uptime))?;
    out.write_all(b"\n")
        .and_then(|_| out.flush())
        .map_err(|e| DoctorError::write(path, e))
}

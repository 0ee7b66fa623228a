//! Stats dumps
//!
//! Each category is written as a banner line followed by one `info!` per
//! metric, `key value - description`. The format is for humans reading a
//! log; nothing parses it back.

use crate::gc_stats::GcStats;
use crate::memory_stats::MemStats;
use crate::threads::ThreadStats;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

/// Largest number of recent pauses to print; quantiles cover the rest
const PAUSE_DISPLAY_LIMIT: usize = 16;

pub fn log_gc_stats(stats: &GcStats) {
    info!("===GcStats======");
    match stats.last_collection {
        Some(at) => info!("gc:last_gc {}", format_unix(at)),
        None => info!("gc:last_gc never"),
    }
    info!("gc:num_gc {}", stats.num_collections);
    info!("gc:pause_total {:?}", stats.pause_total);

    let shown = &stats.pauses[..stats.pauses.len().min(PAUSE_DISPLAY_LIMIT)];
    if stats.pauses.len() > shown.len() {
        info!(
            "gc:pause {:?} ... and {} more",
            shown,
            stats.pauses.len() - shown.len()
        );
    } else {
        info!("gc:pause {:?}", shown);
    }
    info!("gc:pause_quantiles {:?}", stats.pause_quantiles);
}

pub fn log_thread_stats(stats: &ThreadStats) {
    info!("===ThreadStats==");
    match stats.os_threads {
        Some(n) => info!("threads:os {} - threads in this process", n),
        None => info!("threads:os unavailable"),
    }
    if let Some(rt) = stats.runtime {
        info!("threads:runtime_workers {} - async worker threads", rt.workers);
        info!("threads:runtime_tasks {} - tasks alive", rt.alive_tasks);
    }
    info!("================");
}

pub fn log_memory_stats(stats: &MemStats) {
    info!("===MemStats=====");
    if !stats.tracking {
        info!("mem:tracking off - install doctor::TrackingAllocator as #[global_allocator]");
    }
    info!(
        "mem:alloc {} - bytes allocated and still in use",
        format_bytes(stats.live_bytes)
    );
    info!(
        "mem:total_alloc {} - bytes allocated (even if freed)",
        format_bytes(stats.total_bytes)
    );
    info!("mem:mallocs {} - number of allocations", stats.allocs);
    info!("mem:frees {} - number of frees", stats.frees);
    info!("mem:live_objects {} - allocations not yet freed", stats.live_objects);
    info!(
        "mem:peak_alloc {} - high-water mark of bytes in use",
        format_bytes(stats.peak_bytes)
    );
    info!("================");
    for class in &stats.size_classes {
        info!(
            "mem:class <={} objects={} bytes={}",
            format_bytes(class.max_size),
            class.objects,
            class.bytes
        );
    }
    info!("================");
    log_optional_bytes(
        "mem:resident",
        stats.process.resident_bytes,
        "resident set size",
    );
    log_optional_bytes(
        "mem:virtual",
        stats.process.virtual_bytes,
        "virtual memory size",
    );
    log_optional_bytes(
        "mem:max_resident",
        stats.process.max_resident_bytes,
        "peak resident set size",
    );
}

fn log_optional_bytes(key: &str, value: Option<u64>, what: &str) {
    match value {
        Some(bytes) => info!("{} {} - {}", key, format_bytes(bytes), what),
        None => info!("{} unavailable", key),
    }
}

/// Seconds since the epoch with millisecond precision
fn format_unix(at: SystemTime) -> String {
    let since = at.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    format!("{}.{:03}", since.as_secs(), since.subsec_millis())
}

/// Format bytes as human-readable string
pub(crate) fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_format_unix() {
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(format_unix(at), "1700000000.123");
    }

    #[test]
    fn test_dumps_run_without_subscriber() {
        // Just verify nothing panics when no subscriber is installed
        log_gc_stats(&crate::gc_stats::gc_snapshot());
        log_thread_stats(&crate::threads::thread_snapshot(None));
        log_memory_stats(&crate::memory_stats::memory_snapshot());
    }
}

//! Allocator and process memory statistics
//!
//! Provides visibility into heap usage without a custom runtime: the host
//! installs [`TrackingAllocator`] as its global allocator and every
//! allocation updates a handful of atomic counters.
//!
//! ```rust,ignore
//! #[global_allocator]
//! static ALLOC: doctor::TrackingAllocator = doctor::TrackingAllocator::new();
//! ```
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              AllocCounters (global static)           │
//! ├──────────────────────────────────────────────────────┤
//! │ live_bytes / total_bytes / allocs / frees / peak     │
//! │                                                      │
//! │ size classes (power of two, by layout size)          │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐                 │
//! │  │ <= 8 B  │ │ <= 16 B │ │ <= 32 B │  ...            │
//! │  │ objects │ │ objects │ │ objects │                 │
//! │  │ bytes   │ │ bytes   │ │ bytes   │                 │
//! │  └─────────┘ └─────────┘ └─────────┘                 │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Performance
//!
//! - **alloc/dealloc**: a few relaxed atomic adds, plus a CAS loop only
//!   while a new peak is being set
//! - **Reads**: only during diagnostics, one pass over 48 classes
//!
//! The allocator never allocates itself, so it is safe as `#[global_allocator]`.

use serde::Serialize;
use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of power-of-two size classes; the last one absorbs everything larger
pub const SIZE_CLASSES: usize = 48;

/// Atomic allocation counters
pub struct AllocCounters {
    live_bytes: AtomicU64,
    total_bytes: AtomicU64,
    allocs: AtomicU64,
    frees: AtomicU64,
    peak_bytes: AtomicU64,
    class_objects: [AtomicU64; SIZE_CLASSES],
    class_bytes: [AtomicU64; SIZE_CLASSES],
}

impl AllocCounters {
    pub const fn new() -> Self {
        Self {
            live_bytes: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            allocs: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            peak_bytes: AtomicU64::new(0),
            class_objects: [const { AtomicU64::new(0) }; SIZE_CLASSES],
            class_bytes: [const { AtomicU64::new(0) }; SIZE_CLASSES],
        }
    }

    #[inline]
    fn record_alloc(&self, size: usize) {
        let bytes = size as u64;
        let class = size_class(size);

        self.allocs.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.class_objects[class].fetch_add(1, Ordering::Relaxed);
        self.class_bytes[class].fetch_add(bytes, Ordering::Relaxed);
        let live = self.live_bytes.fetch_add(bytes, Ordering::Relaxed) + bytes;

        let mut peak = self.peak_bytes.load(Ordering::Relaxed);
        while live > peak {
            match self.peak_bytes.compare_exchange_weak(
                peak,
                live,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => peak = current,
            }
        }
    }

    #[inline]
    fn record_free(&self, size: usize) {
        let bytes = size as u64;
        let class = size_class(size);

        self.frees.fetch_add(1, Ordering::Relaxed);
        self.class_objects[class].fetch_sub(1, Ordering::Relaxed);
        self.class_bytes[class].fetch_sub(bytes, Ordering::Relaxed);
        self.live_bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Copy the counters and attach process memory figures
    pub fn snapshot(&self) -> MemStats {
        let allocs = self.allocs.load(Ordering::Relaxed);
        let frees = self.frees.load(Ordering::Relaxed);

        let size_classes = (0..SIZE_CLASSES)
            .filter_map(|class| {
                let objects = self.class_objects[class].load(Ordering::Relaxed);
                if objects == 0 {
                    return None;
                }
                Some(SizeClassStats {
                    max_size: class_max_size(class),
                    objects,
                    bytes: self.class_bytes[class].load(Ordering::Relaxed),
                })
            })
            .collect();

        MemStats {
            tracking: allocs > 0,
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            allocs,
            frees,
            live_objects: allocs.saturating_sub(frees),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
            size_classes,
            process: process_memory(),
        }
    }
}

impl Default for AllocCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Class `k` holds sizes in `(2^(k-1), 2^k]`; sizes 0 and 1 land in class 0
fn size_class(size: usize) -> usize {
    let class = (usize::BITS - size.saturating_sub(1).leading_zeros()) as usize;
    class.min(SIZE_CLASSES - 1)
}

fn class_max_size(class: usize) -> u64 {
    1u64 << class
}

static ALLOC_COUNTERS: AllocCounters = AllocCounters::new();

/// Global allocator wrapper that counts every allocation
pub struct TrackingAllocator<A = System> {
    inner: A,
    /// None reports into the global counters
    counters: Option<&'static AllocCounters>,
}

impl TrackingAllocator<System> {
    /// Wrap the system allocator, reporting into the global counters
    pub const fn new() -> Self {
        Self::wrap(System)
    }
}

impl Default for TrackingAllocator<System> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> TrackingAllocator<A> {
    /// Wrap another allocator, reporting into the global counters
    pub const fn wrap(inner: A) -> Self {
        Self {
            inner,
            counters: None,
        }
    }

    /// Wrap an allocator reporting into separate counters
    pub const fn with_counters(inner: A, counters: &'static AllocCounters) -> Self {
        Self {
            inner,
            counters: Some(counters),
        }
    }

    #[inline]
    fn counters(&self) -> &AllocCounters {
        self.counters.unwrap_or(&ALLOC_COUNTERS)
    }
}

// SAFETY: every call forwards to the inner allocator unchanged; the counters
// are plain atomics and never allocate.
unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.inner.alloc(layout) };
        if !ptr.is_null() {
            self.counters().record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.inner.alloc_zeroed(layout) };
        if !ptr.is_null() {
            self.counters().record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { self.inner.dealloc(ptr, layout) };
        self.counters().record_free(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { self.inner.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            self.counters().record_free(layout.size());
            self.counters().record_alloc(new_size);
        }
        new_ptr
    }
}

/// Live objects in one size class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeClassStats {
    /// Largest allocation size counted in this class
    pub max_size: u64,
    pub objects: u64,
    pub bytes: u64,
}

/// Memory figures reported by the operating system
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessMemory {
    pub resident_bytes: Option<u64>,
    pub virtual_bytes: Option<u64>,
    pub max_resident_bytes: Option<u64>,
}

/// Allocator counters plus process memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemStats {
    /// False when no allocation was ever counted (allocator not installed)
    pub tracking: bool,
    /// Bytes allocated and still in use
    pub live_bytes: u64,
    /// Bytes allocated, even if freed
    pub total_bytes: u64,
    pub allocs: u64,
    pub frees: u64,
    pub live_objects: u64,
    /// High-water mark of `live_bytes`
    pub peak_bytes: u64,
    /// Non-empty size classes, smallest first
    pub size_classes: Vec<SizeClassStats>,
    pub process: ProcessMemory,
}

/// Snapshot the global allocation counters
pub fn memory_snapshot() -> MemStats {
    ALLOC_COUNTERS.snapshot()
}

/// Read process memory from the OS; fields the platform can't provide are `None`
pub fn process_memory() -> ProcessMemory {
    let (resident_bytes, virtual_bytes) = statm().unzip();
    ProcessMemory {
        resident_bytes,
        virtual_bytes,
        max_resident_bytes: max_resident_bytes(),
    }
}

/// (resident, virtual) bytes from /proc/self/statm
#[cfg(target_os = "linux")]
fn statm() -> Option<(u64, u64)> {
    let contents = std::fs::read_to_string("/proc/self/statm").ok()?;
    let mut fields = contents.split_whitespace();
    let size_pages: u64 = fields.next()?.parse().ok()?;
    let resident_pages: u64 = fields.next()?.parse().ok()?;

    // SAFETY: sysconf has no preconditions
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let page_size = u64::try_from(page_size).ok().filter(|&p| p > 0)?;

    Some((resident_pages * page_size, size_pages * page_size))
}

#[cfg(not(target_os = "linux"))]
fn statm() -> Option<(u64, u64)> {
    None
}

#[cfg(unix)]
fn max_resident_bytes() -> Option<u64> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage fills the struct we pass; checked below
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: getrusage succeeded, and zeroed is a valid rusage anyway
    let usage = unsafe { usage.assume_init() };
    let max_rss = u64::try_from(usage.ru_maxrss).ok()?;

    // macOS reports bytes, everything else kilobytes
    if cfg!(target_os = "macos") {
        Some(max_rss)
    } else {
        Some(max_rss * 1024)
    }
}

#[cfg(not(unix))]
fn max_resident_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 8).unwrap()
    }

    #[test]
    fn test_size_class_bounds() {
        assert_eq!(size_class(0), 0);
        assert_eq!(size_class(1), 0);
        assert_eq!(size_class(2), 1);
        assert_eq!(size_class(3), 2);
        assert_eq!(size_class(4), 2);
        assert_eq!(size_class(5), 3);
        assert_eq!(size_class(64), 6);
        assert_eq!(size_class(65), 7);
        assert_eq!(size_class(usize::MAX), SIZE_CLASSES - 1);
        assert_eq!(class_max_size(6), 64);
    }

    #[test]
    fn test_alloc_and_free_are_counted() {
        static COUNTERS: AllocCounters = AllocCounters::new();
        let alloc = TrackingAllocator::with_counters(System, &COUNTERS);

        assert!(!COUNTERS.snapshot().tracking);

        unsafe {
            let a = alloc.alloc(layout(64));
            let b = alloc.alloc_zeroed(layout(100));
            assert!(!a.is_null() && !b.is_null());

            let stats = COUNTERS.snapshot();
            assert!(stats.tracking);
            assert_eq!(stats.allocs, 2);
            assert_eq!(stats.live_bytes, 164);
            assert_eq!(stats.live_objects, 2);
            assert_eq!(
                stats.size_classes,
                vec![
                    SizeClassStats { max_size: 64, objects: 1, bytes: 64 },
                    SizeClassStats { max_size: 128, objects: 1, bytes: 100 },
                ]
            );

            alloc.dealloc(a, layout(64));
            alloc.dealloc(b, layout(100));
        }

        let stats = COUNTERS.snapshot();
        assert_eq!(stats.frees, 2);
        assert_eq!(stats.live_bytes, 0);
        assert_eq!(stats.total_bytes, 164);
        assert_eq!(stats.peak_bytes, 164);
        assert!(stats.size_classes.is_empty());
    }

    #[test]
    fn test_realloc_moves_size_class() {
        static COUNTERS: AllocCounters = AllocCounters::new();
        let alloc = TrackingAllocator::with_counters(System, &COUNTERS);

        unsafe {
            let p = alloc.alloc(layout(16));
            let p = alloc.realloc(p, layout(16), 1000);
            assert!(!p.is_null());

            let stats = COUNTERS.snapshot();
            assert_eq!(stats.live_bytes, 1000);
            assert_eq!(stats.live_objects, 1);
            assert_eq!(
                stats.size_classes,
                vec![SizeClassStats { max_size: 1024, objects: 1, bytes: 1000 }]
            );

            alloc.dealloc(p, layout(1000));
        }
        assert_eq!(COUNTERS.snapshot().live_bytes, 0);
    }

    #[test]
    fn test_peak_is_high_water_mark() {
        static COUNTERS: AllocCounters = AllocCounters::new();
        let alloc = TrackingAllocator::with_counters(System, &COUNTERS);

        unsafe {
            let big = alloc.alloc(layout(4096));
            alloc.dealloc(big, layout(4096));
            let small = alloc.alloc(layout(8));
            alloc.dealloc(small, layout(8));
        }

        let stats = COUNTERS.snapshot();
        assert_eq!(stats.peak_bytes, 4096);
        assert_eq!(stats.live_bytes, 0);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_process_memory_on_linux() {
        let mem = process_memory();
        assert!(mem.resident_bytes.unwrap() > 0);
        assert!(mem.virtual_bytes.unwrap() >= mem.resident_bytes.unwrap());
        assert!(mem.max_resident_bytes.unwrap() > 0);
    }

    #[test]
    fn test_heap_stats_serialize() {
        let json = serde_json::to_value(memory_snapshot()).unwrap();
        assert!(json.get("live_bytes").is_some());
        assert!(json["process"].get("resident_bytes").is_some());
    }
}

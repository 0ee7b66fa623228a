//! Collection statistics registry
//!
//! Rust has no tracing collector, but long-running services usually have
//! something that plays the same role: a cache sweep, an arena reset, a
//! compaction pass. The host reports each such pass here and the doctor
//! dumps the numbers next to the allocator stats.
//!
//! ```rust,ignore
//! let _pause = doctor::gc_stats::time_collection();
//! cache.retain(|_, entry| !entry.expired());
//! // pause recorded when `_pause` drops
//! ```
//!
//! # Design
//!
//! All counters are atomics so recording never blocks the hot path. The
//! recent-pause ring is indexed by the collection number, so a writer only
//! ever touches one slot. A snapshot taken while a collection is being
//! recorded may see the new count before the new pause; diagnostics
//! tolerate that.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Number of recent pauses kept
const PAUSE_HISTORY: usize = 256;

/// Global registry of reclamation passes
pub struct CollectionRegistry {
    num_collections: AtomicU64,
    pause_total_ns: AtomicU64,
    /// Wall-clock time of the last collection in unix nanos (0 = never)
    last_collection_ns: AtomicU64,
    pauses: Box<[AtomicU64]>,
}

/// Point-in-time copy of the registry
#[derive(Debug, Clone, PartialEq)]
pub struct GcStats {
    pub last_collection: Option<SystemTime>,
    pub num_collections: u64,
    pub pause_total: Duration,
    /// Recent pauses, most recent first
    pub pauses: Vec<Duration>,
    /// Minimum, 25%, 50%, 75% and maximum of the recent pauses
    pub pause_quantiles: [Duration; 5],
}

impl CollectionRegistry {
    fn new(history: usize) -> Self {
        let pauses: Vec<AtomicU64> = (0..history.max(1)).map(|_| AtomicU64::new(0)).collect();
        Self {
            num_collections: AtomicU64::new(0),
            pause_total_ns: AtomicU64::new(0),
            last_collection_ns: AtomicU64::new(0),
            pauses: pauses.into_boxed_slice(),
        }
    }

    /// Record one collection that stopped the world (or a part of it) for `pause`
    pub fn record_collection(&self, pause: Duration) {
        let pause_ns = duration_to_ns(pause);
        let seq = self.num_collections.fetch_add(1, Ordering::AcqRel);

        let slot = (seq % self.pauses.len() as u64) as usize;
        self.pauses[slot].store(pause_ns, Ordering::Relaxed);
        self.pause_total_ns.fetch_add(pause_ns, Ordering::Relaxed);

        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(duration_to_ns)
            .unwrap_or(0);
        self.last_collection_ns.store(now_ns, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GcStats {
        let num_collections = self.num_collections.load(Ordering::Acquire);
        let history = self.pauses.len() as u64;
        let recent = num_collections.min(history);

        let pauses: Vec<Duration> = (0..recent)
            .map(|i| {
                let slot = ((num_collections - 1 - i) % history) as usize;
                Duration::from_nanos(self.pauses[slot].load(Ordering::Relaxed))
            })
            .collect();

        let last_ns = self.last_collection_ns.load(Ordering::Relaxed);
        let last_collection = if num_collections == 0 || last_ns == 0 {
            None
        } else {
            Some(UNIX_EPOCH + Duration::from_nanos(last_ns))
        };

        GcStats {
            last_collection,
            num_collections,
            pause_total: Duration::from_nanos(self.pause_total_ns.load(Ordering::Relaxed)),
            pause_quantiles: quantiles(&pauses),
            pauses,
        }
    }

    /// Number of recent pauses the registry keeps
    pub fn capacity(&self) -> usize {
        self.pauses.len()
    }
}

fn duration_to_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

fn quantiles(pauses: &[Duration]) -> [Duration; 5] {
    let mut out = [Duration::ZERO; 5];
    if pauses.is_empty() {
        return out;
    }

    let mut sorted = pauses.to_vec();
    sorted.sort_unstable();
    let last = sorted.len() - 1;
    for (i, q) in out.iter_mut().enumerate() {
        *q = sorted[last * i / 4];
    }
    out
}

static COLLECTION_REGISTRY: OnceLock<CollectionRegistry> = OnceLock::new();

/// Get the global collection registry
pub fn collection_registry() -> &'static CollectionRegistry {
    COLLECTION_REGISTRY.get_or_init(|| CollectionRegistry::new(PAUSE_HISTORY))
}

/// Record a collection on the global registry
pub fn record_collection(pause: Duration) {
    collection_registry().record_collection(pause);
}

/// Snapshot the global registry
pub fn gc_snapshot() -> GcStats {
    collection_registry().snapshot()
}

/// Records a collection covering its own lifetime when dropped
#[must_use = "the pause is recorded when the timer drops"]
pub struct CollectionTimer {
    started: Instant,
}

impl Drop for CollectionTimer {
    fn drop(&mut self) {
        record_collection(self.started.elapsed());
    }
}

/// Start timing a collection on the global registry
pub fn time_collection() -> CollectionTimer {
    CollectionTimer {
        started: Instant::now(),
    }
}

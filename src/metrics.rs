//! Cache activity counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Activity counters for a [`WeakCache`](crate::WeakCache).
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use weak_cache::WeakCache;
///
/// let cache = WeakCache::new();
/// let value = Arc::new(1u32);
/// cache.set("k", &value).unwrap();
/// cache.get("k");
/// cache.get("missing");
///
/// let metrics = cache.metrics();
/// assert_eq!(metrics.hits, 1);
/// assert_eq!(metrics.misses, 1);
/// println!("Hit rate: {:.2}%", metrics.hit_rate() * 100.0);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
	/// Lookups that found a live value.
	pub hits: u64,
	/// Lookups that found nothing, or a dead entry.
	pub misses: u64,
	/// Entries created for a key that had none.
	pub inserts: u64,
	/// Entries that replaced an existing one for the same key.
	pub updates: u64,
	/// Entries removed because the collector reported their value reclaimed.
	pub evictions: u64,
	/// Entries removed via `delete`.
	pub removals: u64,
	/// Dead entries removed by lookups or `purge_dead`.
	pub lazy_cleanups: u64,
	/// Stored entries at snapshot time, including dead ones.
	pub entry_count: usize,
}

impl CacheMetrics {
	/// Ratio of hits to lookups, between 0.0 and 1.0.
	///
	/// Returns 0.0 if there have been no lookups.
	pub fn hit_rate(&self) -> f64 {
		let total = self.total_accesses();
		if total == 0 {
			0.0
		} else {
			self.hits as f64 / total as f64
		}
	}

	/// Total number of lookups (hits + misses).
	pub fn total_accesses(&self) -> u64 {
		self.hits + self.misses
	}

	/// Total number of writes (inserts + updates).
	pub fn total_writes(&self) -> u64 {
		self.inserts + self.updates
	}
}

#[derive(Default)]
pub(crate) struct MetricsRecorder {
	hits: AtomicU64,
	misses: AtomicU64,
	inserts: AtomicU64,
	updates: AtomicU64,
	evictions: AtomicU64,
	removals: AtomicU64,
	lazy_cleanups: AtomicU64,
}

impl MetricsRecorder {
	pub fn record_hit(&self) {
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_miss(&self) {
		self.misses.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_insert(&self) {
		self.inserts.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_update(&self) {
		self.updates.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_eviction(&self) {
		self.evictions.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_removal(&self) {
		self.removals.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_lazy_cleanups(&self, count: usize) {
		self.lazy_cleanups.fetch_add(count as u64, Ordering::Relaxed);
	}

	pub fn snapshot(&self, entry_count: usize) -> CacheMetrics {
		CacheMetrics {
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
			inserts: self.inserts.load(Ordering::Relaxed),
			updates: self.updates.load(Ordering::Relaxed),
			evictions: self.evictions.load(Ordering::Relaxed),
			removals: self.removals.load(Ordering::Relaxed),
			lazy_cleanups: self.lazy_cleanups.load(Ordering::Relaxed),
			entry_count,
		}
	}
}

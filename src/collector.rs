//! Host-side reclamation driver.
//!
//! A [`Collector`] plays the role a garbage collector plays in managed
//! runtimes: it decides *when* reclaimed cache values are noticed and
//! reported. Each cache attached to a collector owns an independent
//! registration scope; the collector only holds weak handles to those scopes,
//! so dropping a cache detaches it.
//!
//! Notifications are delivered on whichever thread runs
//! [`Collector::collect`], never synchronously with the drop that caused
//! them. The [global collector](Collector::global) starts its own sweeper
//! thread the first time it is used.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

use crate::error::Result;

/// A registration scope the collector can drive.
pub(crate) trait Scope: Send + Sync {
	/// Queue notifications for every reclaimed registration.
	fn sweep(&self) -> usize;

	/// Deliver every queued notification. Returns how many evicted an entry.
	fn deliver(&self) -> usize;
}

/// Interval between cycles of the global collector's sweeper.
pub const GLOBAL_SWEEP_INTERVAL: Duration = Duration::from_millis(250);

struct Global {
	collector: Collector,
	/// Never dropped: the sweeper runs for the life of the process
	_sweeper: Option<SweeperHandle>,
}

static GLOBAL: Lazy<Global> = Lazy::new(|| {
	let collector = Collector::new();
	let sweeper = match collector.spawn_sweeper(GLOBAL_SWEEP_INTERVAL) {
		Ok(handle) => Some(handle),
		Err(error) => {
			tracing::error!(%error, "failed to start the global sweeper, default caches only sweep inline");
			None
		}
	};
	Global {
		collector,
		_sweeper: sweeper,
	}
});

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
	/// Number of live scopes visited.
	pub scopes: usize,
	/// Number of reclaimed registrations observed.
	pub reclaimed: usize,
	/// Number of notifications that removed an entry.
	pub delivered: usize,
}

struct CollectorInner {
	/// Attached scopes; entries for dropped caches are pruned on attach and collect
	scopes: Mutex<Vec<Weak<dyn Scope>>>,
	cycles: AtomicU64,
}

/// Drives reclamation notifications for the caches attached to it.
///
/// Cloning a collector yields another handle to the same set of scopes.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use weak_cache::{Collector, WeakCache};
///
/// let collector = Collector::new();
/// let cache: WeakCache<&str, String> = WeakCache::builder().collector(&collector).build();
///
/// let value = Arc::new("hello".to_string());
/// cache.set("greeting", &value).unwrap();
/// drop(value);
///
/// let stats = collector.collect();
/// assert_eq!(stats.delivered, 1);
/// assert_eq!(cache.size(), 0);
/// ```
#[derive(Clone)]
pub struct Collector {
	inner: Arc<CollectorInner>,
}

impl Collector {
	/// Create a collector with no attached caches.
	pub fn new() -> Self {
		Self {
			inner: Arc::new(CollectorInner {
				scopes: Mutex::new(Vec::new()),
				cycles: AtomicU64::new(0),
			}),
		}
	}

	/// The process-wide collector used by caches built without an explicit one.
	///
	/// On first use it spawns a sweeper that runs a cycle every
	/// [`GLOBAL_SWEEP_INTERVAL`], so default caches see their dropped values
	/// evicted without any manual driving.
	pub fn global() -> &'static Collector {
		&GLOBAL.collector
	}

	pub(crate) fn attach(&self, scope: Weak<dyn Scope>) {
		let mut scopes = self.inner.scopes.lock();
		scopes.retain(|existing| existing.strong_count() > 0);
		scopes.push(scope);
	}

	/// Run one collection cycle over every attached cache.
	///
	/// Each cache's reclaimed registrations are swept and their notifications
	/// delivered, invoking eviction callbacks on the calling thread.
	pub fn collect(&self) -> CollectStats {
		// Snapshot live scopes so no collector lock is held during delivery
		let scopes: Vec<Arc<dyn Scope>> = {
			let mut scopes = self.inner.scopes.lock();
			scopes.retain(|scope| scope.strong_count() > 0);
			scopes.iter().filter_map(Weak::upgrade).collect()
		};

		let mut stats = CollectStats {
			scopes: scopes.len(),
			..CollectStats::default()
		};
		for scope in &scopes {
			stats.reclaimed += scope.sweep();
			stats.delivered += scope.deliver();
		}

		let cycle = self.inner.cycles.fetch_add(1, Ordering::Relaxed) + 1;
		tracing::debug!(
			cycle,
			scopes = stats.scopes,
			reclaimed = stats.reclaimed,
			delivered = stats.delivered,
			"collection cycle finished"
		);
		stats
	}

	/// Number of caches currently attached.
	pub fn attached(&self) -> usize {
		self.inner.scopes.lock().iter().filter(|scope| scope.strong_count() > 0).count()
	}

	/// Number of collection cycles run so far.
	pub fn cycles(&self) -> u64 {
		self.inner.cycles.load(Ordering::Relaxed)
	}

	/// Spawn a background thread that runs [`collect`](Self::collect) every
	/// `interval`.
	///
	/// The thread stops when the returned handle is dropped or stopped.
	pub fn spawn_sweeper(&self, interval: Duration) -> Result<SweeperHandle> {
		let shutdown = Arc::new(Shutdown::default());
		let collector = self.clone();
		let signal = Arc::clone(&shutdown);

		let thread = thread::Builder::new()
			.name("weak-cache-sweeper".to_string())
			.spawn(move || {
				tracing::debug!(?interval, "sweeper started");
				while !signal.wait(interval) {
					collector.collect();
				}
				tracing::debug!("sweeper stopped");
			})?;

		Ok(SweeperHandle {
			shutdown,
			thread: Some(thread),
		})
	}
}

impl Default for Collector {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for Collector {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Collector")
			.field("attached", &self.attached())
			.field("cycles", &self.cycles())
			.finish()
	}
}

#[derive(Default)]
struct Shutdown {
	stopped: Mutex<bool>,
	condvar: Condvar,
}

impl Shutdown {
	/// Wait up to `timeout` for a stop request. Returns true once stopped.
	fn wait(&self, timeout: Duration) -> bool {
		let mut stopped = self.stopped.lock();
		if !*stopped {
			self.condvar.wait_for(&mut stopped, timeout);
		}
		*stopped
	}

	fn stop(&self) {
		*self.stopped.lock() = true;
		self.condvar.notify_all();
	}
}

/// Handle to a background sweeper thread. Dropping it stops the thread.
pub struct SweeperHandle {
	shutdown: Arc<Shutdown>,
	thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
	/// Stop the sweeper and wait for its thread to exit.
	pub fn stop(mut self) {
		self.shutdown_and_join();
	}

	fn shutdown_and_join(&mut self) {
		self.shutdown.stop();
		if let Some(thread) = self.thread.take()
			&& thread.join().is_err()
		{
			tracing::error!("sweeper thread panicked");
		}
	}
}

impl Drop for SweeperHandle {
	fn drop(&mut self) {
		self.shutdown_and_join();
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;

	struct CountingScope {
		sweeps: AtomicUsize,
	}

	impl Scope for CountingScope {
		fn sweep(&self) -> usize {
			self.sweeps.fetch_add(1, Ordering::Relaxed);
			2
		}

		fn deliver(&self) -> usize {
			1
		}
	}

	fn scope() -> Arc<CountingScope> {
		Arc::new(CountingScope {
			sweeps: AtomicUsize::new(0),
		})
	}

	#[test]
	fn test_collect_visits_attached_scopes() {
		let collector = Collector::new();
		let a = scope();
		let b = scope();
		collector.attach(Arc::downgrade(&a) as Weak<dyn Scope>);
		collector.attach(Arc::downgrade(&b) as Weak<dyn Scope>);

		let stats = collector.collect();
		assert_eq!(
			stats,
			CollectStats {
				scopes: 2,
				reclaimed: 4,
				delivered: 2,
			}
		);
		assert_eq!(a.sweeps.load(Ordering::Relaxed), 1);
		assert_eq!(collector.cycles(), 1);
	}

	#[test]
	fn test_collect_prunes_dropped_scopes() {
		let collector = Collector::new();
		let a = scope();
		collector.attach(Arc::downgrade(&a) as Weak<dyn Scope>);
		assert_eq!(collector.attached(), 1);

		drop(a);
		assert_eq!(collector.attached(), 0);
		assert_eq!(collector.collect().scopes, 0);
		assert!(collector.inner.scopes.lock().is_empty());
	}

	#[test]
	fn test_attach_prunes_dropped_scopes() {
		let collector = Collector::new();
		for _ in 0..10_000 {
			let a = scope();
			collector.attach(Arc::downgrade(&a) as Weak<dyn Scope>);
		}

		// No cycle ran, yet only the last dropped scope is still stored
		assert_eq!(collector.cycles(), 0);
		assert_eq!(collector.attached(), 0);
		assert!(collector.inner.scopes.lock().len() <= 1);

		let kept = scope();
		collector.attach(Arc::downgrade(&kept) as Weak<dyn Scope>);
		assert_eq!(collector.inner.scopes.lock().len(), 1);
		assert_eq!(collector.attached(), 1);
	}

	#[test]
	fn test_clones_share_scopes() {
		let collector = Collector::new();
		let other = collector.clone();
		let a = scope();
		collector.attach(Arc::downgrade(&a) as Weak<dyn Scope>);

		assert_eq!(other.collect().scopes, 1);
	}

	#[test]
	fn test_sweeper_runs_and_stops() {
		let collector = Collector::new();
		let a = scope();
		collector.attach(Arc::downgrade(&a) as Weak<dyn Scope>);

		let handle = collector.spawn_sweeper(Duration::from_millis(5)).unwrap();
		let deadline = std::time::Instant::now() + Duration::from_secs(5);
		while a.sweeps.load(Ordering::Relaxed) < 2 && std::time::Instant::now() < deadline {
			thread::sleep(Duration::from_millis(1));
		}
		handle.stop();

		let sweeps = a.sweeps.load(Ordering::Relaxed);
		assert!(sweeps >= 2);
		thread::sleep(Duration::from_millis(20));
		assert_eq!(a.sweeps.load(Ordering::Relaxed), sweeps);
	}

	#[test]
	fn test_global_is_shared() {
		assert!(std::ptr::eq(Collector::global(), Collector::global()));
	}

	#[test]
	fn test_global_sweeps_in_background() {
		let a = scope();
		Collector::global().attach(Arc::downgrade(&a) as Weak<dyn Scope>);

		let deadline = std::time::Instant::now() + Duration::from_secs(10);
		while a.sweeps.load(Ordering::Relaxed) == 0 && std::time::Instant::now() < deadline {
			thread::sleep(Duration::from_millis(10));
		}
		assert!(a.sweeps.load(Ordering::Relaxed) >= 1);
	}
}

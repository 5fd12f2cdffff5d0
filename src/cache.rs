use std::borrow::Borrow;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::builder::CacheBuilder;
use crate::collector::{Collector, Scope};
use crate::error::{CacheError, Result};
#[cfg(feature = "metrics")]
use crate::metrics::{CacheMetrics, MetricsRecorder};
use crate::listener::{Notification, ReclamationListener};
use crate::store::{Entry, Lookup, Store};
use crate::weak_ref::{Referent, WeakRef};

/// Callback invoked with the key of an entry evicted because its value was
/// dropped.
pub(crate) type EvictionListener<K> = Arc<dyn Fn(&K) + Send + Sync>;

/// Upper bound on notifications delivered inline by a single cache operation.
const MAX_INLINE_DELIVERIES: usize = 16;

/// Every this many operations, a cache sweeps its own registrations inline.
const INLINE_SWEEP_INTERVAL: u64 = 64;

pub(crate) struct Inner<K, V: ?Sized> {
	name: String,
	store: Mutex<Store<K, V>>,
	listener: ReclamationListener<K, V>,
	on_evict: Option<EvictionListener<K>>,
	/// Public operations run so far; paces the inline sweep
	ops: AtomicU64,
	#[cfg(feature = "metrics")]
	metrics: MetricsRecorder,
}

/// Thread-safe cache that holds its values weakly.
///
/// Values are handed in as `Arc<V>` (or anything implementing [`Referent`])
/// and stored as weak handles: the cache never keeps a value alive. Once
/// every other owner drops its `Arc`, the entry is dead. Dead entries are
/// removed either lazily, when `get`/`has` finds them, or reactively, when
/// the cache's [`Collector`] reports the value as reclaimed. Only the
/// reactive path invokes the `on_evict` callback.
///
/// Because removal lags behind the drop, [`size`](Self::size) is an upper
/// bound on the number of live entries.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use weak_cache::WeakCache;
///
/// let cache = WeakCache::new();
/// let value = Arc::new(vec![1, 2, 3]);
///
/// cache.set("a", &value).unwrap();
/// assert!(cache.has("a"));
/// assert_eq!(cache.get("a").as_deref(), Some(&vec![1, 2, 3]));
///
/// assert!(cache.delete("a"));
/// assert!(!cache.has("a"));
/// assert!(!cache.delete("a"));
/// ```
pub struct WeakCache<K, V: ?Sized> {
	inner: Arc<Inner<K, V>>,
}

impl<K, V> WeakCache<K, V>
where
	K: Hash + Eq + Clone + Send + Sync + 'static,
	V: ?Sized + Send + Sync + 'static,
{
	/// Create a cache attached to the [global collector](Collector::global),
	/// with no eviction callback.
	pub fn new() -> Self {
		CacheBuilder::new().build()
	}

	/// Start configuring a cache.
	pub fn builder() -> CacheBuilder<K, V> {
		CacheBuilder::new()
	}

	pub(crate) fn from_parts(
		name: String,
		on_evict: Option<EvictionListener<K>>,
		collector: &Collector,
	) -> Self {
		let inner = Arc::new(Inner {
			name,
			store: Mutex::new(Store::new()),
			listener: ReclamationListener::new(),
			on_evict,
			ops: AtomicU64::new(0),
			#[cfg(feature = "metrics")]
			metrics: MetricsRecorder::default(),
		});

		let scope: Weak<dyn Scope> = Arc::downgrade(&inner) as Weak<dyn Scope>;
		collector.attach(scope);
		tracing::debug!(cache = %inner.name, "cache created");

		Self { inner }
	}

	/// Cache `value` under `key`, replacing any previous entry.
	///
	/// The cache only keeps a weak handle: if the caller holds no other
	/// reference, the entry is dead as soon as this call returns.
	///
	/// # Errors
	///
	/// [`CacheError::NotReferenceable`] if `value` does not resolve to a live
	/// `Arc` (for example `None`, or a `Weak` whose value is gone). The cache
	/// is unchanged in that case.
	pub fn set(&self, key: K, value: impl Referent<V>) -> Result<()> {
		self.inner.maintain();

		let Some(strong) = value.into_referent() else {
			tracing::debug!(cache = %self.inner.name, "rejected value that cannot be weakly referenced");
			return Err(CacheError::NotReferenceable);
		};
		self.inner.insert(key, &strong);
		Ok(())
	}

	/// Get the value for `key` if it is still alive.
	///
	/// A dead entry found here is removed without invoking `on_evict`.
	pub fn get<Q>(&self, key: &Q) -> Option<Arc<V>>
	where
		K: Borrow<Q>,
		Q: Hash + Eq + ?Sized,
	{
		self.inner.maintain();
		self.inner.resolve(key)
	}

	/// Check whether `key` maps to a value that is still alive.
	///
	/// Same lazy cleanup as [`get`](Self::get).
	pub fn has<Q>(&self, key: &Q) -> bool
	where
		K: Borrow<Q>,
		Q: Hash + Eq + ?Sized,
	{
		self.get(key).is_some()
	}

	/// Remove the entry for `key`, live or dead.
	///
	/// Its reclamation registration is canceled, so `on_evict` will not fire
	/// for it later. Returns whether an entry existed.
	pub fn delete<Q>(&self, key: &Q) -> bool
	where
		K: Borrow<Q>,
		Q: Hash + Eq + ?Sized,
	{
		self.inner.maintain();

		let removed = self.inner.store.lock().remove(key);
		match removed {
			Some(entry) => {
				self.inner.listener.unregister(entry.token);
				#[cfg(feature = "metrics")]
				self.inner.metrics.record_removal();
				tracing::debug!(cache = %self.inner.name, token = entry.token.0, "entry deleted");
				true
			}
			None => false,
		}
	}

	/// Number of stored entries.
	///
	/// This is an upper bound: entries whose value was dropped but not yet
	/// cleaned up are still counted.
	pub fn size(&self) -> usize {
		self.inner.maintain();
		self.inner.store.lock().count()
	}

	/// Alias for [`size`](Self::size).
	pub fn len(&self) -> usize {
		self.size()
	}

	/// Whether no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.size() == 0
	}

	/// Return the live value for `key`, or cache and return the one built by
	/// `init`.
	///
	/// Not atomic: concurrent callers racing on the same key may each run
	/// `init`, and the last one to finish wins the slot.
	pub fn get_or_insert_with<F>(&self, key: K, init: F) -> Arc<V>
	where
		F: FnOnce() -> Arc<V>,
	{
		if let Some(value) = self.get(&key) {
			return value;
		}
		let value = init();
		self.inner.insert(key, &value);
		value
	}

	/// Snapshot of every entry whose value is still alive.
	///
	/// Dead entries are skipped, not removed.
	pub fn iter(&self) -> impl Iterator<Item = (K, Arc<V>)> + use<K, V> {
		self.inner.maintain();
		self.inner.store.lock().live_entries().into_iter()
	}

	/// Snapshot of every key whose value is still alive.
	pub fn keys(&self) -> impl Iterator<Item = K> + use<K, V> {
		self.iter().map(|(key, _)| key)
	}

	/// Remove every entry and cancel their registrations.
	///
	/// `on_evict` is not invoked.
	pub fn clear(&self) {
		let tokens = self.inner.store.lock().clear();
		self.inner.listener.unregister_all(&tokens);
		tracing::debug!(cache = %self.inner.name, cleared = tokens.len(), "cache cleared");
	}

	/// Remove every dead entry now, without invoking `on_evict`.
	///
	/// Returns the number of entries removed.
	pub fn purge_dead(&self) -> usize {
		let tokens = self.inner.store.lock().retain_live();
		self.inner.listener.unregister_all(&tokens);
		#[cfg(feature = "metrics")]
		self.inner.metrics.record_lazy_cleanups(tokens.len());
		tracing::debug!(cache = %self.inner.name, purged = tokens.len(), "dead entries purged");
		tokens.len()
	}

	/// Sweep this cache's registrations and deliver every pending
	/// notification on the calling thread, invoking `on_evict` as needed.
	///
	/// Returns the number of entries evicted. Useful when no collector cycle
	/// is expected to run soon.
	pub fn run_pending_evictions(&self) -> usize {
		self.inner.sweep();
		self.inner.run_pending(usize::MAX)
	}

	/// The name given to this cache at build time.
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Snapshot of the cache's counters.
	#[cfg(feature = "metrics")]
	pub fn metrics(&self) -> CacheMetrics {
		self.inner.metrics.snapshot(self.inner.store.lock().count())
	}
}

impl<K, V> Default for WeakCache<K, V>
where
	K: Hash + Eq + Clone + Send + Sync + 'static,
	V: ?Sized + Send + Sync + 'static,
{
	fn default() -> Self {
		Self::new()
	}
}

impl<K, V: ?Sized> std::fmt::Debug for WeakCache<K, V> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WeakCache")
			.field("name", &self.inner.name)
			.field("registered", &self.inner.listener.registered())
			.field("pending", &self.inner.listener.pending())
			.finish_non_exhaustive()
	}
}

impl<K, V> Inner<K, V>
where
	K: Hash + Eq + Clone,
	V: ?Sized,
{
	/// Store a weak handle to `value` and register it for reclamation.
	///
	/// `value` is held strongly for the duration of the call, so the
	/// registration can never observe it already gone.
	fn insert(&self, key: K, value: &Arc<V>) {
		let weak = WeakRef::new(value);
		let token = self.listener.register(key.clone(), weak.downgrade());
		let old = self.store.lock().insert(key, Entry { weak, token });

		match old {
			Some(old) => {
				// Cancel the superseded registration so its reclamation
				// cannot evict the new entry's key.
				self.listener.unregister(old.token);
				#[cfg(feature = "metrics")]
				self.metrics.record_update();
				tracing::debug!(cache = %self.name, token = token.0, replaced = old.token.0, "entry replaced");
			}
			None => {
				#[cfg(feature = "metrics")]
				self.metrics.record_insert();
				tracing::debug!(cache = %self.name, token = token.0, "entry registered");
			}
		}
	}

	fn resolve<Q>(&self, key: &Q) -> Option<Arc<V>>
	where
		K: Borrow<Q>,
		Q: Hash + Eq + ?Sized,
	{
		let lookup = self.store.lock().lookup_or_evict(key);
		match lookup {
			Lookup::Live(value) => {
				#[cfg(feature = "metrics")]
				self.metrics.record_hit();
				Some(value)
			}
			Lookup::Dead(removed) => {
				if let Some(entry) = removed {
					self.listener.unregister(entry.token);
					#[cfg(feature = "metrics")]
					self.metrics.record_lazy_cleanups(1);
					tracing::trace!(cache = %self.name, token = entry.token.0, "removed dead entry on lookup");
				}
				#[cfg(feature = "metrics")]
				self.metrics.record_miss();
				None
			}
			Lookup::Absent => {
				#[cfg(feature = "metrics")]
				self.metrics.record_miss();
				None
			}
		}
	}

	/// Housekeeping run at the start of every public operation: sweep this
	/// cache's registrations every [`INLINE_SWEEP_INTERVAL`] operations, then
	/// deliver a bounded batch of queued notifications.
	fn maintain(&self) {
		let ops = self.ops.fetch_add(1, Ordering::Relaxed) + 1;
		if ops % INLINE_SWEEP_INTERVAL == 0 {
			let reclaimed = self.listener.sweep();
			if reclaimed > 0 {
				tracing::trace!(cache = %self.name, reclaimed, "inline sweep queued notifications");
			}
		}
		self.run_pending(MAX_INLINE_DELIVERIES);
	}

	/// Deliver up to `limit` queued notifications. Returns how many evicted
	/// an entry.
	fn run_pending(&self, limit: usize) -> usize {
		let mut evicted = 0;
		self.listener.drain(limit, |notification| {
			if self.deliver_one(notification) {
				evicted += 1;
			}
		});
		evicted
	}

	fn deliver_one(&self, notification: Notification<K>) -> bool {
		let Notification { token, key } = notification;

		// The store lock is released before the callback runs, so the
		// callback always observes the entry already removed.
		let removed = self.store.lock().remove_if_token(&key, token);
		if !removed {
			tracing::trace!(cache = %self.name, token = token.0, "stale reclamation notification ignored");
			return false;
		}

		#[cfg(feature = "metrics")]
		self.metrics.record_eviction();
		tracing::debug!(cache = %self.name, token = token.0, "entry evicted after value was reclaimed");

		if let Some(on_evict) = &self.on_evict
			&& panic::catch_unwind(AssertUnwindSafe(|| on_evict(&key))).is_err()
		{
			tracing::error!(cache = %self.name, token = token.0, "eviction callback panicked");
		}
		true
	}
}

impl<K, V> Scope for Inner<K, V>
where
	K: Hash + Eq + Clone + Send + Sync,
	V: ?Sized + Send + Sync,
{
	fn sweep(&self) -> usize {
		self.listener.sweep()
	}

	fn deliver(&self) -> usize {
		self.run_pending(usize::MAX)
	}
}

use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::cache::{EvictionListener, WeakCache};
use crate::collector::Collector;

/// Builder for configuring a [`WeakCache`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use weak_cache::{CacheBuilder, Collector, WeakCache};
///
/// let collector = Collector::new();
/// let cache: WeakCache<u64, String> = CacheBuilder::new()
///     .name("sessions")
///     .collector(&collector)
///     .on_evict(|id: &u64| println!("session {id} dropped"))
///     .build();
///
/// assert_eq!(cache.name(), "sessions");
/// ```
pub struct CacheBuilder<K, V: ?Sized> {
	name: Option<String>,
	collector: Option<Collector>,
	on_evict: Option<EvictionListener<K>>,
	_marker: PhantomData<fn() -> Arc<V>>,
}

impl<K, V> CacheBuilder<K, V>
where
	K: Hash + Eq + Clone + Send + Sync + 'static,
	V: ?Sized + Send + Sync + 'static,
{
	/// Create a builder with default settings.
	pub fn new() -> Self {
		Self {
			name: None,
			collector: None,
			on_evict: None,
			_marker: PhantomData,
		}
	}

	/// Name the cache. The name appears in the cache's log events.
	///
	/// Default: `"weak-cache"`
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Attach the cache to `collector` instead of the global one.
	///
	/// Default: [`Collector::global`]
	pub fn collector(mut self, collector: &Collector) -> Self {
		self.collector = Some(collector.clone());
		self
	}

	/// Invoke `callback` with the key of every entry evicted because its
	/// value was reclaimed.
	///
	/// The callback runs on the thread driving the collector, after the entry
	/// has already been removed. Lookups that find a dead entry and explicit
	/// deletes do not invoke it. A panic inside the callback is caught and
	/// logged.
	pub fn on_evict<F>(mut self, callback: F) -> Self
	where
		F: Fn(&K) + Send + Sync + 'static,
	{
		self.on_evict = Some(Arc::new(callback));
		self
	}

	/// Build the cache with the configured settings.
	pub fn build(self) -> WeakCache<K, V> {
		let name = self.name.unwrap_or_else(|| "weak-cache".to_string());
		let collector = match &self.collector {
			Some(collector) => collector,
			None => Collector::global(),
		};
		WeakCache::from_parts(name, self.on_evict, collector)
	}
}

impl<K, V> Default for CacheBuilder<K, V>
where
	K: Hash + Eq + Clone + Send + Sync + 'static,
	V: ?Sized + Send + Sync + 'static,
{
	fn default() -> Self {
		Self::new()
	}
}

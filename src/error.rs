//! Error types returned by the cache.

use std::io;

/// Errors surfaced by [`WeakCache`](crate::WeakCache) and
/// [`Collector`](crate::Collector).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CacheError {
	/// The value passed to `set` cannot be weakly referenced: it was `None`,
	/// or a weak handle whose referent has already been dropped.
	///
	/// The cache is left unchanged.
	#[error("value cannot be weakly referenced: it is absent or already dropped")]
	NotReferenceable,

	/// The background sweeper thread could not be spawned.
	#[error("failed to spawn sweeper thread")]
	SweeperSpawn(#[from] io::Error),
}

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, CacheError>;

//! # Weak Cache
//!
//! A concurrent key-value cache that holds its values weakly:
//! - **Never keeps values alive**: only `Weak` handles are stored
//! - **Lazy cleanup**: lookups that find a dropped value remove its entry
//! - **Reactive eviction**: a [`Collector`] notices dropped values and
//!   evicts their entries, invoking an optional `on_evict` callback
//! - **Independent scopes**: every cache owns its own registrations, so
//!   caches sharing a collector never interfere
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use weak_cache::{Collector, WeakCache};
//!
//! #[derive(Debug)]
//! struct Document {
//!     body: String,
//! }
//!
//! let collector = Collector::new();
//! let cache = WeakCache::builder()
//!     .collector(&collector)
//!     .on_evict(|path: &String| println!("{path} was dropped"))
//!     .build();
//!
//! let doc = Arc::new(Document { body: "hello".to_string() });
//! cache.set("readme.md".to_string(), &doc).unwrap();
//!
//! // Lookups hand back a new strong reference while the value lives
//! assert_eq!(cache.get("readme.md").unwrap().body, "hello");
//!
//! // Once the last owner drops it, a collection cycle evicts the entry
//! drop(doc);
//! collector.collect();
//! assert!(!cache.has("readme.md"));
//! assert_eq!(cache.size(), 0);
//! ```
//!
//! ## Size Is An Upper Bound
//!
//! Dropping the last `Arc` does not remove the entry by itself. Until a
//! lookup, [`WeakCache::purge_dead`], or a collection cycle observes the drop,
//! [`WeakCache::size`] still counts it.
//!
//! ## Background Collection
//!
//! Caches built without an explicit collector attach to
//! [`Collector::global`], which starts a sweeper thread on first use and runs
//! a cycle every [`GLOBAL_SWEEP_INTERVAL`]. Every cache also sweeps its own
//! registrations inline once every few dozen operations. A private collector
//! only runs when driven:
//!
//! ```rust
//! use std::time::Duration;
//! use weak_cache::Collector;
//!
//! // Runs a collection cycle every 100ms until the handle is dropped.
//! let collector = Collector::new();
//! let sweeper = collector.spawn_sweeper(Duration::from_millis(100)).unwrap();
//! sweeper.stop();
//! ```
//!
//! ## Values Must Be Referenceable
//!
//! Only shared allocations can be held weakly, so plain values are rejected at
//! compile time:
//!
//! ```compile_fail
//! use weak_cache::WeakCache;
//!
//! let cache: WeakCache<&str, i32> = WeakCache::new();
//! cache.set("answer", 42).unwrap();
//! ```
//!
//! A missing or already dropped value is rejected at run time:
//!
//! ```rust
//! use std::sync::Arc;
//! use weak_cache::{CacheError, WeakCache};
//!
//! let cache: WeakCache<&str, i32> = WeakCache::new();
//! assert!(matches!(cache.set("answer", None), Err(CacheError::NotReferenceable)));
//!
//! let gone = Arc::downgrade(&Arc::new(42));
//! assert!(matches!(cache.set("answer", gone), Err(CacheError::NotReferenceable)));
//! ```

mod builder;
mod cache;
mod collector;
mod error;
mod listener;
#[cfg(feature = "metrics")]
mod metrics;
mod store;
mod weak_ref;

pub use builder::CacheBuilder;
pub use cache::WeakCache;
pub use collector::{CollectStats, Collector, GLOBAL_SWEEP_INTERVAL, SweeperHandle};
pub use error::{CacheError, Result};
#[cfg(feature = "metrics")]
pub use metrics::CacheMetrics;
pub use weak_ref::{Referent, WeakRef};

use std::fmt;
use std::sync::{Arc, Weak};

/// A non-owning handle to a cached value.
///
/// Holding a `WeakRef` never keeps the value alive. [`resolve`](Self::resolve)
/// hands back a strong reference only while some other owner still holds one.
pub struct WeakRef<V: ?Sized> {
	inner: Weak<V>,
}

impl<V: ?Sized> WeakRef<V> {
	/// Create a handle pointing at `value` without taking ownership of it.
	pub fn new(value: &Arc<V>) -> Self {
		Self {
			inner: Arc::downgrade(value),
		}
	}

	/// Resolve the handle. Returns `None` once the value has been dropped.
	pub fn resolve(&self) -> Option<Arc<V>> {
		self.inner.upgrade()
	}

	/// Whether the value is still owned somewhere. Does not upgrade.
	pub fn is_live(&self) -> bool {
		self.inner.strong_count() > 0
	}

	/// Whether both handles point at the same allocation.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Weak::ptr_eq(&self.inner, &other.inner)
	}

	pub(crate) fn downgrade(&self) -> Weak<V> {
		Weak::clone(&self.inner)
	}
}

impl<V: ?Sized> Clone for WeakRef<V> {
	fn clone(&self) -> Self {
		Self {
			inner: Weak::clone(&self.inner),
		}
	}
}

impl<V: ?Sized> fmt::Debug for WeakRef<V> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WeakRef").field("live", &self.is_live()).finish()
	}
}

/// Anything that can be turned into a weakly referenceable value.
///
/// Returning `None` means there is nothing to reference, and
/// [`WeakCache::set`](crate::WeakCache::set) rejects the call with
/// [`CacheError::NotReferenceable`](crate::CacheError::NotReferenceable).
/// Plain values such as integers or string slices do not implement this
/// trait at all.
pub trait Referent<V: ?Sized> {
	/// Produce a strong reference to the value, if there is one.
	fn into_referent(self) -> Option<Arc<V>>;
}

impl<V: ?Sized> Referent<V> for Arc<V> {
	fn into_referent(self) -> Option<Arc<V>> {
		Some(self)
	}
}

impl<V: ?Sized> Referent<V> for &Arc<V> {
	fn into_referent(self) -> Option<Arc<V>> {
		Some(Arc::clone(self))
	}
}

impl<V: ?Sized> Referent<V> for Weak<V> {
	fn into_referent(self) -> Option<Arc<V>> {
		self.upgrade()
	}
}

impl<V: ?Sized> Referent<V> for &Weak<V> {
	fn into_referent(self) -> Option<Arc<V>> {
		self.upgrade()
	}
}

impl<V: ?Sized> Referent<V> for &WeakRef<V> {
	fn into_referent(self) -> Option<Arc<V>> {
		self.resolve()
	}
}

impl<V: ?Sized> Referent<V> for Option<Arc<V>> {
	fn into_referent(self) -> Option<Arc<V>> {
		self
	}
}

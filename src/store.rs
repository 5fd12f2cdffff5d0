use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use ahash::RandomState;

use crate::listener::Token;
use crate::weak_ref::WeakRef;

/// A stored slot: a weak handle to the value plus the token its
/// reclamation registration was filed under.
pub(crate) struct Entry<V: ?Sized> {
	pub weak: WeakRef<V>,
	pub token: Token,
}

/// Outcome of resolving a key.
pub(crate) enum Lookup<V: ?Sized> {
	Live(Arc<V>),
	/// The slot exists but its value is gone. Carries the removed entry when
	/// the lookup also cleaned it up.
	Dead(Option<Entry<V>>),
	Absent,
}

/// Key to weak-entry mapping.
///
/// The store is not thread-safe on its own; the cache wraps it in a Mutex.
pub(crate) struct Store<K, V: ?Sized> {
	entries: HashMap<K, Entry<V>, RandomState>,
}

impl<K, V> Store<K, V>
where
	K: Hash + Eq,
	V: ?Sized,
{
	pub fn new() -> Self {
		Self {
			entries: HashMap::default(),
		}
	}

	/// Insert an entry, returning the one it supersedes.
	pub fn insert(&mut self, key: K, entry: Entry<V>) -> Option<Entry<V>> {
		self.entries.insert(key, entry)
	}

	/// Resolve `key` without touching the slot.
	pub fn lookup<Q>(&self, key: &Q) -> Lookup<V>
	where
		K: Borrow<Q>,
		Q: Hash + Eq + ?Sized,
	{
		match self.entries.get(key) {
			Some(entry) => match entry.weak.resolve() {
				Some(value) => Lookup::Live(value),
				None => Lookup::Dead(None),
			},
			None => Lookup::Absent,
		}
	}

	/// Resolve `key`, removing the slot if its value is gone.
	pub fn lookup_or_evict<Q>(&mut self, key: &Q) -> Lookup<V>
	where
		K: Borrow<Q>,
		Q: Hash + Eq + ?Sized,
	{
		match self.lookup(key) {
			Lookup::Dead(_) => Lookup::Dead(self.entries.remove(key)),
			other => other,
		}
	}

	/// Remove the slot for `key`, live or dead. Never resolves the value.
	pub fn remove<Q>(&mut self, key: &Q) -> Option<Entry<V>>
	where
		K: Borrow<Q>,
		Q: Hash + Eq + ?Sized,
	{
		self.entries.remove(key)
	}

	/// Remove the slot for `key` only if it was filed under `token`.
	///
	/// Returns false when the slot is gone or belongs to a newer `set`.
	pub fn remove_if_token(&mut self, key: &K, token: Token) -> bool {
		match self.entries.get(key) {
			Some(entry) if entry.token == token => {
				self.entries.remove(key);
				true
			}
			_ => false,
		}
	}

	/// Number of slots, including dead ones not yet cleaned up.
	pub fn count(&self) -> usize {
		self.entries.len()
	}

	/// Remove every slot, returning the tokens they were filed under.
	pub fn clear(&mut self) -> Vec<Token> {
		self.entries.drain().map(|(_, entry)| entry.token).collect()
	}

	/// Remove every dead slot, returning the tokens they were filed under.
	pub fn retain_live(&mut self) -> Vec<Token> {
		let mut dead = Vec::new();
		self.entries.retain(|_, entry| {
			if entry.weak.is_live() {
				true
			} else {
				dead.push(entry.token);
				false
			}
		});
		dead
	}
}

impl<K, V> Store<K, V>
where
	K: Hash + Eq + Clone,
	V: ?Sized,
{
	/// Snapshot of every slot whose value is still live.
	pub fn live_entries(&self) -> Vec<(K, Arc<V>)> {
		self.entries
			.iter()
			.filter_map(|(key, entry)| entry.weak.resolve().map(|value| (key.clone(), value)))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(value: &Arc<String>, token: u64) -> Entry<String> {
		Entry {
			weak: WeakRef::new(value),
			token: Token(token),
		}
	}

	#[test]
	fn test_store_insert_and_lookup() {
		let mut store = Store::new();
		let value = Arc::new("a".to_string());

		assert!(store.insert("k", entry(&value, 1)).is_none());
		assert!(matches!(store.lookup("k"), Lookup::Live(v) if Arc::ptr_eq(&v, &value)));
		assert!(matches!(store.lookup("missing"), Lookup::Absent));
		assert_eq!(store.count(), 1);
	}

	#[test]
	fn test_store_insert_replaces() {
		let mut store = Store::new();
		let first = Arc::new("a".to_string());
		let second = Arc::new("b".to_string());

		store.insert("k", entry(&first, 1));
		let old = store.insert("k", entry(&second, 2)).unwrap();

		assert_eq!(old.token, Token(1));
		assert_eq!(store.count(), 1);
	}

	#[test]
	fn test_store_dead_lookup_keeps_slot() {
		let mut store = Store::new();
		let value = Arc::new("a".to_string());
		store.insert("k", entry(&value, 1));
		drop(value);

		assert!(matches!(store.lookup("k"), Lookup::Dead(None)));
		assert_eq!(store.count(), 1);
	}

	#[test]
	fn test_store_lookup_or_evict_removes_dead() {
		let mut store = Store::new();
		let value = Arc::new("a".to_string());
		store.insert("k", entry(&value, 3));
		drop(value);

		match store.lookup_or_evict("k") {
			Lookup::Dead(Some(removed)) => assert_eq!(removed.token, Token(3)),
			_ => panic!("expected dead slot to be removed"),
		}
		assert_eq!(store.count(), 0);
	}

	#[test]
	fn test_store_remove_dead_entry() {
		let mut store = Store::new();
		let value = Arc::new("a".to_string());
		store.insert("k", entry(&value, 1));
		drop(value);

		assert!(store.remove("k").is_some());
		assert!(store.remove("k").is_none());
	}

	#[test]
	fn test_store_remove_if_token() {
		let mut store = Store::new();
		let value = Arc::new("a".to_string());
		store.insert("k", entry(&value, 1));
		store.insert("k", entry(&value, 2));

		assert!(!store.remove_if_token(&"k", Token(1)));
		assert_eq!(store.count(), 1);
		assert!(store.remove_if_token(&"k", Token(2)));
		assert!(!store.remove_if_token(&"k", Token(2)));
	}

	#[test]
	fn test_store_retain_live() {
		let mut store = Store::new();
		let kept = Arc::new("kept".to_string());
		let dropped = Arc::new("dropped".to_string());
		store.insert("a", entry(&kept, 1));
		store.insert("b", entry(&dropped, 2));
		drop(dropped);

		assert_eq!(store.retain_live(), vec![Token(2)]);
		assert_eq!(store.count(), 1);
		assert_eq!(store.live_entries().len(), 1);
	}

	#[test]
	fn test_store_clear() {
		let mut store = Store::new();
		let value = Arc::new("a".to_string());
		store.insert("a", entry(&value, 1));
		store.insert("b", entry(&value, 2));

		let mut tokens = store.clear();
		tokens.sort();
		assert_eq!(tokens, vec![Token(1), Token(2)]);
		assert_eq!(store.count(), 0);
	}
}

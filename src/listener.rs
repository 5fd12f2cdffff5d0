use std::collections::HashMap;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::RandomState;
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;

/// Correlation handle for one reclamation registration.
///
/// Allocated from a per-listener counter, so a token is never reused by the
/// listener that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Token(pub(crate) u64);

/// A pending request to be told when `target` is dropped.
struct Registration<K, V: ?Sized> {
	key: K,
	target: Weak<V>,
}

/// A reclamation that has been observed but not yet acted on.
#[derive(Debug)]
pub(crate) struct Notification<K> {
	pub token: Token,
	pub key: K,
}

/// Per-cache registration scope.
///
/// Registrations live in a correlation table keyed by token. A sweep moves
/// every registration whose target has been dropped onto a lock-free
/// delivery queue; the owning cache drains that queue and decides, per
/// notification, whether it still applies.
pub(crate) struct ReclamationListener<K, V: ?Sized> {
	/// Token -> registration
	registrations: Mutex<HashMap<Token, Registration<K, V>, RandomState>>,
	/// Reclaimed registrations awaiting delivery (lock-free MPMC queue)
	pending: SegQueue<Notification<K>>,
	next_token: AtomicU64,
}

impl<K, V: ?Sized> ReclamationListener<K, V> {
	pub fn new() -> Self {
		Self {
			registrations: Mutex::new(HashMap::default()),
			pending: SegQueue::new(),
			next_token: AtomicU64::new(1),
		}
	}

	/// Ask to be notified, under a fresh token, once `target` is dropped.
	pub fn register(&self, key: K, target: Weak<V>) -> Token {
		let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));
		self.registrations.lock().insert(token, Registration { key, target });
		token
	}

	/// Cancel a registration that has not been swept yet.
	///
	/// Returns false if the token is unknown or was already swept; in the
	/// latter case the queued notification is discarded at delivery time.
	pub fn unregister(&self, token: Token) -> bool {
		self.registrations.lock().remove(&token).is_some()
	}

	/// Cancel a batch of registrations under a single lock acquisition.
	pub fn unregister_all(&self, tokens: &[Token]) {
		if tokens.is_empty() {
			return;
		}
		let mut registrations = self.registrations.lock();
		for token in tokens {
			registrations.remove(token);
		}
	}

	/// Move every registration whose target is gone onto the delivery queue.
	///
	/// Returns the number of notifications queued.
	pub fn sweep(&self) -> usize {
		let reclaimed: Vec<_> = {
			let mut registrations = self.registrations.lock();
			let dead: Vec<Token> = registrations
				.iter()
				.filter(|(_, registration)| registration.target.strong_count() == 0)
				.map(|(token, _)| *token)
				.collect();
			dead.into_iter()
				.filter_map(|token| registrations.remove(&token).map(|r| (token, r.key)))
				.collect()
		}; // Lock released here

		let count = reclaimed.len();
		for (token, key) in reclaimed {
			self.pending.push(Notification { token, key });
		}
		count
	}

	/// Pop at most `limit` queued notifications, handing each to `deliver`.
	///
	/// Returns how many were popped.
	pub fn drain(&self, limit: usize, mut deliver: impl FnMut(Notification<K>)) -> usize {
		let mut drained = 0;
		while drained < limit {
			match self.pending.pop() {
				Some(notification) => {
					deliver(notification);
					drained += 1;
				}
				None => break,
			}
		}
		drained
	}

	/// Number of registrations not yet swept.
	pub fn registered(&self) -> usize {
		self.registrations.lock().len()
	}

	/// Number of swept notifications awaiting delivery.
	pub fn pending(&self) -> usize {
		self.pending.len()
	}
}

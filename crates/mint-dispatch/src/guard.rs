//! Per-key in-flight guard.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One lock per key, created on demand and dropped once nobody holds it.
///
/// Unrelated keys never wait on each other.
#[derive(Clone, Default)]
pub struct KeyedLocks {
	locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
	pub fn new() -> Self {
		Self::default()
	}

	/// Takes the lock for `key` without waiting; `None` if it is held.
	pub fn try_acquire(&self, key: &str) -> Option<KeyGuard> {
		let lock = self
			.locks
			.entry(key.to_string())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone();

		let guard = lock.try_lock_owned().ok()?;
		Some(KeyGuard {
			key: key.to_string(),
			guard: Some(guard),
			locks: self.locks.clone(),
		})
	}

	/// Whether some guard for `key` is currently alive.
	///
	/// Only a snapshot: the answer can change as soon as it is returned.
	pub fn is_held(&self, key: &str) -> bool {
		self.locks
			.get(key)
			.is_some_and(|lock| lock.try_lock().is_err())
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.locks.len()
	}
}

/// Exclusive hold on one key, returned by [`KeyedLocks::try_acquire`].
///
/// Releases the key on drop, and removes the key's lock entry once no other
/// guard or waiter refers to it.
pub struct KeyGuard {
	key: String,
	guard: Option<OwnedMutexGuard<()>>,
	locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyGuard {
	/// The key this guard holds.
	pub fn key(&self) -> &str {
		&self.key
	}
}

impl Drop for KeyGuard {
	fn drop(&mut self) {
		drop(self.guard.take());
		self.locks
			.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_same_key_is_exclusive() {
		let locks = KeyedLocks::new();

		let guard = locks.try_acquire("proc-1").unwrap();
		assert_eq!(guard.key(), "proc-1");
		assert!(locks.try_acquire("proc-1").is_none());
		assert!(locks.is_held("proc-1"));

		drop(guard);
		assert!(!locks.is_held("proc-1"));
		assert!(locks.try_acquire("proc-1").is_some());
	}

	#[test]
	fn test_unrelated_keys_do_not_block() {
		let locks = KeyedLocks::new();

		let _a = locks.try_acquire("proc-1").unwrap();
		let _b = locks.try_acquire("proc-2").unwrap();
		assert_eq!(locks.len(), 2);
	}

	#[test]
	fn test_entries_removed_on_release() {
		let locks = KeyedLocks::new();
		drop(locks.try_acquire("proc-1").unwrap());
		assert_eq!(locks.len(), 0);
	}
}

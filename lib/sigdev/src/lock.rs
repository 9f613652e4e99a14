//! Keyed mutual exclusion for device transactions.
//!
//! At most one holder per key at any instant; unrelated keys proceed fully in
//! parallel. Waiters are woken by a release broadcast and race to re-acquire,
//! so no FIFO ordering is guaranteed among waiters on the same key.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::SigdevError;

/// Grants exclusive possession of a named resource.
///
/// The registry maps each held key to a wait primitive. The coarse mutex
/// around the map is held only for map mutation, never for the duration of a
/// caller's transaction.
pub struct KeyedLocker<K> {
    registry: Arc<Mutex<HashMap<K, Arc<Notify>>>>,
}

impl<K> Default for KeyedLocker<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for KeyedLocker<K> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<K> KeyedLocker<K> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocker<K> {
    /// Blocks until the lock for `key` is granted or `cancel` fires.
    ///
    /// Cancellation before grant is clean: no lock is taken and no registry
    /// entry is left behind. The returned guard releases on drop.
    pub async fn acquire(
        &self,
        key: K,
        cancel: &CancellationToken,
    ) -> Result<LockGuard<K>, SigdevError> {
        loop {
            let notify;
            // The registry guard lives only in this block so the future stays
            // `Send`; the compiler otherwise considers the non-`Send` guard
            // held across the awaits below.
            let mut released = {
                let mut registry = lock_registry(&self.registry);
                notify = match registry.entry(key.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(Arc::new(Notify::new()));
                        return Ok(LockGuard {
                            registry: Arc::clone(&self.registry),
                            key,
                        });
                    }
                    Entry::Occupied(held) => Arc::clone(held.get()),
                };

                // Register for the release broadcast before letting go of the
                // registry mutex. A release that lands in between would
                // otherwise be missed and this waiter would sleep forever.
                let mut released = Box::pin(notify.notified());
                released.as_mut().enable();
                released
            };

            tokio::select! {
                _ = &mut released => {}
                _ = cancel.cancelled() => return Err(SigdevError::Cancelled),
            }

            // Woken by a release. Ownership is not implied: every waiter on
            // this key wakes and races to re-insert; losers come back around.
        }
    }

    /// True if some transaction currently holds the lock for `key`.
    pub fn is_held(&self, key: &K) -> bool {
        lock_registry(&self.registry).contains_key(key)
    }

    /// Number of keys currently held.
    pub fn held_count(&self) -> usize {
        lock_registry(&self.registry).len()
    }
}

/// Exclusive possession of one key for the duration of one transaction.
/// Dropping the guard removes the registry entry and wakes all waiters.
pub struct LockGuard<K: Eq + Hash> {
    registry: Arc<Mutex<HashMap<K, Arc<Notify>>>>,
    key: K,
}

impl<K: Eq + Hash> Drop for LockGuard<K> {
    fn drop(&mut self) {
        let notify = lock_registry(&self.registry).remove(&self.key);
        if let Some(notify) = notify {
            notify.notify_waiters();
        }
    }
}

// The registry is only ever locked for map mutation, which cannot panic, so
// recover rather than propagate a poison from an unrelated panicking thread.
fn lock_registry<K>(
    registry: &Mutex<HashMap<K, Arc<Notify>>>,
) -> MutexGuard<'_, HashMap<K, Arc<Notify>>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

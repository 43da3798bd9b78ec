//! One flush per object key at a time

use ossfs_core::ObjectKey;
use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type Slots = Arc<Mutex<HashMap<ObjectKey, Arc<AsyncMutex<()>>>>>;

/// Hands out exclusive per-key leases. Clones share state.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    slots: Slots,
}

/// Exclusive right to run a session for one key; released on drop
pub struct KeyLease {
    key: ObjectKey,
    slots: Slots,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLease {
    pub fn key(&self) -> &ObjectKey {
        &self.key
    }
}

/// A reference to a key's slot held while acquiring; prunes the slot when
/// dropped, including when the acquiring future is cancelled
struct SlotRef {
    key: ObjectKey,
    slots: Slots,
    slot: Arc<AsyncMutex<()>>,
}

impl Drop for SlotRef {
    fn drop(&mut self) {
        drop(mem::take(&mut self.slot));
        prune(&self.slots, &self.key);
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other lease on `key` is held, then take it
    pub async fn acquire(&self, key: &ObjectKey) -> KeyLease {
        let slot = self.slot(key);
        let guard = {
            let mutex = slot.slot.clone();
            if mutex.try_lock().is_err() {
                debug!(%key, "waiting for in-progress flush");
            }
            mutex.lock_owned().await
        };
        self.lease(key, guard)
    }

    /// Take the lease only if it is free
    pub fn try_acquire(&self, key: &ObjectKey) -> Option<KeyLease> {
        let slot = self.slot(key);
        let guard = slot.slot.clone().try_lock_owned().ok()?;
        Some(self.lease(key, guard))
    }

    /// Whether a lease on `key` is held or awaited
    pub fn is_active(&self, key: &ObjectKey) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.get(key) {
            Some(slot) if Arc::strong_count(slot) > 1 => true,
            Some(_) => {
                slots.remove(key);
                false
            }
            None => false,
        }
    }

    fn slot(&self, key: &ObjectKey) -> SlotRef {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone();
        SlotRef {
            key: key.clone(),
            slots: self.slots.clone(),
            slot,
        }
    }

    fn lease(&self, key: &ObjectKey, guard: OwnedMutexGuard<()>) -> KeyLease {
        KeyLease {
            key: key.clone(),
            slots: self.slots.clone(),
            guard: Some(guard),
        }
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune(&self.slots, &self.key);
    }
}

/// Remove `key`'s slot once the map holds the only reference to it
fn prune(slots: &Slots, key: &ObjectKey) {
    let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
    if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
        slots.remove(key);
    }
}

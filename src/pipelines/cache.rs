use crate::error::Result;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

// One slot per (type, key). The slot mutex is held for the whole load, so concurrent
// first loads of the same key run the loader once and the other callers wait for it.
// Slots store WEAK references - bundles are freed when all pipelines using them drop.
type Slot = Arc<Mutex<Option<Weak<dyn Any + Send + Sync>>>>;
type CacheStorage = HashMap<(TypeId, String), Slot>;

/// Keyed cache of loaded artifact bundles.
pub struct ArtifactCache {
    slots: Mutex<CacheStorage>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the live value for `key`, or run `loader` to create it.
    ///
    /// At most one loader runs per key at a time. If it fails the slot is dropped and the
    /// error goes to the caller that ran it.
    pub fn get_or_create<M, F>(&self, key: &str, loader: F) -> Result<Arc<M>>
    where
        M: Send + Sync + 'static,
        F: FnOnce() -> Result<M>,
    {
        let map_key = (TypeId::of::<M>(), key.to_string());
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            prune(&mut slots);
            slots
                .entry(map_key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone()
        };

        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(strong) = entry
            .as_ref()
            .and_then(Weak::upgrade)
            .and_then(|any| any.downcast::<M>().ok())
        {
            return Ok(strong);
        }

        // Weak ref dead or slot never filled
        *entry = None;
        match loader() {
            Ok(value) => {
                let value = Arc::new(value);
                let weak: Weak<dyn Any + Send + Sync> = Arc::<M>::downgrade(&value);
                *entry = Some(weak);
                Ok(value)
            }
            Err(err) => {
                // Callers only clone slots under the map lock, so the count is stable here.
                let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
                let unshared = slots
                    .get(&map_key)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot))
                    && Arc::strong_count(&slot) == 2;
                if unshared {
                    slots.remove(&map_key);
                }
                Err(err)
            }
        }
    }

    /// Drop every entry stored under `key`. Returns whether anything was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|(_, k), _| k != key);
        slots.len() != before
    }

    pub fn clear(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.clear();
    }

    /// Number of keys whose bundle is still alive or currently loading.
    pub fn len(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut slots);
        slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Drop slots nobody is loading or waiting on whose bundle has been freed.
fn prune(slots: &mut CacheStorage) {
    slots.retain(|_, slot| {
        if Arc::strong_count(slot) > 1 {
            return true;
        }
        let entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        entry.as_ref().is_some_and(|weak| weak.strong_count() > 0)
    });
}

impl Default for ArtifactCache {
    fn default() -> Self {
        Self::new()
    }
}

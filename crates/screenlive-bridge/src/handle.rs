//! Generational handle tables.
//!
//! A handle packs a slot index (stored +1, so 0 is never valid) in the low
//! 32 bits and the slot generation in the high 32 bits. Removing an entry
//! bumps the slot generation, so a stale handle never resolves to whatever
//! reuses the slot later.

use parking_lot::Mutex;
use std::sync::Arc;

/// Opaque handle value. 0 is the null handle.
pub type Handle = u64;

pub const NULL_HANDLE: Handle = 0;

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

struct Inner<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
}

/// Thread-safe table mapping handles to shared instances.
pub struct HandleTable<T> {
    inner: Mutex<Inner<T>>,
}

fn pack(index: usize, generation: u32) -> Handle {
    ((generation as u64) << 32) | (index as u64 + 1)
}

fn unpack(handle: Handle) -> Option<(usize, u32)> {
    let low = handle & 0xFFFF_FFFF;
    if low == 0 {
        return None;
    }
    Some(((low - 1) as usize, (handle >> 32) as u32))
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                free: Vec::new(),
            }),
        }
    }

    /// Store `value` and return its handle.
    pub fn insert(&self, value: T) -> Handle {
        let mut inner = self.inner.lock();
        let value = Some(Arc::new(value));
        match inner.free.pop() {
            Some(index) => {
                let slot = &mut inner.slots[index];
                slot.value = value;
                pack(index, slot.generation)
            }
            None => {
                let index = inner.slots.len();
                inner.slots.push(Slot {
                    generation: 0,
                    value,
                });
                pack(index, 0)
            }
        }
    }

    /// Resolve a handle. Stale, removed and null handles give `None`.
    pub fn get(&self, handle: Handle) -> Option<Arc<T>> {
        let (index, generation) = unpack(handle)?;
        let inner = self.inner.lock();
        let slot = inner.slots.get(index)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.clone()
    }

    /// Remove a handle, returning the instance if it was live.
    ///
    /// The generation is bumped before the instance is handed back, so
    /// teardown never races a lookup through the same handle.
    pub fn remove(&self, handle: Handle) -> Option<Arc<T>> {
        let (index, generation) = unpack(handle)?;
        let mut inner = self.inner.lock();
        let slot = inner.slots.get_mut(index)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        inner.free.push(index);
        Some(value)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.slots.len() - inner.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

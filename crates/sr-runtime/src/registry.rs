use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::HandleSpaceExhausted;
use crate::handle::Handle;

/// Process-wide table from opaque handles to shared ownership of sessions.
///
/// The lock is only ever held for a single map operation; nothing blocks or
/// calls into the engine while holding it. Handles are minted from two
/// monotonic counters and never reused: once either counter reaches its
/// maximum, every further insert is refused.
pub struct Registry<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    entries: HashMap<Handle, Arc<T>>,
    generation: u32,
    slot: u32,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::starting_at(0, 0)
    }

    /// Create a registry whose counters resume from the given values; the
    /// next handle uses `generation + 1` and `slot + 1`.
    pub fn starting_at(generation: u32, slot: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                generation,
                slot,
            }),
        }
    }

    /// Store `value` and return its freshly minted handle.
    pub fn insert(&self, value: Arc<T>) -> Result<Handle, HandleSpaceExhausted> {
        let mut inner = self.inner.lock();
        let exhausted = HandleSpaceExhausted {
            generation: inner.generation,
            slot: inner.slot,
        };

        let (Some(generation), Some(slot)) =
            (inner.generation.checked_add(1), inner.slot.checked_add(1))
        else {
            tracing::error!(
                generation = inner.generation,
                slot = inner.slot,
                "handle counters exhausted, refusing insert"
            );
            return Err(exhausted);
        };
        let handle = Handle::from_parts(generation, slot).ok_or(exhausted)?;

        inner.generation = generation;
        inner.slot = slot;
        inner.entries.insert(handle, value);
        Ok(handle)
    }

    /// A new shared reference to the entry, or `None` if the handle was never
    /// issued or has been erased.
    pub fn lookup(&self, handle: Handle) -> Option<Arc<T>> {
        self.inner.lock().entries.get(&handle).cloned()
    }

    /// Remove the entry and hand the table's reference to the caller.
    ///
    /// Only discoverability goes away; holders of earlier lookups keep theirs.
    pub fn erase(&self, handle: Handle) -> Option<Arc<T>> {
        self.inner.lock().entries.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the live handles, in no particular order.
    pub fn handles(&self) -> Vec<Handle> {
        self.inner.lock().entries.keys().copied().collect()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

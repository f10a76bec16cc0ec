//! Process-scoped, lazily constructed clients (store handle, LLM provider).
//!
//! Construction happens on first use and is memoized; `reset` drops the cached
//! value so tests can swap environments.

use std::sync::Mutex;

pub struct Memo<T: Clone> {
    slot: Mutex<Option<T>>,
}

impl<T: Clone> Memo<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Return the cached value, or build it with `init` while holding the lock.
    /// A failed `init` leaves the slot empty so the next call tries again.
    pub fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(v) = slot.as_ref() {
            return Ok(v.clone());
        }
        let v = init()?;
        *slot = Some(v.clone());
        Ok(v)
    }

    pub fn reset(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        slot.take();
    }

    pub fn is_initialized(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }
}

impl<T: Clone> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

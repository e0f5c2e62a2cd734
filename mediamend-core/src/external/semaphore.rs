// ============================================================================
// mediamend-core/src/external/semaphore.rs
// ============================================================================
//
// SEMAPHORE: Counting Permits for Tool Invocations
//
// A blocking counting semaphore built on Mutex + Condvar. Permits are owned
// values that release their slot on drop, so a permit can be moved into the
// thread that actually runs a tool and outlive the caller's timeout.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

#[derive(Debug)]
pub struct Semaphore {
    available: Mutex<usize>,
    released: Condvar,
    capacity: usize,
}

impl Semaphore {
    /// Creates a semaphore with `capacity` permits (at least one).
    pub fn new(capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            available: Mutex::new(capacity),
            released: Condvar::new(),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        *self.lock()
    }

    /// Blocks until a permit is free.
    pub fn acquire(self: &Arc<Self>) -> Permit {
        let mut available = self.lock();
        while *available == 0 {
            available = self
                .released
                .wait(available)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        *available -= 1;
        Permit {
            semaphore: Arc::clone(self),
        }
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut available = self.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(Permit {
            semaphore: Arc::clone(self),
        })
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        // The counter stays consistent even if a holder panicked.
        self.available
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release(&self) {
        let mut available = self.lock();
        *available += 1;
        self.released.notify_one();
    }
}

/// An acquired slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct Permit {
    semaphore: Arc<Semaphore>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

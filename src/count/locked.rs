//! Mutex-protected reference counter.

use core::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{RefCount, MAX_REFCOUNT};
use crate::RefCountError;

/// A reference count guarded by a `Mutex`.
///
/// Slower than [`AtomicRefCount`](super::AtomicRefCount) but every update is
/// a plain critical section, which is what hosts that already serialize
/// their objects on a lock tend to want. The mutex also orders the 1 to 0
/// transition after every earlier release.
#[derive(Default)]
pub struct LockedRefCount {
    count: Mutex<usize>,
}

impl LockedRefCount {
    /// Creates a counter with no owners.
    pub const fn new() -> Self {
        Self {
            count: Mutex::new(0),
        }
    }

    // Poisoned locks are recovered.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for LockedRefCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LockedRefCount").field(&self.count()).finish()
    }
}

unsafe impl RefCount for LockedRefCount {
    fn try_incref(&self) -> Result<(), RefCountError> {
        let mut count = self.lock();
        if *count >= MAX_REFCOUNT {
            return Err(RefCountError::Overflow);
        }
        *count += 1;
        Ok(())
    }

    unsafe fn decref(&self) -> Result<bool, RefCountError> {
        let mut count = self.lock();
        if *count == 0 {
            return Err(RefCountError::Unreferenced);
        }
        *count -= 1;
        Ok(*count == 0)
    }

    fn count(&self) -> usize {
        *self.lock()
    }
}

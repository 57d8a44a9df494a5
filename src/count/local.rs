//! Single-threaded reference counter.

use core::cell::Cell;
use core::fmt;

use super::{RefCount, MAX_REFCOUNT};
use crate::RefCountError;

/// A `Cell<usize>` reference count.
///
/// `Cell` is not `Sync`, so any object embedding this counter is not `Sync`
/// either and its handles can't be sent to another thread.
#[derive(Default)]
pub struct LocalRefCount {
    count: Cell<usize>,
}

impl LocalRefCount {
    /// Creates a counter with no owners.
    pub const fn new() -> Self {
        Self {
            count: Cell::new(0),
        }
    }
}

impl fmt::Debug for LocalRefCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalRefCount").field(&self.count.get()).finish()
    }
}

unsafe impl RefCount for LocalRefCount {
    #[inline]
    fn try_incref(&self) -> Result<(), RefCountError> {
        let count = self.count.get();
        if count >= MAX_REFCOUNT {
            return Err(RefCountError::Overflow);
        }
        self.count.set(count + 1);
        Ok(())
    }

    #[inline]
    unsafe fn decref(&self) -> Result<bool, RefCountError> {
        let count = self
            .count
            .get()
            .checked_sub(1)
            .ok_or(RefCountError::Unreferenced)?;
        self.count.set(count);
        Ok(count == 0)
    }

    #[inline]
    fn count(&self) -> usize {
        self.count.get()
    }
}

#[cfg(test)]
mod tests {
    use super::LocalRefCount;
    use crate::count::{RefCount, MAX_REFCOUNT};
    use crate::RefCountError;

    #[test]
    fn test_sequence() {
        let c = LocalRefCount::new();
        assert_eq!(c.count(), 0);
        c.incref();
        c.incref();
        assert_eq!(unsafe { c.decref() }, Ok(false));
        assert_eq!(c.count(), 1);
        assert_eq!(unsafe { c.decref() }, Ok(true));
        assert_eq!(unsafe { c.decref() }, Err(RefCountError::Unreferenced));
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn test_overflow() {
        let c = LocalRefCount::new();
        c.count.set(MAX_REFCOUNT);
        assert_eq!(c.try_incref(), Err(RefCountError::Overflow));
        assert_eq!(c.count(), MAX_REFCOUNT);
    }
}

//! Lock-free reference counter.

use core::fmt;

use super::{RefCount, MAX_REFCOUNT};
use crate::sync::{fence, AtomicUsize, Ordering};
use crate::RefCountError;

/// An `AtomicUsize` reference count.
///
/// Increments are `Relaxed`: a new owner can only be created from an existing
/// one, which already keeps the object alive. Decrements are `Release`, and
/// the decrement that reaches zero is followed by an `Acquire` fence so the
/// destroying thread sees every write made through the other handles.
#[repr(transparent)]
pub struct AtomicRefCount {
    count: AtomicUsize,
}

impl AtomicRefCount {
    /// Creates a counter with no owners.
    #[cfg(not(loom))]
    #[inline]
    pub const fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }

    /// Creates a counter with no owners.
    #[cfg(loom)]
    pub fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }

    #[cfg(all(test, not(loom)))]
    pub(crate) const fn with_count(count: usize) -> Self {
        Self {
            count: AtomicUsize::new(count),
        }
    }
}

impl Default for AtomicRefCount {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AtomicRefCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicRefCount").field(&self.count()).finish()
    }
}

unsafe impl RefCount for AtomicRefCount {
    #[inline]
    fn try_incref(&self) -> Result<(), RefCountError> {
        let old = self.count.fetch_add(1, Ordering::Relaxed);
        if old >= MAX_REFCOUNT {
            self.count.fetch_sub(1, Ordering::Relaxed);
            return Err(RefCountError::Overflow);
        }
        Ok(())
    }

    #[inline]
    unsafe fn decref(&self) -> Result<bool, RefCountError> {
        let mut current = self.count.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return Err(RefCountError::Unreferenced);
            }
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        if current != 1 {
            return Ok(false);
        }
        fence(Ordering::Acquire);
        Ok(true)
    }

    #[inline]
    fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::AtomicRefCount;
    use crate::count::{RefCount, MAX_REFCOUNT};
    use crate::RefCountError;

    #[test]
    fn test_starts_at_zero() {
        let c = AtomicRefCount::new();
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn test_last_decref_reports_unreferenced() {
        let c = AtomicRefCount::new();
        c.incref();
        c.incref();
        assert_eq!(c.count(), 2);
        assert_eq!(unsafe { c.decref() }, Ok(false));
        assert_eq!(unsafe { c.decref() }, Ok(true));
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn test_decref_of_zero_is_refused() {
        let c = AtomicRefCount::new();
        assert_eq!(unsafe { c.decref() }, Err(RefCountError::Unreferenced));
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn test_overflow_is_refused() {
        let c = AtomicRefCount::with_count(MAX_REFCOUNT);
        assert_eq!(c.try_incref(), Err(RefCountError::Overflow));
        assert_eq!(c.count(), MAX_REFCOUNT);
        assert_eq!(unsafe { c.decref() }, Ok(false));
        assert_eq!(c.try_incref(), Ok(()));
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let c = AtomicRefCount::new();
        c.incref();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..10_000 {
                        c.incref();
                    }
                    for _ in 0..9_000 {
                        assert_eq!(unsafe { c.decref() }, Ok(false));
                    }
                });
            }
        });
        assert_eq!(c.count(), 1 + 8 * 1_000);
    }

    #[test]
    fn test_debug_shows_count() {
        let c = AtomicRefCount::new();
        c.incref();
        assert_eq!(format!("{c:?}"), "AtomicRefCount(1)");
    }
}

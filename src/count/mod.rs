//! Intrusive reference counters.
//!
//! A counter is the piece of state an [`AutoObject`](crate::AutoObject) embeds
//! so that handles can share it. The synchronization strategy is pluggable:
//!
//! - [`AtomicRefCount`]: lock-free, the default for shared objects.
//! - [`LockedRefCount`]: every update happens under a mutex.
//! - [`LocalRefCount`]: a `Cell`, for objects that never leave their thread.
//!
//! Every counter starts at zero, refuses to go negative and refuses to grow
//! past [`MAX_REFCOUNT`]. None of them implement `Clone` or `Copy`, which keeps
//! an object embedding one from being duplicated by value.
//!
//! ```compile_fail
//! use autorc::AtomicRefCount;
//!
//! #[derive(Clone)]
//! struct Channel {
//!     count: AtomicRefCount,
//!     index: u32,
//! }
//! ```

pub mod atomic;
pub mod local;
pub mod locked;

pub use atomic::AtomicRefCount;
pub use local::LocalRefCount;
pub use locked::LockedRefCount;

use crate::RefCountError;

/// Largest count a counter will hold.
///
/// Same bound as `std::sync::Arc`: far beyond anything reachable without
/// leaking handles on purpose.
pub const MAX_REFCOUNT: usize = isize::MAX as usize;

/// A reference count embedded in a shared object.
///
/// # Safety
///
/// Handles rely on the following to decide when an object is destroyed:
/// - `decref` reports `Ok(true)` exactly once per transition from 1 to 0, and
///   never for any other update.
/// - Updates are never lost. Implementations that are `Sync` must make
///   `incref` and `decref` atomic with respect to each other.
/// - The 1 to 0 transition synchronizes with every earlier decrement, so the
///   thread that destroys the object observes all writes made through other
///   handles.
pub unsafe trait RefCount: Default {
    /// Adds an owner, refusing to grow past [`MAX_REFCOUNT`].
    ///
    /// # Errors
    ///
    /// Returns [`RefCountError::Overflow`] if the count is already at the
    /// maximum; the count is left unchanged.
    fn try_incref(&self) -> Result<(), RefCountError>;

    /// Removes an owner.
    ///
    /// Returns `Ok(true)` if this call brought the count to zero. The object
    /// is *not* destroyed here; that is the caller's job.
    ///
    /// # Errors
    ///
    /// Returns [`RefCountError::Unreferenced`] if the count is already zero;
    /// the count stays at zero.
    ///
    /// # Safety
    ///
    /// The caller must own one unit of the count, taken earlier with
    /// [`incref`](Self::incref) or [`try_incref`](Self::try_incref), and gives
    /// it up here. Removing a unit that belongs to a live handle lets that
    /// handle destroy the object while others still point to it.
    unsafe fn decref(&self) -> Result<bool, RefCountError>;

    /// Current number of owners.
    ///
    /// Only a snapshot: with other threads holding handles the value may be
    /// stale by the time it is read.
    fn count(&self) -> usize;

    /// Adds an owner.
    ///
    /// Aborts the process on overflow, as `Arc::clone` does. Continuing would
    /// let the count wrap and free a live object.
    #[inline]
    fn incref(&self) {
        if self.try_incref().is_err() {
            crate::trace::trace_event!(error, "reference count overflow, aborting");
            std::process::abort();
        }
    }
}

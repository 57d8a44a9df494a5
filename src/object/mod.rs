//! Objects that carry their own reference count.
//!
//! An object becomes shareable through [`AutoPtr`](crate::AutoPtr) by
//! embedding a [`RefCount`] and implementing [`AutoObject`], usually through
//! the [`auto_object!`](crate::auto_object) macro.
//!
//! ```rust
//! use autorc::{auto_object, AtomicRefCount, AutoPtr};
//!
//! struct Channel {
//!     count: AtomicRefCount,
//!     index: u32,
//! }
//!
//! auto_object!(Channel { count: AtomicRefCount });
//!
//! let a = AutoPtr::new(Channel { count: AtomicRefCount::new(), index: 3 });
//! let b = a.clone();
//! assert_eq!(b.index, 3);
//! assert_eq!(a.ref_count(), Some(2));
//! ```
//!
//! Polymorphic objects go through a trait that fixes the counter type:
//!
//! ```rust
//! use autorc::{auto_object, AtomicRefCount, AutoObject, AutoPtr};
//!
//! trait Device: AutoObject<Count = AtomicRefCount> {
//!     fn name(&self) -> &str;
//! }
//!
//! struct Amplifier {
//!     count: AtomicRefCount,
//! }
//!
//! auto_object!(Amplifier { count: AtomicRefCount });
//!
//! impl Device for Amplifier {
//!     fn name(&self) -> &str {
//!         "amp"
//!     }
//! }
//!
//! let device: AutoPtr<dyn Device> =
//!     AutoPtr::from_box(Box::new(Amplifier { count: AtomicRefCount::new() }));
//! assert_eq!(device.name(), "amp");
//! ```

mod macros;

use crate::count::RefCount;
use crate::RefCountError;

/// An object whose lifetime is governed by an embedded reference count.
///
/// Objects are created with a count of zero; the first handle that points to
/// one establishes a count of 1. When the last handle lets go, the handle
/// rebuilds the owning `Box` and passes it to [`unreferenced`](Self::unreferenced),
/// which by default drops it. Application code never destroys an object
/// directly.
///
/// # Safety
///
/// `ref_count` must return the same counter, embedded in `self`, for the
/// whole life of the object.
pub unsafe trait AutoObject {
    /// The counter strategy this object embeds.
    type Count: RefCount;

    /// The embedded counter.
    fn ref_count(&self) -> &Self::Count;

    /// Adds an owner.
    #[inline]
    fn incref(&self) {
        self.ref_count().incref();
    }

    /// Removes an owner, returning `Ok(true)` when nobody references the
    /// object any more. Does not destroy it.
    ///
    /// # Errors
    ///
    /// [`RefCountError::Unreferenced`] if the count is already zero.
    ///
    /// # Safety
    ///
    /// Same contract as [`RefCount::decref`]: the caller gives up a unit of
    /// the count it owns. Handles do this themselves, so code holding an
    /// [`AutoPtr`](crate::AutoPtr) never needs to.
    ///
    /// ```compile_fail
    /// use autorc::{auto_object, AtomicRefCount, AutoObject, AutoPtr};
    ///
    /// struct Gauge {
    ///     count: AtomicRefCount,
    /// }
    ///
    /// auto_object!(Gauge { count: AtomicRefCount });
    ///
    /// let a = AutoPtr::new(Gauge { count: AtomicRefCount::new() });
    /// let _ = a.decref();
    /// ```
    #[inline]
    unsafe fn decref(&self) -> Result<bool, RefCountError> {
        unsafe { self.ref_count().decref() }
    }

    /// Release policy, run once the count has reached zero.
    ///
    /// Drops the object by default. Override it to hand the box to a
    /// [`Reclaimer`](crate::Reclaimer) or to return it to a pool.
    fn unreferenced(self: Box<Self>) {
        drop(self);
    }
}

//! # `autorc` - Intrusive Reference-Counted Handles
//!
//! Shared ownership for objects that carry their own reference count, with an
//! external handle type that does the counting. This is the classic
//! "auto object / auto object pointer" pair used by C and C++ libraries to
//! pass polymorphic objects across a library boundary, expressed with Rust
//! ownership rules.
//!
//! ## Pieces
//!
//! 1. **Counters** ([`AtomicRefCount`], [`LockedRefCount`], [`LocalRefCount`]):
//!    the intrusive count. Starts at zero, never goes negative, is neither
//!    `Clone` nor `Copy`.
//! 2. **Objects** ([`AutoObject`]): a type embedding a counter. The trait
//!    separates "the count reached zero" from "destroy the object", so each
//!    type picks its own release policy.
//! 3. **Handles** ([`AutoPtr`]): a pointer-sized, possibly empty owner. Binding
//!    adds one to the count, releasing removes one, and the release that
//!    reaches zero destroys the object exactly once.
//! 4. **Deferred release** ([`Reclaimer`]): a lock-free backlog for objects
//!    whose destruction should happen later, on a thread of the owner's
//!    choosing.
//!
//! ## Guarantees
//!
//! - Counter updates are atomic (or made under a lock) for every `Sync`
//!   counter; no update is lost under contention.
//! - An object is destroyed exactly once, on the decrement that takes its
//!   count from 1 to 0, and never while a handle to it is alive.
//! - Handles to objects with a single-threaded counter are not `Send`; the
//!   compiler keeps them on their thread.
//!
//! ## Example
//!
//! ```rust
//! use autorc::{auto_object, AtomicRefCount, AutoPtr};
//!
//! struct Channel {
//!     count: AtomicRefCount,
//!     rate_hz: u32,
//! }
//!
//! auto_object!(Channel { count: AtomicRefCount });
//!
//! let a = AutoPtr::new(Channel { count: AtomicRefCount::new(), rate_hz: 1000 });
//! let mut b: AutoPtr<Channel> = AutoPtr::null();
//! b.assign(&a);
//! assert_eq!(a.ref_count(), Some(2));
//!
//! b.unpoint();
//! assert_eq!(a.ref_count(), Some(1));
//! assert_eq!(a.rate_hz, 1000);
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod error;
mod sync;
mod trace;

pub mod count;
pub mod object;
pub mod ptr;
pub mod reclaim;

pub use count::{AtomicRefCount, LocalRefCount, LockedRefCount, RefCount, MAX_REFCOUNT};
pub use error::RefCountError;
pub use object::AutoObject;
pub use ptr::AutoPtr;
pub use reclaim::{ReclaimConfig, ReclaimStats, Reclaimer};

// Compile-time assertions for memory layout
const _: () = {
    use core::mem;

    #[allow(dead_code)]
    struct Probe {
        count: AtomicRefCount,
    }

    auto_object!(Probe { count: AtomicRefCount });

    trait Dyn: AutoObject<Count = AtomicRefCount> {}

    // An empty handle is the null niche of the pointer.
    assert!(mem::size_of::<AutoPtr<Probe>>() == mem::size_of::<*mut Probe>());
    assert!(mem::size_of::<AutoPtr<dyn Dyn>>() == mem::size_of::<*mut dyn Dyn>());

    // The counter adds nothing beyond its integer.
    #[cfg(not(loom))]
    assert!(mem::size_of::<AtomicRefCount>() == mem::size_of::<usize>());
};

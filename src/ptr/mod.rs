//! `AutoPtr`, the handle side of the intrusive count.
//!
//! Each live, non-empty handle accounts for exactly one unit of its target's
//! count. Binding adds one, releasing removes one, and the release that
//! brings the count to zero destroys the target before returning.

use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ops::Deref;
use core::ptr::NonNull;

use crate::count::RefCount;
use crate::trace::trace_event;
use crate::AutoObject;

/// A shared-ownership handle to a heap-allocated [`AutoObject`].
///
/// Unlike `Arc`, the count lives inside the object, and a handle may be
/// empty ("unpointed"). `AutoPtr<T>` is a single pointer wide.
///
/// A handle is `Send` and `Sync` only when `T` is both. Objects with a
/// [`LocalRefCount`](crate::LocalRefCount) stay on their thread:
///
/// ```compile_fail
/// use std::thread;
/// use autorc::{auto_object, AutoPtr, LocalRefCount};
///
/// struct Cursor {
///     count: LocalRefCount,
/// }
///
/// auto_object!(Cursor { count: LocalRefCount });
///
/// let h = AutoPtr::new(Cursor { count: LocalRefCount::new() });
/// thread::spawn(move || drop(h));
/// ```
pub struct AutoPtr<T: ?Sized + AutoObject> {
    target: Option<NonNull<T>>,
    _owns: PhantomData<T>,
}

// A handle hands out `&T` on any thread and may destroy `T` on any thread.
unsafe impl<T: ?Sized + AutoObject + Send + Sync> Send for AutoPtr<T> {}
unsafe impl<T: ?Sized + AutoObject + Send + Sync> Sync for AutoPtr<T> {}

impl<T: ?Sized + AutoObject> AutoPtr<T> {
    /// Creates an empty handle.
    #[inline]
    pub const fn null() -> Self {
        Self {
            target: None,
            _owns: PhantomData,
        }
    }

    /// Moves `value` to the heap and points a new handle at it.
    pub fn new(value: T) -> Self
    where
        T: Sized,
    {
        Self::from_box(Box::new(value))
    }

    /// Takes ownership of a boxed object and points a new handle at it.
    ///
    /// This is how trait objects are made shareable:
    /// `AutoPtr::<dyn Device>::from_box(Box::new(amp))`.
    pub fn from_box(object: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(object));
        // SAFETY: just leaked, so valid.
        unsafe { ptr.as_ref() }.incref();
        Self::adopt(Some(ptr))
    }

    /// Points a new handle at `ptr`, adding an owner. A null pointer gives an
    /// empty handle.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must point to a live object that was allocated as a
    /// `Box<T>` and handed over to the reference-counting protocol (through
    /// [`Box::into_raw`], [`as_ptr`](Self::as_ptr) or [`into_raw`](Self::into_raw)).
    /// Nothing may free it other than the last handle.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        let target = NonNull::new(ptr);
        if let Some(p) = target {
            p.as_ref().incref();
        }
        Self::adopt(target)
    }

    /// Rebuilds a handle from [`into_raw`](Self::into_raw) without touching
    /// the count.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_raw` (or otherwise carry one unit of the
    /// count that nobody else will release), and may only be adopted once.
    pub unsafe fn from_raw_owned(ptr: *mut T) -> Self {
        Self::adopt(NonNull::new(ptr))
    }

    #[inline]
    fn adopt(target: Option<NonNull<T>>) -> Self {
        Self {
            target,
            _owns: PhantomData,
        }
    }

    /// Gives up the handle without releasing its unit of the count.
    ///
    /// The reference is leaked until it is handed back to
    /// [`from_raw_owned`](Self::from_raw_owned).
    pub fn into_raw(self) -> Option<NonNull<T>> {
        ManuallyDrop::new(self).target
    }

    /// Rebinds this handle to `ptr`.
    ///
    /// The old target is released as [`unpoint`](Self::unpoint) would, and
    /// `ptr` gains an owner. Rebinding to the current target changes nothing.
    /// The new target is counted before the old one is released, so an old
    /// target that owns the only other reference to the new one can't take
    /// it down on the way out.
    ///
    /// # Safety
    ///
    /// Same contract as [`from_raw`](Self::from_raw).
    pub unsafe fn point(&mut self, ptr: *mut T) {
        let target = NonNull::new(ptr);
        if same_target(self.target, target) {
            return;
        }
        if let Some(p) = target {
            p.as_ref().incref();
        }
        if let Some(old) = mem::replace(&mut self.target, target) {
            Self::release(old);
        }
    }

    /// Releases the target, leaving the handle empty.
    ///
    /// If this was the last owner the target is destroyed, through its
    /// [release policy](AutoObject::unreferenced), before this returns.
    pub fn unpoint(&mut self) {
        if let Some(ptr) = self.target.take() {
            // SAFETY: a non-empty handle owns one unit of a live target.
            unsafe { Self::release(ptr) };
        }
    }

    /// Makes this handle share `other`'s target (`self = other`).
    ///
    /// Assigning from a handle that already shares the target is a no-op, so
    /// the count never dips to zero on the way.
    pub fn assign(&mut self, other: &Self) {
        match other.target {
            // SAFETY: `other` keeps its target alive while we count it.
            Some(p) => unsafe { self.point(p.as_ptr()) },
            None => self.unpoint(),
        }
    }

    /// Moves the target out into a new handle, leaving this one empty. The
    /// count is unchanged.
    pub fn take(&mut self) -> Self {
        Self::adopt(self.target.take())
    }

    /// Whether the handle is empty.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.target.is_none()
    }

    /// The raw target, `None` when empty. The count is unchanged.
    #[inline]
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.target
    }

    /// Borrows the target, `None` when empty.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        // SAFETY: our unit of the count keeps the target alive for `&self`.
        self.target.map(|p| unsafe { &*p.as_ptr() })
    }

    /// Mutably borrows the target if this handle is its only owner.
    ///
    /// # Safety
    ///
    /// The borrow reaches the embedded counter. The caller must not replace
    /// or reset it (for example by assigning a fresh counter or the whole
    /// object), since the handle still owns one unit of it.
    ///
    /// ```compile_fail
    /// use autorc::{auto_object, AtomicRefCount, AutoPtr};
    ///
    /// struct Gauge {
    ///     count: AtomicRefCount,
    /// }
    ///
    /// auto_object!(Gauge { count: AtomicRefCount });
    ///
    /// let mut a = AutoPtr::new(Gauge { count: AtomicRefCount::new() });
    /// if let Some(g) = a.get_mut() {
    ///     g.count = AtomicRefCount::new();
    /// }
    /// ```
    pub unsafe fn get_mut(&mut self) -> Option<&mut T> {
        let ptr = self.target?;
        // SAFETY: live while we hold our unit.
        if unsafe { ptr.as_ref() }.ref_count().count() != 1 {
            return None;
        }
        // SAFETY: a count of 1 is our own unit; no other handle can reach it.
        Some(unsafe { &mut *ptr.as_ptr() })
    }

    /// Current count of the target, `None` when empty.
    pub fn ref_count(&self) -> Option<usize> {
        self.get().map(|t| t.ref_count().count())
    }

    /// Takes the object back out of the counting protocol if this handle is
    /// its only owner. Otherwise hands the handle back unchanged.
    ///
    /// # Errors
    ///
    /// Returns `self` when empty or shared.
    pub fn try_unwrap(mut self) -> Result<Box<T>, Self> {
        let Some(ptr) = self.target else {
            return Err(self);
        };
        // SAFETY: live while we hold our unit.
        let object = unsafe { ptr.as_ref() };
        if object.ref_count().count() != 1 {
            return Err(self);
        }
        // SAFETY: gives up the unit this handle owns; on `Ok(false)` it is
        // taken back below.
        match unsafe { object.decref() } {
            Ok(true) => {
                self.target = None;
                // SAFETY: the count is zero and we were the last owner, so we
                // own the box again.
                Ok(unsafe { Box::from_raw(ptr.as_ptr()) })
            }
            Ok(false) => {
                object.incref();
                Err(self)
            }
            Err(_) => Err(self),
        }
    }

    /// Whether two handles share a target. Two empty handles compare equal.
    #[inline]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        same_target(a.target, b.target)
    }

    /// # Safety
    ///
    /// `ptr` must be a live target carrying one unit of the count owned by
    /// the caller, which gives that unit up.
    unsafe fn release(ptr: NonNull<T>) {
        match ptr.as_ref().decref() {
            Ok(false) => {}
            Ok(true) => {
                trace_event!(trace, object = ?ptr, "last handle released, destroying");
                Box::from_raw(ptr.as_ptr()).unreferenced();
            }
            Err(_err) => {
                // Decremented outside the handles. The object is leaked.
                trace_event!(error, object = ?ptr, err = %_err, "handle released an uncounted object");
            }
        }
    }
}

#[inline]
fn same_target<T: ?Sized>(a: Option<NonNull<T>>, b: Option<NonNull<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.as_ptr().cast::<u8>() == b.as_ptr().cast::<u8>(),
        (None, None) => true,
        _ => false,
    }
}

impl<T: ?Sized + AutoObject> Clone for AutoPtr<T> {
    fn clone(&self) -> Self {
        if let Some(p) = self.target {
            // SAFETY: `self` keeps the target alive.
            unsafe { p.as_ref() }.incref();
        }
        Self::adopt(self.target)
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign(source);
    }
}

impl<T: ?Sized + AutoObject> Drop for AutoPtr<T> {
    #[inline]
    fn drop(&mut self) {
        self.unpoint();
    }
}

impl<T: ?Sized + AutoObject> Default for AutoPtr<T> {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized + AutoObject> Deref for AutoPtr<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is empty. Use [`get`](AutoPtr::get) to check.
    #[inline]
    #[track_caller]
    fn deref(&self) -> &T {
        match self.get() {
            Some(target) => target,
            None => unpointed(),
        }
    }
}

#[cold]
#[track_caller]
fn unpointed() -> ! {
    panic!("dereferenced an unpointed AutoPtr")
}

impl<T: ?Sized + AutoObject> From<Box<T>> for AutoPtr<T> {
    fn from(object: Box<T>) -> Self {
        Self::from_box(object)
    }
}

impl<T: ?Sized + AutoObject + fmt::Debug> fmt::Debug for AutoPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(target) => f.debug_tuple("AutoPtr").field(&target).finish(),
            None => f.write_str("AutoPtr(null)"),
        }
    }
}

impl<T: ?Sized + AutoObject> fmt::Pointer for AutoPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            Some(p) => fmt::Pointer::fmt(&p, f),
            None => fmt::Pointer::fmt(&core::ptr::null::<u8>(), f),
        }
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::AutoPtr;
    use crate::count::{LocalRefCount, RefCount};
    use crate::AutoObject;

    #[derive(Debug)]
    struct Node {
        count: LocalRefCount,
        value: u32,
        drops: Rc<Cell<u32>>,
    }

    crate::auto_object!(Node { count: LocalRefCount });

    impl Drop for Node {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    fn node(value: u32, drops: &Rc<Cell<u32>>) -> Node {
        Node {
            count: LocalRefCount::new(),
            value,
            drops: drops.clone(),
        }
    }

    #[test]
    fn test_null_handle() {
        let h: AutoPtr<Node> = AutoPtr::null();
        assert!(h.is_null());
        assert!(h.get().is_none());
        assert_eq!(h.ref_count(), None);
        assert!(AutoPtr::ptr_eq(&h, &AutoPtr::default()));
        assert_eq!(format!("{h:?}"), "AutoPtr(null)");
    }

    #[test]
    #[should_panic(expected = "dereferenced an unpointed AutoPtr")]
    fn test_deref_null_panics() {
        let h: AutoPtr<Node> = AutoPtr::null();
        let _value: u32 = h.value;
    }

    #[test]
    fn test_new_counts_one() {
        let drops = Rc::new(Cell::new(0));
        let h = AutoPtr::new(node(5, &drops));
        assert_eq!(h.ref_count(), Some(1));
        assert_eq!(h.value, 5);
        drop(h);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_from_raw_null_is_empty() {
        let h: AutoPtr<Node> = unsafe { AutoPtr::from_raw(core::ptr::null_mut()) };
        assert!(h.is_null());
    }

    #[test]
    fn test_from_raw_adds_owner() {
        let drops = Rc::new(Cell::new(0));
        let raw = Box::into_raw(Box::new(node(1, &drops)));
        let a = unsafe { AutoPtr::from_raw(raw) };
        let b = unsafe { AutoPtr::from_raw(raw) };
        assert_eq!(a.ref_count(), Some(2));
        drop(a);
        assert_eq!(drops.get(), 0);
        drop(b);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_into_raw_round_trip_keeps_count() {
        let drops = Rc::new(Cell::new(0));
        let a = AutoPtr::new(node(1, &drops));
        let raw = a.into_raw().map(|p| p.as_ptr());
        assert_eq!(drops.get(), 0);
        let b = unsafe { AutoPtr::from_raw_owned(raw.unwrap_or(core::ptr::null_mut())) };
        assert_eq!(b.ref_count(), Some(1));
        drop(b);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_take_moves_ownership() {
        let drops = Rc::new(Cell::new(0));
        let mut a = AutoPtr::new(node(1, &drops));
        let b = a.take();
        assert!(a.is_null());
        assert_eq!(b.ref_count(), Some(1));
        drop(a);
        assert_eq!(drops.get(), 0);
        drop(b);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_get_mut_only_when_unique() {
        let drops = Rc::new(Cell::new(0));
        let mut a = AutoPtr::new(node(1, &drops));
        if let Some(n) = unsafe { a.get_mut() } {
            n.value = 9;
        }
        assert_eq!(a.value, 9);
        let b = a.clone();
        assert!(unsafe { a.get_mut() }.is_none());
        drop(b);
        assert!(unsafe { a.get_mut() }.is_some());
    }

    #[test]
    fn test_release_of_uncounted_object_leaks() {
        let drops = Rc::new(Cell::new(0));
        let a = AutoPtr::new(node(3, &drops));
        let raw = a.as_ptr();
        // Take the handle's unit away behind its back.
        assert_eq!(unsafe { a.decref() }, Ok(true));

        // The release sees an underflow: no panic, no destruction.
        drop(a);
        assert_eq!(drops.get(), 0);

        let leaked = raw.map(|p| unsafe { Box::from_raw(p.as_ptr()) });
        assert_eq!(leaked.as_ref().map(|n| n.count.count()), Some(0));
        drop(leaked);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_try_unwrap() {
        let drops = Rc::new(Cell::new(0));
        let a = AutoPtr::new(node(4, &drops));
        let b = a.clone();
        let a = match a.try_unwrap() {
            Ok(_) => panic!("shared handle must not unwrap"),
            Err(a) => a,
        };
        assert_eq!(a.ref_count(), Some(2));
        drop(b);
        let boxed = match a.try_unwrap() {
            Ok(boxed) => boxed,
            Err(_) => panic!("sole owner must unwrap"),
        };
        assert_eq!(boxed.value, 4);
        assert_eq!(boxed.count.count(), 0);
        assert_eq!(drops.get(), 0);
        drop(boxed);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_pointer_format() {
        let h: AutoPtr<Node> = AutoPtr::null();
        assert_eq!(format!("{h:p}"), format!("{:p}", core::ptr::null::<u8>()));
    }
}

/// Implements [`AutoObject`](crate::AutoObject) for a struct by naming the
/// field that holds its counter.
///
/// Generic structs are not supported; write the `unsafe impl` by hand for
/// those.
///
/// # Example
///
/// ```rust
/// use autorc::{auto_object, LockedRefCount, AutoPtr};
///
/// struct Session {
///     refs: LockedRefCount,
///     id: u64,
/// }
///
/// auto_object!(Session { refs: LockedRefCount });
///
/// let s = AutoPtr::new(Session { refs: LockedRefCount::new(), id: 7 });
/// assert_eq!(s.id, 7);
/// ```
#[macro_export]
macro_rules! auto_object {
    ($ty:ty { $field:ident : $count:ty $(,)? }) => {
        // SAFETY: the counter is a field of `Self`, so it is the same counter
        // for the whole life of the object.
        unsafe impl $crate::AutoObject for $ty {
            type Count = $count;

            #[inline]
            fn ref_count(&self) -> &Self::Count {
                &self.$field
            }
        }
    };
}

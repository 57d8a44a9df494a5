//! Errors reported by the low-level counter API.

/// A refused reference-count update.
///
/// Handle operations never return this; it surfaces only from
/// [`RefCount::try_incref`](crate::RefCount::try_incref) and
/// [`RefCount::decref`](crate::RefCount::decref).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefCountError {
    /// A decrement was requested on an object nobody references.
    Unreferenced,
    /// An increment would push the count past [`MAX_REFCOUNT`](crate::count::MAX_REFCOUNT).
    Overflow,
}

impl core::fmt::Display for RefCountError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unreferenced => f.write_str("decrementing ref count of unreferenced object"),
            Self::Overflow => f.write_str("reference count overflow"),
        }
    }
}

impl std::error::Error for RefCountError {}

#[cfg(test)]
mod tests {
    use super::RefCountError;

    #[test]
    fn test_display() {
        assert_eq!(
            RefCountError::Unreferenced.to_string(),
            "decrementing ref count of unreferenced object"
        );
        assert_eq!(RefCountError::Overflow.to_string(), "reference count overflow");
    }

    #[test]
    fn test_is_std_error() {
        let err: Box<dyn std::error::Error + Send + Sync> = Box::new(RefCountError::Overflow);
        assert!(err.source().is_none());
    }
}

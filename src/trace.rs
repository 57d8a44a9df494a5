//! Event hooks for the optional `tracing` feature.

/// Emits a `tracing` event at `$level` when the `tracing` feature is enabled,
/// and expands to nothing otherwise.
macro_rules! trace_event {
    ($level:ident, $($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        {
            tracing::$level!($($arg)+);
        }
    };
}

pub(crate) use trace_event;

//! Deferred destruction of unreferenced objects.
//!
//! By default the handle that drops the last reference destroys the object on
//! the spot. An object can instead override
//! [`AutoObject::unreferenced`](crate::AutoObject::unreferenced) and hand
//! itself to a [`Reclaimer`], which keeps it until the owner of the reclaimer
//! calls [`Reclaimer::reclaim`] (for example once per acquisition cycle, off
//! the hot path).
//!
//! ```rust
//! use std::sync::Arc;
//! use autorc::{AtomicRefCount, AutoObject, AutoPtr, Reclaimer};
//!
//! struct Frame {
//!     count: AtomicRefCount,
//!     reclaimer: Arc<Reclaimer>,
//! }
//!
//! unsafe impl AutoObject for Frame {
//!     type Count = AtomicRefCount;
//!
//!     fn ref_count(&self) -> &AtomicRefCount {
//!         &self.count
//!     }
//!
//!     fn unreferenced(self: Box<Self>) {
//!         let reclaimer = self.reclaimer.clone();
//!         reclaimer.defer(self);
//!     }
//! }
//!
//! let reclaimer = Arc::new(Reclaimer::new());
//! let frame = AutoPtr::new(Frame { count: AtomicRefCount::new(), reclaimer: reclaimer.clone() });
//! drop(frame);
//! assert_eq!(reclaimer.pending(), 1);
//! assert_eq!(reclaimer.reclaim(), 1);
//! ```
//!
//! The backlog is a lock-free intrusive stack. Pushes are a CAS loop; a drain
//! detaches the whole stack with one `swap`, so nodes are never popped one at
//! a time and the usual Treiber-stack ABA hazard does not arise.

use core::fmt;
use core::ptr;

use crossbeam_utils::{Backoff, CachePadded};
use serde::{Deserialize, Serialize};

use crate::sync::{AtomicPtr, AtomicUsize, Ordering};
use crate::trace::trace_event;

/// Reclaimer settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReclaimConfig {
    /// Reclaim the whole backlog on the deferring thread once this many
    /// objects are pending. `None` leaves every reclaim to the caller.
    pub flush_threshold: Option<usize>,
}

/// Counters describing a reclaimer's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimStats {
    /// Objects handed to [`Reclaimer::defer`] so far.
    pub deferred: usize,
    /// Objects destroyed by [`Reclaimer::reclaim`] so far.
    pub reclaimed: usize,
    /// Objects waiting to be destroyed.
    pub pending: usize,
}

struct Node {
    garbage: Box<dyn Send>,
    next: *mut Node,
}

/// A queue of unreferenced objects, destroyed on demand.
pub struct Reclaimer {
    head: CachePadded<AtomicPtr<Node>>,
    pending: AtomicUsize,
    deferred: AtomicUsize,
    reclaimed: AtomicUsize,
    config: ReclaimConfig,
}

impl Reclaimer {
    /// Creates an empty reclaimer with no flush threshold.
    pub fn new() -> Self {
        Self::with_config(ReclaimConfig::default())
    }

    /// Creates an empty reclaimer with the given settings.
    pub fn with_config(config: ReclaimConfig) -> Self {
        Self {
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            pending: AtomicUsize::new(0),
            deferred: AtomicUsize::new(0),
            reclaimed: AtomicUsize::new(0),
            config,
        }
    }

    /// The settings this reclaimer was built with.
    pub fn config(&self) -> ReclaimConfig {
        self.config
    }

    /// Queues `garbage` for destruction.
    ///
    /// If this push reaches the flush threshold, the backlog (including
    /// `garbage`) is reclaimed before returning.
    pub fn defer<T: ?Sized + Send + 'static>(&self, garbage: Box<T>) {
        let node = Box::into_raw(Box::new(Node {
            garbage: Box::new(garbage),
            next: ptr::null_mut(),
        }));

        // Counted before it becomes visible, so a concurrent drain never
        // subtracts more than has been added.
        let pending = self.pending.fetch_add(1, Ordering::Relaxed) + 1;
        self.deferred.fetch_add(1, Ordering::Relaxed);

        let backoff = Backoff::new();
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: `node` is ours until the CAS publishes it.
            unsafe { (*node).next = head };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => {
                    head = actual;
                    backoff.spin();
                }
            }
        }
        trace_event!(trace, pending, "deferred unreferenced object");

        if let Some(threshold) = self.config.flush_threshold {
            if pending >= threshold {
                trace_event!(debug, pending, threshold, "flush threshold reached");
                self.reclaim();
            }
        }
    }

    /// Destroys everything pending, including objects deferred by the
    /// destructors this call runs. Returns how many objects were destroyed.
    pub fn reclaim(&self) -> usize {
        let mut total = 0;
        loop {
            let mut node = self.head.swap(ptr::null_mut(), Ordering::Acquire);
            if node.is_null() {
                break;
            }
            let mut drained = 0;
            while !node.is_null() {
                // SAFETY: the swap detached this list; every node on it came
                // from `Box::into_raw` in `defer` and is visited once.
                let Node { garbage, next } = *unsafe { Box::from_raw(node) };
                node = next;
                drop(garbage);
                drained += 1;
            }
            self.pending.fetch_sub(drained, Ordering::Relaxed);
            self.reclaimed.fetch_add(drained, Ordering::Relaxed);
            total += drained;
        }
        if total > 0 {
            trace_event!(trace, reclaimed = total, "reclaimed unreferenced objects");
        }
        total
    }

    /// Objects waiting to be destroyed.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Snapshot of the reclaimer's counters.
    pub fn stats(&self) -> ReclaimStats {
        ReclaimStats {
            deferred: self.deferred.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }
}

impl Default for Reclaimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.reclaim();
    }
}

impl fmt::Debug for Reclaimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reclaimer")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{ReclaimConfig, ReclaimStats, Reclaimer};

    struct Tracked(Arc<AtomicUsize>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_defer_then_reclaim() {
        let drops = Arc::new(AtomicUsize::new(0));
        let r = Reclaimer::new();
        r.defer(Box::new(Tracked(drops.clone())));
        r.defer(Box::new(Tracked(drops.clone())));
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        assert_eq!(r.pending(), 2);
        assert_eq!(r.reclaim(), 2);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
        assert_eq!(r.reclaim(), 0);
        assert_eq!(
            r.stats(),
            ReclaimStats {
                deferred: 2,
                reclaimed: 2,
                pending: 0
            }
        );
    }

    #[test]
    fn test_unsized_garbage() {
        let r = Reclaimer::new();
        let s: Box<str> = "spent".into();
        r.defer(s);
        let v: Box<[u8]> = vec![1, 2, 3].into_boxed_slice();
        r.defer(v);
        assert_eq!(r.reclaim(), 2);
    }

    #[test]
    fn test_threshold_flushes_on_push() {
        let drops = Arc::new(AtomicUsize::new(0));
        let r = Reclaimer::with_config(ReclaimConfig {
            flush_threshold: Some(3),
        });
        r.defer(Box::new(Tracked(drops.clone())));
        r.defer(Box::new(Tracked(drops.clone())));
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        r.defer(Box::new(Tracked(drops.clone())));
        assert_eq!(drops.load(Ordering::SeqCst), 3);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn test_drop_reclaims_backlog() {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let r = Reclaimer::new();
            r.defer(Box::new(Tracked(drops.clone())));
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_defer() {
        let drops = Arc::new(AtomicUsize::new(0));
        let r = Reclaimer::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..250 {
                        r.defer(Box::new(Tracked(drops.clone())));
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..50 {
                    r.reclaim();
                }
            });
        });
        r.reclaim();
        assert_eq!(drops.load(Ordering::SeqCst), 1_000);
        assert_eq!(r.stats().reclaimed, 1_000);
        assert_eq!(r.pending(), 0);
    }
}

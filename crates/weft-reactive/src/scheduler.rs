//! Process-wide (per-thread) flush scheduling.
//!
//! Stores never notify listeners synchronously. A write enqueues its store
//! here; the host drains the queue with [`tick`], delivering one coalesced
//! flush pass. In a browser runtime this drain would ride a microtask; in
//! this engine the host loop (or a test) calls [`tick`] at the end of each
//! synchronous mutation window.
//!
//! # Invariants
//!
//! 1. A store appears at most once per queue (stores guard enqueueing with
//!    their `queued` flag).
//! 2. [`tick`] flushes exactly the stores queued when it started; stores
//!    enqueued during the pass land in a fresh queue for a later tick. This
//!    bounds recursion within one pass while allowing chained reactions
//!    across passes.
//!
//! The queue is exposed only through the store's internal `schedule` call;
//! user code drives it solely via [`tick`] and [`settle`].

use std::cell::RefCell;

use tracing::{trace, warn};

use crate::store::Store;

/// Upper bound on [`settle`] passes before giving up on a quiescent state.
const MAX_SETTLE_PASSES: usize = 64;

thread_local! {
    static QUEUE: RefCell<Vec<Store>> = const { RefCell::new(Vec::new()) };
}

/// Enqueue a store for the next flush pass. Callers deduplicate via the
/// store's `queued` flag before reaching here.
pub(crate) fn schedule(store: Store) {
    QUEUE.with(|queue| queue.borrow_mut().push(store));
    trace!("store scheduled for next tick");
}

/// Number of stores currently awaiting a flush.
#[must_use]
pub fn pending_stores() -> usize {
    QUEUE.with(|queue| queue.borrow().len())
}

/// Run one flush pass: every store queued at entry flushes exactly once.
///
/// Returns the number of stores flushed. Stores enqueued by listeners
/// during the pass are left queued for the next tick.
pub fn tick() -> usize {
    let batch = QUEUE.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
    let count = batch.len();
    for store in batch {
        // Cleared before flushing so in-flush writes re-enqueue for later.
        store.clear_queued();
        store.flush();
    }
    count
}

/// Tick until no store is pending, up to an internal pass limit.
///
/// Returns the number of passes run. Hitting the limit (a listener cycle
/// that never quiesces) is logged and leaves the remaining work queued.
pub fn settle() -> usize {
    let mut passes = 0;
    while pending_stores() > 0 {
        if passes == MAX_SETTLE_PASSES {
            warn!(passes, "settle pass limit hit; listeners keep scheduling work");
            break;
        }
        tick();
        passes += 1;
    }
    passes
}

#![forbid(unsafe_code)]

//! Observable state store and coalescing flush scheduler for Weft.
//!
//! This crate provides the reactive half of the engine:
//!
//! - [`path`]: dotted-path splitting and prebuilt [`Accessor`]s.
//! - [`Store`]: a fixed-key observable attribute map with bitmask dirty
//!   tracking and direct + nested-path subscriptions.
//! - [`scheduler`]: a thread-local queue coalescing mutations across stores
//!   into one flush pass per [`tick`].
//!
//! # Architecture
//!
//! `Store` uses `Rc<RefCell<..>>` for single-threaded shared ownership.
//! Writes never notify synchronously; they mark a per-key dirty bit and
//! enqueue the store with the scheduler. The host drives delivery by calling
//! [`tick`] (the microtask analog), at which point every queued store flushes
//! exactly once and listeners observe the fully-applied state.
//!
//! # Invariants
//!
//! 1. The top-level key set is fixed at store creation; at most 32 keys.
//! 2. Setting a top-level key to an equal value is a no-op (no dirty bit,
//!    no scheduling, no notifications).
//! 3. Nested writes always dirty their owning top-level key (no equality
//!    check) — an intentional asymmetry with top-level writes.
//! 4. Listeners for a key fire at most once per flush pass, in registration
//!    order, with the value current at flush time.
//! 5. A store enqueued during a flush pass is processed by a later [`tick`],
//!    never the pass currently executing.

pub mod path;
pub mod scheduler;
pub mod store;

pub use path::{Accessor, Segments, split_path};
pub use scheduler::{pending_stores, settle, tick};
pub use store::{Callback, Store, StoreError, Subscription, WatchSource};

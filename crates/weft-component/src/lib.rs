#![forbid(unsafe_code)]

//! Component classes, instances, and the binding engine for Weft.
//!
//! A component is defined once ([`ComponentDef`] → [`ComponentClass`]:
//! template compiled, state shape validated) and instantiated many times.
//! Each [`Component`] owns a deep clone of the class's prototype fragment
//! plus its own observable store; dynamic template placeholders become
//! binding groups that subscribe to the store (or to named external
//! sources) and patch exactly the text nodes and attributes they touch.
//!
//! The [`registry`] maps class names to compiled classes per thread, and
//! [`Offload`] ships heavy work to a background thread with results
//! delivered back on the owning thread.

pub mod class;
pub mod instance;
pub mod registry;
pub mod tasks;

pub use class::{ClassError, ComponentClass, ComponentDef, EventHandler, Hook};
pub use instance::{Component, Phase};
pub use tasks::{Offload, OffloadError};

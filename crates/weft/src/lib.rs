#![forbid(unsafe_code)]

//! Weft: a small reactive component engine.
//!
//! Weft wires three layers together:
//!
//! - [`weft_reactive`]: fixed-key observable stores with bitmask dirty
//!   tracking and a batching scheduler ([`tick`] flushes one batch).
//! - [`weft_template`]: one-time template compilation into a prototype
//!   fragment plus node-path index.
//! - [`weft_component`]: classes, instances, and the binding engine that
//!   patches exactly the nodes a changed value touches.
//!
//! ```
//! use weft::prelude::*;
//! use serde_json::json;
//!
//! let class = ComponentClass::new(
//!     ComponentDef::new("counter", "<span>{{state.count}}</span>")
//!         .with_state("count", json!(0)),
//! )
//! .unwrap();
//! let counter = Component::create(&class).unwrap();
//! counter.attach();
//! counter.store().set("count", json!(3)).unwrap();
//! tick();
//! assert_eq!(counter.markup(), "<span>3</span>");
//! ```

pub use weft_component as component;
pub use weft_dom as dom;
pub use weft_reactive as reactive;
pub use weft_template as template;

pub use weft_component::{
    ClassError, Component, ComponentClass, ComponentDef, Offload, OffloadError, Phase, registry,
};
pub use weft_reactive::{Store, StoreError, Subscription, WatchSource, settle, tick};

/// Everything most applications need, one `use` away.
pub mod prelude {
    pub use weft_component::{
        ClassError, Component, ComponentClass, ComponentDef, Offload, OffloadError, Phase,
    };
    pub use weft_dom::node::{Node, NodeRef};
    pub use weft_reactive::{Store, StoreError, Subscription, WatchSource, settle, tick};
}

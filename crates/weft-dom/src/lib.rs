#![forbid(unsafe_code)]

//! Retained node tree and markup parsing for Weft.
//!
//! The engine does not patch a browser DOM; it owns a small document model
//! of its own. A compiled template parses once into a prototype fragment,
//! every component instance deep-clones that fragment, and bindings patch
//! the clone in place. Serialization back to markup exists for tests and
//! for host embedders that render strings.
//!
//! # Invariants
//!
//! 1. A node has at most one parent; attaching a node detaches it from its
//!    previous parent first.
//! 2. Child-index paths recorded against a prototype fragment resolve to
//!    the corresponding node in any deep clone of that fragment.
//! 3. Parsing is best-effort: malformed markup never fails, it degrades
//!    (unclosed tags close at end of input, stray text passes through).

pub mod node;
pub mod parser;
pub mod serialize;

pub use node::{Node, NodeKind, NodePath, NodeRef};
pub use parser::parse_fragment;
pub use serialize::{escape_attr, escape_text, to_markup};

#![forbid(unsafe_code)]

//! Template compiler and node-path indexer for Weft.
//!
//! Compilation happens once per component class and produces everything an
//! instance needs to bind cheaply:
//!
//! - [`compile`]: scans a template string for `{{ expr }}` (dynamic) and
//!   `@{{ expr }}` (static/one-time) placeholders, classifies each as a
//!   text or attribute target, extracts its dotted source path, prebuilds
//!   an accessor, and substitutes a placeholder token into the static
//!   markup, which is then parsed into a prototype fragment.
//! - [`index_fragment`]: walks the prototype fragment once and records,
//!   per placeholder occurrence and per `data-ref` element, the ordinal
//!   child-index path from the fragment root to the target node.
//!
//! Instances clone the fragment and resolve the recorded paths against the
//! clone; nothing at instance time re-parses strings.

pub mod compile;
pub mod index;

pub use compile::{
    BindingInstruction, CompileError, CompiledTemplate, compile, placeholder_token,
};
pub use index::{NodePathIndex, Occurrence, TargetKind, index_fragment, tokens_in};

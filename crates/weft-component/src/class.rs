//! Component classes: template compiled once, shared by every instance.
//!
//! A [`ComponentClass`] is built from a [`ComponentDef`] exactly once. It
//! owns the compiled template artifacts (static markup, binding
//! instructions, prototype fragment, node-path index), the initial state
//! shape, named external sources, event handlers, and lifecycle hooks.
//! Instances hold an `Rc` to their class and read everything through it.
//!
//! Classes whose instances are all created up front can opt into
//! discarding the compiled artifacts after the first instantiation with
//! [`ComponentDef::discard_after_first`]; creating another instance
//! afterwards fails with [`ClassError::ArtifactsDiscarded`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::debug;

use weft_reactive::store::{Store, StoreError, WatchSource};
use weft_template::{CompileError, CompiledTemplate, compile};

use crate::instance::Component;

/// Lifecycle hook invoked with the instance it belongs to.
pub type Hook = Rc<dyn Fn(&Component)>;

/// Handler for a named event, invoked with the instance and a detail value.
pub type EventHandler = Rc<dyn Fn(&Component, &Value)>;

/// Errors from class construction and instantiation.
#[derive(Debug)]
pub enum ClassError {
    /// The template failed to compile.
    Compile(CompileError),
    /// The declared state shape is invalid (too many keys, duplicates).
    Store(StoreError),
    /// The class discarded its compiled artifacts after its first
    /// instantiation; no further instances can be created.
    ArtifactsDiscarded,
}

impl fmt::Display for ClassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile(e) => write!(f, "template compilation failed: {e}"),
            Self::Store(e) => write!(f, "invalid state declaration: {e}"),
            Self::ArtifactsDiscarded => {
                write!(f, "compiled artifacts were discarded after first instantiation")
            }
        }
    }
}

impl std::error::Error for ClassError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Compile(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::ArtifactsDiscarded => None,
        }
    }
}

impl From<CompileError> for ClassError {
    fn from(e: CompileError) -> Self {
        Self::Compile(e)
    }
}

impl From<StoreError> for ClassError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Declarative description of a component class. Build one with the
/// `with_*` methods, then hand it to [`ComponentClass::new`].
pub struct ComponentDef {
    pub(crate) name: String,
    pub(crate) template: String,
    pub(crate) state: Vec<(String, Value)>,
    pub(crate) sources: Vec<(String, Rc<dyn WatchSource>)>,
    pub(crate) events: Vec<(String, EventHandler)>,
    pub(crate) mount: Option<Hook>,
    pub(crate) unmount: Option<Hook>,
    pub(crate) discard_after_first: bool,
}

impl ComponentDef {
    #[must_use]
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            state: Vec::new(),
            sources: Vec::new(),
            events: Vec::new(),
            mount: None,
            unmount: None,
            discard_after_first: false,
        }
    }

    /// Declare one top-level state key with its initial value. Declaration
    /// order is the bit order of the store's dirty mask.
    #[must_use]
    pub fn with_state(mut self, key: impl Into<String>, initial: Value) -> Self {
        self.state.push((key.into(), initial));
        self
    }

    /// Attach a named external source bindings may reference by name.
    #[must_use]
    pub fn with_source(mut self, name: impl Into<String>, source: Rc<dyn WatchSource>) -> Self {
        self.sources.push((name.into(), source));
        self
    }

    /// Register a handler for a named event dispatched on instances.
    #[must_use]
    pub fn with_event(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&Component, &Value) + 'static,
    ) -> Self {
        self.events.push((name.into(), Rc::new(handler)));
        self
    }

    /// Hook invoked after an instance finishes attaching.
    #[must_use]
    pub fn with_mount(mut self, hook: impl Fn(&Component) + 'static) -> Self {
        self.mount = Some(Rc::new(hook));
        self
    }

    /// Hook invoked as an instance begins detaching.
    #[must_use]
    pub fn with_unmount(mut self, hook: impl Fn(&Component) + 'static) -> Self {
        self.unmount = Some(Rc::new(hook));
        self
    }

    /// Free the compiled artifacts after the first instance is created.
    #[must_use]
    pub fn discard_after_first(mut self) -> Self {
        self.discard_after_first = true;
        self
    }
}

/// One compiled component class.
pub struct ComponentClass {
    name: String,
    artifacts: RefCell<Option<Rc<CompiledTemplate>>>,
    state: Vec<(String, Value)>,
    sources: FxHashMap<String, Rc<dyn WatchSource>>,
    events: FxHashMap<String, EventHandler>,
    pub(crate) mount: Option<Hook>,
    pub(crate) unmount: Option<Hook>,
    discard_after_first: bool,
}

impl ComponentClass {
    /// Compile the template and validate the state shape. The returned
    /// class is the single shared compilation for all its instances.
    pub fn new(def: ComponentDef) -> Result<Rc<Self>, ClassError> {
        let compiled = compile(&def.template)?;
        // Probe the state shape now so instantiation cannot fail on it.
        Store::new(def.state.clone())?;
        debug!(
            class = %def.name,
            bindings = compiled.bindings.len(),
            "component class compiled"
        );
        Ok(Rc::new(Self {
            name: def.name,
            artifacts: RefCell::new(Some(Rc::new(compiled))),
            state: def.state,
            sources: def.sources.into_iter().collect(),
            events: def.events.into_iter().collect(),
            mount: def.mount,
            unmount: def.unmount,
            discard_after_first: def.discard_after_first,
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the compiled artifacts are still held.
    #[must_use]
    pub fn has_artifacts(&self) -> bool {
        self.artifacts.borrow().is_some()
    }

    #[must_use]
    pub(crate) fn source(&self, name: &str) -> Option<Rc<dyn WatchSource>> {
        self.sources.get(name).cloned()
    }

    #[must_use]
    pub(crate) fn event(&self, name: &str) -> Option<EventHandler> {
        self.events.get(name).cloned()
    }

    pub(crate) fn initial_state(&self) -> Vec<(String, Value)> {
        self.state.clone()
    }

    /// Grab the artifacts for a new instance, honoring the discard policy.
    pub(crate) fn checkout_artifacts(&self) -> Result<Rc<CompiledTemplate>, ClassError> {
        let mut slot = self.artifacts.borrow_mut();
        let Some(artifacts) = slot.as_ref().map(Rc::clone) else {
            return Err(ClassError::ArtifactsDiscarded);
        };
        if self.discard_after_first {
            debug!(class = %self.name, "discarding compiled artifacts");
            *slot = None;
        }
        Ok(artifacts)
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("name", &self.name)
            .field("state_keys", &self.state.len())
            .field("has_artifacts", &self.has_artifacts())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn compiles_template_once_at_class_creation() {
        let class = ComponentClass::new(
            ComponentDef::new("counter", "<span>{{state.count}}</span>")
                .with_state("count", json!(0)),
        )
        .unwrap();
        assert_eq!(class.name(), "counter");
        assert!(class.has_artifacts());
        let artifacts = class.checkout_artifacts().unwrap();
        assert_eq!(artifacts.markup, "<span>[__bind_0]</span>");
    }

    #[test]
    fn empty_template_fails() {
        let err = ComponentClass::new(ComponentDef::new("x", "  ")).unwrap_err();
        assert!(matches!(err, ClassError::Compile(CompileError::EmptyTemplate)));
    }

    #[test]
    fn duplicate_state_key_fails() {
        let err = ComponentClass::new(
            ComponentDef::new("x", "<p>a</p>")
                .with_state("a", json!(1))
                .with_state("a", json!(2)),
        )
        .unwrap_err();
        assert!(matches!(err, ClassError::Store(StoreError::DuplicateKey(_))));
    }

    #[test]
    fn too_many_state_keys_fail() {
        let mut def = ComponentDef::new("x", "<p>a</p>");
        for i in 0..33 {
            def = def.with_state(format!("k{i}"), json!(i));
        }
        let err = ComponentClass::new(def).unwrap_err();
        assert!(matches!(err, ClassError::Store(StoreError::TooManyKeys(33))));
    }

    #[test]
    fn discard_after_first_frees_artifacts() {
        let class = ComponentClass::new(
            ComponentDef::new("once", "<p>x</p>").discard_after_first(),
        )
        .unwrap();
        assert!(class.checkout_artifacts().is_ok());
        assert!(!class.has_artifacts());
        assert!(matches!(
            class.checkout_artifacts().unwrap_err(),
            ClassError::ArtifactsDiscarded
        ));
    }

    #[test]
    fn artifacts_persist_without_discard_flag() {
        let class = ComponentClass::new(ComponentDef::new("many", "<p>x</p>")).unwrap();
        assert!(class.checkout_artifacts().is_ok());
        assert!(class.checkout_artifacts().is_ok());
        assert!(class.has_artifacts());
    }
}

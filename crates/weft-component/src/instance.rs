//! Component instances and the surgical update engine.
//!
//! An instance clones its class's prototype fragment on first attach and
//! never re-renders it. Updates flow through binding groups: every dynamic
//! placeholder on the same `(source, path)` pair shares one subscription
//! and one update closure, and each touched node keeps its original
//! template string plus a per-placeholder value map, so multiple
//! placeholders in one text node or attribute recompose instead of
//! clobbering each other.
//!
//! # Lifecycle
//!
//! ```text
//! Unattached --attach--> Attached <--attach-- Detached
//!                           |    --detach-->     |
//!                           +-----dispose--------+--> Disposed (terminal)
//! ```
//!
//! First attach does the one-time work (clone, ref resolution, static
//! substitution, binding-state construction); later attaches only
//! re-subscribe and refresh. `detach` cancels subscriptions but keeps the
//! fragment and binding state so re-attach is cheap. `dispose` is the
//! terminal teardown; every operation on a disposed instance is a no-op.
//!
//! # Invariants
//!
//! - Node references are resolved from indexed paths before any island
//!   splice mutates the tree; paths are never resolved against a fragment
//!   that islands have already reshaped.
//! - Static substitution runs before per-node originals are captured, so
//!   dynamic recomposition bakes static values in.
//! - `detach` → `attach` → `detach` runs the unmount hook exactly once
//!   per cycle.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, warn};

use weft_dom::node::{Node, NodeRef};
use weft_dom::parser::parse_fragment;
use weft_dom::serialize::to_markup;
use weft_reactive::path::Accessor;
use weft_reactive::store::{Callback, Store, Subscription, WatchSource};
use weft_template::{BindingInstruction, CompiledTemplate, TargetKind, placeholder_token};

use crate::class::{ClassError, ComponentClass};

/// The name bindings use to reach the instance's own store.
const STATE_SOURCE: &str = "state";

/// Instance lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Created; the fragment has not been built yet.
    Unattached,
    /// Live: subscriptions active, updates applied.
    Attached,
    /// Subscriptions cancelled; fragment and binding state retained.
    Detached,
    /// Terminal. Every further operation is a no-op.
    Disposed,
}

/// Render a bound value into template text. `Null` renders empty so a
/// missing nested path blanks its slot instead of printing `null`.
fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Per-node binding state for one text node or one attribute. Shared by
/// every placeholder occurring in that string.
struct Slot {
    node: NodeRef,
    kind: TargetKind,
    /// The string as it stood after static substitution, tokens intact.
    original: String,
    /// Last rendered value per placeholder id.
    values: FxHashMap<u32, String>,
}

impl Slot {
    /// Recompose the original string with all current values and write it
    /// back to the node.
    fn apply(&self) {
        let mut text = self.original.clone();
        for (id, value) in &self.values {
            text = text.replace(&placeholder_token(*id), value);
        }
        match &self.kind {
            TargetKind::Text => self.node.set_text(text),
            TargetKind::Attribute(name) => self.node.set_attr(name.clone(), text),
        }
    }
}

/// One placeholder occurrence wired into a binding group.
enum Member {
    /// Plain occurrence: write through the shared slot.
    Slot { id: u32, slot: Rc<RefCell<Slot>> },
    /// HTML-island occurrence: splice parsed markup after the marker.
    Island {
        marker: NodeRef,
        inserted: Rc<RefCell<Vec<NodeRef>>>,
    },
}

/// All occurrences sharing one `(source, path)` subscription.
struct BindingGroup {
    source: Option<Rc<dyn WatchSource>>,
    path: String,
    accessor: Accessor,
    update: Callback,
}

/// Remove the previously spliced island nodes and insert the parse of
/// `markup` after the marker, in order.
fn splice_island(marker: &NodeRef, inserted: &mut Vec<NodeRef>, markup: &str) {
    for node in inserted.drain(..) {
        Node::detach(&node);
    }
    let children = parse_fragment(markup).children();
    let mut anchor = Rc::clone(marker);
    for child in &children {
        Node::detach(child);
        Node::insert_after(&anchor, child);
        anchor = Rc::clone(child);
    }
    *inserted = children;
}

fn make_update(members: Vec<Member>) -> Callback {
    Rc::new(move |value: &Value| {
        let rendered = render_value(value);
        for member in &members {
            match member {
                Member::Slot { id, slot } => {
                    let mut slot = slot.borrow_mut();
                    slot.values.insert(*id, rendered.clone());
                    slot.apply();
                }
                Member::Island { marker, inserted } => {
                    splice_island(marker, &mut inserted.borrow_mut(), &rendered);
                }
            }
        }
    })
}

/// One live component.
pub struct Component {
    class: Rc<ComponentClass>,
    artifacts: Rc<CompiledTemplate>,
    store: Store,
    phase: Cell<Phase>,
    fragment: RefCell<Option<NodeRef>>,
    refs: RefCell<FxHashMap<String, NodeRef>>,
    groups: RefCell<Vec<BindingGroup>>,
    subscriptions: RefCell<Vec<Subscription>>,
}

impl Component {
    /// Create an instance of a class. Fails only if the class declared an
    /// invalid state shape (already caught at class creation) or has
    /// discarded its artifacts.
    pub fn create(class: &Rc<ComponentClass>) -> Result<Self, ClassError> {
        let artifacts = class.checkout_artifacts()?;
        let store = Store::new(class.initial_state())?;
        Ok(Self {
            class: Rc::clone(class),
            artifacts,
            store,
            phase: Cell::new(Phase::Unattached),
            fragment: RefCell::new(None),
            refs: RefCell::new(FxHashMap::default()),
            groups: RefCell::new(Vec::new()),
            subscriptions: RefCell::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn class(&self) -> &Rc<ComponentClass> {
        &self.class
    }

    /// The instance's own observable state.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// The named `data-ref` element, valid between first attach and
    /// dispose.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<NodeRef> {
        self.refs.borrow().get(name).cloned()
    }

    /// Serialize the instance fragment. Empty before first attach and
    /// after dispose.
    #[must_use]
    pub fn markup(&self) -> String {
        self.fragment.borrow().as_ref().map_or_else(String::new, to_markup)
    }

    #[must_use]
    pub fn fragment(&self) -> Option<NodeRef> {
        self.fragment.borrow().clone()
    }

    /// Go live: build on first attach, then subscribe every binding
    /// group, refresh from current source values, and run the mount hook.
    /// No-op when already attached or disposed.
    pub fn attach(&self) {
        match self.phase.get() {
            Phase::Attached | Phase::Disposed => return,
            Phase::Unattached => self.initialize(),
            Phase::Detached => {}
        }
        self.subscribe_groups();
        self.phase.set(Phase::Attached);
        if let Some(hook) = self.class.mount.clone() {
            hook(self);
        }
        debug!(class = %self.class.name(), "component attached");
    }

    /// Run the unmount hook, then cancel every subscription. The fragment
    /// and binding state survive for a later re-attach. Idempotent.
    pub fn detach(&self) {
        if self.phase.get() != Phase::Attached {
            return;
        }
        if let Some(hook) = self.class.unmount.clone() {
            hook(self);
        }
        for subscription in self.subscriptions.borrow_mut().drain(..) {
            subscription.cancel();
        }
        self.phase.set(Phase::Detached);
        debug!(class = %self.class.name(), "component detached");
    }

    /// Terminal teardown: detach if needed, then release binding state,
    /// refs, and the fragment. Idempotent.
    pub fn dispose(&self) {
        if self.phase.get() == Phase::Disposed {
            return;
        }
        self.detach();
        self.groups.borrow_mut().clear();
        self.refs.borrow_mut().clear();
        *self.fragment.borrow_mut() = None;
        self.phase.set(Phase::Disposed);
        debug!(class = %self.class.name(), "component disposed");
    }

    /// Invoke the class handler for a named event. Returns whether a
    /// handler ran; disposed instances never handle events.
    pub fn dispatch(&self, event: &str, detail: &Value) -> bool {
        if self.phase.get() == Phase::Disposed {
            return false;
        }
        let Some(handler) = self.class.event(event) else {
            return false;
        };
        handler(self, detail);
        true
    }

    fn resolve_source(&self, name: &str) -> Option<Rc<dyn WatchSource>> {
        if name == STATE_SOURCE {
            return Some(Rc::new(self.store.clone()));
        }
        self.class.source(name)
    }

    /// Current value a binding would render, via its prebuilt accessor.
    fn bound_value(&self, binding: &BindingInstruction) -> Value {
        match self.resolve_source(&binding.source) {
            Some(source) => binding.accessor.resolve(&source.peek("")),
            None => Value::Null,
        }
    }

    /// One-time build on first attach.
    fn initialize(&self) {
        let fragment = Node::deep_clone(&self.artifacts.fragment);
        let index = &self.artifacts.index;

        // Resolve every indexed path before anything reshapes the tree;
        // island splices shift sibling ordinals.
        let mut refs = FxHashMap::default();
        for name in index.ref_names() {
            if let Some(path) = index.ref_path(name)
                && let Some(node) = Node::at_path(&fragment, path)
            {
                refs.insert(name.to_owned(), node);
            }
        }
        let mut resolved: Vec<(usize, NodeRef, TargetKind)> = Vec::new();
        for (i, binding) in self.artifacts.bindings.iter().enumerate() {
            for occurrence in index.occurrences(binding.id) {
                if let Some(node) = Node::at_path(&fragment, &occurrence.path) {
                    resolved.push((i, node, occurrence.kind.clone()));
                }
            }
        }

        // Static pass: substitute one-time values in place so the
        // originals captured below already carry them.
        for (i, node, kind) in &resolved {
            let binding = &self.artifacts.bindings[*i];
            if binding.dynamic {
                continue;
            }
            let rendered = render_value(&self.bound_value(binding));
            if binding.island && *kind == TargetKind::Text {
                let marker = Node::comment(node.text());
                Node::replace(node, &marker);
                splice_island(&marker, &mut Vec::new(), &rendered);
                continue;
            }
            let token = placeholder_token(binding.id);
            match kind {
                TargetKind::Text => node.set_text(node.text().replace(&token, &rendered)),
                TargetKind::Attribute(name) => {
                    if let Some(value) = node.attr(name) {
                        node.set_attr(name.clone(), value.replace(&token, &rendered));
                    }
                }
            }
        }

        // Dynamic pass: one slot per touched (node, target) string, one
        // group per (source, path).
        let mut slots: FxHashMap<(usize, TargetKind), Rc<RefCell<Slot>>> = FxHashMap::default();
        struct GroupBuild {
            source: String,
            path: String,
            accessor: Accessor,
            members: Vec<Member>,
        }
        let mut builds: Vec<GroupBuild> = Vec::new();
        for (i, node, kind) in &resolved {
            let binding = &self.artifacts.bindings[*i];
            if !binding.dynamic {
                continue;
            }
            let member = if binding.island && *kind == TargetKind::Text {
                let marker = Node::comment(node.text());
                Node::replace(node, &marker);
                Member::Island {
                    marker,
                    inserted: Rc::new(RefCell::new(Vec::new())),
                }
            } else {
                let key = (Rc::as_ptr(node) as usize, kind.clone());
                let slot = slots.entry(key).or_insert_with(|| {
                    let original = match kind {
                        TargetKind::Text => node.text(),
                        TargetKind::Attribute(name) => node.attr(name).unwrap_or_default(),
                    };
                    Rc::new(RefCell::new(Slot {
                        node: Rc::clone(node),
                        kind: kind.clone(),
                        original,
                        values: FxHashMap::default(),
                    }))
                });
                slot.borrow_mut().values.insert(binding.id, String::new());
                Member::Slot {
                    id: binding.id,
                    slot: Rc::clone(slot),
                }
            };
            match builds
                .iter_mut()
                .find(|b| b.source == binding.source && b.path == binding.path)
            {
                Some(build) => build.members.push(member),
                None => builds.push(GroupBuild {
                    source: binding.source.clone(),
                    path: binding.path.clone(),
                    accessor: binding.accessor.clone(),
                    members: vec![member],
                }),
            }
        }

        let mut groups = Vec::with_capacity(builds.len());
        for build in builds {
            let update = make_update(build.members);
            let source = self.resolve_source(&build.source);
            if source.is_none() {
                warn!(source = %build.source, "unknown binding source; rendering empty");
                update(&Value::Null);
            }
            groups.push(BindingGroup {
                source,
                path: build.path,
                accessor: build.accessor,
                update,
            });
        }

        *self.fragment.borrow_mut() = Some(fragment);
        *self.refs.borrow_mut() = refs;
        *self.groups.borrow_mut() = groups;
    }

    /// Subscribe every sourced group and refresh it from the source's
    /// current value. Runs on every attach.
    fn subscribe_groups(&self) {
        let groups = self.groups.borrow();
        let mut subscriptions = self.subscriptions.borrow_mut();
        for group in groups.iter() {
            let Some(source) = &group.source else { continue };
            let subscription = source.watch(&group.path, Rc::clone(&group.update));
            (group.update)(&group.accessor.resolve(&source.peek("")));
            subscriptions.push(subscription);
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("class", &self.class.name())
            .field("phase", &self.phase.get())
            .finish()
    }
}

impl Drop for Component {
    fn drop(&mut self) {
        self.dispose();
    }
}

//! Node tree primitives.
//!
//! Nodes are `Rc`-shared within one thread and interior-mutable: bindings
//! patch text and attributes in place while the tree shape stays stable.
//! Structural edits (append, insert-after, replace, detach) maintain the
//! parent link invariant.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

/// Shared handle to a node.
pub type NodeRef = Rc<Node>;

/// Ordinal child-index path from a fragment root to a node.
pub type NodePath = SmallVec<[usize; 8]>;

/// What a node is. Fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// A parentless container of top-level children (template root).
    Fragment,
    /// An element with a tag name, attributes and children.
    Element(String),
    /// A text node; the payload is raw, unescaped text.
    Text,
    /// A comment node.
    Comment,
}

/// One node in the retained tree.
pub struct Node {
    kind: NodeKind,
    attrs: RefCell<Vec<(String, String)>>,
    text: RefCell<String>,
    children: RefCell<Vec<NodeRef>>,
    parent: RefCell<Weak<Node>>,
}

impl Node {
    fn build(kind: NodeKind, text: String) -> NodeRef {
        Rc::new(Self {
            kind,
            attrs: RefCell::new(Vec::new()),
            text: RefCell::new(text),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
        })
    }

    /// Create an empty fragment.
    #[must_use]
    pub fn fragment() -> NodeRef {
        Self::build(NodeKind::Fragment, String::new())
    }

    /// Create an element with the given tag name.
    #[must_use]
    pub fn element(tag: impl Into<String>) -> NodeRef {
        Self::build(NodeKind::Element(tag.into()), String::new())
    }

    /// Create a text node with raw (unescaped) content.
    #[must_use]
    pub fn text_node(content: impl Into<String>) -> NodeRef {
        Self::build(NodeKind::Text, content.into())
    }

    /// Create a comment node.
    #[must_use]
    pub fn comment(content: impl Into<String>) -> NodeRef {
        Self::build(NodeKind::Comment, content.into())
    }

    /// The node's kind.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Tag name, for elements.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element(tag) => Some(tag),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element(_))
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        self.kind == NodeKind::Text
    }

    /// Text or comment payload. Empty for other kinds.
    #[must_use]
    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    /// Replace the text/comment payload.
    pub fn set_text(&self, content: impl Into<String>) {
        *self.text.borrow_mut() = content.into();
    }

    /// Read an attribute value.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<String> {
        self.attrs
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Set an attribute, preserving declaration order for existing names.
    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let mut attrs = self.attrs.borrow_mut();
        if let Some(slot) = attrs.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            attrs.push((name, value));
        }
    }

    /// Snapshot of all attributes in declaration order.
    #[must_use]
    pub fn attrs(&self) -> Vec<(String, String)> {
        self.attrs.borrow().clone()
    }

    /// Snapshot of the child list.
    #[must_use]
    pub fn children(&self) -> Vec<NodeRef> {
        self.children.borrow().clone()
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    /// Child at ordinal index.
    #[must_use]
    pub fn child(&self, index: usize) -> Option<NodeRef> {
        self.children.borrow().get(index).cloned()
    }

    /// The node's parent, if attached.
    #[must_use]
    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.borrow().upgrade()
    }

    // -- structural operations ------------------------------------------

    /// Identity comparison: same underlying node.
    #[must_use]
    pub fn same(a: &NodeRef, b: &NodeRef) -> bool {
        Rc::ptr_eq(a, b)
    }

    /// Ordinal index of `child` within `parent`, by identity.
    #[must_use]
    pub fn index_of(parent: &NodeRef, child: &NodeRef) -> Option<usize> {
        parent
            .children
            .borrow()
            .iter()
            .position(|c| Rc::ptr_eq(c, child))
    }

    /// Remove `node` from its parent, if any.
    pub fn detach(node: &NodeRef) {
        if let Some(parent) = node.parent() {
            parent
                .children
                .borrow_mut()
                .retain(|c| !Rc::ptr_eq(c, node));
        }
        *node.parent.borrow_mut() = Weak::new();
    }

    /// Append `child` as the last child of `parent`, detaching it from any
    /// previous parent first.
    pub fn append(parent: &NodeRef, child: &NodeRef) {
        Self::detach(child);
        parent.children.borrow_mut().push(Rc::clone(child));
        *child.parent.borrow_mut() = Rc::downgrade(parent);
    }

    /// Insert `new` as the next sibling of `anchor`.
    ///
    /// No-op when `anchor` has no parent.
    pub fn insert_after(anchor: &NodeRef, new: &NodeRef) {
        let Some(parent) = anchor.parent() else {
            return;
        };
        let Some(index) = Self::index_of(&parent, anchor) else {
            return;
        };
        Self::detach(new);
        parent.children.borrow_mut().insert(index + 1, Rc::clone(new));
        *new.parent.borrow_mut() = Rc::downgrade(&parent);
    }

    /// Replace `old` with `new` in `old`'s parent.
    ///
    /// No-op when `old` has no parent.
    pub fn replace(old: &NodeRef, new: &NodeRef) {
        let Some(parent) = old.parent() else {
            return;
        };
        let Some(index) = Self::index_of(&parent, old) else {
            return;
        };
        Self::detach(new);
        parent.children.borrow_mut()[index] = Rc::clone(new);
        *new.parent.borrow_mut() = Rc::downgrade(&parent);
        *old.parent.borrow_mut() = Weak::new();
    }

    /// Walk `root` along ordinal child indices.
    #[must_use]
    pub fn at_path(root: &NodeRef, path: &[usize]) -> Option<NodeRef> {
        let mut current = Rc::clone(root);
        for &index in path {
            let next = current.child(index)?;
            current = next;
        }
        Some(current)
    }

    /// Structurally copy a subtree. The clone is parentless; shared-class
    /// prototype fragments stay pristine while instances patch their copy.
    #[must_use]
    pub fn deep_clone(node: &NodeRef) -> NodeRef {
        let copy = Self::build(node.kind.clone(), node.text.borrow().clone());
        *copy.attrs.borrow_mut() = node.attrs.borrow().clone();
        for child in node.children.borrow().iter() {
            Self::append(&copy, &Self::deep_clone(child));
        }
        copy
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(node: &NodeRef) -> String {
        fn walk(node: &NodeRef, out: &mut String) {
            if node.is_text() {
                out.push_str(&node.text.borrow());
            }
            for child in node.children.borrow().iter() {
                walk(child, out);
            }
        }
        let mut out = String::new();
        walk(node, &mut out);
        out
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Fragment => write!(f, "Fragment({} children)", self.child_count()),
            NodeKind::Element(tag) => {
                write!(f, "<{tag} {:?} ({} children)>", self.attrs.borrow(), self.child_count())
            }
            NodeKind::Text => write!(f, "Text({:?})", self.text.borrow()),
            NodeKind::Comment => write!(f, "Comment({:?})", self.text.borrow()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> NodeRef {
        // <div id="root">hello<span>world</span></div>
        let root = Node::fragment();
        let div = Node::element("div");
        div.set_attr("id", "root");
        Node::append(&root, &div);
        Node::append(&div, &Node::text_node("hello"));
        let span = Node::element("span");
        Node::append(&span, &Node::text_node("world"));
        Node::append(&div, &span);
        root
    }

    #[test]
    fn append_sets_parent() {
        let parent = Node::element("div");
        let child = Node::text_node("x");
        Node::append(&parent, &child);
        assert!(Node::same(&child.parent().unwrap(), &parent));
        assert_eq!(parent.child_count(), 1);
    }

    #[test]
    fn reappend_moves_between_parents() {
        let a = Node::element("div");
        let b = Node::element("div");
        let child = Node::text_node("x");
        Node::append(&a, &child);
        Node::append(&b, &child);
        assert_eq!(a.child_count(), 0);
        assert_eq!(b.child_count(), 1);
        assert!(Node::same(&child.parent().unwrap(), &b));
    }

    #[test]
    fn insert_after_orders_siblings() {
        let parent = Node::element("ul");
        let first = Node::element("li");
        let third = Node::element("li");
        Node::append(&parent, &first);
        Node::append(&parent, &third);
        let second = Node::element("li");
        Node::insert_after(&first, &second);
        let children = parent.children();
        assert!(Node::same(&children[0], &first));
        assert!(Node::same(&children[1], &second));
        assert!(Node::same(&children[2], &third));
    }

    #[test]
    fn replace_swaps_in_place() {
        let parent = Node::element("div");
        let old = Node::text_node("old");
        Node::append(&parent, &old);
        let new = Node::comment("marker");
        Node::replace(&old, &new);
        assert_eq!(parent.child_count(), 1);
        assert!(Node::same(&parent.child(0).unwrap(), &new));
        assert!(old.parent().is_none());
        assert!(Node::same(&new.parent().unwrap(), &parent));
    }

    #[test]
    fn detach_is_safe_on_parentless_node() {
        let lone = Node::text_node("x");
        Node::detach(&lone);
        assert!(lone.parent().is_none());
    }

    #[test]
    fn path_resolution() {
        let root = sample_tree();
        let world = Node::at_path(&root, &[0, 1, 0]).unwrap();
        assert_eq!(world.text(), "world");
        assert!(Node::at_path(&root, &[0, 5]).is_none());
        assert!(Node::same(&Node::at_path(&root, &[]).unwrap(), &root));
    }

    #[test]
    fn paths_survive_deep_clone() {
        let proto = sample_tree();
        let clone = Node::deep_clone(&proto);
        let original = Node::at_path(&proto, &[0, 1, 0]).unwrap();
        let copied = Node::at_path(&clone, &[0, 1, 0]).unwrap();
        assert_eq!(original.text(), copied.text());
        assert!(!Node::same(&original, &copied), "clone must not alias");
        copied.set_text("patched");
        assert_eq!(original.text(), "world", "prototype stays pristine");
    }

    #[test]
    fn deep_clone_copies_attributes() {
        let proto = sample_tree();
        let clone = Node::deep_clone(&proto);
        let div = Node::at_path(&clone, &[0]).unwrap();
        assert_eq!(div.attr("id").as_deref(), Some("root"));
        div.set_attr("id", "other");
        let proto_div = Node::at_path(&proto, &[0]).unwrap();
        assert_eq!(proto_div.attr("id").as_deref(), Some("root"));
    }

    #[test]
    fn set_attr_updates_in_place() {
        let el = Node::element("a");
        el.set_attr("href", "/");
        el.set_attr("title", "home");
        el.set_attr("href", "/docs");
        assert_eq!(
            el.attrs(),
            vec![
                ("href".to_owned(), "/docs".to_owned()),
                ("title".to_owned(), "home".to_owned())
            ]
        );
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let root = sample_tree();
        assert_eq!(Node::text_content(&root), "helloworld");
    }
}

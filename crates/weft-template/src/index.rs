//! Node-path indexing over a compiled prototype fragment.
//!
//! One traversal per component class records where every placeholder token
//! and every `data-ref` element lives, as ordinal child-index paths from
//! the fragment root. Instances resolve these paths against their own
//! cloned fragment, so lookup is pure pointer chasing at bind time.
//!
//! Multiple placeholders may share one text node or attribute value; each
//! is a separate [`Occurrence`] resolving to the same physical node, and
//! updates compose all placeholder values into the remembered original
//! string rather than overwriting each other.

use memchr::memmem;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use weft_dom::node::{NodePath, NodeRef};

/// Where a placeholder occurrence lands on its node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// The placeholder sits in a text node.
    Text,
    /// The placeholder sits in the named attribute's value.
    Attribute(String),
}

/// One recorded placeholder location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Occurrence {
    /// Ordinal child-index path from the fragment root. Copied per record,
    /// never aliased with the traversal stack.
    pub path: NodePath,
    pub kind: TargetKind,
}

/// Per-class map from binding ids and ref names to node paths.
#[derive(Clone, Debug, Default)]
pub struct NodePathIndex {
    occurrences: FxHashMap<u32, Vec<Occurrence>>,
    refs: FxHashMap<String, NodePath>,
}

impl NodePathIndex {
    /// All recorded occurrences for a binding id.
    #[must_use]
    pub fn occurrences(&self, id: u32) -> &[Occurrence] {
        self.occurrences.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Binding ids that have at least one occurrence.
    #[must_use]
    pub fn binding_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.occurrences.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Path of a `data-ref` element by name.
    #[must_use]
    pub fn ref_path(&self, name: &str) -> Option<&NodePath> {
        self.refs.get(name)
    }

    /// All declared ref names.
    #[must_use]
    pub fn ref_names(&self) -> Vec<&str> {
        self.refs.keys().map(String::as_str).collect()
    }
}

/// Extract the ids of all placeholder tokens (`[__bind_N]`) embedded in a
/// string, deduplicated in first-appearance order.
#[must_use]
pub fn tokens_in(text: &str) -> SmallVec<[u32; 2]> {
    let mut ids = SmallVec::new();
    let finder = memmem::Finder::new("[__bind_");
    let mut cursor = 0;
    while let Some(offset) = finder.find(text[cursor..].as_bytes()) {
        let digits_start = cursor + offset + "[__bind_".len();
        let digits_end = text[digits_start..]
            .find(|c: char| !c.is_ascii_digit())
            .map_or(text.len(), |d| digits_start + d);
        if text[digits_end..].starts_with(']')
            && let Ok(id) = text[digits_start..digits_end].parse::<u32>()
            && !ids.contains(&id)
        {
            ids.push(id);
        }
        cursor = digits_end;
    }
    ids
}

/// Walk the compiled fragment once, recording placeholder occurrences and
/// `data-ref` paths.
#[must_use]
pub fn index_fragment(fragment: &NodeRef) -> NodePathIndex {
    let mut index = NodePathIndex::default();
    let mut path = NodePath::new();
    walk(fragment, &mut path, &mut index);
    index
}

fn walk(node: &NodeRef, path: &mut NodePath, index: &mut NodePathIndex) {
    if node.is_element() {
        if let Some(name) = node.attr("data-ref") {
            index.refs.insert(name, path.clone());
        }
        for (attr_name, attr_value) in node.attrs() {
            for id in tokens_in(&attr_value) {
                index.occurrences.entry(id).or_default().push(Occurrence {
                    path: path.clone(),
                    kind: TargetKind::Attribute(attr_name.clone()),
                });
            }
        }
    } else if node.is_text() {
        for id in tokens_in(&node.text()) {
            index.occurrences.entry(id).or_default().push(Occurrence {
                path: path.clone(),
                kind: TargetKind::Text,
            });
        }
    }
    for (i, child) in node.children().iter().enumerate() {
        path.push(i);
        walk(child, path, index);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use weft_dom::parse_fragment;

    use super::*;

    #[test]
    fn tokens_in_finds_ids_in_order() {
        assert_eq!(
            tokens_in("a [__bind_3] b [__bind_0] c").to_vec(),
            vec![3, 0]
        );
    }

    #[test]
    fn tokens_in_dedups_repeats() {
        assert_eq!(tokens_in("[__bind_1][__bind_1]").to_vec(), vec![1]);
    }

    #[test]
    fn tokens_in_ignores_malformed() {
        assert!(tokens_in("[__bind_] [__bind_x] [__bind_2").is_empty());
    }

    #[test]
    fn indexes_text_occurrences() {
        let frag = parse_fragment("<div><span>[__bind_0]</span></div>");
        let index = index_fragment(&frag);
        let occ = index.occurrences(0);
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].path.as_slice(), &[0, 0, 0]);
        assert_eq!(occ[0].kind, TargetKind::Text);
    }

    #[test]
    fn indexes_attribute_occurrences() {
        let frag = parse_fragment(r#"<a title="[__bind_0]-[__bind_1]">x</a>"#);
        let index = index_fragment(&frag);
        assert_eq!(index.binding_ids(), vec![0, 1]);
        let occ = index.occurrences(1);
        assert_eq!(occ[0].kind, TargetKind::Attribute("title".to_owned()));
        assert_eq!(occ[0].path.as_slice(), &[0]);
    }

    #[test]
    fn shared_node_occurrences_are_recorded_separately() {
        let frag = parse_fragment("<p>[__bind_0] and [__bind_1]</p>");
        let index = index_fragment(&frag);
        assert_eq!(index.occurrences(0)[0].path, index.occurrences(1)[0].path);
    }

    #[test]
    fn one_binding_may_occur_in_many_places() {
        let frag = parse_fragment(r#"<p title="[__bind_0]">[__bind_0]</p>"#);
        let index = index_fragment(&frag);
        assert_eq!(index.occurrences(0).len(), 2);
    }

    #[test]
    fn records_ref_paths() {
        let frag = parse_fragment(
            r#"<div><button data-ref="inc">+</button><span data-ref="out"></span></div>"#,
        );
        let index = index_fragment(&frag);
        assert_eq!(index.ref_path("inc").unwrap().as_slice(), &[0, 0]);
        assert_eq!(index.ref_path("out").unwrap().as_slice(), &[0, 1]);
        assert!(index.ref_path("missing").is_none());
        let mut names = index.ref_names();
        names.sort_unstable();
        assert_eq!(names, vec!["inc", "out"]);
    }

    #[test]
    fn comment_content_is_not_indexed() {
        let frag = parse_fragment("<!--[__bind_0]--><b>[__bind_0]</b>");
        let index = index_fragment(&frag);
        assert_eq!(index.occurrences(0).len(), 1);
        assert_eq!(index.occurrences(0)[0].kind, TargetKind::Text);
    }
}

//! Dotted-path splitting and prebuilt accessors.
//!
//! A path like `"user.address.city"` splits into segments once, at
//! registration or compile time; an [`Accessor`] then walks a value along
//! those segments with no further string work per evaluation.

use serde_json::Value;
use smallvec::SmallVec;

/// Segment list for a dotted path. Small paths stay inline.
pub type Segments = SmallVec<[String; 4]>;

/// Split a dotted path into segments.
///
/// A single pass over the bytes; a trailing dot yields no empty trailing
/// segment, but interior empty segments (`"a..b"`) are preserved so that a
/// malformed path fails lookup instead of silently collapsing.
#[must_use]
pub fn split_path(path: &str) -> Segments {
    let mut parts = Segments::new();
    let mut start = 0;
    for (i, b) in path.bytes().enumerate() {
        if b == b'.' {
            parts.push(path[start..i].to_owned());
            start = i + 1;
        }
    }
    if start < path.len() {
        parts.push(path[start..].to_owned());
    }
    parts
}

/// A prebuilt walker over path segments.
///
/// Built once per binding or nested subscription; evaluation is O(depth)
/// with no re-parsing. Missing segments and non-traversable intermediates
/// resolve to `Value::Null` rather than erroring, mirroring plain property
/// access on an absent field.
#[derive(Clone, Debug)]
pub struct Accessor {
    segments: Segments,
}

impl Accessor {
    /// Build an accessor from pre-split segments.
    #[must_use]
    pub fn new(segments: Segments) -> Self {
        Self { segments }
    }

    /// Build an accessor directly from a dotted path.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        Self::new(split_path(path))
    }

    /// The segments this accessor walks. Empty means identity.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Walk `root` along the segments, returning a reference to the value
    /// reached, or `None` when the path does not resolve.
    #[must_use]
    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Walk `root` along the segments, cloning the result. Unresolvable
    /// paths yield `Value::Null`.
    #[must_use]
    pub fn resolve(&self, root: &Value) -> Value {
        self.get(root).cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_simple() {
        let parts = split_path("a.b.c");
        assert_eq!(parts.as_slice(), ["a", "b", "c"]);
    }

    #[test]
    fn split_single_segment() {
        assert_eq!(split_path("count").as_slice(), ["count"]);
    }

    #[test]
    fn split_empty() {
        assert!(split_path("").is_empty());
    }

    #[test]
    fn split_trailing_dot_drops_empty_tail() {
        assert_eq!(split_path("a.").as_slice(), ["a"]);
    }

    #[test]
    fn split_interior_empty_segment_preserved() {
        assert_eq!(split_path("a..b").as_slice(), ["a", "", "b"]);
    }

    #[test]
    fn accessor_walks_objects() {
        let v = json!({"user": {"address": {"city": "Oslo"}}});
        let a = Accessor::from_path("user.address.city");
        assert_eq!(a.resolve(&v), json!("Oslo"));
    }

    #[test]
    fn accessor_walks_arrays_by_index() {
        let v = json!({"rows": [{"id": 1}, {"id": 2}]});
        let a = Accessor::from_path("rows.1.id");
        assert_eq!(a.resolve(&v), json!(2));
    }

    #[test]
    fn accessor_missing_segment_is_null() {
        let v = json!({"user": {"name": "Ada"}});
        let a = Accessor::from_path("user.age");
        assert_eq!(a.resolve(&v), Value::Null);
    }

    #[test]
    fn accessor_through_scalar_is_null() {
        let v = json!({"n": 3});
        let a = Accessor::from_path("n.x");
        assert_eq!(a.resolve(&v), Value::Null);
    }

    #[test]
    fn accessor_empty_path_is_identity() {
        let v = json!({"k": 1});
        let a = Accessor::from_path("");
        assert_eq!(a.resolve(&v), v);
    }

    #[test]
    fn accessor_bad_array_index_is_null() {
        let v = json!({"rows": [1, 2]});
        assert_eq!(Accessor::from_path("rows.x").resolve(&v), Value::Null);
        assert_eq!(Accessor::from_path("rows.9").resolve(&v), Value::Null);
    }

    mod properties {
        use proptest::prelude::*;
        use serde_json::json;

        use super::super::*;

        proptest! {
            #[test]
            fn join_then_split_round_trips(
                segments in proptest::collection::vec("[a-z][a-z0-9_]{0,8}", 1..6)
            ) {
                let joined = segments.join(".");
                prop_assert_eq!(split_path(&joined).to_vec(), segments);
            }

            #[test]
            fn accessor_never_panics_on_arbitrary_paths(path in "[a-z.]{0,16}") {
                let v = json!({"a": {"b": [1, 2, {"c": true}]}});
                let _ = Accessor::from_path(&path).resolve(&v);
            }
        }
    }
}

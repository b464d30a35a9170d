//! One-time template compilation.
//!
//! The compiler makes a single left-to-right pass over the template source.
//! For every placeholder it classifies the surrounding markup context with
//! an explicit state scan (outside-tag / inside-tag / inside-quoted-value),
//! extracts the dotted source path, prebuilds an accessor, and substitutes
//! the sequential token `[__bind_N]`. The resulting static markup parses
//! once into a prototype fragment; instances only ever clone it.
//!
//! # Expression grammar
//!
//! ```text
//! {{ source(.segment)*(:html)? }}    dynamic (live subscription)
//! @{{ source(.segment)*(:html)? }}   static (substituted once, never updates)
//! ```
//!
//! The `:html` suffix marks an HTML-island: the produced string is parsed
//! as markup and spliced in as live sibling nodes instead of escaped text.
//!
//! # Failure modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Empty template | `CompileError::EmptyTemplate` |
//! | Unterminated `{{` | stop processing; emit already-processed output plus the raw tail |
//! | Placeholder in an unquoted tag position | classified as text, resolves to nothing at index time |

use std::fmt;

use memchr::memmem;
use tracing::debug;

use weft_dom::node::NodeRef;
use weft_dom::parser::parse_fragment;
use weft_reactive::path::{Accessor, split_path};

use crate::index::{NodePathIndex, TargetKind, index_fragment};

/// Marker immediately before `{{` that makes a placeholder static.
const STATIC_SIGIL: char = '@';

/// Suffix on an expression that marks an HTML-island.
const ISLAND_SUFFIX: &str = ":html";

/// Compilation errors. Malformed placeholder syntax is not an error — it
/// degrades per the module docs, since template text is author-controlled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompileError {
    /// The template source contains no markup at all.
    EmptyTemplate,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTemplate => write!(f, "template source is empty"),
        }
    }
}

impl std::error::Error for CompileError {}

/// Compiled description of one template placeholder. Immutable after
/// compilation and shared read-only by every instance of the class.
#[derive(Clone, Debug)]
pub struct BindingInstruction {
    /// Sequential id; `[__bind_id]` is the token in the static markup.
    pub id: u32,
    /// Name before the first dot: `state` or an external named source.
    pub source: String,
    /// Dotted remainder under the source; empty for a bare source name.
    pub path: String,
    /// Prebuilt walker for `path`.
    pub accessor: Accessor,
    /// Live subscription (`{{..}}`) vs. one-time substitution (`@{{..}}`).
    pub dynamic: bool,
    /// Value is parsed as markup and spliced as sibling nodes.
    pub island: bool,
    /// Context classification at the placeholder site.
    pub target: TargetKind,
    /// `data-ref` of the enclosing open tag, when the placeholder sits in
    /// tag context. A convenience for diagnostics, not load-bearing.
    pub ref_name: Option<String>,
}

/// Everything a component class derives from its template, exactly once.
#[derive(Clone, Debug)]
pub struct CompiledTemplate {
    /// Template source with placeholders replaced by tokens.
    pub markup: String,
    /// One instruction per placeholder, in source order.
    pub bindings: Vec<BindingInstruction>,
    /// Prototype fragment parsed from `markup`. Shared read-only;
    /// instances deep-clone before touching it.
    pub fragment: NodeRef,
    /// Node paths for every token occurrence and `data-ref`.
    pub index: NodePathIndex,
}

/// The token substituted for placeholder `id` in the static markup.
#[must_use]
pub fn placeholder_token(id: u32) -> String {
    format!("[__bind_{id}]")
}

/// Compile a template source. Invoked once per component class.
pub fn compile(source: &str) -> Result<CompiledTemplate, CompileError> {
    if source.trim().is_empty() {
        return Err(CompileError::EmptyTemplate);
    }
    let finder = memmem::Finder::new("{{");
    let mut markup = String::with_capacity(source.len());
    let mut bindings = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = finder.find(source[cursor..].as_bytes()) {
        let open = cursor + offset;
        let Some(close_offset) = memmem::find(source[open + 2..].as_bytes(), b"}}") else {
            debug!(at = open, "unterminated placeholder; emitting raw tail");
            break;
        };
        let close = open + 2 + close_offset;

        let is_static = source[..open].ends_with(STATIC_SIGIL);
        let literal_end = if is_static { open - STATIC_SIGIL.len_utf8() } else { open };
        markup.push_str(&source[cursor..literal_end]);

        let mut expression = source[open + 2..close].trim();
        let island = expression.ends_with(ISLAND_SUFFIX);
        if island {
            expression = expression[..expression.len() - ISLAND_SUFFIX.len()].trim_end();
        }
        let segments = split_path(expression);
        let source_name = segments.first().cloned().unwrap_or_default();
        let path = segments.get(1..).unwrap_or(&[]).join(".");
        let accessor = Accessor::new(segments.iter().skip(1).cloned().collect());

        let context = classify_context(&source[..open]);
        let ref_name = match &context {
            Context::Text => None,
            Context::Tag { start } | Context::AttributeValue { start, .. } => {
                ref_in_tag(source, *start, close)
            }
        };
        let target = match context {
            Context::AttributeValue { name, .. } => TargetKind::Attribute(name),
            Context::Text | Context::Tag { .. } => TargetKind::Text,
        };

        let id = u32::try_from(bindings.len()).unwrap_or(u32::MAX);
        markup.push_str(&placeholder_token(id));
        bindings.push(BindingInstruction {
            id,
            source: source_name,
            path,
            accessor,
            dynamic: !is_static,
            island,
            target,
            ref_name,
        });
        cursor = close + 2;
    }
    markup.push_str(&source[cursor..]);

    debug!(bindings = bindings.len(), "template compiled");
    let fragment = parse_fragment(&markup);
    let index = index_fragment(&fragment);
    Ok(CompiledTemplate {
        markup,
        bindings,
        fragment,
        index,
    })
}

/// Markup context immediately before a placeholder.
enum Context {
    /// Outside any tag: the placeholder lands in a text node.
    Text,
    /// Inside an open tag but not inside a quoted value.
    Tag { start: usize },
    /// Inside an open quoted attribute value.
    AttributeValue { start: usize, name: String },
}

/// Scan `prefix` with explicit states to decide where its end sits.
fn classify_context(prefix: &str) -> Context {
    enum State {
        Text,
        Tag,
        Quoted(char),
    }
    let mut state = State::Text;
    let mut tag_start = 0;
    let mut token = String::new();
    let mut eq_name: Option<String> = None;
    let mut attr_name: Option<String> = None;

    for (i, c) in prefix.char_indices() {
        match state {
            State::Text => {
                if c == '<' {
                    state = State::Tag;
                    tag_start = i;
                    token.clear();
                    eq_name = None;
                }
            }
            State::Tag => match c {
                '>' => state = State::Text,
                '"' | '\'' => {
                    attr_name = eq_name.take();
                    state = State::Quoted(c);
                }
                '=' => {
                    eq_name = Some(std::mem::take(&mut token));
                }
                c if c.is_whitespace() || c == '/' => token.clear(),
                _ => token.push(c),
            },
            State::Quoted(quote) => {
                if c == quote {
                    attr_name = None;
                    state = State::Tag;
                }
            }
        }
    }
    match state {
        State::Text => Context::Text,
        State::Tag => Context::Tag { start: tag_start },
        State::Quoted(_) => Context::AttributeValue {
            start: tag_start,
            name: attr_name.unwrap_or_default(),
        },
    }
}

/// Find a `data-ref` value inside the open tag spanning `tag_start..` up to
/// the first `>` at or after `expr_end`.
fn ref_in_tag(source: &str, tag_start: usize, expr_end: usize) -> Option<String> {
    let tag_end = source[expr_end..]
        .find('>')
        .map_or(source.len(), |i| expr_end + i);
    let tag = &source[tag_start..tag_end];
    let at = memmem::find(tag.as_bytes(), b"data-ref=")?;
    let rest = &tag[at + "data-ref=".len()..];
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[quote.len_utf8()..];
    let end = value.find(quote)?;
    Some(value[..end].to_owned())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_template_is_an_error() {
        assert_eq!(compile("  \n ").unwrap_err(), CompileError::EmptyTemplate);
    }

    #[test]
    fn substitutes_sequential_tokens() {
        let compiled = compile("<b>{{state.a}}</b><i>{{state.b}}</i>").unwrap();
        assert_eq!(compiled.markup, "<b>[__bind_0]</b><i>[__bind_1]</i>");
        assert_eq!(compiled.bindings.len(), 2);
    }

    #[test]
    fn splits_source_and_path() {
        let compiled = compile("<p>{{user.address.city}}</p>").unwrap();
        let binding = &compiled.bindings[0];
        assert_eq!(binding.source, "user");
        assert_eq!(binding.path, "address.city");
        assert_eq!(binding.accessor.segments(), ["address", "city"]);
    }

    #[test]
    fn bare_source_has_empty_path() {
        let compiled = compile("<p>{{state}}</p>").unwrap();
        assert_eq!(compiled.bindings[0].source, "state");
        assert_eq!(compiled.bindings[0].path, "");
        assert!(compiled.bindings[0].accessor.segments().is_empty());
    }

    #[test]
    fn static_sigil_marks_one_time_bindings() {
        let compiled = compile("<div>@{{state.x}}</div><span>{{state.y}}</span>").unwrap();
        assert!(!compiled.bindings[0].dynamic);
        assert!(compiled.bindings[1].dynamic);
        // The sigil itself is consumed.
        assert_eq!(compiled.markup, "<div>[__bind_0]</div><span>[__bind_1]</span>");
    }

    #[test]
    fn island_suffix_is_detected_and_stripped() {
        let compiled = compile("<div>{{state.body:html}}</div>").unwrap();
        let binding = &compiled.bindings[0];
        assert!(binding.island);
        assert_eq!(binding.source, "state");
        assert_eq!(binding.path, "body");
    }

    #[test]
    fn classifies_text_context() {
        let compiled = compile("<div>{{state.x}}</div>").unwrap();
        assert_eq!(compiled.bindings[0].target, TargetKind::Text);
    }

    #[test]
    fn classifies_attribute_context_with_name() {
        let compiled = compile(r#"<div title="{{state.a}}-{{state.b}}">x</div>"#).unwrap();
        assert_eq!(
            compiled.bindings[0].target,
            TargetKind::Attribute("title".to_owned())
        );
        assert_eq!(
            compiled.bindings[1].target,
            TargetKind::Attribute("title".to_owned())
        );
    }

    #[test]
    fn single_quoted_attribute_context() {
        let compiled = compile("<div title='{{state.a}}'>x</div>").unwrap();
        assert_eq!(
            compiled.bindings[0].target,
            TargetKind::Attribute("title".to_owned())
        );
    }

    #[test]
    fn attribute_after_other_attributes() {
        let compiled = compile(r#"<a href="/x" class="b {{state.c}}">y</a>"#).unwrap();
        assert_eq!(
            compiled.bindings[0].target,
            TargetKind::Attribute("class".to_owned())
        );
    }

    #[test]
    fn records_data_ref_in_tag_context() {
        let compiled =
            compile(r#"<span data-ref="out" title="{{state.t}}">x</span>"#).unwrap();
        assert_eq!(compiled.bindings[0].ref_name.as_deref(), Some("out"));
    }

    #[test]
    fn data_ref_after_placeholder_in_same_tag_is_found() {
        let compiled =
            compile(r#"<span title="{{state.t}}" data-ref="out">x</span>"#).unwrap();
        assert_eq!(compiled.bindings[0].ref_name.as_deref(), Some("out"));
    }

    #[test]
    fn text_context_has_no_ref() {
        let compiled = compile(r#"<span data-ref="out">{{state.t}}</span>"#).unwrap();
        assert_eq!(compiled.bindings[0].ref_name, None);
    }

    #[test]
    fn unterminated_placeholder_degrades() {
        let compiled = compile("<b>{{state.a}}</b><i>{{broken</i>").unwrap();
        assert_eq!(compiled.markup, "<b>[__bind_0]</b><i>{{broken</i>");
        assert_eq!(compiled.bindings.len(), 1);
    }

    #[test]
    fn whitespace_inside_delimiters_is_trimmed() {
        let compiled = compile("<p>{{  state.x  }}</p>").unwrap();
        assert_eq!(compiled.bindings[0].source, "state");
        assert_eq!(compiled.bindings[0].path, "x");
    }

    #[test]
    fn fragment_and_index_are_built() {
        let compiled = compile("<p>{{state.x}}</p>").unwrap();
        assert_eq!(compiled.index.occurrences(0).len(), 1);
        let node = weft_dom::node::Node::at_path(
            &compiled.fragment,
            &compiled.index.occurrences(0)[0].path,
        )
        .unwrap();
        assert_eq!(node.text(), "[__bind_0]");
    }

    #[test]
    fn island_suffix_with_inner_whitespace() {
        let compiled = compile("<div>{{ state.body :html }}</div>").unwrap();
        assert!(compiled.bindings[0].island);
        assert_eq!(compiled.bindings[0].path, "body");
    }
}

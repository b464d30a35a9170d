//! Best-effort markup parser.
//!
//! A hand-written scanner with explicit positions rather than a grammar:
//! text runs between `<`s, tags, quoted attribute values and comments are
//! each handled by a dedicated step. Template sources are author-controlled
//! and checked at development time, so malformed input degrades instead of
//! failing: unclosed tags close at end of input, a stray `<` becomes text,
//! an unterminated comment swallows the rest of the source.

use std::rc::Rc;

use memchr::memchr;

use crate::node::{Node, NodeRef};
use crate::serialize::{is_void_element, unescape};

/// Parse markup into a fragment. Never fails; see module docs for the
/// degradation rules.
#[must_use]
pub fn parse_fragment(source: &str) -> NodeRef {
    let root = Node::fragment();
    let mut stack: Vec<NodeRef> = vec![Rc::clone(&root)];
    let bytes = source.as_bytes();
    let mut pos = 0;

    while pos < source.len() {
        let Some(lt) = memchr(b'<', &bytes[pos..]) else {
            push_text(&stack, &source[pos..]);
            break;
        };
        if lt > 0 {
            push_text(&stack, &source[pos..pos + lt]);
            pos += lt;
        }
        let rest = &source[pos..];
        if let Some(comment) = rest.strip_prefix("<!--") {
            match comment.find("-->") {
                Some(end) => {
                    append(&stack, Node::comment(&comment[..end]));
                    pos += 4 + end + 3;
                }
                None => {
                    append(&stack, Node::comment(comment));
                    pos = source.len();
                }
            }
        } else if let Some(close) = rest.strip_prefix("</") {
            match close.find('>') {
                Some(end) => {
                    close_tag(&mut stack, close[..end].trim());
                    pos += 2 + end + 1;
                }
                None => pos = source.len(),
            }
        } else if rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
            pos += parse_tag(&mut stack, rest);
        } else {
            // Stray '<' with no tag behind it: literal text.
            push_text(&stack, "<");
            pos += 1;
        }
    }
    root
}

fn current(stack: &[NodeRef]) -> &NodeRef {
    stack.last().unwrap_or_else(|| unreachable!("fragment root never pops"))
}

fn append(stack: &[NodeRef], node: NodeRef) {
    Node::append(current(stack), &node);
}

fn push_text(stack: &[NodeRef], raw: &str) {
    if !raw.is_empty() {
        append(stack, Node::text_node(unescape(raw)));
    }
}

fn close_tag(stack: &mut Vec<NodeRef>, name: &str) {
    // Find the nearest open element with this tag (the root fragment at
    // index 0 never counts); pop through it. A stray close tag is ignored.
    let Some(open) = stack
        .iter()
        .rposition(|n| n.tag().is_some_and(|t| t.eq_ignore_ascii_case(name)))
    else {
        return;
    };
    if open > 0 {
        stack.truncate(open);
    }
}

/// Parse one open tag starting at `<`. Returns the number of bytes consumed.
fn parse_tag(stack: &mut Vec<NodeRef>, rest: &str) -> usize {
    let bytes = rest.as_bytes();
    let mut i = 1;
    while i < bytes.len() && is_name_byte(bytes[i]) {
        i += 1;
    }
    let element = Node::element(&rest[1..i]);
    let mut self_closing = false;

    loop {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            // Unclosed tag at end of input: keep what we have, stay open.
            break;
        }
        match bytes[i] {
            b'>' => {
                i += 1;
                break;
            }
            b'/' if rest[i..].starts_with("/>") => {
                self_closing = true;
                i += 2;
                break;
            }
            b'/' => {
                i += 1;
            }
            _ => i = parse_attr(&element, rest, i),
        }
    }

    let tag_is_void = element.tag().is_some_and(is_void_element);
    append(stack, Rc::clone(&element));
    if !self_closing && !tag_is_void {
        stack.push(element);
    }
    i
}

/// Parse one attribute (`name`, `name=value`, `name="value"`, `name='value'`)
/// starting at `i`. Returns the position after the attribute.
fn parse_attr(element: &NodeRef, rest: &str, mut i: usize) -> usize {
    let bytes = rest.as_bytes();
    let name_start = i;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'=' | b'>' | b'/') {
        i += 1;
    }
    let name = &rest[name_start..i];
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= bytes.len() || bytes[i] != b'=' {
        if !name.is_empty() {
            element.set_attr(name, "");
        }
        return i;
    }
    i += 1;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let value = if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
        let quote = bytes[i];
        i += 1;
        let value_start = i;
        match memchr(quote, &bytes[i..]) {
            Some(end) => {
                i += end + 1;
                &rest[value_start..value_start + end]
            }
            None => {
                // Unterminated quote: the rest of the source is the value.
                i = bytes.len();
                &rest[value_start..]
            }
        }
    } else {
        let value_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
            i += 1;
        }
        &rest[value_start..i]
    };
    if !name.is_empty() {
        element.set_attr(name, unescape(value));
    }
    i
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b':' || b == b'_'
}

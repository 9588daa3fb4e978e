//! Structural addresses for document nodes.
//!
//! An address is a root-to-leaf path of `tag[n]` segments, where `n` counts
//! the element among preceding siblings sharing its tag (1-based). Siblings of
//! other tags do not shift the index, so unrelated insertions keep an address
//! stable. Inserting a same-tag sibling before the target, or changing the
//! tag hierarchy, breaks it; resolution then reports not-found.
//!
//! Highlight markers are transparent to addressing: they never count as
//! siblings and are never the addressed element, so an address does not
//! depend on which highlights happen to be rendered.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::dom::{Document, NodeData, NodeId};
use crate::restore::is_marker;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address must start with '/': {0}")]
    NotAbsolute(String),
    #[error("empty segment in address")]
    EmptySegment,
    #[error("malformed segment: {0}")]
    MalformedSegment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub tag: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralAddress {
    segments: Vec<Segment>,
}

impl StructuralAddress {
    /// Builds the address of `node`. Text nodes are addressed through their
    /// parent element. Returns `None` for other node kinds and for elements
    /// not attached to the document.
    pub fn of(doc: &Document, node: NodeId) -> Option<Self> {
        let target = addressable_element(doc, node)?;

        let mut segments = Vec::new();
        let mut current = target;
        loop {
            let tag = doc.tag_name(current)?;
            let parent = doc.parent(current)?;
            let index = 1 + structural_children(doc, parent)
                .take_while(|sibling| *sibling != current)
                .filter(|sibling| doc.tag_name(*sibling) == Some(tag))
                .count();
            segments.push(Segment {
                tag: tag.to_ascii_lowercase(),
                index,
            });

            if parent == doc.root() {
                break;
            }
            current = parent;
        }

        segments.reverse();
        Some(StructuralAddress { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Walks the address from the document root. Any segment that no longer
    /// matches yields `None`.
    pub fn resolve(&self, doc: &Document) -> Option<NodeId> {
        let mut current = doc.root();
        for segment in &self.segments {
            current = structural_children(doc, current)
                .filter(|child| {
                    doc.tag_name(*child)
                        .map(|tag| tag.eq_ignore_ascii_case(&segment.tag))
                        .unwrap_or(false)
                })
                .nth(segment.index - 1)?;
        }
        Some(current)
    }
}

/// The element `node` is addressed through. Text nodes use their parent
/// element, and markers defer to the element they were inserted into.
pub fn addressable_element(doc: &Document, node: NodeId) -> Option<NodeId> {
    let mut element = match doc.data(node) {
        NodeData::Element { .. } => node,
        NodeData::Text(_) => doc.parent(node).filter(|p| doc.is_element(*p))?,
        _ => return None,
    };
    while is_marker(doc, element) {
        element = doc.parent(element).filter(|p| doc.is_element(*p))?;
    }
    Some(element)
}

fn structural_children(doc: &Document, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    doc.element_children(parent)
        .filter(move |child| !is_marker(doc, *child))
}

impl fmt::Display for StructuralAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}[{}]", segment.tag, segment.index)?;
        }
        Ok(())
    }
}

impl FromStr for StructuralAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        let Some(path) = s.strip_prefix('/') else {
            return Err(AddressError::NotAbsolute(s.to_string()));
        };

        let segments = path
            .split('/')
            .map(parse_segment)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StructuralAddress { segments })
    }
}

fn parse_segment(raw: &str) -> Result<Segment, AddressError> {
    if raw.is_empty() {
        return Err(AddressError::EmptySegment);
    }
    let malformed = || AddressError::MalformedSegment(raw.to_string());

    let (tag, index) = match raw.split_once('[') {
        Some((tag, rest)) => {
            let digits = rest.strip_suffix(']').ok_or_else(malformed)?;
            let index: usize = digits.parse().map_err(|_| malformed())?;
            (tag, index)
        }
        None => (raw, 1),
    };

    let valid_tag = !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':');
    if !valid_tag || index == 0 {
        return Err(malformed());
    }

    Ok(Segment {
        tag: tag.to_ascii_lowercase(),
        index,
    })
}

/// Encodes `node` as an address string; empty when the node is unaddressable.
pub fn encode(doc: &Document, node: NodeId) -> String {
    StructuralAddress::of(doc, node)
        .map(|address| address.to_string())
        .unwrap_or_default()
}

/// Resolves an address string against `doc`. Malformed or stale addresses
/// resolve to `None`.
pub fn decode(doc: &Document, address: &str) -> Option<NodeId> {
    match address.parse::<StructuralAddress>() {
        Ok(parsed) => parsed.resolve(doc),
        Err(e) => {
            tracing::debug!(address, error = %e, "unparseable structural address");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    const PAGE: &str = r#"<html><body>
        <div><p>first</p><span>aside</span><p>second <b>bold</b></p></div>
        <div><p>third</p></div>
    </body></html>"#;

    #[test]
    fn test_encode_counts_same_tag_siblings_only() {
        let doc = parse_html(PAGE);
        let ps = doc.find_elements(doc.root(), |d, n| d.tag_name(n) == Some("p"));
        assert_eq!(encode(&doc, ps[0]), "/html[1]/body[1]/div[1]/p[1]");
        assert_eq!(encode(&doc, ps[1]), "/html[1]/body[1]/div[1]/p[2]");
        assert_eq!(encode(&doc, ps[2]), "/html[1]/body[1]/div[2]/p[1]");
    }

    #[test]
    fn test_encode_text_node_uses_parent() {
        let doc = parse_html(PAGE);
        let b = doc.first_element_by_tag("b").unwrap();
        let text = doc.children(b)[0];
        assert_eq!(encode(&doc, text), "/html[1]/body[1]/div[1]/p[2]/b[1]");
    }

    #[test]
    fn test_round_trip_every_element() {
        let doc = parse_html(PAGE);
        for element in doc.find_elements(doc.root(), |_, _| true) {
            let address = encode(&doc, element);
            assert_eq!(decode(&doc, &address), Some(element), "{}", address);
        }
    }

    #[test]
    fn test_markers_are_not_counted_as_siblings() {
        let mut doc = parse_html("<p>Hello world <span>inner text here</span></p>");
        let p = doc.first_element_by_tag("p").unwrap();
        let span = doc.first_element_by_tag("span").unwrap();
        let lead = doc.children(p)[0];

        let marker = doc.create_element("span");
        doc.set_attr(marker, "class", crate::restore::MARKER_CLASS);
        doc.set_attr(marker, crate::restore::MARKER_ID_ATTR, "m1");
        let marked = doc.create_text("Hello");
        doc.append_child(marker, marked);
        let rest = doc.create_text(" world ");
        assert!(doc.replace_with(lead, &[marker, rest]));

        assert_eq!(encode(&doc, span), "/html[1]/body[1]/p[1]/span[1]");
        assert_eq!(decode(&doc, "/html[1]/body[1]/p[1]/span[1]"), Some(span));
        assert_eq!(encode(&doc, marked), "/html[1]/body[1]/p[1]");
        assert_eq!(encode(&doc, marker), "/html[1]/body[1]/p[1]");
    }

    #[test]
    fn test_unaddressable_nodes_encode_empty() {
        let mut doc = parse_html("<!DOCTYPE html><p>x</p><!-- note -->");
        let doctype = doc.children(doc.root())[0];
        let comment = doc
            .descendants(doc.root())
            .find(|n| matches!(doc.data(*n), NodeData::Comment(_)))
            .unwrap();
        let detached = doc.create_element("p");

        assert_eq!(encode(&doc, doc.root()), "");
        assert_eq!(encode(&doc, doctype), "");
        assert_eq!(encode(&doc, comment), "");
        assert_eq!(encode(&doc, detached), "");
    }

    #[test]
    fn test_unrelated_insertions_keep_address_stable() {
        let mut doc = parse_html(PAGE);
        let target = doc
            .find_elements(doc.root(), |d, n| d.tag_name(n) == Some("p"))[1];
        let address = encode(&doc, target);

        let div = doc.parent(target).unwrap();
        let first = doc.children(div)[0];
        let extra = doc.create_element("section");
        doc.insert_before(div, extra, first);

        assert_eq!(decode(&doc, &address), Some(target));
    }

    #[test]
    fn test_decode_fails_quietly() {
        let doc = parse_html(PAGE);
        assert_eq!(decode(&doc, "/html[1]/body[1]/div[3]"), None);
        assert_eq!(decode(&doc, "/html[1]/body[1]/article[1]"), None);
        assert_eq!(decode(&doc, "html[1]"), None);
        assert_eq!(decode(&doc, "/html[0]"), None);
        assert_eq!(decode(&doc, "/html[x]"), None);
        assert_eq!(decode(&doc, ""), None);
        assert_eq!(decode(&doc, "//p"), None);
    }

    #[test]
    fn test_parse_accepts_implicit_index_and_uppercase() {
        let doc = parse_html(PAGE);
        let parsed: StructuralAddress = "/HTML/BODY[1]/DIV[2]/P".parse().unwrap();
        assert_eq!(parsed.to_string(), "/html[1]/body[1]/div[2]/p[1]");
        assert!(parsed.resolve(&doc).is_some());
    }
}

//! Selection Capture
//!
//! Turns a released text selection into a [`HighlightRecord`]. Only
//! selections inside one text node qualify, which keeps every stored range
//! restorable by the single-node lookup in `restore`.

use thiserror::Error;

use crate::address;
use crate::dom::{Document, NodeId, utf16_len, utf16_to_byte};
use crate::model::{CreateHighlight, HighlightColor, HighlightRecord};

pub const MIN_SELECTION_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPoint {
    pub node: NodeId,
    /// UTF-16 offset inside `node`.
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: SelectionPoint,
    pub focus: SelectionPoint,
}

impl Selection {
    pub fn within(node: NodeId, start: usize, end: usize) -> Self {
        Selection {
            anchor: SelectionPoint { node, offset: start },
            focus: SelectionPoint { node, offset: end },
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureRejection {
    #[error("highlighting is switched off")]
    Inactive,
    #[error("selection is collapsed")]
    Collapsed,
    #[error("selection spans more than one text node")]
    CrossNode,
    #[error("selection is not inside a text node")]
    NotText,
    #[error("selection offsets fall outside the text node")]
    OutOfBounds,
    #[error("selected text is shorter than {} characters", MIN_SELECTION_CHARS)]
    TooShort,
    #[error("selection has no addressable element")]
    Unaddressable,
}

/// A qualifying selection expressed in stored-record terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRange {
    pub xpath: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
}

/// Checks a released selection and converts it into element-relative
/// offsets. Does not look at activation state.
pub fn qualify(doc: &Document, selection: &Selection) -> Result<CapturedRange, CaptureRejection> {
    if selection.is_collapsed() {
        return Err(CaptureRejection::Collapsed);
    }
    if selection.anchor.node != selection.focus.node {
        return Err(CaptureRejection::CrossNode);
    }

    let node = selection.anchor.node;
    let text = doc.text(node).ok_or(CaptureRejection::NotText)?;
    let (local_start, local_end) = if selection.anchor.offset <= selection.focus.offset {
        (selection.anchor.offset, selection.focus.offset)
    } else {
        (selection.focus.offset, selection.anchor.offset)
    };

    let from = utf16_to_byte(text, local_start).ok_or(CaptureRejection::OutOfBounds)?;
    let to = utf16_to_byte(text, local_end).ok_or(CaptureRejection::OutOfBounds)?;
    let selected = &text[from..to];
    if selected.trim().chars().count() < MIN_SELECTION_CHARS {
        return Err(CaptureRejection::TooShort);
    }

    // offsets are relative to the addressed element, which includes text
    // already wrapped in markers
    let element = address::addressable_element(doc, node).ok_or(CaptureRejection::Unaddressable)?;
    let xpath = address::encode(doc, element);
    if xpath.is_empty() {
        return Err(CaptureRejection::Unaddressable);
    }

    let prefix: usize = doc
        .text_nodes(element)
        .into_iter()
        .take_while(|n| *n != node)
        .filter_map(|n| doc.text(n))
        .map(utf16_len)
        .sum();

    Ok(CapturedRange {
        xpath,
        start_offset: prefix + local_start,
        end_offset: prefix + local_end,
        text: selected.to_string(),
    })
}

/// Builds a new record for a qualifying selection on `url`.
pub fn capture(
    doc: &Document,
    selection: &Selection,
    url: &str,
    active: bool,
    color: HighlightColor,
) -> Result<HighlightRecord, CaptureRejection> {
    if !active {
        return Err(CaptureRejection::Inactive);
    }
    let range = qualify(doc, selection)?;
    Ok(HighlightRecord::new(CreateHighlight {
        url: url.to_string(),
        text: range.text,
        note: String::new(),
        start_offset: range.start_offset,
        end_offset: range.end_offset,
        xpath: range.xpath,
        color: Some(color.hex().to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::restore;

    fn text_nodes_of(doc: &Document, tag: &str) -> Vec<NodeId> {
        let element = doc.first_element_by_tag(tag).unwrap();
        doc.text_nodes(element)
    }

    #[test]
    fn test_capture_uses_element_relative_offsets() {
        let doc = parse_html("<p>one <b>two</b> three four</p>");
        let tail = text_nodes_of(&doc, "p")[2];
        let selection = Selection::within(tail, 7, 1);

        let record = capture(&doc, &selection, "https://e.com", true, HighlightColor::Blue).unwrap();
        assert_eq!(record.xpath, "/html[1]/body[1]/p[1]");
        assert_eq!(record.text, "three ");
        assert_eq!((record.start_offset, record.end_offset), (8, 14));
        assert_eq!(record.color.as_deref(), Some("#90caf9"));
    }

    #[test]
    fn test_captured_record_restores_same_text() {
        let doc = parse_html("<div><p>a</p><p>Hello, wonderful world</p></div>");
        let node = text_nodes_of(&doc, "div")[1];
        let record = capture(
            &doc,
            &Selection::within(node, 7, 16),
            "u",
            true,
            HighlightColor::default(),
        )
        .unwrap();

        let mut fresh = parse_html("<div><p>a</p><p>Hello, wonderful world</p></div>");
        let marker = restore::restore(&mut fresh, &record).unwrap();
        assert_eq!(fresh.text_content(marker), "wonderful");
    }

    #[test]
    fn test_selection_inside_marker_addresses_host_element() {
        let mut doc = parse_html("<p>Hello, wonderful world</p>");
        let node = text_nodes_of(&doc, "p")[0];
        let first = capture(&doc, &Selection::within(node, 7, 16), "u", true, HighlightColor::default())
            .unwrap();
        let marker = restore::restore(&mut doc, &first).unwrap();

        let inner = doc.children(marker)[0];
        let second = capture(&doc, &Selection::within(inner, 0, 6), "u", true, HighlightColor::Pink)
            .unwrap();
        assert_eq!(second.xpath, "/html[1]/body[1]/p[1]");
        assert_eq!((second.start_offset, second.end_offset), (7, 13));

        let mut fresh = parse_html("<p>Hello, wonderful world</p>");
        let restored = restore::restore(&mut fresh, &second).unwrap();
        assert_eq!(fresh.text_content(restored), "wonder");
    }

    #[test]
    fn test_cross_node_selection_is_rejected() {
        let doc = parse_html("<p>one <b>two</b> three</p>");
        let nodes = text_nodes_of(&doc, "p");
        let selection = Selection {
            anchor: SelectionPoint { node: nodes[0], offset: 0 },
            focus: SelectionPoint { node: nodes[2], offset: 3 },
        };
        assert_eq!(
            capture(&doc, &selection, "u", true, HighlightColor::default()),
            Err(CaptureRejection::CrossNode)
        );
    }

    #[test]
    fn test_rejections() {
        let doc = parse_html("<p>  ab  text</p>");
        let node = text_nodes_of(&doc, "p")[0];
        let p = doc.first_element_by_tag("p").unwrap();
        let color = HighlightColor::default();

        let cases = [
            (Selection::within(node, 0, 6), true, CaptureRejection::TooShort),
            (Selection::within(node, 3, 3), true, CaptureRejection::Collapsed),
            (Selection::within(node, 0, 99), true, CaptureRejection::OutOfBounds),
            (Selection::within(p, 0, 1), true, CaptureRejection::NotText),
            (Selection::within(node, 6, 10), false, CaptureRejection::Inactive),
        ];
        for (selection, active, expected) in cases {
            assert_eq!(capture(&doc, &selection, "u", active, color), Err(expected));
        }
        assert!(capture(&doc, &Selection::within(node, 6, 10), "u", true, color).is_ok());
    }
}

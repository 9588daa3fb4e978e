//! Restoration Engine
//!
//! Re-applies stored highlights to a document. A record's offsets index into
//! the concatenated text of the element its `xpath` resolves to; the engine
//! finds the one text node containing that range, splits it, and wraps the
//! middle in a marker element. A range that no longer fits inside a single
//! text node is abandoned rather than approximated.
//!
//! Each pass first unwinds markers left by earlier passes, so repeated passes
//! converge on the same tree.

use serde::Serialize;
use thiserror::Error;

use crate::address;
use crate::dom::{Document, NodeId, utf16_len, utf16_to_byte};
use crate::model::HighlightRecord;

pub const MARKER_TAG: &str = "span";
pub const MARKER_CLASS: &str = "web-highlighter-mark";
pub const MARKER_ID_ATTR: &str = "data-highlight-id";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RestoreError {
    #[error("address {0} does not resolve to an element")]
    AddressUnresolvable(String),
    #[error("range [{start}, {end}) is not contained in a single text node")]
    RangeAmbiguous { start: usize, end: usize },
    #[error("range [{start}, {end}) is empty")]
    EmptyRange { start: usize, end: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreFailure {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreReport {
    pub unwound: usize,
    pub restored: Vec<String>,
    pub failed: Vec<RestoreFailure>,
}

/// Where a record's range landed in the resolved element.
struct TextHit {
    node: NodeId,
    local_start: usize,
    local_end: usize,
}

fn locate(doc: &Document, element: NodeId, start: usize, end: usize) -> Result<TextHit, RestoreError> {
    let mut node_start = 0;
    for node in doc.text_nodes(element) {
        let len = doc.text(node).map(utf16_len).unwrap_or(0);
        let node_end = node_start + len;

        if start >= node_start && end <= node_end {
            return Ok(TextHit {
                node,
                local_start: start - node_start,
                local_end: end - node_start,
            });
        }
        if start < node_end {
            // starts here, ends in a later node
            break;
        }
        node_start = node_end;
    }
    Err(RestoreError::RangeAmbiguous { start, end })
}

fn build_marker(doc: &mut Document, record: &HighlightRecord, text: &str) -> NodeId {
    let marker = doc.create_element(MARKER_TAG);
    doc.set_attr(marker, "class", MARKER_CLASS);
    doc.set_attr(marker, MARKER_ID_ATTR, &record.id);
    if !record.note.is_empty() {
        doc.set_attr(marker, "title", &record.note);
    }
    doc.set_attr(
        marker,
        "style",
        &format!("background-color: {}; cursor: pointer;", record.color()),
    );
    let inner = doc.create_text(text);
    doc.append_child(marker, inner);
    marker
}

/// Restores one record into `doc` and returns the inserted marker.
///
/// The document is left untouched on error.
pub fn restore(doc: &mut Document, record: &HighlightRecord) -> Result<NodeId, RestoreError> {
    let (start, end) = (record.start_offset, record.end_offset);
    if end <= start {
        return Err(RestoreError::EmptyRange { start, end });
    }

    let element = address::decode(doc, &record.xpath)
        .ok_or_else(|| RestoreError::AddressUnresolvable(record.xpath.clone()))?;
    let hit = locate(doc, element, start, end)?;

    let text = doc.text(hit.node).unwrap_or_default().to_string();
    let ambiguous = || RestoreError::RangeAmbiguous { start, end };
    let from = utf16_to_byte(&text, hit.local_start).ok_or_else(ambiguous)?;
    let to = utf16_to_byte(&text, hit.local_end).ok_or_else(ambiguous)?;
    let (before, highlighted, after) = (&text[..from], &text[from..to], &text[to..]);
    if highlighted.is_empty() {
        return Err(RestoreError::EmptyRange { start, end });
    }

    let mut replacements = Vec::with_capacity(3);
    if !before.is_empty() {
        replacements.push(doc.create_text(before));
    }
    let marker = build_marker(doc, record, highlighted);
    replacements.push(marker);
    if !after.is_empty() {
        replacements.push(doc.create_text(after));
    }

    if !doc.replace_with(hit.node, &replacements) {
        return Err(RestoreError::AddressUnresolvable(record.xpath.clone()));
    }
    Ok(marker)
}

/// Whether `node` is a marker element inserted by a restoration pass.
pub fn is_marker(doc: &Document, node: NodeId) -> bool {
    doc.has_class(node, MARKER_CLASS) && doc.attr(node, MARKER_ID_ATTR).is_some()
}

/// All markers currently in the document, in document order.
pub fn markers(doc: &Document) -> Vec<NodeId> {
    doc.find_elements(doc.root(), is_marker)
}

/// The marker containing `node` (or `node` itself), if any.
pub fn marker_for(doc: &Document, node: NodeId) -> Option<NodeId> {
    let mut current = Some(node);
    while let Some(id) = current {
        if is_marker(doc, id) {
            return Some(id);
        }
        current = doc.parent(id);
    }
    None
}

/// Replaces every marker with a plain text node carrying its text, then
/// merges adjacent text in each affected parent. Returns the number of
/// markers removed.
pub fn unwind_markers(doc: &mut Document) -> usize {
    let mut parents = Vec::new();
    let mut unwound = 0;

    for marker in markers(doc) {
        let Some(parent) = doc.parent(marker) else {
            continue;
        };
        let text = doc.text_content(marker);
        let plain = doc.create_text(&text);
        if doc.replace_with(marker, &[plain]) {
            unwound += 1;
            if !parents.contains(&parent) {
                parents.push(parent);
            }
        }
    }

    for parent in parents {
        doc.normalize(parent);
    }
    unwound
}

/// Runs a full pass: unwinds existing markers, then restores each record.
/// A failing record is logged and skipped.
pub fn restore_all(doc: &mut Document, records: &[HighlightRecord]) -> RestoreReport {
    let mut report = RestoreReport {
        unwound: unwind_markers(doc),
        ..Default::default()
    };

    for record in records {
        match restore(doc, record) {
            Ok(_) => report.restored.push(record.id.clone()),
            Err(e) => {
                tracing::warn!(id = %record.id, xpath = %record.xpath, error = %e, "highlight not restored");
                report.failed.push(RestoreFailure {
                    id: record.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::debug!(
        restored = report.restored.len(),
        failed = report.failed.len(),
        unwound = report.unwound,
        "restoration pass complete"
    );
    report
}

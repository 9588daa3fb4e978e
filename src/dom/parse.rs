use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

use super::{Attribute, Document, NodeData, NodeId};

/// Parses an HTML string into an owned [`Document`].
///
/// Parsing follows the HTML5 tree construction rules, so malformed markup
/// still yields a tree (`html`, `head` and `body` are always present).
pub fn parse_html(html: &str) -> Document {
    let dom = parse_document(RcDom::default(), Default::default()).one(html);

    let mut doc = Document::new();
    let root = doc.root();
    for child in dom.document.children.borrow().iter() {
        import(&mut doc, root, child);
    }
    doc
}

fn import(doc: &mut Document, parent: NodeId, handle: &Handle) {
    let data = match &handle.data {
        RcNodeData::Doctype { name, .. } => NodeData::Doctype(name.to_string()),
        RcNodeData::Text { contents } => NodeData::Text(contents.borrow().to_string()),
        RcNodeData::Comment { contents } => NodeData::Comment(contents.to_string()),
        RcNodeData::Element { name, attrs, .. } => NodeData::Element {
            name: name.local.to_string(),
            attrs: attrs
                .borrow()
                .iter()
                .map(|a| Attribute {
                    name: a.name.local.to_string(),
                    value: a.value.to_string(),
                })
                .collect(),
        },
        RcNodeData::Document | RcNodeData::ProcessingInstruction { .. } => return,
    };

    let id = doc.push(data);
    doc.append_child(parent, id);
    for child in handle.children.borrow().iter() {
        import(doc, id, child);
    }

    // <template> content lives in a separate fragment, not in `children`
    if let RcNodeData::Element { template_contents, .. } = &handle.data {
        if let Some(fragment) = template_contents.borrow().as_ref() {
            for child in fragment.children.borrow().iter() {
                import(doc, id, child);
            }
        }
    }
}

//! Document Tree
//!
//! An owned arena representation of an HTML document. Nodes are addressed by
//! [`NodeId`] and never hold references to each other, so the restoration
//! engine can traverse and locally rewrite the tree without fighting the
//! borrow checker over a cyclic parent/child graph.
//!
//! Detached nodes stay in the arena until the document is dropped. Documents
//! are short lived (one render pass), so nothing is reclaimed.

mod parse;
mod serialize;

pub use parse::parse_html;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Doctype(String),
    Element { name: String, attrs: Vec<Attribute> },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Document {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeData::Element {
            name: name.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Comment(text.to_string()))
    }

    pub fn create_doctype(&mut self, name: &str) -> NodeId {
        self.push(NodeData::Doctype(name.to_string()))
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.node(id).data
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.data(id), NodeData::Element { .. })
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.data(id), NodeData::Text(_))
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id) {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: &str) {
        if let NodeData::Text(text) = &mut self.node_mut(id).data {
            *text = value.to_string();
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.data(id) {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|a| a.name.eq_ignore_ascii_case(name))
                .map(|a| a.value.as_str()),
            _ => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.node_mut(id).data {
            match attrs.iter_mut().find(|a| a.name.eq_ignore_ascii_case(name)) {
                Some(existing) => existing.value = value.to_string(),
                None => attrs.push(Attribute {
                    name: name.to_ascii_lowercase(),
                    value: value.to_string(),
                }),
            }
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .map(|classes| classes.split_ascii_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Removes `id` from its parent's child list. The node and its subtree
    /// remain valid and can be re-inserted.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node_mut(id).parent.take() {
            self.node_mut(parent).children.retain(|child| *child != id);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
    }

    /// Inserts `child` before `reference`. Falls back to appending when
    /// `reference` is not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        self.detach(child);
        let position = self
            .children(parent)
            .iter()
            .position(|c| *c == reference)
            .unwrap_or(self.children(parent).len());
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.insert(position, child);
    }

    /// Splices `replacements` into the parent of `target` at its position and
    /// detaches `target`. Returns false when `target` has no parent.
    pub fn replace_with(&mut self, target: NodeId, replacements: &[NodeId]) -> bool {
        let Some(parent) = self.parent(target) else {
            return false;
        };
        for node in replacements {
            self.detach(*node);
        }
        let Some(position) = self.children(parent).iter().position(|c| *c == target) else {
            return false;
        };

        self.node_mut(target).parent = None;
        self.node_mut(parent)
            .children
            .splice(position..=position, replacements.iter().copied());
        for node in replacements {
            self.node_mut(*node).parent = Some(parent);
        }
        true
    }

    /// Pre-order walk of the subtree below `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.children(id).to_vec();
        stack.reverse();
        Descendants { doc: self, stack }
    }

    /// Every text node under `id` in document order. A text node passed in
    /// directly yields itself.
    pub fn text_nodes(&self, id: NodeId) -> Vec<NodeId> {
        if self.is_text(id) {
            return vec![id];
        }
        self.descendants(id).filter(|n| self.is_text(*n)).collect()
    }

    pub fn text_content(&self, id: NodeId) -> String {
        self.text_nodes(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    pub fn find_elements<F>(&self, id: NodeId, mut predicate: F) -> Vec<NodeId>
    where
        F: FnMut(&Document, NodeId) -> bool,
    {
        self.descendants(id)
            .filter(|n| self.is_element(*n) && predicate(self, *n))
            .collect()
    }

    pub fn first_element_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .find(|n| matches!(self.tag_name(*n), Some(name) if name.eq_ignore_ascii_case(tag)))
    }

    /// Merges adjacent text nodes and drops empty ones throughout the subtree
    /// rooted at `id`.
    pub fn normalize(&mut self, id: NodeId) {
        let children = self.children(id).to_vec();
        let mut pending: Option<NodeId> = None;

        for child in children {
            if self.is_text(child) {
                let text = self.text(child).unwrap_or_default().to_string();
                if text.is_empty() {
                    self.detach(child);
                    continue;
                }
                match pending {
                    Some(previous) => {
                        let merged = format!("{}{}", self.text(previous).unwrap_or_default(), text);
                        self.set_text(previous, &merged);
                        self.detach(child);
                    }
                    None => pending = Some(child),
                }
            } else {
                pending = None;
                self.normalize(child);
            }
        }
    }
}

pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let next = self.stack.pop()?;
        self.stack
            .extend(self.doc.children(next).iter().rev().copied());
        Some(next)
    }
}

/// Length of `text` in UTF-16 code units, the unit browsers use for
/// selection and range offsets.
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Byte index in `text` for a UTF-16 offset. `None` when the offset is past
/// the end or falls inside a surrogate pair.
pub fn utf16_to_byte(text: &str, offset: usize) -> Option<usize> {
    let mut units = 0;
    for (byte, ch) in text.char_indices() {
        if units == offset {
            return Some(byte);
        }
        if units > offset {
            return None;
        }
        units += ch.len_utf16();
    }
    (units == offset).then_some(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph_doc() -> (Document, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let p = doc.create_element("P");
        let a = doc.create_text("one ");
        let b = doc.create_element("b");
        let bold = doc.create_text("two");
        let c = doc.create_text(" three");
        doc.append_child(root, p);
        doc.append_child(p, a);
        doc.append_child(p, b);
        doc.append_child(b, bold);
        doc.append_child(p, c);
        (doc, p)
    }

    #[test]
    fn test_text_content_walks_in_document_order() {
        let (doc, p) = paragraph_doc();
        assert_eq!(doc.tag_name(p), Some("p"));
        assert_eq!(doc.text_content(p), "one two three");
        assert_eq!(doc.text_nodes(p).len(), 3);
    }

    #[test]
    fn test_replace_with_splices_in_place() {
        let (mut doc, p) = paragraph_doc();
        let first = doc.children(p)[0];
        let x = doc.create_text("o");
        let y = doc.create_text("ne ");
        assert!(doc.replace_with(first, &[x, y]));
        assert_eq!(doc.children(p).len(), 4);
        assert_eq!(doc.parent(first), None);
        assert_eq!(doc.text_content(p), "one two three");
    }

    #[test]
    fn test_normalize_merges_adjacent_text() {
        let mut doc = Document::new();
        let root = doc.root();
        let div = doc.create_element("div");
        doc.append_child(root, div);
        for part in ["a", "", "b", "c"] {
            let t = doc.create_text(part);
            doc.append_child(div, t);
        }
        doc.normalize(div);
        assert_eq!(doc.children(div).len(), 1);
        assert_eq!(doc.text(doc.children(div)[0]), Some("abc"));
    }

    #[test]
    fn test_attributes_and_classes() {
        let mut doc = Document::new();
        let span = doc.create_element("span");
        doc.set_attr(span, "class", "a web-highlighter-mark");
        doc.set_attr(span, "CLASS", "web-highlighter-mark b");
        assert_eq!(doc.attr(span, "class"), Some("web-highlighter-mark b"));
        assert!(doc.has_class(span, "web-highlighter-mark"));
        assert!(!doc.has_class(span, "a"));
    }

    #[test]
    fn test_utf16_offsets() {
        let text = "a😀b";
        assert_eq!(utf16_len(text), 4);
        assert_eq!(utf16_to_byte(text, 1), Some(1));
        assert_eq!(utf16_to_byte(text, 2), None);
        assert_eq!(utf16_to_byte(text, 3), Some(5));
        assert_eq!(utf16_to_byte(text, 4), Some(6));
        assert_eq!(utf16_to_byte(text, 5), None);
    }
}

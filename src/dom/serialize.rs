use std::io;

use html5ever::serialize::{self, Serialize, SerializeOpts, Serializer, TraversalScope};
use html5ever::{LocalName, Namespace, QualName};

use super::{Document, NodeData, NodeId};

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// A subtree of a [`Document`] handed to the html5ever serializer, which owns
/// void elements, raw-text elements and escaping.
struct Subtree<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl Serialize for Subtree<'_> {
    fn serialize<S>(&self, serializer: &mut S, traversal_scope: TraversalScope) -> io::Result<()>
    where
        S: Serializer,
    {
        match traversal_scope {
            TraversalScope::IncludeNode => self.doc.serialize_node(self.id, serializer),
            TraversalScope::ChildrenOnly(_) => self.doc.serialize_children(self.id, serializer),
        }
    }
}

impl Document {
    /// Serializes the whole document back to HTML.
    pub fn to_html(&self) -> String {
        self.render(self.root(), TraversalScope::ChildrenOnly(None))
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        self.render(id, TraversalScope::IncludeNode)
    }

    fn render(&self, id: NodeId, traversal_scope: TraversalScope) -> String {
        let mut out = Vec::new();
        let opts = SerializeOpts {
            traversal_scope,
            ..Default::default()
        };
        if let Err(e) = serialize::serialize(&mut out, &Subtree { doc: self, id }, opts) {
            tracing::warn!(error = %e, "html serialization stopped early");
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    fn serialize_children<S: Serializer>(&self, id: NodeId, serializer: &mut S) -> io::Result<()> {
        for child in self.children(id) {
            self.serialize_node(*child, serializer)?;
        }
        Ok(())
    }

    fn serialize_node<S: Serializer>(&self, id: NodeId, serializer: &mut S) -> io::Result<()> {
        match self.data(id) {
            NodeData::Document => self.serialize_children(id, serializer),
            NodeData::Doctype(name) => serializer.write_doctype(name),
            NodeData::Comment(text) => serializer.write_comment(text),
            NodeData::Text(text) => serializer.write_text(text),
            NodeData::Element { name, attrs } => {
                let element = QualName::new(
                    None,
                    Namespace::from(HTML_NAMESPACE),
                    LocalName::from(name.as_str()),
                );
                let names: Vec<QualName> = attrs
                    .iter()
                    .map(|a| QualName::new(None, Namespace::from(""), LocalName::from(a.name.as_str())))
                    .collect();

                serializer.start_elem(
                    element.clone(),
                    names.iter().zip(attrs).map(|(n, a)| (n, a.value.as_str())),
                )?;
                self.serialize_children(id, serializer)?;
                serializer.end_elem(element)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::dom::parse_html;

    #[test]
    fn test_round_trip_markup() {
        let source = r#"<!DOCTYPE html><html><head><style>p > b { color: red; }</style></head><body><p class="x">a &amp; b &lt; c<br><img src="i.png" alt="&quot;q&quot;"></p></body></html>"#;
        let doc = parse_html(source);
        assert_eq!(doc.to_html(), source);
    }

    #[test]
    fn test_outer_html_of_element() {
        let doc = parse_html("<p>one <em>two</em></p>");
        let em = doc.first_element_by_tag("em").unwrap();
        assert_eq!(doc.outer_html(em), "<em>two</em>");
    }

    #[test]
    fn test_edited_text_and_attributes_are_escaped() {
        let mut doc = parse_html("<p>x</p>");
        let p = doc.first_element_by_tag("p").unwrap();
        let text = doc.children(p)[0];
        doc.set_text(text, "1 < 2 & 3");
        doc.set_attr(p, "title", r#"say "hi""#);
        assert_eq!(
            doc.outer_html(p),
            r#"<p title="say &quot;hi&quot;">1 &lt; 2 &amp; 3</p>"#
        );
    }
}

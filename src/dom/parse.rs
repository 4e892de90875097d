//! Build a [`Document`] arena from HTML markup.

use scraper::{ElementRef, Html, Node};

use super::{Document, NodeId};

impl Document {
    /// Parse a full HTML document. Comments and processing instructions are
    /// dropped; `<head>` and `<body>` are always present.
    pub fn parse_html(html: &str) -> Document {
        let parsed = Html::parse_document(html);
        let mut doc = Document::empty();
        let root = doc.root();
        let html_el = parsed.root_element();
        for (k, v) in html_el.value().attrs() {
            let _ = doc.set_attr(root, k, v);
        }
        copy_children(&mut doc, root, html_el);
        doc
    }
}

fn copy_children(doc: &mut Document, parent: NodeId, source: ElementRef<'_>) {
    for child in source.children() {
        if let Some(el) = ElementRef::wrap(child) {
            let id = doc.create_element(el.value().name());
            for (k, v) in el.value().attrs() {
                let _ = doc.set_attr(id, k, v);
            }
            doc.attach(parent, id);
            copy_children(doc, id, el);
        } else if let Node::Text(text) = child.value() {
            let id = doc.create_text(&text.text);
            doc.attach(parent, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_structure_and_attributes() {
        let doc = Document::parse_html(
            r#"<html lang="en"><body><main><article><time datetime="2024-01-01T09:30:00Z">Jan 1</time></article></main></body></html>"#,
        );
        assert_eq!(doc.attr(doc.root(), "lang"), Some("en"));
        let body = doc.body().unwrap();
        let main = doc.child_elements(body)[0];
        assert_eq!(doc.tag(main), Some("main"));
        let time = doc.descendants(main)[1];
        assert_eq!(doc.attr(time, "datetime"), Some("2024-01-01T09:30:00Z"));
        assert_eq!(doc.inner_text(time), "Jan 1");
        assert!(doc.head().is_some());
    }
}

//! CSS selectors over the document model.
//!
//! Parsing is `scraper::Selector`; matching runs `selectors` against arena
//! nodes through [`NodeRef`], so any selector scraper accepts can be used as
//! a host marker.

use std::fmt;

use scraper::selector::{NonTSPseudoClass, PseudoElement, Simple};
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::matching::{self, ElementSelectorFlags, MatchingContext, MatchingMode, QuirksMode};
use selectors::{Element, OpaqueElement, SelectorImpl};

use super::{Document, ElementData, NodeId, NodeKind};
use crate::{Error, Result};

type LocalName = <Simple as SelectorImpl>::LocalName;
type Namespace = <Simple as SelectorImpl>::NamespaceUrl;

const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// A parsed selector list
#[derive(Debug, Clone)]
pub struct Selector {
    inner: scraper::Selector,
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self> {
        let inner = scraper::Selector::parse(input).map_err(|e| Error::Selector {
            selector: input.to_string(),
            reason: format!("{:?}", e.kind),
        })?;
        Ok(Self { inner })
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        let Some(element) = NodeRef::new(doc, node) else {
            return false;
        };
        let mut context =
            MatchingContext::new(MatchingMode::Normal, None, None, QuirksMode::NoQuirks);
        self.inner.selectors.iter().any(|s| {
            matching::matches_selector(s, 0, None, &element, &mut context, &mut |_, _| {})
        })
    }
}

/// Element node borrowed from a document, as seen by the matcher
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    doc: &'a Document,
    id: NodeId,
    data: &'a ElementData,
}

impl<'a> NodeRef<'a> {
    /// `None` for text nodes and unknown ids
    pub fn new(doc: &'a Document, id: NodeId) -> Option<Self> {
        doc.element(id).map(|data| Self { doc, id, data })
    }

    fn siblings(&self) -> Option<(&'a [NodeId], usize)> {
        let parent = self.doc.parent(self.id)?;
        let siblings = self.doc.children(parent);
        let pos = siblings.iter().position(|c| *c == self.id)?;
        Some((siblings, pos))
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("tag", &self.data.tag)
            .finish()
    }
}

impl<'a> Element for NodeRef<'a> {
    type Impl = Simple;

    fn opaque(&self) -> OpaqueElement {
        OpaqueElement::new(self.data)
    }

    fn parent_element(&self) -> Option<Self> {
        self.doc
            .parent(self.id)
            .and_then(|p| NodeRef::new(self.doc, p))
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        false
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        None
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        let (siblings, pos) = self.siblings()?;
        siblings[..pos]
            .iter()
            .rev()
            .find_map(|c| NodeRef::new(self.doc, *c))
    }

    fn next_sibling_element(&self) -> Option<Self> {
        let (siblings, pos) = self.siblings()?;
        siblings[pos + 1..]
            .iter()
            .find_map(|c| NodeRef::new(self.doc, *c))
    }

    fn is_html_element_in_html_document(&self) -> bool {
        true
    }

    fn has_local_name(&self, name: &LocalName) -> bool {
        self.data.tag.as_str() == &**name
    }

    fn has_namespace(&self, ns: &Namespace) -> bool {
        &**ns == XHTML_NS
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.data.tag == other.data.tag
    }

    fn attr_matches(
        &self,
        ns: &NamespaceConstraint<&Namespace>,
        local_name: &LocalName,
        operation: &AttrSelectorOperation<&String>,
    ) -> bool {
        // attributes in the arena carry no namespace
        if matches!(*ns, NamespaceConstraint::Specific(url) if !url.is_empty()) {
            return false;
        }
        self.data
            .attrs
            .iter()
            .any(|(key, value)| key.as_str() == &**local_name && operation.eval_str(value))
    }

    fn match_non_ts_pseudo_class<F>(
        &self,
        _pc: &NonTSPseudoClass,
        _context: &mut MatchingContext<Self::Impl>,
        _flags_setter: &mut F,
    ) -> bool
    where
        F: FnMut(&Self, ElementSelectorFlags),
    {
        false
    }

    fn match_pseudo_element(
        &self,
        _pe: &PseudoElement,
        _context: &mut MatchingContext<Self::Impl>,
    ) -> bool {
        false
    }

    fn is_link(&self) -> bool {
        matches!(self.data.tag.as_str(), "a" | "area" | "link") && self.data.attr("href").is_some()
    }

    fn is_html_slot_element(&self) -> bool {
        false
    }

    fn has_id(&self, id: &LocalName, case_sensitivity: CaseSensitivity) -> bool {
        self.data
            .attr("id")
            .map_or(false, |v| case_sensitivity.eq(id.as_bytes(), v.as_bytes()))
    }

    fn has_class(&self, name: &LocalName, case_sensitivity: CaseSensitivity) -> bool {
        self.data
            .classes()
            .any(|c| case_sensitivity.eq(name.as_bytes(), c.as_bytes()))
    }

    fn exported_part(&self, _: &LocalName) -> Option<LocalName> {
        None
    }

    fn imported_part(&self, _: &LocalName) -> Option<LocalName> {
        None
    }

    fn is_part(&self, _name: &LocalName) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        !self
            .doc
            .children(self.id)
            .iter()
            .any(|c| match self.doc.kind(*c) {
                Some(NodeKind::Element(_)) => true,
                Some(NodeKind::Text(t)) => !t.is_empty(),
                None => false,
            })
    }

    fn is_root(&self) -> bool {
        self.id == self.doc.root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::parse_html(
            r#"<body><main><article data-id="1">
                 <div data-testid="Tweet-User-Avatar"><img alt="a" draggable="true" src="u.png"></div>
                 <div role="group"><span class="x y">s</span></div>
               </article></main></body>"#,
        )
    }

    fn count(d: &Document, selector: &str) -> usize {
        d.query_selector_all(d.root(), &Selector::parse(selector).unwrap())
            .len()
    }

    #[test]
    fn matches_attribute_and_descendant() {
        let d = doc();
        let sel =
            Selector::parse(r#"div[data-testid="Tweet-User-Avatar"] img[alt][draggable="true"]"#)
                .unwrap();
        let img = d.query_selector(d.root(), &sel).unwrap();
        assert_eq!(d.attr(img, "src"), Some("u.png"));
    }

    #[test]
    fn child_combinator_is_strict() {
        let d = doc();
        assert_eq!(count(&d, "main > article"), 1);
        assert_eq!(count(&d, "main > div"), 0);
    }

    #[test]
    fn classes_and_lists() {
        let d = doc();
        assert_eq!(count(&d, "span.x.y, nav"), 1);
        assert_eq!(count(&d, ".x.z"), 0);
    }

    #[test]
    fn structural_and_substring_selectors() {
        let d = Document::parse_html(
            r#"<body><main>
                 <article class="promoted" data-testid="tweet-ad"><div><span>a</span><span>b</span></div></article>
                 <article data-testid="tweetBody"><a href="x y">l</a><div></div><span>after</span></article>
               </main></body>"#,
        );
        assert_eq!(count(&d, "article:not(.promoted)"), 1);
        assert_eq!(count(&d, r#"[data-testid^="tweet"]"#), 2);
        assert_eq!(count(&d, "div > span:first-child"), 1);
        assert_eq!(count(&d, r#"a[href~="x"]"#), 1);
        assert_eq!(count(&d, "div + span"), 1);
        assert_eq!(count(&d, "div:empty"), 1);
    }

    #[test]
    fn detached_subtrees_still_match() {
        let mut d = doc();
        let article = d
            .query_selector(d.root(), &Selector::parse("article").unwrap())
            .unwrap();
        d.remove(article);
        let sel = Selector::parse("article > div[role=group]").unwrap();
        assert_eq!(d.query_selector_all(article, &sel).len(), 1);
        assert!(!d.matches(article, &Selector::parse(":root").unwrap()));
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "div[", "> a", "a,", "a $"] {
            let err = Selector::parse(bad).unwrap_err();
            assert!(matches!(err, Error::Selector { .. }), "{}", bad);
        }
    }
}

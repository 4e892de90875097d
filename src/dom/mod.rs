//! Simulated document model.
//!
//! The pipeline never holds live rendering-engine handles. Every node lives in
//! an arena owned by a [`Document`] and is addressed by a [`NodeId`] that is
//! assigned on creation and never reused, so watcher and injector logic can be
//! driven from tests by mutating a plain tree.
//!
//! A [`Page`] is the shared, cloneable handle the pipeline works against. It
//! wraps the document behind a mutex and adds the page origin plus a decoded
//! image cache. Locks are only taken for the duration of a closure and are
//! never held across an `.await`.

pub mod parse;
pub mod selector;

pub use selector::Selector;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use image::RgbaImage;
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Stable identifier of a node inside one [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tag name and attributes of an element node
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

impl ElementData {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Element(ElementData),
    Text(String),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// One structural change under an observed target
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    /// Parent whose child list changed
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// All records produced by a single [`Page::update`]
pub type MutationBatch = Vec<MutationRecord>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Observer {
    id: ObserverId,
    target: NodeId,
    subtree: bool,
    tx: mpsc::UnboundedSender<MutationBatch>,
    pending: Vec<MutationRecord>,
}

/// Whether a click keeps bubbling to ancestors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickEvent {
    /// Node the click originated on
    pub target: NodeId,
    /// Node whose handler is currently running
    pub current: NodeId,
}

pub type ClickHandler = Arc<dyn Fn(&Page, &ClickEvent) -> Propagation + Send + Sync>;

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "div", "footer", "form", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "html", "li", "main", "nav", "ol", "p", "pre", "section",
    "table", "tr", "ul",
];

/// Arena-backed element tree
pub struct Document {
    nodes: HashMap<NodeId, NodeData>,
    next_id: u64,
    root: NodeId,
    observers: Vec<Observer>,
    next_observer: u64,
    handlers: HashMap<NodeId, ClickHandler>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A document with `<html>`, `<head>` and `<body>`
    pub fn new() -> Self {
        let mut doc = Self::empty();
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        let root = doc.root;
        doc.attach(root, head);
        doc.attach(root, body);
        doc
    }

    /// A document holding only the `<html>` element, as seen before the body is parsed
    pub fn empty() -> Self {
        let root = NodeId(1);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            NodeData {
                kind: NodeKind::Element(ElementData {
                    tag: "html".to_string(),
                    attrs: Vec::new(),
                }),
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            next_id: 2,
            root,
            observers: Vec::new(),
            next_observer: 1,
            handlers: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> Option<NodeId> {
        self.child_elements(self.root)
            .into_iter()
            .find(|c| self.tag(*c) == Some("body"))
    }

    pub fn head(&self) -> Option<NodeId> {
        self.child_elements(self.root)
            .into_iter()
            .find(|c| self.tag(*c) == Some("head"))
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            NodeData {
                kind,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Text(text.to_string()))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(&id).map(|n| &n.kind)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.kind(id) {
            Some(NodeKind::Element(e)) => Some(e),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn child_elements(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    /// True when the node is reachable from the document root
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if n == self.root {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// True when `ancestor` is `node` or one of its ancestors
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.attr(name))
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).map(|e| e.has_class(class)).unwrap_or(false)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        match self.nodes.get_mut(&id).map(|n| &mut n.kind) {
            Some(NodeKind::Element(e)) => {
                match e.attrs.iter_mut().find(|(k, _)| k == name) {
                    Some(slot) => slot.1 = value.to_string(),
                    None => e.attrs.push((name.to_string(), value.to_string())),
                }
                Ok(())
            }
            _ => Err(Error::Detached(id.raw())),
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(NodeKind::Element(e)) = self.nodes.get_mut(&id).map(|n| &mut n.kind) {
            e.attrs.retain(|(k, _)| k != name);
        }
    }

    /// Append `child` to `parent`, moving it if it already has a parent
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if !self.is_element(parent) {
            return Err(Error::Detached(parent.raw()));
        }
        if !self.contains(child) || self.is_inclusive_ancestor(child, parent) {
            return Err(Error::Detached(child.raw()));
        }
        self.remove(child);
        self.attach(parent, child);
        self.record(parent, vec![child], Vec::new());
        Ok(())
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
    }

    /// Detach a node from its parent. The node keeps its data and subtree, so
    /// stale handles remain readable. Returns false when it had no parent.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != id);
        }
        if let Some(n) = self.nodes.get_mut(&id) {
            n.parent = None;
        }
        self.record(parent, Vec::new(), vec![id]);
        true
    }

    /// Replace all children with a single text node
    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        if !self.is_element(id) {
            return Err(Error::Detached(id.raw()));
        }
        for child in self.children(id).to_vec() {
            self.remove(child);
        }
        let t = self.create_text(text);
        self.append_child(id, t)
    }

    /// Rendered text in the manner of `innerText`: whitespace collapsed,
    /// `<br>` and block boundaries become line breaks.
    pub fn inner_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out.trim_matches('\n').to_string()
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            Some(NodeKind::Text(t)) => {
                let collapsed = collapse_whitespace(t);
                let piece = if out.is_empty() || out.ends_with('\n') {
                    collapsed.trim_start()
                } else {
                    collapsed.as_str()
                };
                out.push_str(piece);
            }
            Some(NodeKind::Element(e)) => {
                if e.tag == "br" {
                    trim_trailing_spaces(out);
                    out.push('\n');
                    return;
                }
                if matches!(e.tag.as_str(), "script" | "style" | "head") {
                    return;
                }
                let block = BLOCK_TAGS.contains(&e.tag.as_str());
                if block {
                    break_line(out);
                }
                for child in self.children(id) {
                    self.collect_text(*child, out);
                }
                if block {
                    break_line(out);
                }
            }
            None => {}
        }
    }

    /// Elements under `scope` (excluding `scope`) in document order
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            if self.is_element(n) {
                out.push(n);
                stack.extend(self.children(n).iter().rev().copied());
            }
        }
        out
    }

    pub fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        selector.matches(self, id)
    }

    pub fn query_selector(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|n| selector.matches(self, *n))
    }

    pub fn query_selector_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|n| selector.matches(self, *n))
            .collect()
    }

    pub fn set_click_handler(&mut self, node: NodeId, handler: ClickHandler) {
        self.handlers.insert(node, handler);
    }

    pub fn clear_click_handler(&mut self, node: NodeId) {
        self.handlers.remove(&node);
    }

    fn record(&mut self, target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) {
        if self.observers.is_empty() {
            return;
        }
        let interested: Vec<usize> = self
            .observers
            .iter()
            .enumerate()
            .filter(|(_, o)| {
                o.target == target || (o.subtree && self.is_inclusive_ancestor(o.target, target))
            })
            .map(|(i, _)| i)
            .collect();
        for i in interested {
            self.observers[i].pending.push(MutationRecord {
                target,
                added: added.clone(),
                removed: removed.clone(),
            });
        }
    }

    fn observe(
        &mut self,
        target: NodeId,
        subtree: bool,
    ) -> (ObserverId, mpsc::UnboundedReceiver<MutationBatch>) {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(Observer {
            id,
            target,
            subtree,
            tx,
            pending: Vec::new(),
        });
        (id, rx)
    }

    /// Deliver queued records, one batch per observer. Observers whose
    /// receiver is gone are dropped.
    fn flush_mutations(&mut self) {
        self.observers.retain_mut(|o| {
            if o.pending.is_empty() {
                return !o.tx.is_closed();
            }
            let batch = std::mem::take(&mut o.pending);
            o.tx.send(batch).is_ok()
        });
    }
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for ch in s.chars() {
        if ch.is_ascii_whitespace() {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(ch);
            in_ws = false;
        }
    }
    out
}

fn trim_trailing_spaces(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
}

fn break_line(out: &mut String) {
    trim_trailing_spaces(out);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Decoded images kept per page
pub const IMAGE_CACHE_CAPACITY: usize = 64;

/// Decoded images keyed by URL. Past capacity the oldest entry is evicted.
#[derive(Default)]
struct ImageCache {
    entries: HashMap<String, Arc<RgbaImage>>,
    order: VecDeque<String>,
}

impl ImageCache {
    fn get(&self, url: &str) -> Option<Arc<RgbaImage>> {
        self.entries.get(url).cloned()
    }

    fn insert(&mut self, url: &str, image: Arc<RgbaImage>) {
        if self.entries.insert(url.to_string(), image).is_some() {
            return;
        }
        self.order.push_back(url.to_string());
        while self.order.len() > IMAGE_CACHE_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

struct PageInner {
    doc: Mutex<Document>,
    origin: Option<url::Url>,
    images: Mutex<ImageCache>,
}

/// Shared handle to a live page
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl Page {
    pub fn new(doc: Document, origin: Option<&str>) -> Result<Self> {
        let origin = origin
            .map(url::Url::parse)
            .transpose()
            .map_err(|e| Error::ConfigError(format!("invalid page origin: {}", e)))?;
        Ok(Self {
            inner: Arc::new(PageInner {
                doc: Mutex::new(doc),
                origin,
                images: Mutex::new(ImageCache::default()),
            }),
        })
    }

    pub fn from_html(html: &str, origin: Option<&str>) -> Result<Self> {
        Self::new(Document::parse_html(html), origin)
    }

    fn lock(&self) -> MutexGuard<'_, Document> {
        self.inner.doc.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn origin(&self) -> Option<&url::Url> {
        self.inner.origin.as_ref()
    }

    /// Run a read-only closure against the document
    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.lock())
    }

    /// Run a mutating closure. All changes it makes reach observers as one batch.
    pub fn update<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let mut doc = self.lock();
        let out = f(&mut doc);
        doc.flush_mutations();
        out
    }

    pub fn body(&self) -> Option<NodeId> {
        self.read(|d| d.body())
    }

    pub fn root(&self) -> NodeId {
        self.read(|d| d.root())
    }

    pub fn query_selector(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>> {
        let sel = Selector::parse(selector)?;
        Ok(self.read(|d| d.query_selector(scope, &sel)))
    }

    pub fn query_selector_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>> {
        let sel = Selector::parse(selector)?;
        Ok(self.read(|d| d.query_selector_all(scope, &sel)))
    }

    pub fn is_connected(&self, id: NodeId) -> bool {
        self.read(|d| d.is_connected(id))
    }

    pub fn inner_text(&self, id: NodeId) -> String {
        self.read(|d| d.inner_text(id))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<String> {
        self.read(|d| d.attr(id, name).map(str::to_string))
    }

    /// Subscribe to child-list changes under `target`
    pub fn observe(
        &self,
        target: NodeId,
        subtree: bool,
    ) -> Result<(ObserverId, mpsc::UnboundedReceiver<MutationBatch>)> {
        let mut doc = self.lock();
        if !doc.is_element(target) {
            return Err(Error::Detached(target.raw()));
        }
        Ok(doc.observe(target, subtree))
    }

    pub fn disconnect(&self, id: ObserverId) {
        self.lock().observers.retain(|o| o.id != id);
    }

    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    pub fn on_click(&self, node: NodeId, handler: ClickHandler) {
        self.lock().set_click_handler(node, handler);
    }

    /// Dispatch a click on `target`, bubbling through its ancestors. Handlers
    /// run without the document lock held, so they may mutate the page.
    pub fn click(&self, target: NodeId) -> Result<()> {
        let path = self.read(|d| {
            if !d.contains(target) {
                return None;
            }
            let mut path = vec![target];
            let mut cur = d.parent(target);
            while let Some(p) = cur {
                path.push(p);
                cur = d.parent(p);
            }
            Some(path)
        });
        let path = path.ok_or(Error::Detached(target.raw()))?;
        for current in path {
            let handler = self.lock().handlers.get(&current).cloned();
            if let Some(handler) = handler {
                let event = ClickEvent { target, current };
                if handler(self, &event) == Propagation::Stop {
                    break;
                }
            }
        }
        Ok(())
    }

    fn images(&self) -> MutexGuard<'_, ImageCache> {
        self.inner.images.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn cached_image(&self, url: &str) -> Option<Arc<RgbaImage>> {
        self.images().get(url)
    }

    pub fn cache_image(&self, url: &str, image: Arc<RgbaImage>) {
        self.images().insert(url, image);
    }

    pub fn cached_image_count(&self) -> usize {
        self.images().entries.len()
    }
}

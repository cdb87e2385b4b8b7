//! Element tree capabilities used by the dev-time rewriter and the dev mount.
//!
//! [`DomTree`] and [`TreeObserver`] keep the rewrite rules independent of any
//! browser runtime. [`MemoryDom`] is an arena-backed implementation: mutations
//! made through it are queued as [`Mutation`] records and delivered on
//! [`MemoryDom::flush`], only to observers whose root contains the target.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Read/write access to an element tree.
pub trait DomTree {
    type Node: Copy + Eq + Hash + fmt::Debug;

    fn is_element(&self, node: Self::Node) -> bool;

    fn get_attribute(&self, node: Self::Node, name: &str) -> Option<String>;

    fn set_attribute(&mut self, node: Self::Node, name: &str, value: &str);

    /// Every node below `node` in document order, excluding `node` itself.
    fn descendants(&self, node: Self::Node) -> Vec<Self::Node>;

    /// `node` is `root` or lies inside it.
    fn contains(&self, root: Self::Node, node: Self::Node) -> bool;

    /// Parse `html` and append the resulting nodes to `parent`.
    fn append_html(&mut self, parent: Self::Node, html: &str) -> Vec<Self::Node>;
}

/// One observed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation<N> {
    Attributes { target: N, name: String },
    ChildList { target: N, added: Vec<N> },
}

impl<N: Copy> Mutation<N> {
    pub fn target(&self) -> N {
        match self {
            Mutation::Attributes { target, .. } | Mutation::ChildList { target, .. } => *target,
        }
    }
}

/// What an observer wants to hear about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    pub child_list: bool,
    pub subtree: bool,
    pub attributes: bool,
    /// Attribute names to report; `None` reports all of them.
    pub attribute_filter: Option<Vec<String>>,
}

pub type MutationCallback<D> = Box<dyn FnMut(&mut D, &[Mutation<<D as DomTree>::Node>])>;

/// Subscribe to mutations below a root.
pub trait TreeObserver: DomTree + Sized {
    fn observe(
        &mut self,
        root: Self::Node,
        options: ObserveOptions,
        callback: MutationCallback<Self>,
    ) -> Subscription;
}

/// Handle returned by [`TreeObserver::observe`]. Dropping it does not stop
/// delivery; call [`Subscription::unsubscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// MemoryDom
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct NodeEntry {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct Observer {
    root: NodeId,
    options: ObserveOptions,
    callback: MutationCallback<MemoryDom>,
    subscription: Subscription,
}

impl Observer {
    fn accepts(&self, dom: &MemoryDom, record: &Mutation<NodeId>) -> bool {
        let target = record.target();
        let in_scope = target == self.root || (self.options.subtree && dom.contains(self.root, target));
        if !in_scope {
            return false;
        }
        match record {
            Mutation::Attributes { name, .. } => {
                self.options.attributes
                    && self
                        .options
                        .attribute_filter
                        .as_ref()
                        .is_none_or(|filter| filter.iter().any(|f| f == name))
            }
            Mutation::ChildList { .. } => self.options.child_list,
        }
    }
}

/// Delivery rounds per flush before pending records are dropped. Observers
/// that keep mutating what they observe would otherwise never settle.
const MAX_FLUSH_ROUNDS: usize = 32;

/// Arena-backed element tree.
#[derive(Default)]
pub struct MemoryDom {
    nodes: Vec<NodeEntry>,
    pending: Vec<Mutation<NodeId>>,
    observers: Vec<Observer>,
}

impl fmt::Debug for MemoryDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDom")
            .field("nodes", &self.nodes.len())
            .field("pending", &self.pending.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeEntry {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// A detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(old) = self.nodes[child.0].parent.take() {
            self.nodes[old.0].children.retain(|c| *c != child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Append `child` to `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.attach(parent, child);
        self.pending.push(Mutation::ChildList {
            target: parent,
            added: vec![child],
        });
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(node.0).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes.get(node.0)?.data {
            NodeData::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// Element children carrying `tag`, in document order.
    pub fn elements_by_tag(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|n| self.tag(*n).is_some_and(|t| t.eq_ignore_ascii_case(tag)))
            .collect()
    }

    /// Number of undelivered mutation records.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Deliver queued mutations. Records produced by callbacks are delivered
    /// in further rounds of the same flush. Returns the number of records
    /// handed to observers.
    pub fn flush(&mut self) -> usize {
        let mut delivered = 0;
        let mut rounds = 0;
        while !self.pending.is_empty() {
            if rounds == MAX_FLUSH_ROUNDS {
                tracing::warn!(pending = self.pending.len(), "mutation delivery did not settle");
                self.pending.clear();
                break;
            }
            rounds += 1;

            let records = std::mem::take(&mut self.pending);
            let mut observers = std::mem::take(&mut self.observers);
            observers.retain(|o| o.subscription.is_active());
            for observer in observers.iter_mut() {
                if !observer.subscription.is_active() {
                    continue;
                }
                let matched: Vec<_> = records
                    .iter()
                    .filter(|r| observer.accepts(self, r))
                    .cloned()
                    .collect();
                if matched.is_empty() {
                    continue;
                }
                delivered += matched.len();
                (observer.callback)(self, &matched);
            }
            observers.append(&mut self.observers);
            self.observers = observers;
        }
        delivered
    }

    /// Serialized children of `node`.
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node) {
            self.write_html(*child, &mut out);
        }
        out
    }

    /// Serialized `node` including itself.
    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        let Some(entry) = self.nodes.get(node.0) else {
            return;
        };
        match &entry.data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeData::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                out.push('>');
                if is_void(tag) {
                    return;
                }
                for child in &entry.children {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

impl DomTree for MemoryDom {
    type Node = NodeId;

    fn is_element(&self, node: NodeId) -> bool {
        self.tag(node).is_some()
    }

    fn get_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.nodes.get(node.0)?.data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(NodeEntry {
            data: NodeData::Element { attrs, .. },
            ..
        }) = self.nodes.get_mut(node.0)
        else {
            return;
        };
        let name = name.to_ascii_lowercase();
        match attrs.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => attrs.push((name.clone(), value.to_string())),
        }
        self.pending.push(Mutation::Attributes { target: node, name });
    }

    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    fn contains(&self, root: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == root {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    fn append_html(&mut self, parent: NodeId, html: &str) -> Vec<NodeId> {
        let added = FragmentParser::new(html).parse_into(self, parent);
        if !added.is_empty() {
            self.pending.push(Mutation::ChildList {
                target: parent,
                added: added.clone(),
            });
        }
        added
    }
}

impl TreeObserver for MemoryDom {
    fn observe(
        &mut self,
        root: NodeId,
        options: ObserveOptions,
        callback: MutationCallback<Self>,
    ) -> Subscription {
        let subscription = Subscription::new();
        self.observers.push(Observer {
            root,
            options,
            callback,
            subscription: subscription.clone(),
        });
        subscription
    }
}

// ---------------------------------------------------------------------------
// Fragment parser
// ---------------------------------------------------------------------------

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

fn unescape_attr(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Lenient parser for markup fragments: elements, attributes (quoted or
/// not), text, comments, void and self-closing tags, raw-text elements.
/// Unmatched end tags are ignored; unclosed elements close at the end.
struct FragmentParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> FragmentParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    /// Parse everything and attach it below `parent`; returns the top-level
    /// nodes.
    fn parse_into(mut self, dom: &mut MemoryDom, parent: NodeId) -> Vec<NodeId> {
        let mut top = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();

        let place = |dom: &mut MemoryDom, stack: &[NodeId], node: NodeId, top: &mut Vec<NodeId>| {
            match stack.last() {
                Some(open) => dom.attach(*open, node),
                None => {
                    dom.attach(parent, node);
                    top.push(node);
                }
            }
        };

        while self.pos < self.src.len() {
            let rest = self.rest();
            if let Some(body) = rest.strip_prefix("<!--") {
                let (text, consumed) = match body.find("-->") {
                    Some(end) => (&body[..end], 4 + end + 3),
                    None => (body, rest.len()),
                };
                let node = dom.push(NodeData::Comment(text.to_string()));
                place(dom, &stack, node, &mut top);
                self.pos += consumed;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.pos += rest.find('>').map_or(rest.len(), |i| i + 1);
            } else if rest.starts_with("</") {
                self.pos += 2;
                let name = self.eat_while(|c| c.is_ascii_alphanumeric() || c == '-').to_ascii_lowercase();
                let rest = self.rest();
                self.pos += rest.find('>').map_or(rest.len(), |i| i + 1);
                if let Some(depth) = stack.iter().rposition(|n| dom.tag(*n) == Some(name.as_str())) {
                    stack.truncate(depth);
                }
            } else if rest.starts_with('<') && rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                self.pos += 1;
                let (node, tag, self_closing) = self.open_tag(dom);
                place(dom, &stack, node, &mut top);
                if self_closing || is_void(&tag) {
                    continue;
                }
                if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                    let text = self.raw_text(&tag);
                    if !text.is_empty() {
                        let text_node = dom.push(NodeData::Text(text.to_string()));
                        dom.attach(node, text_node);
                    }
                    continue;
                }
                stack.push(node);
            } else {
                let first = rest.chars().next().map_or(0, char::len_utf8);
                let end = rest[first..].find('<').map_or(rest.len(), |i| i + first);
                let node = dom.push(NodeData::Text(rest[..end].to_string()));
                place(dom, &stack, node, &mut top);
                self.pos += end;
            }
        }
        top
    }

    fn open_tag(&mut self, dom: &mut MemoryDom) -> (NodeId, String, bool) {
        let tag = self.eat_while(|c| c.is_ascii_alphanumeric() || c == '-').to_ascii_lowercase();
        let mut attrs: Vec<(String, String)> = Vec::new();
        let mut self_closing = false;

        loop {
            self.eat_while(char::is_whitespace);
            let rest = self.rest();
            if rest.is_empty() {
                break;
            }
            if let Some(after) = rest.strip_prefix("/>") {
                self.pos = self.src.len() - after.len();
                self_closing = true;
                break;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break;
            }
            if rest.starts_with('/') {
                self.pos += 1;
                continue;
            }

            let name = self
                .eat_while(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '/'))
                .to_ascii_lowercase();
            if name.is_empty() {
                self.pos += self.rest().chars().next().map_or(0, char::len_utf8);
                continue;
            }
            self.eat_while(char::is_whitespace);
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.eat_while(char::is_whitespace);
                self.attr_value()
            } else {
                String::new()
            };
            if !attrs.iter().any(|(n, _)| *n == name) {
                attrs.push((name, value));
            }
        }

        let node = dom.push(NodeData::Element {
            tag: tag.clone(),
            attrs,
        });
        (node, tag, self_closing)
    }

    fn attr_value(&mut self) -> String {
        let rest = self.rest();
        match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let body = &rest[1..];
                let end = body.find(quote).unwrap_or(body.len());
                self.pos += 1 + end + usize::from(end < body.len());
                unescape_attr(&body[..end])
            }
            _ => unescape_attr(self.eat_while(|c| !c.is_whitespace() && c != '>')),
        }
    }

    fn raw_text(&mut self, tag: &str) -> &'a str {
        let rest = self.rest();
        let close = format!("</{tag}");
        let end = rest.to_ascii_lowercase().find(&close).unwrap_or(rest.len());
        self.pos += end;
        if end < rest.len() {
            let after = self.rest();
            self.pos += after.find('>').map_or(after.len(), |i| i + 1);
        }
        &rest[..end]
    }
}

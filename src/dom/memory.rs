//! In-memory DOM.
//!
//! A [`DomAdapter`] that keeps a plain node tree and an operation log.
//! Clones share the same document, so a test can hand one clone to
//! `create_root` and inspect the tree through another.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::rc::Rc;

use tracing::warn;

use super::{DomAdapter, DomNode, Namespace};
use crate::reactive::Value;

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq)]
pub enum DomOp {
    CreateElement { node: DomNode, tag: String },
    CreateText { node: DomNode, text: String },
    SetText { node: DomNode, text: String },
    Append { parent: DomNode, child: DomNode },
    InsertBefore { parent: DomNode, child: DomNode, before: DomNode },
    Remove { parent: DomNode, child: DomNode },
    SetProperty { node: DomNode, key: String, value: Value },
    SetAttribute { node: DomNode, key: String, value: String },
    RemoveAttribute { node: DomNode, key: String },
    AddListener { node: DomNode, event: String, capture: bool },
    RemoveListener { node: DomNode, event: String, capture: bool },
}

impl DomOp {
    /// Whether the op changed an attached or detached tree, as opposed to
    /// only creating a node.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, DomOp::CreateElement { .. } | DomOp::CreateText { .. })
    }
}

enum MemKind {
    Element { tag: String, ns: Namespace },
    Text(String),
}

struct MemNode {
    kind: MemKind,
    parent: Option<DomNode>,
    children: Vec<DomNode>,
    props: BTreeMap<String, Value>,
    attrs: BTreeMap<String, String>,
    listeners: Vec<(String, bool)>,
}

impl MemNode {
    fn new(kind: MemKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            props: BTreeMap::new(),
            attrs: BTreeMap::new(),
            listeners: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Document {
    nodes: Vec<MemNode>,
    ops: Vec<DomOp>,
}

impl Document {
    fn alloc(&mut self, kind: MemKind) -> DomNode {
        let id = DomNode(self.nodes.len() as u64);
        self.nodes.push(MemNode::new(kind));
        id
    }

    fn node(&self, id: DomNode) -> Option<&MemNode> {
        self.nodes.get(id.0 as usize)
    }

    fn node_mut(&mut self, id: DomNode) -> Option<&mut MemNode> {
        self.nodes.get_mut(id.0 as usize)
    }

    fn detach(&mut self, child: DomNode) {
        let Some(parent) = self.node(child).and_then(|n| n.parent) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = None;
        }
    }

    fn attach(&mut self, parent: DomNode, child: DomNode, before: Option<DomNode>) {
        if parent == child || self.node(parent).is_none() || self.node(child).is_none() {
            warn!(?parent, ?child, "invalid attach ignored");
            return;
        }
        self.detach(child);
        let Some(p) = self.node_mut(parent) else { return };
        let pos = before
            .and_then(|b| p.children.iter().position(|c| *c == b))
            .unwrap_or(p.children.len());
        p.children.insert(pos, child);
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
    }

    fn text_into(&self, id: DomNode, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        match &node.kind {
            MemKind::Text(text) => out.push_str(text),
            MemKind::Element { .. } => {
                for child in &node.children {
                    self.text_into(*child, out);
                }
            }
        }
    }

    fn html_into(&self, id: DomNode, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        match &node.kind {
            MemKind::Text(text) => out.push_str(text),
            MemKind::Element { tag, .. } => {
                let _ = write!(out, "<{tag}");
                if let Some(class) = node.props.get("className") {
                    let _ = write!(out, " class=\"{class}\"");
                }
                for (key, value) in &node.attrs {
                    let _ = write!(out, " {key}=\"{value}\"");
                }
                out.push('>');
                for child in &node.children {
                    self.html_into(*child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }
}

/// Shared in-memory document.
#[derive(Clone, Default)]
pub struct MemoryDom {
    doc: Rc<RefCell<Document>>,
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    /// A root element for `create_root`. Not recorded in the op log.
    pub fn create_container(&self, tag: &str) -> DomNode {
        self.doc.borrow_mut().alloc(MemKind::Element {
            tag: tag.to_string(),
            ns: Namespace::Html,
        })
    }

    pub fn ops(&self) -> Vec<DomOp> {
        self.doc.borrow().ops.clone()
    }

    /// Drain the op log.
    pub fn take_ops(&self) -> Vec<DomOp> {
        std::mem::take(&mut self.doc.borrow_mut().ops)
    }

    /// Recorded ops that touched a tree (node creation excluded).
    pub fn mutation_count(&self) -> usize {
        self.doc.borrow().ops.iter().filter(|op| op.is_mutation()).count()
    }

    pub fn text_content(&self, node: DomNode) -> String {
        let mut out = String::new();
        self.doc.borrow().text_into(node, &mut out);
        out
    }

    /// Markup of `node`'s children, attributes sorted by name.
    pub fn inner_html(&self, node: DomNode) -> String {
        let doc = self.doc.borrow();
        let mut out = String::new();
        if let Some(n) = doc.node(node) {
            for child in &n.children {
                doc.html_into(*child, &mut out);
            }
        }
        out
    }

    pub fn children(&self, node: DomNode) -> Vec<DomNode> {
        self.doc.borrow().node(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    pub fn parent(&self, node: DomNode) -> Option<DomNode> {
        self.doc.borrow().node(node).and_then(|n| n.parent)
    }

    pub fn tag(&self, node: DomNode) -> Option<String> {
        match &self.doc.borrow().node(node)?.kind {
            MemKind::Element { tag, .. } => Some(tag.clone()),
            MemKind::Text(_) => None,
        }
    }

    pub fn namespace(&self, node: DomNode) -> Option<Namespace> {
        match &self.doc.borrow().node(node)?.kind {
            MemKind::Element { ns, .. } => Some(*ns),
            MemKind::Text(_) => None,
        }
    }

    pub fn property(&self, node: DomNode, key: &str) -> Option<Value> {
        self.doc.borrow().node(node)?.props.get(key).cloned()
    }

    pub fn attribute(&self, node: DomNode, key: &str) -> Option<String> {
        self.doc.borrow().node(node)?.attrs.get(key).cloned()
    }

    pub fn listeners(&self, node: DomNode) -> Vec<(String, bool)> {
        self.doc.borrow().node(node).map(|n| n.listeners.clone()).unwrap_or_default()
    }

    /// Element children of `node` named `tag`, depth first.
    pub fn find_all(&self, node: DomNode, tag: &str) -> Vec<DomNode> {
        let mut found = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            for child in self.children(id).into_iter().rev() {
                if self.tag(child).as_deref() == Some(tag) {
                    found.push(child);
                }
                stack.push(child);
            }
        }
        found
    }

    fn record(&self, op: DomOp) {
        self.doc.borrow_mut().ops.push(op);
    }
}

impl DomAdapter for MemoryDom {
    fn create_element(&mut self, tag: &str, ns: Namespace) -> DomNode {
        let node = self.doc.borrow_mut().alloc(MemKind::Element {
            tag: tag.to_string(),
            ns,
        });
        self.record(DomOp::CreateElement {
            node,
            tag: tag.to_string(),
        });
        node
    }

    fn create_text_node(&mut self, text: &str) -> DomNode {
        let node = self.doc.borrow_mut().alloc(MemKind::Text(text.to_string()));
        self.record(DomOp::CreateText {
            node,
            text: text.to_string(),
        });
        node
    }

    fn set_text(&mut self, node: DomNode, text: &str) {
        if let Some(MemNode {
            kind: MemKind::Text(current),
            ..
        }) = self.doc.borrow_mut().node_mut(node)
        {
            *current = text.to_string();
        }
        self.record(DomOp::SetText {
            node,
            text: text.to_string(),
        });
    }

    fn append_child(&mut self, parent: DomNode, child: DomNode) {
        self.doc.borrow_mut().attach(parent, child, None);
        self.record(DomOp::Append { parent, child });
    }

    fn insert_before(&mut self, parent: DomNode, child: DomNode, before: DomNode) {
        self.doc.borrow_mut().attach(parent, child, Some(before));
        self.record(DomOp::InsertBefore { parent, child, before });
    }

    fn remove_child(&mut self, parent: DomNode, child: DomNode) {
        {
            let mut doc = self.doc.borrow_mut();
            if doc.node(child).and_then(|n| n.parent) == Some(parent) {
                doc.detach(child);
            } else {
                warn!(?parent, ?child, "remove_child: not a child");
            }
        }
        self.record(DomOp::Remove { parent, child });
    }

    fn set_property(&mut self, node: DomNode, key: &str, value: &Value) {
        {
            let mut doc = self.doc.borrow_mut();
            if key == "textContent" {
                let old = doc.node(node).map(|n| n.children.clone()).unwrap_or_default();
                for child in old {
                    doc.detach(child);
                }
                let text = match value {
                    Value::Undefined | Value::Null => String::new(),
                    other => other.to_string(),
                };
                if !text.is_empty() {
                    let text_node = doc.alloc(MemKind::Text(text));
                    doc.attach(node, text_node, None);
                }
            } else if let Some(n) = doc.node_mut(node) {
                if value.is_undefined() {
                    n.props.remove(key);
                } else {
                    n.props.insert(key.to_string(), value.clone());
                }
            }
        }
        self.record(DomOp::SetProperty {
            node,
            key: key.to_string(),
            value: value.clone(),
        });
    }

    fn set_attribute(&mut self, node: DomNode, key: &str, value: &str) {
        if let Some(n) = self.doc.borrow_mut().node_mut(node) {
            n.attrs.insert(key.to_string(), value.to_string());
        }
        self.record(DomOp::SetAttribute {
            node,
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    fn remove_attribute(&mut self, node: DomNode, key: &str) {
        if let Some(n) = self.doc.borrow_mut().node_mut(node) {
            n.attrs.remove(key);
        }
        self.record(DomOp::RemoveAttribute {
            node,
            key: key.to_string(),
        });
    }

    fn add_event_listener(&mut self, node: DomNode, event: &str, capture: bool) {
        if let Some(n) = self.doc.borrow_mut().node_mut(node) {
            n.listeners.push((event.to_string(), capture));
        }
        self.record(DomOp::AddListener {
            node,
            event: event.to_string(),
            capture,
        });
    }

    fn remove_event_listener(&mut self, node: DomNode, event: &str, capture: bool) {
        if let Some(n) = self.doc.borrow_mut().node_mut(node) {
            n.listeners.retain(|(e, c)| !(e == event && *c == capture));
        }
        self.record(DomOp::RemoveListener {
            node,
            event: event.to_string(),
            capture,
        });
    }
}

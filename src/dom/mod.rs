//! DOM Adapter - The host seam.
//!
//! The runtime never touches a real document. Every host operation goes
//! through a [`DomAdapter`], so the same reconciler drives a browser binding,
//! a server renderer or the in-memory [`MemoryDom`] used by tests.
//!
//! # Prop routing
//!
//! Host props are applied by [`apply_prop`] / [`remove_prop`]:
//! - `textContent`, `className`, `value`, `checked` and other plain names go
//!   through `set_property`
//! - names containing `-` or `:` (`data-id`, `aria-label`, `xlink:href`) and
//!   every prop on an SVG element go through `set_attribute`
//! - event handlers never reach the adapter as props; the root registers one
//!   listener per event type on its container instead

mod memory;

pub use memory::{DomOp, MemoryDom};

use std::cell::RefCell;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use crate::reactive::Value;
use crate::vnode::VNodeId;

/// Opaque handle to a host node, issued by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomNode(pub u64);

/// Element namespace, decided by the host context during capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    #[default]
    Html,
    Svg,
}

impl Namespace {
    pub fn uri(self) -> &'static str {
        match self {
            Namespace::Html => "http://www.w3.org/1999/xhtml",
            Namespace::Svg => "http://www.w3.org/2000/svg",
        }
    }

    /// Namespace for the children of `tag` created in `self`.
    pub fn child_namespace(self, tag: &str) -> Namespace {
        match (self, tag) {
            (_, "svg") => Namespace::Svg,
            (Namespace::Svg, "foreignObject") => Namespace::Html,
            (ns, _) => ns,
        }
    }

    /// Namespace of an element named `tag` created in `self`.
    pub fn element_namespace(self, tag: &str) -> Namespace {
        if tag == "svg" { Namespace::Svg } else { self }
    }
}

/// Host operations the runtime needs.
///
/// Implementations must accept an `append_child`/`insert_before` of a node
/// that is already attached and move it, like the DOM does.
pub trait DomAdapter {
    fn create_element(&mut self, tag: &str, ns: Namespace) -> DomNode;
    fn create_text_node(&mut self, text: &str) -> DomNode;
    fn set_text(&mut self, node: DomNode, text: &str);

    fn append_child(&mut self, parent: DomNode, child: DomNode);
    fn insert_before(&mut self, parent: DomNode, child: DomNode, before: DomNode);
    fn remove_child(&mut self, parent: DomNode, child: DomNode);

    fn set_property(&mut self, node: DomNode, key: &str, value: &Value);
    fn set_attribute(&mut self, node: DomNode, key: &str, value: &str);
    fn remove_attribute(&mut self, node: DomNode, key: &str);

    fn add_event_listener(&mut self, node: DomNode, event: &str, capture: bool);
    fn remove_event_listener(&mut self, node: DomNode, event: &str, capture: bool);
}

impl<A: DomAdapter + ?Sized> DomAdapter for Box<A> {
    fn create_element(&mut self, tag: &str, ns: Namespace) -> DomNode {
        (**self).create_element(tag, ns)
    }
    fn create_text_node(&mut self, text: &str) -> DomNode {
        (**self).create_text_node(text)
    }
    fn set_text(&mut self, node: DomNode, text: &str) {
        (**self).set_text(node, text)
    }
    fn append_child(&mut self, parent: DomNode, child: DomNode) {
        (**self).append_child(parent, child)
    }
    fn insert_before(&mut self, parent: DomNode, child: DomNode, before: DomNode) {
        (**self).insert_before(parent, child, before)
    }
    fn remove_child(&mut self, parent: DomNode, child: DomNode) {
        (**self).remove_child(parent, child)
    }
    fn set_property(&mut self, node: DomNode, key: &str, value: &Value) {
        (**self).set_property(node, key, value)
    }
    fn set_attribute(&mut self, node: DomNode, key: &str, value: &str) {
        (**self).set_attribute(node, key, value)
    }
    fn remove_attribute(&mut self, node: DomNode, key: &str) {
        (**self).remove_attribute(node, key)
    }
    fn add_event_listener(&mut self, node: DomNode, event: &str, capture: bool) {
        (**self).add_event_listener(node, event, capture)
    }
    fn remove_event_listener(&mut self, node: DomNode, event: &str, capture: bool) {
        (**self).remove_event_listener(node, event, capture)
    }
}

// =============================================================================
// Host state
// =============================================================================

/// A root's adapter plus what the runtime keeps about the container.
///
/// Shared between the root record and in-flight builds. Borrowed only for
/// host operations, never across user code.
pub(crate) struct Host {
    adapter: Box<dyn DomAdapter>,
    pub container: DomNode,
    /// Host node -> owning VNode, for event target lookup.
    pub index: AHashMap<DomNode, VNodeId>,
    /// Root listeners installed on the container.
    pub listeners: AHashSet<(Rc<str>, bool)>,
    /// Adapter calls made through [`Host::dom`].
    pub operations: usize,
}

pub(crate) type SharedHost = Rc<RefCell<Host>>;

impl Host {
    pub(crate) fn new(adapter: Box<dyn DomAdapter>, container: DomNode) -> Self {
        Self {
            adapter,
            container,
            index: AHashMap::new(),
            listeners: AHashSet::new(),
            operations: 0,
        }
    }

    /// The adapter; counts one operation.
    pub(crate) fn dom(&mut self) -> &mut dyn DomAdapter {
        self.operations += 1;
        &mut *self.adapter
    }

    /// Install the container listener for `event` once.
    pub(crate) fn listen(&mut self, event: Rc<str>, capture: bool) {
        if self.listeners.insert((event.clone(), capture)) {
            let container = self.container;
            self.dom().add_event_listener(container, &event, capture);
        }
    }

    pub(crate) fn unlisten_all(&mut self) {
        let container = self.container;
        for (event, capture) in std::mem::take(&mut self.listeners) {
            self.dom().remove_event_listener(container, &event, capture);
        }
    }
}

// =============================================================================
// Prop routing
// =============================================================================

fn is_attribute(key: &str, ns: Namespace) -> bool {
    ns == Namespace::Svg || key.contains('-') || key.contains(':')
}

/// Write one host prop.
pub(crate) fn apply_prop(
    adapter: &mut dyn DomAdapter,
    node: DomNode,
    ns: Namespace,
    key: &str,
    value: &Value,
) {
    if is_attribute(key, ns) {
        match value {
            Value::Undefined | Value::Null | Value::Bool(false) => adapter.remove_attribute(node, key),
            Value::Bool(true) => adapter.set_attribute(node, key, ""),
            other => adapter.set_attribute(node, key, &other.to_string()),
        }
    } else {
        adapter.set_property(node, key, value);
    }
}

/// Undo a host prop that is no longer present.
pub(crate) fn remove_prop(adapter: &mut dyn DomAdapter, node: DomNode, ns: Namespace, key: &str) {
    if is_attribute(key, ns) {
        adapter.remove_attribute(node, key);
    } else {
        adapter.set_property(node, key, &Value::Undefined);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_transitions() {
        assert_eq!(Namespace::Html.element_namespace("svg"), Namespace::Svg);
        assert_eq!(Namespace::Html.child_namespace("svg"), Namespace::Svg);
        assert_eq!(Namespace::Svg.child_namespace("g"), Namespace::Svg);
        assert_eq!(Namespace::Svg.child_namespace("foreignObject"), Namespace::Html);
        assert_eq!(Namespace::Svg.element_namespace("foreignObject"), Namespace::Svg);
    }

    #[test]
    fn test_prop_routing() {
        let mut dom = MemoryDom::new();
        let div = dom.create_element("div", Namespace::Html);
        apply_prop(&mut dom, div, Namespace::Html, "className", &Value::from("box"));
        apply_prop(&mut dom, div, Namespace::Html, "data-id", &Value::from(7));
        assert_eq!(dom.property(div, "className"), Some(Value::from("box")));
        assert_eq!(dom.attribute(div, "data-id").as_deref(), Some("7"));

        remove_prop(&mut dom, div, Namespace::Html, "data-id");
        assert_eq!(dom.attribute(div, "data-id"), None);

        let circle = dom.create_element("circle", Namespace::Svg);
        apply_prop(&mut dom, circle, Namespace::Svg, "r", &Value::from(4));
        assert_eq!(dom.attribute(circle, "r").as_deref(), Some("4"));
    }
}

//! The VNode record.

use std::collections::VecDeque;
use std::rc::Rc;

use super::{Update, VNodeFlags, VNodeId, VNodeTag};
use crate::component::ClassComponent;
use crate::dom::{DomNode, Namespace};
use crate::element::{Element, ElementKind, ElementType, Key, NodeRef, Props};
use crate::error::ComponentError;
use crate::hooks::HookSlot;
use crate::reactive::{Tracker, Value};
use crate::root::RootId;
use crate::suspense::PendingHandle;

/// Host prop change computed by bubble, applied by commit.
#[derive(Debug, Clone, PartialEq)]
pub enum PropChange {
    Set(Rc<str>, Value),
    Remove(Rc<str>),
}

/// One node of the persistent tree.
///
/// Fields prefixed `old_` hold what was last committed; the unprefixed ones
/// are the work-in-progress values a build writes. Commit promotes them.
#[derive(Clone)]
pub struct VNode {
    pub tag: VNodeTag,
    pub element_type: ElementType,
    pub key: Option<Key>,
    pub root: RootId,

    pub parent: Option<VNodeId>,
    pub child: Option<VNodeId>,
    pub sibling: Option<VNodeId>,
    pub index: usize,

    pub element: Element,
    pub old_element: Option<Element>,
    pub state: Value,
    pub old_state: Value,

    pub flags: VNodeFlags,
    pub should_update: bool,
    pub child_should_update: bool,
    /// Created by a build that has not committed yet.
    pub is_created: bool,

    pub updates: VecDeque<Update>,
    /// Leading updates folded by the current build; dropped on commit.
    pub consumed_updates: usize,
    pub callbacks: Vec<Rc<dyn Fn()>>,
    pub caught: Vec<ComponentError>,

    pub hooks: Vec<HookSlot>,
    pub instance: Option<Rc<dyn ClassComponent>>,
    pub tracker: Option<Rc<Tracker>>,
    pub context_deps: Vec<u64>,
    /// Provider value or consumer input seen by the last capture.
    pub context_value: Value,

    pub real_node: Option<DomNode>,
    pub namespace: Namespace,
    pub direct_text: Option<Rc<str>>,
    pub old_direct_text: Option<Rc<str>>,
    pub pending_props: Vec<PropChange>,
    pub pending_text: Option<Rc<str>>,
    pub node_ref: Option<NodeRef>,
    pub old_ref: Option<NodeRef>,

    pub suspended: Vec<PendingHandle>,
    pub deletions: Vec<VNodeId>,
}

impl VNode {
    pub(crate) fn new(tag: VNodeTag, element: Element, root: RootId) -> Self {
        Self {
            tag,
            element_type: element.element_type(),
            key: element.key.clone(),
            root,
            parent: None,
            child: None,
            sibling: None,
            index: 0,
            node_ref: element.node_ref.clone(),
            element,
            old_element: None,
            state: Value::Undefined,
            old_state: Value::Undefined,
            flags: VNodeFlags::empty(),
            should_update: true,
            child_should_update: false,
            is_created: true,
            updates: VecDeque::new(),
            consumed_updates: 0,
            callbacks: Vec::new(),
            caught: Vec::new(),
            hooks: Vec::new(),
            instance: None,
            tracker: None,
            context_deps: Vec::new(),
            context_value: Value::Undefined,
            real_node: None,
            namespace: Namespace::Html,
            direct_text: None,
            old_direct_text: None,
            pending_props: Vec::new(),
            pending_text: None,
            old_ref: None,
            suspended: Vec::new(),
            deletions: Vec::new(),
        }
    }

    /// Root node for a container.
    pub(crate) fn tree_root(root: RootId, container: DomNode) -> Self {
        let mut node = Self::new(VNodeTag::TreeRoot, crate::element::empty(), root);
        node.element_type = ElementType::Root;
        node.real_node = Some(container);
        node.is_created = false;
        node.should_update = false;
        node
    }

    pub fn props(&self) -> Props {
        self.element.props().cloned().unwrap_or_default()
    }

    pub fn old_props(&self) -> Option<Props> {
        self.old_element.as_ref().and_then(|e| e.props().cloned())
    }

    pub fn text(&self) -> Option<Rc<str>> {
        match &self.element.kind {
            ElementKind::Text(text) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn name(&self) -> String {
        match self.tag {
            VNodeTag::TreeRoot => "#root".into(),
            _ => self.element.type_name(),
        }
    }

    /// Needs capture work of its own (not just its subtree).
    pub fn has_work(&self) -> bool {
        self.is_created || self.should_update
    }
}

impl std::fmt::Debug for VNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VNode")
            .field("tag", &self.tag)
            .field("name", &self.name())
            .field("key", &self.key)
            .field("parent", &self.parent)
            .field("child", &self.child)
            .field("sibling", &self.sibling)
            .field("flags", &self.flags)
            .field("real_node", &self.real_node)
            .finish()
    }
}

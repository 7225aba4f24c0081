//! VNode tree.
//!
//! The persistent tree the builder reconciles elements into. Nodes live in
//! a generational arena ([`arena`]) and link through `parent` / `child` /
//! `sibling` ids. Each node carries double-buffered fields (`old_*` =
//! committed), an update queue ([`update`]) and commit flags ([`flags`]).

pub mod arena;
pub mod flags;
pub mod node;
pub mod tag;
pub mod update;

pub use flags::VNodeFlags;
pub use node::{PropChange, VNode};
pub use tag::VNodeTag;
pub use update::{Folded, Payload, Update, UpdateKind, merge_state, process_updates};

use crate::dom::DomNode;
use crate::element::ElementKind;

/// Handle to a VNode. Stale once the node is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VNodeId {
    pub index: u32,
    pub generation: u32,
}

// =============================================================================
// Dirty marking
// =============================================================================

/// Mark `id` for re-render and flag every ancestor's subtree as dirty.
///
/// Walks all the way up: a build in progress may already have cleared the
/// flags of ancestors it passed.
pub(crate) fn mark_dirty(id: VNodeId) -> bool {
    let Some(mut parent) = arena::with_mut(id, |n| {
        n.should_update = true;
        n.parent
    }) else {
        return false;
    };
    while let Some(p) = parent {
        parent = arena::with_mut(p, |n| {
            n.child_should_update = true;
            n.parent
        })
        .flatten();
    }
    true
}

// =============================================================================
// Traversal
// =============================================================================

pub(crate) fn children(id: VNodeId) -> Vec<VNodeId> {
    let mut out = Vec::new();
    let mut next = arena::with(id, |n| n.child).flatten();
    while let Some(child) = next {
        out.push(child);
        next = arena::with(child, |n| n.sibling).flatten();
    }
    out
}

pub(crate) fn parent(id: VNodeId) -> Option<VNodeId> {
    arena::with(id, |n| n.parent).flatten()
}

/// Pre-order ids of `id` and everything below it.
pub(crate) fn subtree(id: VNodeId) -> Vec<VNodeId> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        out.push(current);
        let mut kids = children(current);
        kids.reverse();
        stack.extend(kids);
    }
    out
}

/// Host node children of `id` attach to: its own for hosts, the container
/// for roots and portals.
pub(crate) fn host_container(id: VNodeId) -> Option<DomNode> {
    arena::with(id, |n| match (&n.tag, &n.element.kind) {
        (VNodeTag::Host | VNodeTag::TreeRoot, _) => n.real_node,
        (VNodeTag::Portal, ElementKind::Portal { container, .. }) => Some(*container),
        _ => None,
    })
    .flatten()
}

/// Nearest ancestor that owns a host container, with that container.
pub(crate) fn host_parent(id: VNodeId) -> Option<(VNodeId, DomNode)> {
    let mut current = parent(id);
    while let Some(p) = current {
        if let Some(dom) = host_container(p) {
            return Some((p, dom));
        }
        current = parent(p);
    }
    None
}

/// Outermost host nodes of a subtree (itself if it is one). Does not enter
/// portals: their hosts live in another container.
pub(crate) fn top_hosts(id: VNodeId) -> Vec<(VNodeId, DomNode)> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        let Some((tag, real)) = arena::with(current, |n| (n.tag, n.real_node)) else {
            continue;
        };
        if tag.is_host() {
            if let Some(real) = real {
                out.push((current, real));
            }
            continue;
        }
        if tag == VNodeTag::Portal && current != id {
            continue;
        }
        let mut kids = children(current);
        kids.reverse();
        stack.extend(kids);
    }
    out
}

/// First ancestor (excluding `id`) matching `pred`.
pub(crate) fn find_ancestor(id: VNodeId, pred: impl Fn(&VNode) -> bool) -> Option<VNodeId> {
    let mut current = parent(id);
    while let Some(p) = current {
        if arena::with(p, &pred)? {
            return Some(p);
        }
        current = parent(p);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Props, h, text};
    use crate::root::RootId;

    fn link(parent: VNodeId, kids: &[VNodeId]) {
        arena::with_mut(parent, |n| n.child = kids.first().copied());
        for (i, kid) in kids.iter().enumerate() {
            let next = kids.get(i + 1).copied();
            arena::with_mut(*kid, |n| {
                n.parent = Some(parent);
                n.sibling = next;
                n.index = i;
            });
        }
    }

    fn host(tag: &str, dom: u64) -> VNodeId {
        let mut node = VNode::new(VNodeTag::Host, h(tag, Props::new(), []), RootId(0));
        node.real_node = Some(DomNode(dom));
        arena::alloc(node)
    }

    #[test]
    fn test_mark_dirty_flags_ancestors() {
        let root = arena::alloc(VNode::tree_root(RootId(0), DomNode(0)));
        let a = host("div", 1);
        let b = host("span", 2);
        link(root, &[a]);
        link(a, &[b]);
        arena::with_mut(a, |n| n.should_update = false);
        arena::with_mut(b, |n| n.should_update = false);

        assert!(mark_dirty(b));
        assert_eq!(arena::with(b, |n| n.should_update), Some(true));
        assert_eq!(arena::with(a, |n| (n.should_update, n.child_should_update)), Some((false, true)));
        assert_eq!(arena::with(root, |n| n.child_should_update), Some(true));

        assert_eq!(subtree(root), vec![root, a, b]);
        assert_eq!(host_parent(b), Some((a, DomNode(1))));
        for id in [root, a, b] {
            arena::free(id);
        }
    }

    #[test]
    fn test_top_hosts_skip_through_fragments() {
        let frag = arena::alloc(VNode::new(
            VNodeTag::Fragment,
            crate::element::fragment([]),
            RootId(0),
        ));
        let t = arena::alloc(VNode::new(VNodeTag::Text, text("x"), RootId(0)));
        arena::with_mut(t, |n| n.real_node = Some(DomNode(5)));
        let d = host("p", 6);
        link(frag, &[t, d]);
        assert_eq!(top_hosts(frag), vec![(t, DomNode(5)), (d, DomNode(6))]);
        for id in [frag, t, d] {
            arena::free(id);
        }
    }
}

//! VNode storage.
//!
//! One slab per thread. Ids carry a generation so a handle kept past
//! `free` (a stale suspense callback, an updater on an unmounted
//! component) is detected instead of aliasing a reused slot.
//!
//! Closures passed to [`with`] / [`with_mut`] run while the arena is
//! borrowed: they must not call user code or re-enter the arena.

use std::cell::RefCell;

use slab::Slab;

use super::{VNode, VNodeId};

#[derive(Default)]
struct Arena {
    nodes: Slab<VNode>,
    generations: Vec<u32>,
}

impl Arena {
    fn live(&self, id: VNodeId) -> bool {
        let index = id.index as usize;
        self.nodes.contains(index) && self.generations.get(index) == Some(&id.generation)
    }
}

thread_local! {
    static ARENA: RefCell<Arena> = RefCell::new(Arena::default());
}

pub(crate) fn alloc(node: VNode) -> VNodeId {
    ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        let index = arena.nodes.insert(node);
        if arena.generations.len() <= index {
            arena.generations.resize(index + 1, 0);
        }
        VNodeId {
            index: index as u32,
            generation: arena.generations[index],
        }
    })
}

/// Release a node. Stale ids are ignored.
pub(crate) fn free(id: VNodeId) -> Option<VNode> {
    ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        if !arena.live(id) {
            return None;
        }
        let index = id.index as usize;
        arena.generations[index] = arena.generations[index].wrapping_add(1);
        Some(arena.nodes.remove(index))
    })
}

pub fn contains(id: VNodeId) -> bool {
    ARENA.with(|arena| arena.borrow().live(id))
}

pub(crate) fn with<R>(id: VNodeId, f: impl FnOnce(&VNode) -> R) -> Option<R> {
    ARENA.with(|arena| {
        let arena = arena.borrow();
        if !arena.live(id) {
            return None;
        }
        arena.nodes.get(id.index as usize).map(f)
    })
}

pub(crate) fn with_mut<R>(id: VNodeId, f: impl FnOnce(&mut VNode) -> R) -> Option<R> {
    ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        if !arena.live(id) {
            return None;
        }
        arena.nodes.get_mut(id.index as usize).map(f)
    })
}

/// Snapshot of a node.
pub(crate) fn get(id: VNodeId) -> Option<VNode> {
    with(id, VNode::clone)
}

/// Overwrite a live node (journal restore).
pub(crate) fn replace(id: VNodeId, node: VNode) -> bool {
    with_mut(id, |slot| *slot = node).is_some()
}

pub fn live_count() -> usize {
    ARENA.with(|arena| arena.borrow().nodes.len())
}

/// Drop every node; outstanding ids become stale.
pub fn reset_arena() {
    ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        let keys: Vec<usize> = arena.nodes.iter().map(|(k, _)| k).collect();
        for key in keys {
            arena.generations[key] = arena.generations[key].wrapping_add(1);
        }
        arena.nodes.clear();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::DomNode;
    use crate::root::RootId;

    fn node() -> VNode {
        VNode::tree_root(RootId(0), DomNode(0))
    }

    #[test]
    fn test_stale_id_after_free() {
        let a = alloc(node());
        assert!(contains(a));
        assert!(free(a).is_some());
        assert!(!contains(a));

        let b = alloc(node());
        assert_eq!(a.index, b.index);
        assert_ne!(a, b);
        assert!(with(a, |_| ()).is_none());
        assert!(free(a).is_none());
        assert!(contains(b));
        free(b);
    }

    #[test]
    fn test_with_mut_and_replace() {
        let id = alloc(node());
        with_mut(id, |n| n.index = 7);
        assert_eq!(with(id, |n| n.index), Some(7));
        let mut snapshot = get(id).unwrap();
        snapshot.index = 2;
        assert!(replace(id, snapshot));
        assert_eq!(with(id, |n| n.index), Some(2));
        free(id);
    }
}

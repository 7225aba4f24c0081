//! Child reconciliation and host prop diffing.
//!
//! Children match by key, or by position when unkeyed, and only when the
//! element type is the same. A reused node that sat before the last node
//! kept in place has moved and gets `ADDITION`; everything left over is
//! deleted.

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use tracing::warn;

use super::BuildPass;
use crate::element::{Element, ElementKind, Key, Props};
use crate::reactive::{is_same, observer::isolate};
use crate::vnode::{self, PropChange, VNode, VNodeFlags, VNodeId, VNodeTag, arena};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Key(Key),
    Index(usize),
}

/// Flatten fragments-in-arrays is the caller's business; `elements` are the
/// direct children of `parent`. Returns the first child.
pub(crate) fn reconcile_children(
    pass: &mut BuildPass,
    parent: VNodeId,
    elements: Vec<Element>,
) -> Option<VNodeId> {
    pass.touch(parent);
    let Some((parent_created, parent_tag)) = arena::with(parent, |n| (n.is_created, n.tag)) else {
        return None;
    };
    let track_moves = !parent_created || parent_tag == VNodeTag::Portal;

    let mut existing: AHashMap<Slot, VNodeId> = AHashMap::new();
    for child in vnode::children(parent) {
        let Some((key, index)) = arena::with(child, |n| (n.key.clone(), n.index)) else {
            continue;
        };
        let slot = match key {
            Some(key) => Slot::Key(key),
            None => Slot::Index(index),
        };
        existing.insert(slot, child);
    }

    let mut seen = AHashSet::new();
    let mut leftovers = Vec::new();
    let mut placed = Vec::with_capacity(elements.len());
    let mut last_placed = 0;

    for (index, element) in elements.into_iter().enumerate() {
        if element.is_empty() {
            continue;
        }
        if let Some(key) = &element.key {
            if !seen.insert(key.clone()) {
                warn!(key = %key, parent = ?parent, "duplicate key; element skipped");
                continue;
            }
        }
        let slot = match &element.key {
            Some(key) => Slot::Key(key.clone()),
            None => Slot::Index(index),
        };
        let reused = match existing.remove(&slot) {
            Some(old) if arena::with(old, |n| n.element_type == element.element_type()) == Some(true) => Some(old),
            Some(old) => {
                leftovers.push(old);
                None
            }
            None => None,
        };
        let id = match reused {
            Some(old) => {
                let old_index = arena::with(old, |n| n.index).unwrap_or(0);
                update_child(pass, old, element, index);
                if old_index < last_placed {
                    if track_moves {
                        arena::with_mut(old, |n| n.flags |= VNodeFlags::ADDITION);
                    }
                } else {
                    last_placed = old_index;
                }
                old
            }
            None => {
                let id = create_child(pass, parent, element, index);
                if track_moves {
                    arena::with_mut(id, |n| n.flags |= VNodeFlags::ADDITION);
                }
                id
            }
        };
        placed.push(id);
    }

    leftovers.extend(existing.into_values());
    for child in leftovers {
        delete_child(pass, parent, child);
    }

    let first = placed.first().copied();
    arena::with_mut(parent, |n| n.child = first);
    for (i, id) in placed.iter().enumerate() {
        let next = placed.get(i + 1).copied();
        arena::with_mut(*id, |n| {
            n.parent = Some(parent);
            n.sibling = next;
        });
    }
    first
}

fn create_child(pass: &mut BuildPass, parent: VNodeId, element: Element, index: usize) -> VNodeId {
    // Empty elements never get here.
    let tag = VNodeTag::of(&element.kind).unwrap_or(VNodeTag::Fragment);
    let mut node = VNode::new(tag, element, pass.root);
    node.parent = Some(parent);
    node.index = index;
    pass.alloc(node)
}

fn update_child(pass: &mut BuildPass, id: VNodeId, element: Element, index: usize) {
    pass.touch(id);
    let Some(old) = arena::with(id, |n| n.element.clone()) else {
        return;
    };
    let same = same_input(&old, &element);
    let memo_equal = !same && memo_props_equal(&old, &element);
    arena::with_mut(id, |n| {
        n.index = index;
        n.sibling = None;
        n.key = element.key.clone();
        n.node_ref = element.node_ref.clone();
        if !same && !memo_equal {
            n.should_update = true;
        }
        if !memo_equal {
            n.element = element;
        }
    });
}

/// Remove `child` from `parent`: pass-created nodes are freed right away,
/// committed ones wait for commit.
pub(crate) fn delete_child(pass: &mut BuildPass, parent: VNodeId, child: VNodeId) {
    if pass.created_here(child) {
        pass.discard(child);
        return;
    }
    pass.touch(parent);
    arena::with_mut(parent, |n| {
        n.deletions.push(child);
        n.flags |= VNodeFlags::DELETION;
    });
}

/// Whether `next` describes exactly the input `prev` was built from.
pub(crate) fn same_input(prev: &Element, next: &Element) -> bool {
    match (&prev.kind, &next.kind) {
        (ElementKind::Text(a), ElementKind::Text(b)) => a == b,
        (ElementKind::Fragment(a), ElementKind::Fragment(b)) => Rc::ptr_eq(a, b),
        (ElementKind::Portal { children: a, .. }, ElementKind::Portal { children: b, .. }) => Rc::ptr_eq(a, b),
        (
            ElementKind::Provider { value: va, children: a, .. },
            ElementKind::Provider { value: vb, children: b, .. },
        ) => Rc::ptr_eq(a, b) && is_same(va, vb),
        (ElementKind::Consumer { render: a, .. }, ElementKind::Consumer { render: b, .. }) => Rc::ptr_eq(a, b),
        (
            ElementKind::Suspense { fallback: fa, children: a },
            ElementKind::Suspense { fallback: fb, children: b },
        ) => Rc::ptr_eq(a, b) && Rc::ptr_eq(fa, fb),
        _ => match (prev.props(), next.props()) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            _ => false,
        },
    }
}

/// Memo bailout: the custom compare, or a shallow props comparison.
fn memo_props_equal(prev: &Element, next: &Element) -> bool {
    let ElementKind::Memo { props: old, .. } = &prev.kind else {
        return false;
    };
    let ElementKind::Memo { props: new, compare, .. } = &next.kind else {
        return false;
    };
    match compare {
        Some(compare) => {
            let mut equal = false;
            isolate("memo compare", || equal = compare(old, new));
            equal
        }
        None => old.shallow_eq(new),
    }
}

/// Host prop changes from `old` to `new`.
pub(crate) fn diff_props(old: Option<&Props>, new: &Props) -> Vec<PropChange> {
    let mut changes = Vec::new();
    if let Some(old) = old {
        for (key, _) in old.values() {
            if new.value(key).is_none() {
                changes.push(PropChange::Remove(key.into()));
            }
        }
    }
    for (key, value) in new.values() {
        let unchanged = old.and_then(|o| o.value(key)).is_some_and(|prev| is_same(prev, value));
        if !unchanged {
            changes.push(PropChange::Set(key.into(), value.clone()));
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{h, text};

    #[test]
    fn test_diff_props_set_and_remove() {
        let old = Props::new().with("id", "a").with("title", "x");
        let new = Props::new().with("id", "b").with("className", "c");
        let changes = diff_props(Some(&old), &new);
        assert!(changes.contains(&PropChange::Remove("title".into())));
        assert!(changes.contains(&PropChange::Set("id".into(), "b".into())));
        assert!(changes.contains(&PropChange::Set("className".into(), "c".into())));
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn test_diff_props_unchanged_is_empty() {
        let old = Props::new().with("id", "a");
        let new = Props::new().with("id", "a");
        assert!(diff_props(Some(&old), &new).is_empty());
    }

    #[test]
    fn test_same_input() {
        let props = Props::new().with("id", "a");
        let a = h("div", props.clone(), []);
        assert!(same_input(&a, &a.clone()));
        assert!(!same_input(&a, &h("div", Props::new().with("id", "a"), [])));
        assert!(same_input(&text("x"), &text("x")));
        assert!(!same_input(&text("x"), &text("y")));
    }
}

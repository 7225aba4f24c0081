//! Commit - Apply a finished build to the host tree.
//!
//! Runs in one go, in this order:
//! 1. deletions: unmount lifecycles and effect cleanups, then detach the
//!    removed host nodes
//! 2. placements, prop/text updates and text resets, children first
//! 3. refs, then every node the pass touched is promoted (`old_*` = current)
//! 4. lifecycles (`did_mount` / `did_update` / `did_catch`, update
//!    callbacks) and `use_effect` bodies, inside one batch
//!
//! User code only runs in steps 1 and 4, never while the host is borrowed.

use std::rc::Rc;

use ahash::AHashSet;
use tracing::{debug, trace};

use crate::builder::BuildPass;
use crate::component::{ClassComponent, Updater};
use crate::devtools;
use crate::dom::{DomNode, SharedHost, apply_prop, remove_prop};
use crate::element::Props;
use crate::error::ComponentError;
use crate::hooks::{EffectSlot, HookSlot};
use crate::reactive::Value;
use crate::reactive::observer::isolate;
use crate::scheduler;
use crate::vnode::{self, PropChange, VNodeFlags, VNodeId, VNodeTag, arena};

/// What a commit did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub effects: usize,
    pub deletions: usize,
    pub host_operations: usize,
}

struct ClassJob {
    instance: Rc<dyn ClassComponent>,
    updater: Updater,
    mounted: bool,
    previous: Option<(Props, Value)>,
    caught: Vec<ComponentError>,
    callbacks: Vec<Rc<dyn Fn()>>,
}

pub(crate) fn commit(pass: BuildPass) -> CommitSummary {
    let BuildPass {
        root,
        host,
        effects,
        journal,
        created_hosts,
        events,
        ..
    } = pass;
    let operations_before = host.borrow().operations;
    let mut seen = AHashSet::new();
    let effects: Vec<VNodeId> = effects.into_iter().filter(|id| seen.insert(*id)).collect();
    let mut summary = CommitSummary {
        effects: effects.len(),
        ..CommitSummary::default()
    };

    // Deletions
    for &id in &effects {
        let doomed = arena::with_mut(id, |n| std::mem::take(&mut n.deletions)).unwrap_or_default();
        for node in doomed {
            summary.deletions += 1;
            unmount(&host, node);
        }
    }

    // Host mutations
    for &id in &effects {
        let Some(flags) = arena::with(id, |n| n.flags) else {
            continue;
        };
        if flags.contains(VNodeFlags::ADDITION) {
            place(&host, id);
            arena::with_mut(id, |n| n.flags.remove(VNodeFlags::ADDITION));
        }
        if flags.contains(VNodeFlags::UPDATE) {
            apply_update(&host, id);
        }
        if let Some(real) = arena::with(id, |n| n.real_node).flatten() {
            reset_text(&host, id, real);
        }
    }

    // Refs and lifecycle collection, before promotion overwrites `old_*`.
    let rendered: AHashSet<VNodeId> = journal.rendered.iter().copied().collect();
    let mut class_jobs = Vec::new();
    let mut effect_slots: Vec<EffectSlot> = Vec::new();
    for &id in &effects {
        let Some((tag, flags)) = arena::with(id, |n| (n.tag, n.flags)) else {
            continue;
        };
        if flags.contains(VNodeFlags::REF) {
            attach_ref(id);
        }
        if flags.contains(VNodeFlags::CALLBACK) && tag == VNodeTag::Class {
            if let Some(job) = class_job(root, id, rendered.contains(&id)) {
                class_jobs.push(job);
            }
        }
        if flags.contains(VNodeFlags::EFFECT) {
            arena::with(id, |n| {
                for slot in &n.hooks {
                    if let HookSlot::Effect(effect) = slot {
                        if effect.has_pending() {
                            effect_slots.push(effect.clone());
                        }
                    }
                }
            });
        }
    }

    for id in journal.nodes() {
        arena::with_mut(id, |n| {
            n.is_created = false;
            n.flags.remove(VNodeFlags::TRANSIENT);
            n.old_element = Some(n.element.clone());
            n.old_state = n.state.clone();
            n.old_direct_text = n.direct_text.clone();
            n.old_ref = n.node_ref.clone();
            n.pending_props.clear();
            n.pending_text = None;
            let consumed = n.consumed_updates.min(n.updates.len());
            n.updates.drain(..consumed);
            n.consumed_updates = 0;
            n.callbacks.clear();
            n.caught.clear();
        });
    }

    {
        let mut host = host.borrow_mut();
        for (dom, id) in created_hosts {
            if arena::contains(id) {
                host.index.insert(dom, id);
            }
        }
        for (event, capture) in events {
            host.listen(event, capture);
        }
        summary.host_operations = host.operations - operations_before;
    }

    trace!(
        root = root.0,
        effects = summary.effects,
        deletions = summary.deletions,
        lifecycles = class_jobs.len(),
        use_effects = effect_slots.len(),
        "commit applied"
    );
    devtools::emit("commit", || {
        format!(
            "root {} effects={} deletions={} host_ops={}",
            root.0, summary.effects, summary.deletions, summary.host_operations
        )
    });

    if !class_jobs.is_empty() || !effect_slots.is_empty() {
        scheduler::batch(|| {
            for job in class_jobs {
                run_class_job(job);
            }
            for effect in effect_slots {
                isolate("use_effect", || effect.flush());
            }
        });
    }
    summary
}

// =============================================================================
// Deletion
// =============================================================================

/// `id`'s subtree plus deletions its nodes were still holding, pre-order.
fn doomed_nodes(id: VNodeId) -> Vec<VNodeId> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        out.push(current);
        let pending = arena::with(current, |n| n.deletions.clone()).unwrap_or_default();
        stack.extend(pending);
        let mut kids = vnode::children(current);
        kids.reverse();
        stack.extend(kids);
    }
    out
}

fn unmount(host: &SharedHost, target: VNodeId) {
    let nodes = doomed_nodes(target);
    debug!(?target, nodes = nodes.len(), "unmounting subtree");

    for &id in &nodes {
        let Some((created, instance, hooks, tracker, node_ref)) = arena::with(id, |n| {
            (
                n.is_created,
                n.instance.clone(),
                n.hooks.clone(),
                n.tracker.clone(),
                n.old_ref.clone(),
            )
        }) else {
            continue;
        };
        if let Some(tracker) = tracker {
            tracker.dispose();
        }
        if created {
            continue;
        }
        if let Some(instance) = instance {
            isolate("component_will_unmount", || instance.component_will_unmount());
        }
        for slot in hooks {
            if let HookSlot::Effect(effect) = slot {
                isolate("effect cleanup", || effect.run_cleanup());
            }
        }
        if let Some(node_ref) = node_ref {
            node_ref.set(None);
        }
    }

    // Hosts under nested portals live in other containers; nodes still
    // waiting in a deletion list are no longer linked as children.
    let mut removal_roots = vec![target];
    removal_roots.extend(
        nodes
            .iter()
            .copied()
            .filter(|id| *id != target && arena::with(*id, |n| n.tag == VNodeTag::Portal) == Some(true)),
    );
    for &id in &nodes {
        removal_roots.extend(arena::with(id, |n| n.deletions.clone()).unwrap_or_default());
    }
    let mut seen = AHashSet::new();
    removal_roots.retain(|id| seen.insert(*id));
    let mut detach = Vec::new();
    for start in removal_roots {
        for (id, dom) in vnode::top_hosts(start) {
            if arena::with(id, |n| n.is_created) != Some(false) {
                continue;
            }
            if let Some((_, parent)) = vnode::host_parent(id) {
                detach.push((parent, dom));
            }
        }
    }
    {
        let mut host = host.borrow_mut();
        for (parent, dom) in detach {
            host.dom().remove_child(parent, dom);
        }
        for &id in &nodes {
            if let Some(Some(real)) = arena::with(id, |n| n.tag.is_host().then_some(n.real_node).flatten()) {
                host.index.remove(&real);
            }
        }
    }
    for id in nodes {
        arena::free(id);
    }
}

// =============================================================================
// Placement and updates
// =============================================================================

fn place(host: &SharedHost, id: VNodeId) {
    if arena::with(id, |n| n.tag == VNodeTag::Portal) != Some(false) {
        return;
    }
    let Some((parent, parent_dom)) = vnode::host_parent(id) else {
        return;
    };
    reset_text(host, parent, parent_dom);
    let before = next_host_sibling(id);
    let hosts = vnode::top_hosts(id);
    let mut host = host.borrow_mut();
    for (_, dom) in hosts {
        match before {
            Some(anchor) => host.dom().insert_before(parent_dom, dom, anchor),
            None => host.dom().append_child(parent_dom, dom),
        }
    }
}

/// First host node after `id` that is already in place, within the same
/// host parent.
fn next_host_sibling(id: VNodeId) -> Option<DomNode> {
    let mut node = id;
    'siblings: loop {
        loop {
            if let Some(sibling) = arena::with(node, |n| n.sibling).flatten() {
                node = sibling;
                break;
            }
            let parent = vnode::parent(node)?;
            let tag = arena::with(parent, |n| n.tag)?;
            if tag.is_host() || matches!(tag, VNodeTag::TreeRoot | VNodeTag::Portal) {
                return None;
            }
            node = parent;
        }
        loop {
            let (tag, flags, real, child) = arena::with(node, |n| (n.tag, n.flags, n.real_node, n.child))?;
            if flags.contains(VNodeFlags::ADDITION) || tag == VNodeTag::Portal {
                continue 'siblings;
            }
            if tag.is_host() {
                match real {
                    Some(real) => return Some(real),
                    None => continue 'siblings,
                }
            }
            match child {
                Some(child) => node = child,
                None => continue 'siblings,
            }
        }
    }
}

fn reset_text(host: &SharedHost, id: VNodeId, real: DomNode) {
    let pending = arena::with_mut(id, |n| {
        let pending = n.flags.contains(VNodeFlags::RESET_TEXT);
        n.flags.remove(VNodeFlags::RESET_TEXT);
        pending
    });
    if pending == Some(true) {
        host.borrow_mut()
            .dom()
            .set_property(real, "textContent", &Value::Str("".into()));
    }
}

fn apply_update(host: &SharedHost, id: VNodeId) {
    let Some((tag, real, ns, changes, text)) = arena::with_mut(id, |n| {
        (
            n.tag,
            n.real_node,
            n.namespace,
            std::mem::take(&mut n.pending_props),
            n.pending_text.take(),
        )
    }) else {
        return;
    };
    let Some(real) = real else {
        return;
    };
    let mut host = host.borrow_mut();
    match tag {
        VNodeTag::Text => {
            if let Some(text) = text {
                host.dom().set_text(real, &text);
            }
        }
        VNodeTag::Host => {
            for change in changes {
                match change {
                    PropChange::Set(key, value) if &*key == "textContent" => {
                        host.dom().set_property(real, &key, &value);
                    }
                    PropChange::Set(key, value) if value.is_undefined() => {
                        remove_prop(host.dom(), real, ns, &key);
                    }
                    PropChange::Set(key, value) => apply_prop(host.dom(), real, ns, &key, &value),
                    PropChange::Remove(key) => remove_prop(host.dom(), real, ns, &key),
                }
            }
        }
        _ => {}
    }
}

fn attach_ref(id: VNodeId) {
    let Some((real, node_ref, old_ref)) = arena::with(id, |n| (n.real_node, n.node_ref.clone(), n.old_ref.clone()))
    else {
        return;
    };
    if let Some(old) = old_ref {
        if node_ref.as_ref().is_none_or(|r| !r.ptr_eq(&old)) {
            old.set(None);
        }
    }
    if let Some(node_ref) = node_ref {
        node_ref.set(real);
    }
}

// =============================================================================
// Lifecycles
// =============================================================================

fn class_job(root: crate::root::RootId, id: VNodeId, rendered: bool) -> Option<ClassJob> {
    arena::with(id, |n| {
        let instance = n.instance.clone()?;
        let mounted = n.is_created;
        let previous = (!mounted && rendered).then(|| (n.old_props().unwrap_or_default(), n.old_state.clone()));
        Some(ClassJob {
            instance,
            updater: Updater::new(root, id),
            mounted,
            previous,
            caught: n.caught.clone(),
            callbacks: n.callbacks.clone(),
        })
    })
    .flatten()
}

fn run_class_job(job: ClassJob) {
    let ClassJob {
        instance,
        updater,
        mounted,
        previous,
        caught,
        callbacks,
    } = job;
    if mounted {
        isolate("component_did_mount", || instance.component_did_mount(&updater));
    } else if let Some((props, state)) = previous {
        isolate("component_did_update", || {
            instance.component_did_update(&props, &state, &updater)
        });
    }
    for error in &caught {
        isolate("component_did_catch", || instance.component_did_catch(error, &updater));
    }
    for callback in callbacks {
        isolate("update callback", || callback());
    }
}

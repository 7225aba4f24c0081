//! Bubble - The upward half of a pass.
//!
//! Host nodes get their real node here: created elements are built
//! detached (props applied, child hosts appended) so commit only has to
//! insert the top of each new subtree. Updated elements get a prop diff.

use super::BuildPass;
use super::diff::diff_props;
use crate::dom::apply_prop;
use crate::element::ElementKind;
use crate::reactive::Value;
use crate::vnode::{self, PropChange, VNodeFlags, VNodeId, VNodeTag, arena};

pub(crate) fn bubble(pass: &mut BuildPass, id: VNodeId) {
    pass.contexts.pop_owned(id);
    if !pass.worked.contains(&id) {
        return;
    }
    match arena::with(id, |n| n.tag) {
        Some(VNodeTag::Host) => complete_host(pass, id),
        Some(VNodeTag::Text) => complete_text(pass, id),
        _ => {}
    }
    let flags = arena::with(id, |n| n.flags).unwrap_or_default();
    if flags.intersects(VNodeFlags::COMMIT_WORK) {
        pass.effects.push(id);
    }
}

fn complete_host(pass: &mut BuildPass, id: VNodeId) {
    let Some((created, real, ns, element, old_props, text, old_text, node_ref, old_ref)) = arena::with(id, |n| {
        (
            n.is_created,
            n.real_node,
            n.namespace,
            n.element.clone(),
            n.old_props(),
            n.direct_text.clone(),
            n.old_direct_text.clone(),
            n.node_ref.clone(),
            n.old_ref.clone(),
        )
    }) else {
        return;
    };
    let ElementKind::Host { tag, props } = &element.kind else {
        return;
    };
    for handler in props.handlers() {
        pass.events.insert((handler.event.clone(), handler.capture));
    }

    if created {
        if real.is_some() {
            return;
        }
        let child_hosts: Vec<_> = vnode::children(id)
            .into_iter()
            .filter(|child| arena::with(*child, |n| n.tag != VNodeTag::Portal).unwrap_or(false))
            .flat_map(vnode::top_hosts)
            .collect();
        let dom = {
            let mut host = pass.host.borrow_mut();
            let dom = host.dom().create_element(tag, ns);
            for (key, value) in props.values() {
                if !value.is_undefined() {
                    apply_prop(host.dom(), dom, ns, key, value);
                }
            }
            if let Some(text) = &text {
                host.dom().set_property(dom, "textContent", &Value::Str(text.clone()));
            }
            for (_, child) in child_hosts {
                host.dom().append_child(dom, child);
            }
            dom
        };
        pass.created_hosts.push((dom, id));
        arena::with_mut(id, |n| {
            n.real_node = Some(dom);
            if n.node_ref.is_some() {
                n.flags |= VNodeFlags::REF;
            }
        });
        return;
    }

    let mut changes = diff_props(old_props.as_ref(), props);
    let mut flags = VNodeFlags::empty();
    match (&old_text, &text) {
        (_, Some(next)) if old_text.as_ref() != Some(next) => {
            changes.push(PropChange::Set("textContent".into(), Value::Str(next.clone())));
        }
        (Some(_), None) => flags |= VNodeFlags::RESET_TEXT,
        _ => {}
    }
    if !changes.is_empty() {
        flags |= VNodeFlags::UPDATE;
    }
    let ref_changed = match (&old_ref, &node_ref) {
        (Some(a), Some(b)) => !a.ptr_eq(b),
        (None, None) => false,
        _ => true,
    };
    if ref_changed {
        flags |= VNodeFlags::REF;
    }
    arena::with_mut(id, |n| {
        n.pending_props = changes;
        n.flags |= flags;
    });
}

fn complete_text(pass: &mut BuildPass, id: VNodeId) {
    let Some((created, real, text, old_text)) = arena::with(id, |n| {
        let old_text = match n.old_element.as_ref().map(|e| &e.kind) {
            Some(ElementKind::Text(t)) => Some(t.clone()),
            _ => None,
        };
        (n.is_created, n.real_node, n.text(), old_text)
    }) else {
        return;
    };
    let text = text.unwrap_or_default();
    if created {
        if real.is_none() {
            let dom = pass.host.borrow_mut().dom().create_text_node(&text);
            pass.created_hosts.push((dom, id));
            arena::with_mut(id, |n| n.real_node = Some(dom));
        }
        return;
    }
    if old_text.as_deref() != Some(&*text) {
        arena::with_mut(id, |n| {
            n.pending_text = Some(text);
            n.flags |= VNodeFlags::UPDATE;
        });
    }
}

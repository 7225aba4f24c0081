//! Capture - The downward half of a pass.
//!
//! Renders the node if it has work and reconciles its children. Nodes
//! without work of their own bail out: they descend only when something
//! below is dirty, otherwise the whole subtree is skipped.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use super::context::Frame;
use super::diff::reconcile_children;
use super::{BuildPass, Failure};
use crate::component::{ClassCtx, ClassType, Component, Updater};
use crate::element::{Element, ElementKind, ElementType, Props};
use crate::error::{ComponentError, Interrupt};
use crate::hooks::RenderCtx;
use crate::reactive::observer::panic_message;
use crate::reactive::{Tracker, is_same};
use crate::scheduler;
use crate::vnode::{self, VNodeFlags, VNodeId, VNodeTag, arena, merge_state, process_updates};

/// Key given to a Suspense fallback so it never reuses a primary child.
const FALLBACK_KEY: &str = "\u{0}suspense-fallback";

type Step = Result<Option<VNodeId>, Interrupt>;

/// Capture `id`; the next node to work on, or `None` to complete it.
pub(crate) fn capture(pass: &mut BuildPass, id: VNodeId) -> Result<Option<VNodeId>, Failure> {
    let Some((tag, has_work, child_dirty, child)) =
        arena::with(id, |n| (n.tag, n.has_work(), n.child_should_update, n.child))
    else {
        return Ok(None);
    };
    pass.record_entry(id);
    push_frames(pass, id, tag);

    if !has_work {
        if !child_dirty {
            return Ok(None);
        }
        pass.touch(id);
        arena::with_mut(id, |n| n.child_should_update = false);
        return Ok(child);
    }

    pass.touch(id);
    arena::with_mut(id, |n| {
        n.should_update = false;
        n.child_should_update = false;
    });
    pass.worked.insert(id);

    let Some(element) = arena::with(id, |n| n.element.clone()) else {
        return Ok(None);
    };
    let step = match (tag, &element.kind) {
        (VNodeTag::TreeRoot, _) => Ok(reconcile_children(pass, id, vec![element.clone()])),
        (VNodeTag::Host, ElementKind::Host { props, .. }) => Ok(capture_host(pass, id, props)),
        (VNodeTag::Text, _) => Ok(None),
        (VNodeTag::Fragment, ElementKind::Fragment(children))
        | (VNodeTag::Portal, ElementKind::Portal { children, .. }) => {
            Ok(reconcile_children(pass, id, children.to_vec()))
        }
        (VNodeTag::Function, ElementKind::Component { component, props })
        | (VNodeTag::Memo, ElementKind::Memo { component, props, .. }) => {
            render_function(pass, id, component, props)
        }
        (VNodeTag::Lazy, ElementKind::Lazy { lazy, props }) => match lazy.load() {
            Ok(component) => render_function(pass, id, &component, props),
            Err(interrupt) => Err(interrupt),
        },
        (VNodeTag::Class, ElementKind::Class { class, props }) => {
            capture_class(pass, id, class, props, child_dirty.then_some(child).flatten())
        }
        (VNodeTag::Provider, ElementKind::Provider { context, value, children }) => {
            capture_provider(pass, id, context.id(), value, children)
        }
        (VNodeTag::Consumer, ElementKind::Consumer { context, render }) => {
            let value = pass
                .contexts
                .lookup(context.id())
                .unwrap_or_else(|| context.default_value().clone());
            arena::with_mut(id, |n| {
                n.context_deps = vec![context.id()];
                n.context_value = value.clone();
            });
            pass.journal.rendered.push(id);
            let tracker = tracker_for(pass, id);
            guarded(|| Ok(tracker.run(|| render(&value))))
                .map(|child| reconcile_children(pass, id, vec![child]))
        }
        (VNodeTag::Suspense, ElementKind::Suspense { fallback, children }) => {
            Ok(capture_suspense(pass, id, fallback, children))
        }
        _ => Ok(None),
    };
    step.map_err(|interrupt| Failure { node: id, interrupt })
}

/// Frames this node contributes to its subtree. Pushed even when the node
/// bails out; bubble pops them.
fn push_frames(pass: &mut BuildPass, id: VNodeId, tag: VNodeTag) {
    let frame = arena::with(id, |n| match &n.element.kind {
        ElementKind::Host { tag, .. } => Some(Frame::Namespace(
            pass.contexts.namespace().child_namespace(tag),
        )),
        ElementKind::Portal { container, .. } => Some(Frame::Portal(*container)),
        ElementKind::Provider { context, value, .. } => Some(Frame::Provider {
            context: context.id(),
            value: value.clone(),
        }),
        _ => None,
    })
    .flatten();
    if tag == VNodeTag::Host {
        let current = pass.contexts.namespace();
        arena::with_mut(id, |n| {
            if let ElementKind::Host { tag, .. } = &n.element.kind {
                if n.is_created {
                    n.namespace = current.element_namespace(tag);
                }
            }
        });
        match frame {
            Some(Frame::Namespace(ns)) if ns != current => pass.contexts.push(id, Frame::Namespace(ns)),
            _ => {}
        }
        return;
    }
    if let Some(frame) = frame {
        pass.contexts.push(id, frame);
    }
}

/// Run user code, turning a panic into a component error.
fn guarded<R>(f: impl FnOnce() -> Result<R, Interrupt>) -> Result<R, Interrupt> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ComponentError::Panicked(panic_message(payload.as_ref())).into()),
    }
}

/// The node's render tracker, created on first render.
fn tracker_for(pass: &BuildPass, id: VNodeId) -> Rc<Tracker> {
    if let Some(Some(tracker)) = arena::with(id, |n| n.tracker.clone()) {
        return tracker;
    }
    let root = pass.root;
    let tracker = Tracker::new("render", move || scheduler::invalidate(root, id));
    arena::with_mut(id, |n| n.tracker = Some(tracker.clone()));
    tracker
}

// =============================================================================
// Per-tag capture
// =============================================================================

fn capture_host(pass: &mut BuildPass, id: VNodeId, props: &Props) -> Option<VNodeId> {
    let direct_text = match props.children() {
        [only] => match &only.kind {
            ElementKind::Text(text) => Some(text.clone()),
            _ => None,
        },
        _ => None,
    };
    if let Some(text) = direct_text {
        reconcile_children(pass, id, Vec::new());
        arena::with_mut(id, |n| n.direct_text = Some(text));
        return None;
    }
    arena::with_mut(id, |n| n.direct_text = None);
    reconcile_children(pass, id, props.children().to_vec())
}

fn render_function(pass: &mut BuildPass, id: VNodeId, component: &Component, props: &Props) -> Step {
    let Some((slots, first)) = arena::with(id, |n| (n.hooks.clone(), n.is_created && n.hooks.is_empty())) else {
        return Ok(None);
    };
    let tracker = tracker_for(pass, id);
    pass.journal.rendered.push(id);
    let render = component.render_fn();
    let mut ctx = RenderCtx::new(id, pass.root, slots, first, &pass.contexts);
    let element = guarded(|| tracker.run(|| render(&mut ctx, props)))?;
    let output = ctx.finish()?;
    arena::with_mut(id, |n| {
        n.hooks = output.slots;
        n.context_deps = output.context_deps;
        if output.has_effects {
            n.flags |= VNodeFlags::EFFECT;
        }
    });
    Ok(reconcile_children(pass, id, vec![element]))
}

fn capture_class(
    pass: &mut BuildPass,
    id: VNodeId,
    class: &ClassType,
    props: &Props,
    bailout_child: Option<VNodeId>,
) -> Step {
    let Some((instance, created, flags)) = arena::with(id, |n| (n.instance.clone(), n.is_created, n.flags)) else {
        return Ok(None);
    };
    let instance = match instance {
        Some(instance) => instance,
        None => {
            let instance = guarded(|| Ok(class.construct(props)))?;
            let initial = guarded(|| Ok(instance.initial_state(props)))?;
            arena::with_mut(id, |n| {
                n.instance = Some(instance.clone());
                n.old_state = initial.clone();
                n.state = initial;
            });
            instance
        }
    };

    let (base, updates) = arena::with(id, |n| (n.old_state.clone(), n.updates.iter().cloned().collect::<Vec<_>>()))
        .unwrap_or_default();
    let folded = guarded(|| Ok(process_updates(&base, props, &updates)))?;
    let mut state = folded.state;
    for error in &folded.captured {
        let partial = guarded(|| Ok(instance.derive_state_from_error(error)))?;
        state = merge_state(&state, &partial);
    }
    let caught = !folded.captured.is_empty();
    let forced = folded.force || flags.contains(VNodeFlags::FORCE_UPDATE);
    let render = created || forced || caught || guarded(|| Ok(instance.should_component_update(props, &state)))?;

    arena::with_mut(id, |n| {
        n.state = state.clone();
        n.consumed_updates = updates.len();
        n.callbacks = folded.callbacks;
        if caught {
            n.flags.insert(VNodeFlags::DID_CAPTURE);
            n.flags.remove(VNodeFlags::SHOULD_CAPTURE);
            n.caught = folded.captured;
        }
        if created || render || caught || !n.callbacks.is_empty() {
            n.flags |= VNodeFlags::CALLBACK;
        }
    });
    if !render {
        return Ok(bailout_child);
    }

    pass.journal.rendered.push(id);
    let tracker = tracker_for(pass, id);
    let updater = Updater::new(pass.root, id);
    let element = guarded(|| {
        tracker.run(|| {
            instance.render(&ClassCtx {
                props,
                state: &state,
                updater: &updater,
            })
        })
    })?;
    Ok(reconcile_children(pass, id, vec![element]))
}

fn capture_provider(
    pass: &mut BuildPass,
    id: VNodeId,
    context: u64,
    value: &crate::reactive::Value,
    children: &Rc<Vec<Element>>,
) -> Step {
    let Some((created, previous)) = arena::with(id, |n| (n.is_created, n.context_value.clone())) else {
        return Ok(None);
    };
    if !created && !is_same(&previous, value) {
        propagate_context_change(pass, id, context);
    }
    arena::with_mut(id, |n| n.context_value = value.clone());
    Ok(reconcile_children(pass, id, children.to_vec()))
}

/// Mark every reader of `context` below `provider` for re-render.
/// Nested providers of the same context shadow their subtree.
fn propagate_context_change(pass: &mut BuildPass, provider: VNodeId, context: u64) {
    let mut stack = vnode::children(provider);
    while let Some(node) = stack.pop() {
        let Some((reads, shadows)) = arena::with(node, |n| {
            (
                n.context_deps.contains(&context),
                n.element_type == ElementType::Provider(context),
            )
        }) else {
            continue;
        };
        if shadows {
            continue;
        }
        if reads {
            pass.touch(node);
            arena::with_mut(node, |n| n.should_update = true);
            let mut up = vnode::parent(node);
            while let Some(ancestor) = up {
                if ancestor == provider {
                    break;
                }
                pass.touch(ancestor);
                arena::with_mut(ancestor, |n| n.child_should_update = true);
                up = vnode::parent(ancestor);
            }
        }
        stack.extend(vnode::children(node));
    }
}

fn capture_suspense(
    pass: &mut BuildPass,
    id: VNodeId,
    fallback: &Rc<Element>,
    children: &Rc<Vec<Element>>,
) -> Option<VNodeId> {
    let showing_fallback = arena::with_mut(id, |n| {
        n.suspended.retain(|handle| !handle.is_resolved());
        let showing = !n.suspended.is_empty();
        n.flags.set(VNodeFlags::DID_SUSPEND, showing);
        showing
    })
    .unwrap_or(false);
    let elements = if showing_fallback {
        vec![fallback.as_ref().clone().with_key(FALLBACK_KEY)]
    } else {
        children.to_vec()
    };
    reconcile_children(pass, id, elements)
}

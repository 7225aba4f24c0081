//! Recovery - Error boundaries and Suspense.
//!
//! A failed or suspended render is handled at the nearest boundary above
//! it: the boundary's children are discarded, contexts unwind to where the
//! boundary was entered and the boundary is captured again.
//!
//! - `Failed` queues an error update on the nearest class with
//!   `is_error_boundary()` that has not caught yet in this pass. A boundary
//!   whose error state fails again passes the error upward.
//! - `Pending` records the handle on the nearest Suspense node, which then
//!   renders its fallback. Resolving the last handle schedules a rebuild.

use ahash::AHashSet;
use tracing::{debug, warn};

use super::diff::delete_child;
use super::{BuildPass, Failure};
use crate::error::{BuildError, Interrupt};
use crate::root::RootId;
use crate::scheduler::{self, ScheduleMode};
use crate::vnode::{self, Update, VNodeFlags, VNodeId, VNodeTag, arena};

/// Handle `failure`; the node to capture next.
pub(crate) fn recover(pass: &mut BuildPass, failure: Failure) -> Result<VNodeId, BuildError> {
    let Failure { node, interrupt } = failure;
    let component = arena::with(node, |n| n.name()).unwrap_or_default();
    match interrupt {
        Interrupt::Pending(handle) => {
            let Some(boundary) = vnode::find_ancestor(node, |n| n.tag == VNodeTag::Suspense) else {
                return Err(BuildError::UncaughtSuspense { component });
            };
            debug!(component = %component, handle = handle.label(), "render suspended");
            pass.touch(boundary);
            let added = arena::with_mut(boundary, |n| {
                n.should_update = true;
                n.flags |= VNodeFlags::DID_SUSPEND;
                if n.suspended.contains(&handle) {
                    false
                } else {
                    n.suspended.push(handle.clone());
                    true
                }
            })
            .unwrap_or(false);
            if added {
                let root = pass.root;
                let id = handle.id();
                handle.on_resolve(move || wake_boundary(root, boundary, id));
            }
            Ok(resume_at(pass, boundary))
        }
        Interrupt::Failed(error) => {
            let Some(boundary) = find_error_boundary(pass, node) else {
                return Err(BuildError::Uncaught {
                    component,
                    source: error,
                });
            };
            warn!(component = %component, %error, "render failed; recovering at error boundary");
            pass.recovered.insert(boundary);
            pass.touch(boundary);
            arena::with_mut(boundary, |n| {
                n.updates.push_back(Update::error(error));
                n.should_update = true;
                n.flags |= VNodeFlags::SHOULD_CAPTURE;
            });
            Ok(resume_at(pass, boundary))
        }
    }
}

fn find_error_boundary(pass: &BuildPass, failed: VNodeId) -> Option<VNodeId> {
    let mut current = vnode::parent(failed);
    while let Some(id) = current {
        let instance = arena::with(id, |n| match n.tag {
            VNodeTag::Class => n.instance.clone(),
            _ => None,
        })
        .flatten();
        if let Some(instance) = instance {
            if !pass.recovered.contains(&id) && instance.is_error_boundary() {
                return Some(id);
            }
        }
        current = vnode::parent(id);
    }
    None
}

/// Throw away the work below `boundary` and make it the next unit.
fn resume_at(pass: &mut BuildPass, boundary: VNodeId) -> VNodeId {
    pass.contexts.unwind_to(pass.entry_depth(boundary));
    let children = vnode::children(boundary);
    let doomed: AHashSet<VNodeId> = children.iter().flat_map(|c| vnode::subtree(*c)).collect();
    pass.effects.retain(|id| !doomed.contains(id));
    pass.created_hosts.retain(|(_, id)| !doomed.contains(id));
    for child in children {
        delete_child(pass, boundary, child);
    }
    arena::with_mut(boundary, |n| n.child = None);
    boundary
}

/// `on_resolve` callback of a suspending handle. Stale boundaries and
/// handles it no longer waits on are ignored.
pub(crate) fn wake_boundary(root: RootId, boundary: VNodeId, handle: u64) {
    let emptied = arena::with_mut(boundary, |n| {
        let before = n.suspended.len();
        n.suspended.retain(|h| h.id() != handle && !h.is_resolved());
        before > 0 && n.suspended.is_empty()
    });
    if emptied == Some(true) {
        debug!(?boundary, "suspense resolved");
        scheduler::invalidate_in(root, boundary, ScheduleMode::Async);
    }
}

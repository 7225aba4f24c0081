//! Builder - One reconciliation pass over a root's VNode tree.
//!
//! A pass walks the tree depth first:
//! - **capture** (on the way down) renders components and reconciles their
//!   children, creating, reusing or deleting VNodes
//! - **bubble** (on the way up) creates detached host nodes for new
//!   elements, diffs host props, and appends nodes with pending side effects
//!   to the effect list, children before parents
//!
//! Nothing visible changes until [`commit`](crate::commit) applies the
//! effect list. A pass can stop after a budget of nodes ([`PassOutcome::Yielded`])
//! and resume later, or be aborted: every node it touched was snapshotted in
//! its journal on first touch, so [`BuildPass::abort`] puts the tree back
//! and frees what the pass created.
//!
//! Errors and suspensions do not abort: the pass discards the work below the
//! nearest error boundary / Suspense node, unwinds contexts to that node and
//! captures it again (see [`recover`]).

pub(crate) mod bubble;
pub(crate) mod capture;
pub mod context;
pub(crate) mod diff;
pub(crate) mod recover;

use ahash::{AHashMap, AHashSet};
use std::rc::Rc;
use tracing::trace;

use crate::dom::{DomNode, SharedHost};
use crate::error::BuildError;
use crate::root::RootId;
use crate::scheduler::ScheduleMode;
use crate::vnode::{self, UpdateKind, VNode, VNodeId, arena};
use context::ContextStack;

/// Result of [`BuildPass::run`].
#[derive(Debug)]
pub(crate) enum PassOutcome {
    /// Every node was visited; the pass is ready to commit.
    Complete,
    /// The slice budget ran out; call `run` again to continue.
    Yielded,
    /// Unrecoverable; the caller must [`abort`](BuildPass::abort).
    Failed(BuildError),
}

/// Pre-pass snapshots of every node a pass modified.
#[derive(Default)]
pub(crate) struct Journal {
    snapshots: Vec<(VNodeId, VNode)>,
    touched: AHashSet<VNodeId>,
    pub(crate) created: Vec<VNodeId>,
    created_set: AHashSet<VNodeId>,
    /// Nodes whose render ran (their trackers were re-recorded).
    pub(crate) rendered: Vec<VNodeId>,
}

impl Journal {
    /// Ids of touched and created nodes, in first-touch order.
    pub(crate) fn nodes(&self) -> impl Iterator<Item = VNodeId> + '_ {
        self.snapshots.iter().map(|(id, _)| *id).chain(self.created.iter().copied())
    }
}

pub(crate) struct BuildPass {
    pub(crate) root: RootId,
    pub(crate) root_node: VNodeId,
    pub(crate) mode: ScheduleMode,
    pub(crate) host: SharedHost,
    work: Option<VNodeId>,
    pub(crate) contexts: ContextStack,
    pub(crate) journal: Journal,
    entry_depth: AHashMap<VNodeId, usize>,
    /// Nodes captured with work this pass (bubble does host work for them).
    pub(crate) worked: AHashSet<VNodeId>,
    pub(crate) effects: Vec<VNodeId>,
    /// Boundaries that already caught an error this pass.
    pub(crate) recovered: AHashSet<VNodeId>,
    /// Host nodes created this pass, registered for event lookup on commit.
    pub(crate) created_hosts: Vec<(DomNode, VNodeId)>,
    /// Event types host props listen to.
    pub(crate) events: AHashSet<(Rc<str>, bool)>,
    pub(crate) units: usize,
}

impl BuildPass {
    pub(crate) fn new(root: RootId, root_node: VNodeId, mode: ScheduleMode, host: SharedHost) -> Self {
        Self {
            root,
            root_node,
            mode,
            host,
            work: Some(root_node),
            contexts: ContextStack::default(),
            journal: Journal::default(),
            entry_depth: AHashMap::new(),
            worked: AHashSet::new(),
            effects: Vec::new(),
            recovered: AHashSet::new(),
            created_hosts: Vec::new(),
            events: AHashSet::new(),
            units: 0,
        }
    }

    /// Work until done, failed, or `budget` nodes were captured.
    pub(crate) fn run(&mut self, budget: Option<usize>) -> PassOutcome {
        let mut slice = 0;
        while let Some(id) = self.work {
            if budget.is_some_and(|b| slice >= b) {
                trace!(units = self.units, "build pass yielding");
                return PassOutcome::Yielded;
            }
            slice += 1;
            self.units += 1;
            self.work = match capture::capture(self, id) {
                Ok(Some(child)) => Some(child),
                Ok(None) => self.complete(id),
                Err(failure) => match recover::recover(self, failure) {
                    Ok(resume) => Some(resume),
                    Err(err) => return PassOutcome::Failed(err),
                },
            };
        }
        PassOutcome::Complete
    }

    /// Bubble `id` and its finished ancestors; the next node to capture.
    fn complete(&mut self, id: VNodeId) -> Option<VNodeId> {
        let mut current = id;
        loop {
            bubble::bubble(self, current);
            if current == self.root_node {
                return None;
            }
            let (sibling, parent) = arena::with(current, |n| (n.sibling, n.parent))?;
            if sibling.is_some() {
                return sibling;
            }
            current = parent?;
        }
    }

    // =========================================================================
    // Journal
    // =========================================================================

    /// Snapshot `id` before its first modification in this pass.
    pub(crate) fn touch(&mut self, id: VNodeId) {
        if self.journal.created_set.contains(&id) || !self.journal.touched.insert(id) {
            return;
        }
        if let Some(snapshot) = arena::get(id) {
            self.journal.snapshots.push((id, snapshot));
        }
    }

    pub(crate) fn alloc(&mut self, node: VNode) -> VNodeId {
        let id = arena::alloc(node);
        self.journal.created.push(id);
        self.journal.created_set.insert(id);
        id
    }

    pub(crate) fn created_here(&self, id: VNodeId) -> bool {
        self.journal.created_set.contains(&id)
    }

    pub(crate) fn record_entry(&mut self, id: VNodeId) {
        self.entry_depth.insert(id, self.contexts.depth());
    }

    pub(crate) fn entry_depth(&self, id: VNodeId) -> usize {
        self.entry_depth.get(&id).copied().unwrap_or(0)
    }

    /// Free a subtree created by this pass. Nothing of it was committed.
    pub(crate) fn discard(&mut self, id: VNodeId) {
        for node in vnode::subtree(id) {
            if let Some(Some(tracker)) = arena::with(node, |n| n.tracker.clone()) {
                tracker.dispose();
            }
            arena::free(node);
        }
    }

    /// Put the tree back as it was before this pass.
    ///
    /// Updates queued while the pass ran are kept, except the errors
    /// recovery queued on boundaries. Nodes whose render ran are
    /// marked dirty: their trackers now hold the aborted render's reads.
    pub(crate) fn abort(mut self) {
        self.contexts.unwind_to(0);
        let rendered: Vec<VNodeId> = self
            .journal
            .rendered
            .iter()
            .copied()
            .filter(|id| !self.journal.created_set.contains(id))
            .collect();
        for (id, mut snapshot) in self.journal.snapshots.drain(..).rev() {
            if let Some(updates) = arena::with(id, |n| n.updates.clone()) {
                snapshot.updates = updates
                    .into_iter()
                    .filter(|u| u.kind != UpdateKind::Error)
                    .collect();
            }
            arena::replace(id, snapshot);
        }
        for id in self.journal.created.drain(..).rev() {
            if let Some(Some(tracker)) = arena::with(id, |n| n.tracker.clone()) {
                tracker.dispose();
            }
            arena::free(id);
        }
        for id in rendered {
            vnode::mark_dirty(id);
        }
    }
}

impl std::fmt::Debug for BuildPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildPass")
            .field("root", &self.root)
            .field("mode", &self.mode)
            .field("work", &self.work)
            .field("units", &self.units)
            .field("contexts", &self.contexts.depth())
            .finish()
    }
}

/// Failure raised while capturing `node`.
#[derive(Debug)]
pub(crate) struct Failure {
    pub node: VNodeId,
    pub interrupt: crate::error::Interrupt,
}

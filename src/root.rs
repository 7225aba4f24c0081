//! Root - A container the runtime renders into.
//!
//! Each root owns its adapter, a tree-root VNode and at most one in-flight
//! build. Sync builds loop until the tree is clean (bounded by
//! `max_nested_builds`); async builds run in slices from the scheduler's
//! task queue and keep their pass here between slices.
//!
//! # Example
//!
//! ```ignore
//! let dom = MemoryDom::new();
//! let container = dom.create_container("div");
//! let root = create_root(dom.clone(), container);
//! root.render(h("p", Props::new(), [text("hello")]))?;
//! assert_eq!(dom.inner_html(container), "<p>hello</p>");
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::AHashMap;
use tracing::{debug, error, warn};

use crate::builder::{BuildPass, PassOutcome};
use crate::commit;
use crate::config::runtime_config;
use crate::devtools;
use crate::dom::{DomAdapter, DomNode, Host, SharedHost};
use crate::element::{Element, empty};
use crate::error::{BuildError, Result};
use crate::event::{self, DispatchOutcome};
use crate::reactive::{Value, reset_proxies};
use crate::scheduler::{self, ScheduleMode};
use crate::vnode::{self, VNode, VNodeId, arena};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId(pub(crate) usize);

/// Build counters for one root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RootStats {
    /// Passes started.
    pub builds: usize,
    pub commits: usize,
    pub aborted: usize,
    /// Times an async pass yielded between slices.
    pub yields: usize,
    /// Adapter calls made for this root.
    pub host_operations: usize,
}

struct RootRecord {
    host: SharedHost,
    root_node: VNodeId,
    in_flight: Option<BuildPass>,
    async_scheduled: bool,
    building: bool,
    /// Consecutive async commits that left the tree dirty.
    async_chain: usize,
    /// Nodes marked dirty while a pass was running; re-marked on abort.
    marks: Vec<VNodeId>,
    stats: RootStats,
    last_error: Option<BuildError>,
}

thread_local! {
    static ROOTS: RefCell<AHashMap<usize, RootRecord>> = RefCell::new(AHashMap::new());
    static NEXT_ROOT: Cell<usize> = const { Cell::new(1) };
}

fn with_record<R>(root: RootId, f: impl FnOnce(&mut RootRecord) -> R) -> Option<R> {
    ROOTS.with(|roots| roots.borrow_mut().get_mut(&root.0).map(f))
}

// =============================================================================
// Public handle
// =============================================================================

/// Handle to a mounted root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Root {
    id: RootId,
}

/// Create a root rendering into `container` through `adapter`.
pub fn create_root(adapter: impl DomAdapter + 'static, container: DomNode) -> Root {
    let id = RootId(NEXT_ROOT.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    }));
    let root_node = arena::alloc(VNode::tree_root(id, container));
    let record = RootRecord {
        host: Rc::new(RefCell::new(Host::new(Box::new(adapter), container))),
        root_node,
        in_flight: None,
        async_scheduled: false,
        building: false,
        async_chain: 0,
        marks: Vec::new(),
        stats: RootStats::default(),
        last_error: None,
    };
    ROOTS.with(|roots| roots.borrow_mut().insert(id.0, record));
    debug!(root = id.0, ?container, "root created");
    Root { id }
}

impl Root {
    pub fn id(&self) -> RootId {
        self.id
    }

    pub fn is_mounted(&self) -> bool {
        with_record(self.id, |_| ()).is_some()
    }

    pub fn container(&self) -> Result<DomNode> {
        with_record(self.id, |r| r.host.borrow().container).ok_or(BuildError::UnknownRoot(self.id.0))
    }

    /// Render `element` and commit before returning.
    pub fn render(&self, element: Element) -> Result<()> {
        self.render_with(element, ScheduleMode::Sync)
    }

    /// Render `element` in `mode`. An in-flight async build is aborted first.
    pub fn render_with(&self, element: Element, mode: ScheduleMode) -> Result<()> {
        let (root_node, in_flight) = with_record(self.id, |r| (r.root_node, r.in_flight.take()))
            .ok_or(BuildError::UnknownRoot(self.id.0))?;
        if let Some(pass) = in_flight {
            abort_pass(self.id, pass);
        }
        arena::with_mut(root_node, |n| n.element = element).ok_or(BuildError::MissingNode(root_node))?;
        vnode::mark_dirty(root_node);
        note_mark(self.id, root_node);
        match mode {
            ScheduleMode::Sync => flush_root(self.id),
            ScheduleMode::Async => {
                schedule_async(self.id);
                Ok(())
            }
        }
    }

    /// Finish pending work now: abort any in-flight slice and build
    /// synchronously until clean.
    pub fn flush(&self) -> Result<()> {
        flush_root(self.id)
    }

    /// Render nothing, remove the container listeners and forget the root.
    pub fn unmount(self) -> Result<()> {
        self.render(empty())?;
        let record = ROOTS.with(|roots| roots.borrow_mut().remove(&self.id.0));
        if let Some(record) = record {
            record.host.borrow_mut().unlisten_all();
            arena::free(record.root_node);
        }
        debug!(root = self.id.0, "root unmounted");
        Ok(())
    }

    /// Dispatch a synthetic event at `target` (capture, then bubble).
    pub fn dispatch_event(&self, target: DomNode, name: &str, detail: impl Into<Value>) -> Result<DispatchOutcome> {
        event::dispatch(self.id, target, name, detail.into())
    }

    pub fn stats(&self) -> RootStats {
        stats(self.id)
    }

    /// Error of the last scheduled build that failed, if not taken yet.
    pub fn take_error(&self) -> Option<BuildError> {
        take_error(self.id)
    }
}

// =============================================================================
// Crate-internal access
// =============================================================================

pub(crate) fn host_of(root: RootId) -> Option<SharedHost> {
    with_record(root, |r| r.host.clone())
}

pub(crate) fn stats(root: RootId) -> RootStats {
    with_record(root, |r| RootStats {
        host_operations: r.host.borrow().operations,
        ..r.stats
    })
    .unwrap_or_default()
}

pub(crate) fn store_error(root: RootId, err: BuildError) {
    with_record(root, |r| r.last_error = Some(err));
}

pub(crate) fn take_error(root: RootId) -> Option<BuildError> {
    with_record(root, |r| r.last_error.take()).flatten()
}

/// Remember a dirty mark made while a pass is running.
pub(crate) fn note_mark(root: RootId, node: VNodeId) {
    with_record(root, |r| {
        if r.building || r.in_flight.is_some() {
            r.marks.push(node);
        }
    });
}

fn needs_build(root: RootId) -> bool {
    with_record(root, |r| r.root_node)
        .and_then(|node| arena::with(node, |n| n.should_update || n.child_should_update))
        .unwrap_or(false)
}

// =============================================================================
// Passes
// =============================================================================

fn begin_pass(root: RootId, mode: ScheduleMode) -> Result<BuildPass> {
    let (host, root_node) = with_record(root, |r| {
        r.stats.builds += 1;
        r.marks.clear();
        (r.host.clone(), r.root_node)
    })
    .ok_or(BuildError::UnknownRoot(root.0))?;
    debug!(root = root.0, ?mode, "build started");
    devtools::emit("build", || format!("root {} {mode:?}", root.0));
    Ok(BuildPass::new(root, root_node, mode, host))
}

fn finish_pass(root: RootId, pass: BuildPass) {
    let units = pass.units;
    let summary = commit::commit(pass);
    with_record(root, |r| {
        r.stats.commits += 1;
        r.marks.clear();
    });
    debug!(root = root.0, units, effects = summary.effects, host_ops = summary.host_operations, "build committed");
}

fn abort_pass(root: RootId, pass: BuildPass) {
    let marks = with_record(root, |r| {
        r.stats.aborted += 1;
        std::mem::take(&mut r.marks)
    })
    .unwrap_or_default();
    debug!(root = root.0, units = pass.units, "build aborted");
    pass.abort();
    for node in marks {
        vnode::mark_dirty(node);
    }
}

/// Build synchronously until the tree is clean.
pub(crate) fn flush_root(root: RootId) -> Result<()> {
    let claimed = with_record(root, |r| {
        if r.building {
            return None;
        }
        r.building = true;
        Some(r.in_flight.take())
    })
    .ok_or(BuildError::UnknownRoot(root.0))?;
    // Already building: the running loop picks the new work up.
    let Some(in_flight) = claimed else {
        return Ok(());
    };
    if let Some(pass) = in_flight {
        abort_pass(root, pass);
    }
    let result = build_until_clean(root);
    with_record(root, |r| r.building = false);
    result
}

fn build_until_clean(root: RootId) -> Result<()> {
    let max = runtime_config().max_nested_builds;
    let mut passes = 0;
    while needs_build(root) {
        passes += 1;
        if passes > max {
            error!(root = root.0, passes = max, "update loop detected");
            return Err(BuildError::UpdateLoop { passes: max });
        }
        let mut pass = begin_pass(root, ScheduleMode::Sync)?;
        match pass.run(None) {
            PassOutcome::Complete => finish_pass(root, pass),
            PassOutcome::Yielded => {
                with_record(root, |r| r.in_flight = Some(pass));
                return Ok(());
            }
            PassOutcome::Failed(err) => {
                abort_pass(root, pass);
                warn!(root = root.0, %err, "build failed; keeping last committed tree");
                return Err(err);
            }
        }
    }
    Ok(())
}

/// Queue one async slice for `root` unless one is queued already.
pub(crate) fn schedule_async(root: RootId) {
    let queue = with_record(root, |r| !std::mem::replace(&mut r.async_scheduled, true)).unwrap_or(false);
    if queue {
        scheduler::defer(move || async_step(root));
    }
}

fn async_step(root: RootId) {
    let claimed = with_record(root, |r| {
        r.async_scheduled = false;
        if r.building {
            return None;
        }
        r.building = true;
        Some(r.in_flight.take())
    })
    .flatten();
    let Some(in_flight) = claimed else {
        return;
    };
    let release = || {
        with_record(root, |r| r.building = false);
    };

    let mut pass = match in_flight {
        Some(pass) => pass,
        None if !needs_build(root) => {
            release();
            return;
        }
        None => match begin_pass(root, ScheduleMode::Async) {
            Ok(pass) => pass,
            Err(err) => {
                release();
                store_error(root, err);
                return;
            }
        },
    };

    let config = runtime_config();
    match pass.run(Some(config.slice_budget)) {
        PassOutcome::Yielded => {
            with_record(root, |r| {
                r.in_flight = Some(pass);
                r.stats.yields += 1;
                r.building = false;
            });
            schedule_async(root);
        }
        PassOutcome::Complete => {
            finish_pass(root, pass);
            let chain = with_record(root, |r| {
                r.building = false;
                r.async_chain += 1;
                r.async_chain
            })
            .unwrap_or(0);
            if !needs_build(root) {
                with_record(root, |r| r.async_chain = 0);
            } else if chain > config.max_nested_builds {
                error!(root = root.0, passes = config.max_nested_builds, "update loop detected");
                with_record(root, |r| r.async_chain = 0);
                store_error(root, BuildError::UpdateLoop {
                    passes: config.max_nested_builds,
                });
            } else {
                schedule_async(root);
            }
        }
        PassOutcome::Failed(err) => {
            abort_pass(root, pass);
            with_record(root, |r| {
                r.building = false;
                r.async_chain = 0;
            });
            error!(root = root.0, %err, "async build failed; keeping last committed tree");
            store_error(root, err);
        }
    }
}

// =============================================================================
// Reset
// =============================================================================

/// Drop every root, queued task, VNode and proxy of this thread.
pub fn reset_runtime() {
    let records = ROOTS.with(|roots| std::mem::take(&mut *roots.borrow_mut()));
    drop(records);
    scheduler::reset_scheduler();
    arena::reset_arena();
    reset_proxies();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDom;
    use crate::element::{Props, h, text};

    #[test]
    fn test_render_and_unmount() {
        let dom = MemoryDom::new();
        let container = dom.create_container("div");
        let root = create_root(dom.clone(), container);
        root.render(h("p", Props::new(), [text("hi")])).unwrap();
        assert_eq!(dom.inner_html(container), "<p>hi</p>");
        assert_eq!(root.stats().commits, 1);

        root.unmount().unwrap();
        assert_eq!(dom.inner_html(container), "");
        assert!(!root.is_mounted());
    }

    #[test]
    fn test_async_render_waits_for_queue() {
        let dom = MemoryDom::new();
        let container = dom.create_container("div");
        let root = create_root(dom.clone(), container);
        root.render_with(text("later"), ScheduleMode::Async).unwrap();
        assert_eq!(dom.inner_html(container), "");
        scheduler::run_deferred();
        assert_eq!(dom.inner_html(container), "later");
    }

    #[test]
    fn test_unknown_root_errors() {
        let root = Root { id: RootId(usize::MAX) };
        assert!(matches!(root.render(empty()), Err(BuildError::UnknownRoot(_))));
    }
}

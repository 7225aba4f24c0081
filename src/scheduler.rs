//! Scheduler - When builds run.
//!
//! Two modes:
//! - **Sync**: build and commit before returning to the caller
//! - **Async**: queue a task; the build runs from the task queue in slices
//!   of [`RuntimeConfig::slice_budget`](crate::config::RuntimeConfig) nodes,
//!   yielding between slices
//!
//! Inside [`batch`] (event dispatch, commit lifecycles) every build request
//! is recorded instead and the affected roots are flushed synchronously
//! when the outermost batch ends.
//!
//! The task queue is driven by the embedder: [`tick`] runs one task,
//! [`run_deferred`] drains it.
//!
//! # Example
//!
//! ```ignore
//! set_runtime_config(RuntimeConfig { default_mode: ScheduleMode::Async, ..Default::default() });
//! state.set("count", 1)?;     // queues an async build
//! run_deferred();             // builds and commits
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use tracing::{error, trace};

use crate::config::runtime_config;
use crate::reactive::observer::isolate;
use crate::root::{self, RootId};
use crate::vnode::{self, Update, VNodeId, arena};

/// How a build runs once requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    Sync,
    Async,
}

type Task = Box<dyn FnOnce()>;

thread_local! {
    static BATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
    /// Roots that asked for a build during the current batch, in order.
    static BATCHED: RefCell<Vec<RootId>> = const { RefCell::new(Vec::new()) };
    static TASKS: RefCell<VecDeque<Task>> = const { RefCell::new(VecDeque::new()) };
}

// =============================================================================
// Batching
// =============================================================================

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let depth = BATCH_DEPTH.with(|d| {
            let depth = d.get() - 1;
            d.set(depth);
            depth
        });
        if depth == 0 {
            flush_batched();
        }
    }
}

/// Run `f` with build requests held until it returns, then flush the
/// affected roots synchronously.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    BATCH_DEPTH.with(|d| d.set(d.get() + 1));
    let _guard = BatchGuard;
    f()
}

pub fn is_batching() -> bool {
    BATCH_DEPTH.with(Cell::get) > 0
}

fn flush_batched() {
    loop {
        let roots = BATCHED.with(|b| std::mem::take(&mut *b.borrow_mut()));
        if roots.is_empty() {
            return;
        }
        for root in roots {
            if let Err(err) = root::flush_root(root) {
                error!(root = root.0, %err, "batched build failed");
                root::store_error(root, err);
            }
        }
    }
}

// =============================================================================
// Task queue
// =============================================================================

/// Queue `task` to run on a later [`tick`].
pub fn defer(task: impl FnOnce() + 'static) {
    TASKS.with(|t| t.borrow_mut().push_back(Box::new(task)));
}

/// Run the oldest queued task. `false` when the queue was empty.
pub fn tick() -> bool {
    let Some(task) = TASKS.with(|t| t.borrow_mut().pop_front()) else {
        return false;
    };
    isolate("deferred task", task);
    true
}

/// Run tasks until the queue is empty, including tasks queued meanwhile.
pub fn run_deferred() -> usize {
    let mut ran = 0;
    while tick() {
        ran += 1;
    }
    trace!(tasks = ran, "deferred queue drained");
    ran
}

pub fn has_pending_work() -> bool {
    TASKS.with(|t| !t.borrow().is_empty())
}

pub(crate) fn reset_scheduler() {
    BATCH_DEPTH.with(|d| d.set(0));
    BATCHED.with(|b| b.borrow_mut().clear());
    TASKS.with(|t| t.borrow_mut().clear());
}

// =============================================================================
// Build requests
// =============================================================================

/// Request a build of `root`.
pub(crate) fn schedule_build(root: RootId, mode: ScheduleMode) {
    if is_batching() {
        BATCHED.with(|b| {
            let mut batched = b.borrow_mut();
            if !batched.contains(&root) {
                batched.push(root);
            }
        });
        return;
    }
    match mode {
        ScheduleMode::Sync => {
            if let Err(err) = root::flush_root(root) {
                error!(root = root.0, %err, "build failed");
                root::store_error(root, err);
            }
        }
        ScheduleMode::Async => root::schedule_async(root),
    }
}

/// Append `update` to a class node's queue and schedule its root.
pub(crate) fn enqueue_update(root: RootId, node: VNodeId, update: Update) {
    if arena::with_mut(node, |n| n.updates.push_back(update)).is_none() {
        trace!(?node, "update for unmounted component dropped");
        return;
    }
    invalidate(root, node);
}

/// Mark `node` for re-render and schedule in the configured default mode.
pub(crate) fn invalidate(root: RootId, node: VNodeId) {
    invalidate_in(root, node, runtime_config().default_mode);
}

pub(crate) fn invalidate_in(root: RootId, node: VNodeId, mode: ScheduleMode) {
    if !vnode::mark_dirty(node) {
        return;
    }
    root::note_mark(root, node);
    schedule_build(root, mode);
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_deferred_tasks_run_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let seen = seen.clone();
            defer(move || seen.borrow_mut().push(i));
        }
        assert!(has_pending_work());
        assert_eq!(run_deferred(), 3);
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
        assert!(!tick());
    }

    #[test]
    fn test_tasks_queued_while_draining_also_run() {
        let seen = Rc::new(Cell::new(0));
        let inner = seen.clone();
        defer(move || {
            let again = inner.clone();
            defer(move || again.set(again.get() + 1));
            inner.set(inner.get() + 1);
        });
        assert_eq!(run_deferred(), 2);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn test_panicking_task_does_not_stop_queue() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        defer(|| panic!("task failed"));
        defer(move || flag.set(true));
        run_deferred();
        assert!(ran.get());
    }

    #[test]
    fn test_batch_nesting() {
        assert!(!is_batching());
        batch(|| {
            assert!(is_batching());
            batch(|| assert!(is_batching()));
            assert!(is_batching());
        });
        assert!(!is_batching());
    }
}

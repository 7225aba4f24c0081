//! Events - Synthetic dispatch through the VNode tree.
//!
//! The root installs one container listener per event type its host props
//! use. [`dispatch`] maps the target host node back to its VNode and walks
//! VNode parents, so events raised inside a portal reach handlers of the
//! portal's element-tree ancestors.
//!
//! Capture handlers run root to target, then bubble handlers target to
//! root, until one stops propagation. Handlers run inside a batch: state
//! written by several handlers commits once, synchronously, when dispatch
//! returns.
//!
//! # Example
//!
//! ```ignore
//! let button = h("button", Props::new().on("click", move |_| {
//!     count.set("n", count.get("n").as_number().unwrap_or(0.0) + 1.0).ok();
//! }), [text("+")]);
//! root.dispatch_event(button_node, "click", Value::Undefined)?;
//! ```

use std::rc::Rc;

use tracing::trace;

use crate::dom::DomNode;
use crate::element::Props;
use crate::error::{BuildError, Result};
use crate::reactive::Value;
use crate::reactive::observer::isolate;
use crate::root::{self, RootId};
use crate::scheduler;
use crate::vnode::{VNodeTag, arena};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    Capture,
    Target,
    Bubble,
}

/// Event object handed to handlers.
#[derive(Debug, Clone)]
pub struct SyntheticEvent {
    pub name: Rc<str>,
    /// Host node the event was dispatched at.
    pub target: DomNode,
    /// Host node whose handler is running.
    pub current_target: DomNode,
    pub detail: Value,
    pub phase: EventPhase,
    stopped: bool,
    default_prevented: bool,
}

impl SyntheticEvent {
    pub fn new(name: &str, target: DomNode, detail: Value) -> Self {
        Self {
            name: name.into(),
            target,
            current_target: target,
            detail,
            phase: EventPhase::Target,
            stopped: false,
            default_prevented: false,
        }
    }

    /// No handler after this one runs.
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.stopped
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// What a dispatch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub handlers_run: usize,
    pub stopped: bool,
    pub default_prevented: bool,
}

pub(crate) fn dispatch(root: RootId, target: DomNode, name: &str, detail: Value) -> Result<DispatchOutcome> {
    let host = root::host_of(root).ok_or(BuildError::UnknownRoot(root.0))?;
    let start = host.borrow().index.get(&target).copied();
    let Some(start) = start else {
        trace!(?target, event = name, "event target not rendered by this root");
        return Ok(DispatchOutcome::default());
    };

    // Committed host ancestors, target first.
    let mut path: Vec<(DomNode, Props)> = Vec::new();
    let mut current = Some(start);
    while let Some(id) = current {
        let Some((entry, parent)) = arena::with(id, |n| {
            let entry = match (n.tag, n.real_node) {
                (VNodeTag::Host, Some(real)) => Some((real, n.old_props().unwrap_or_else(|| n.props()))),
                _ => None,
            };
            (entry, n.parent)
        }) else {
            break;
        };
        path.extend(entry);
        current = parent;
    }

    let mut event = SyntheticEvent::new(name, target, detail);
    let mut handlers_run = 0;
    scheduler::batch(|| {
        for (node, props) in path.iter().rev() {
            let Some(handler) = props.handler(name, true) else {
                continue;
            };
            event.current_target = *node;
            event.phase = if *node == target { EventPhase::Target } else { EventPhase::Capture };
            isolate("event handler", || (handler.callback)(&mut event));
            handlers_run += 1;
            if event.stopped {
                return;
            }
        }
        for (node, props) in &path {
            let Some(handler) = props.handler(name, false) else {
                continue;
            };
            event.current_target = *node;
            event.phase = if *node == target { EventPhase::Target } else { EventPhase::Bubble };
            isolate("event handler", || (handler.callback)(&mut event));
            handlers_run += 1;
            if event.stopped {
                return;
            }
        }
    });

    let outcome = DispatchOutcome {
        handlers_run,
        stopped: event.stopped,
        default_prevented: event.default_prevented,
    };
    match root::take_error(root) {
        Some(err) => Err(err),
        None => Ok(outcome),
    }
}

//! # spark-dom
//!
//! Reactive virtual-DOM runtime for Rust.
//!
//! Components read tracked state through proxies; writes re-render exactly
//! the components that read what changed. Rendering builds a new element
//! description that is reconciled into a persistent VNode tree and
//! committed to the host through a [`DomAdapter`].
//!
//! ## Architecture
//!
//! ```text
//! Proxy write → Tracker invalidation → Scheduler → Build pass (capture/bubble) → Commit → DomAdapter
//! ```
//!
//! - A build pass works on the VNode tree in place and journals every node
//!   it touches, so it can yield between slices or abort without the host
//!   ever seeing partial work.
//! - Commit is the only phase that mutates the host.
//!
//! ## Modules
//!
//! - [`reactive`] - Proxies, observers, trackers, `watch_effect`
//! - [`element`] - Element descriptions and props
//! - [`component`] - Function, class and lazy components
//! - [`hooks`] - Per-render state for function components
//! - [`vnode`] - The persistent tree, update queues and flags
//! - [`scheduler`] - Sync/async builds, batching, the task queue
//! - [`root`] - Containers, build driving, stats
//! - [`event`] - Synthetic event dispatch
//! - [`suspense`] - Pending handles and resources
//! - [`dom`] - The host seam and an in-memory document

pub(crate) mod builder;
pub(crate) mod commit;
pub mod component;
pub mod config;
pub mod devtools;
pub mod dom;
pub mod element;
pub mod error;
pub mod event;
pub mod hooks;
pub mod reactive;
pub mod root;
pub mod scheduler;
pub mod suspense;
pub mod vnode;

pub use component::{ClassComponent, ClassCtx, Component, Lazy, LazyResolver, Updater, component, lazy};
pub use config::{RuntimeConfig, runtime_config, set_runtime_config, update_runtime_config};
pub use devtools::{DevtoolsEvent, attach_devtools, detach_devtools};
pub use dom::{DomAdapter, DomNode, DomOp, MemoryDom, Namespace};
pub use element::{
    Context, Element, NodeRef, Props, Render, class, create_context, empty, fragment, h, lazy_element,
    memo, memo_with, portal, suspense, text,
};
pub use error::{BuildError, ComponentError, Interrupt, ReactiveError};
pub use event::{DispatchOutcome, EventPhase, SyntheticEvent};
pub use hooks::RenderCtx;
pub use reactive::{
    Cleanup, Proxy, RawObject, Value, is_proxy, reactive, readonly, shallow, to_raw, untrack,
    watch_effect,
};
pub use root::{Root, RootId, RootStats, create_root, reset_runtime};
pub use scheduler::{ScheduleMode, batch, defer, has_pending_work, run_deferred, tick};
pub use suspense::{PendingHandle, Resource};

//! Hooks - Per-render state for function components.
//!
//! Each hook call claims the next slot of the component's VNode. Slots must
//! be claimed in the same order on every render; a mismatch fails the render
//! with [`ComponentError::HookOrder`].
//!
//! # API
//!
//! - `use_reactive(init)` - Tracked state container, created once
//! - `use_ref(init)` - Mutable box that never triggers a re-render
//! - `use_memo(deps, f)` - Value recomputed when `deps` change
//! - `use_effect(deps, f)` - Side effect run after commit
//! - `use_context(&ctx)` - Nearest provider value
//! - `updater()` - Handle to force a re-render
//!
//! # Example
//!
//! ```ignore
//! let counter = component("Counter", |ctx, _props| {
//!     let state = ctx.use_reactive(|| RawObject::from_pairs([("count", 0)]));
//!     let label = format!("Count: {}", state.get("count"));
//!     Ok(h("p", Props::new(), [text(label)]))
//! });
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;

use crate::builder::context::ContextStack;
use crate::component::Updater;
use crate::element::Context;
use crate::error::ComponentError;
use crate::reactive::{Cleanup, Proxy, RawObject, Value, reactive, same_deps};
use crate::root::RootId;
use crate::vnode::VNodeId;

pub(crate) type EffectFn = Box<dyn FnOnce() -> Option<Cleanup>>;

/// `use_effect` slot.
#[derive(Clone)]
pub struct EffectSlot {
    deps: Option<Vec<Value>>,
    /// Effect queued by the latest render, taken by commit.
    pub(crate) pending: Rc<RefCell<Option<EffectFn>>>,
    /// Cleanup returned by the last effect run.
    pub(crate) cleanup: Rc<RefCell<Option<Cleanup>>>,
}

impl EffectSlot {
    /// Run the previous cleanup, then the pending effect.
    pub(crate) fn flush(&self) {
        let Some(effect) = self.pending.borrow_mut().take() else {
            return;
        };
        self.run_cleanup();
        let cleanup = effect();
        *self.cleanup.borrow_mut() = cleanup;
    }

    pub(crate) fn run_cleanup(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }
}

/// One hook's storage on a VNode.
#[derive(Clone)]
pub enum HookSlot {
    Reactive(Proxy),
    Ref(Rc<dyn Any>),
    Memo { deps: Vec<Value>, value: Rc<dyn Any> },
    Effect(EffectSlot),
}

impl HookSlot {
    fn kind(&self) -> &'static str {
        match self {
            HookSlot::Reactive(_) => "use_reactive",
            HookSlot::Ref(_) => "use_ref",
            HookSlot::Memo { .. } => "use_memo",
            HookSlot::Effect(_) => "use_effect",
        }
    }
}

/// What a function component's render receives.
pub struct RenderCtx<'a> {
    node: VNodeId,
    root: RootId,
    slots: Vec<HookSlot>,
    cursor: usize,
    first_render: bool,
    contexts: &'a ContextStack,
    context_deps: Vec<u64>,
    error: Option<ComponentError>,
    has_effects: bool,
}

/// Hook state handed back to the builder after a render.
pub(crate) struct RenderOutput {
    pub slots: Vec<HookSlot>,
    pub context_deps: Vec<u64>,
    pub has_effects: bool,
}

impl<'a> RenderCtx<'a> {
    pub(crate) fn new(
        node: VNodeId,
        root: RootId,
        slots: Vec<HookSlot>,
        first_render: bool,
        contexts: &'a ContextStack,
    ) -> Self {
        Self {
            node,
            root,
            slots,
            cursor: 0,
            first_render,
            contexts,
            context_deps: Vec::new(),
            error: None,
            has_effects: false,
        }
    }

    pub fn is_first_render(&self) -> bool {
        self.first_render
    }

    pub fn node(&self) -> VNodeId {
        self.node
    }

    /// Claim the next slot. On the first render `init` creates it; later
    /// renders must find a slot of the same kind.
    fn claim(&mut self, found: &'static str, init: impl FnOnce() -> HookSlot) -> usize {
        let index = self.cursor;
        self.cursor += 1;
        match self.slots.get(index) {
            Some(slot) if slot.kind() == found => {}
            Some(slot) => {
                self.fail_order(index, slot.kind(), found);
                self.slots[index] = init();
            }
            None => {
                if !self.first_render {
                    self.fail_order(index, "end of hooks", found);
                }
                self.slots.push(init());
            }
        }
        index
    }

    fn fail_order(&mut self, slot: usize, expected: &'static str, found: &'static str) {
        if self.error.is_none() {
            warn!(node = ?self.node, slot, expected, found, "hook order changed between renders");
            self.error = Some(ComponentError::HookOrder { slot, expected, found });
        }
    }

    /// Tracked state, created from `init` on the first render.
    pub fn use_reactive(&mut self, init: impl FnOnce() -> RawObject) -> Proxy {
        let index = self.claim("use_reactive", || HookSlot::Reactive(reactive(&init())));
        match &self.slots[index] {
            HookSlot::Reactive(proxy) => proxy.clone(),
            _ => unreachable!("claimed slot has the requested kind"),
        }
    }

    /// A box that survives renders. Writing it does not re-render.
    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Rc<RefCell<T>> {
        let index = self.cursor;
        if let Some(HookSlot::Ref(any)) = self.slots.get(index) {
            match Rc::downcast::<RefCell<T>>(any.clone()) {
                Ok(cell) => {
                    self.cursor += 1;
                    return cell;
                }
                Err(_) => self.fail_order(index, "use_ref of another type", "use_ref"),
            }
        }
        let cell = Rc::new(RefCell::new(init()));
        let slot = HookSlot::Ref(cell.clone());
        let claimed = self.claim("use_ref", || slot.clone());
        self.slots[claimed] = slot;
        cell
    }

    /// `compute()` on the first render and whenever `deps` differ (by
    /// `is_same`) from the previous render's.
    pub fn use_memo<T: Clone + 'static>(&mut self, deps: &[Value], compute: impl FnOnce() -> T) -> T {
        let index = self.cursor;
        let cached = match self.slots.get(index) {
            Some(HookSlot::Memo { deps: old, value }) if same_deps(old, deps) => {
                value.downcast_ref::<T>().cloned()
            }
            _ => None,
        };
        if let Some(value) = cached {
            self.cursor += 1;
            return value;
        }
        let value = compute();
        let slot = HookSlot::Memo {
            deps: deps.to_vec(),
            value: Rc::new(value.clone()),
        };
        let claimed = self.claim("use_memo", || slot.clone());
        self.slots[claimed] = slot;
        value
    }

    /// Queue `effect` to run after commit when `deps` changed; `None`
    /// runs it after every commit. The previous cleanup runs first.
    pub fn use_effect(
        &mut self,
        deps: Option<&[Value]>,
        effect: impl FnOnce() -> Option<Cleanup> + 'static,
    ) {
        let index = self.claim("use_effect", || {
            HookSlot::Effect(EffectSlot {
                deps: None,
                pending: Rc::new(RefCell::new(None)),
                cleanup: Rc::new(RefCell::new(None)),
            })
        });
        let HookSlot::Effect(slot) = &mut self.slots[index] else {
            unreachable!("claimed slot has the requested kind")
        };
        let changed = match (&slot.deps, deps) {
            (Some(old), Some(new)) => !same_deps(old, new),
            _ => true,
        };
        if changed {
            slot.deps = deps.map(<[Value]>::to_vec);
            slot.pending = Rc::new(RefCell::new(Some(Box::new(effect))));
            self.has_effects = true;
        } else {
            slot.pending = Rc::new(RefCell::new(None));
        }
    }

    /// Nearest provider's value, or the context default.
    pub fn use_context(&mut self, context: &Context) -> Value {
        if !self.context_deps.contains(&context.id()) {
            self.context_deps.push(context.id());
        }
        self.contexts
            .lookup(context.id())
            .unwrap_or_else(|| context.default_value().clone())
    }

    /// Handle that can force this component to re-render.
    pub fn updater(&self) -> Updater {
        Updater::new(self.root, self.node)
    }

    /// Hand the slots back, validating hook count against the last render.
    pub(crate) fn finish(mut self) -> Result<RenderOutput, ComponentError> {
        if !self.first_render && self.cursor < self.slots.len() {
            let expected = self.slots[self.cursor].kind();
            self.fail_order(self.cursor, expected, "end of hooks");
        }
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(RenderOutput {
            slots: self.slots,
            context_deps: self.context_deps,
            has_effects: self.has_effects,
        })
    }
}

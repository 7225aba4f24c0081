//! Component kinds.
//!
//! - [`Component`]: a render function with hooks (`RenderCtx`).
//! - [`ClassComponent`]: an instance with state, update queue and
//!   lifecycles; error boundaries are class components.
//! - [`Lazy`]: a component whose render function arrives later; rendering
//!   it before then suspends.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use crate::element::{Element, ElementKind, Props, Render, lazy_element};
use crate::error::{ComponentError, Interrupt};
use crate::hooks::RenderCtx;
use crate::reactive::observer::panic_message;
use crate::reactive::{RawObject, Value};
use crate::root::RootId;
use crate::scheduler;
use crate::suspense::PendingHandle;
use crate::vnode::{Update, VNodeId, arena};

// =============================================================================
// Function components
// =============================================================================

pub type RenderFn = Rc<dyn Fn(&mut RenderCtx<'_>, &Props) -> Render>;

/// A function component.
///
/// Two components are the same type when they were created from the same
/// closure or function item; the builder reuses VNodes only across the same
/// type.
#[derive(Clone)]
pub struct Component {
    identity: TypeId,
    name: &'static str,
    render: RenderFn,
}

impl Component {
    pub fn new<F>(name: &'static str, render: F) -> Self
    where
        F: Fn(&mut RenderCtx<'_>, &Props) -> Render + 'static,
    {
        Self {
            identity: TypeId::of::<F>(),
            name,
            render: Rc::new(render),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn identity(&self) -> TypeId {
        self.identity
    }

    pub(crate) fn render_fn(&self) -> RenderFn {
        self.render.clone()
    }

    pub fn element(&self, props: Props) -> Element {
        Element::new(ElementKind::Component {
            component: self.clone(),
            props,
        })
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.name)
    }
}

/// Shorthand for [`Component::new`].
pub fn component<F>(name: &'static str, render: F) -> Component
where
    F: Fn(&mut RenderCtx<'_>, &Props) -> Render + 'static,
{
    Component::new(name, render)
}

// =============================================================================
// Class components
// =============================================================================

/// What a class component's render sees.
pub struct ClassCtx<'a> {
    pub props: &'a Props,
    pub state: &'a Value,
    pub updater: &'a Updater,
}

impl ClassCtx<'_> {
    /// One field of an object state.
    pub fn field(&self, key: &str) -> Value {
        match self.state {
            Value::Object(raw) => raw.field(key),
            Value::Proxy(proxy) => proxy.get(key),
            _ => Value::Undefined,
        }
    }
}

/// A stateful component with lifecycle methods.
///
/// State changes go through the [`Updater`]: updates are queued, folded in
/// order during the next build and only become current on commit.
pub trait ClassComponent: 'static {
    fn new(props: &Props) -> Self
    where
        Self: Sized;

    fn initial_state(&self, _props: &Props) -> Value {
        Value::Object(RawObject::object())
    }

    fn render(&self, ctx: &ClassCtx<'_>) -> Render;

    fn should_component_update(&self, _next_props: &Props, _next_state: &Value) -> bool {
        true
    }

    fn component_did_mount(&self, _updater: &Updater) {}

    fn component_did_update(&self, _prev_props: &Props, _prev_state: &Value, _updater: &Updater) {}

    fn component_will_unmount(&self) {}

    /// Whether errors below this component are routed to it.
    fn is_error_boundary(&self) -> bool {
        false
    }

    /// Partial state merged in when an error below is caught.
    fn derive_state_from_error(&self, _error: &ComponentError) -> Value {
        Value::Undefined
    }

    fn component_did_catch(&self, _error: &ComponentError, _updater: &Updater) {}
}

/// Type-erased constructor for a [`ClassComponent`].
#[derive(Clone)]
pub struct ClassType {
    identity: TypeId,
    name: &'static str,
    construct: fn(&Props) -> Rc<dyn ClassComponent>,
}

fn construct<C: ClassComponent>(props: &Props) -> Rc<dyn ClassComponent> {
    Rc::new(C::new(props))
}

impl ClassType {
    pub(crate) fn of<C: ClassComponent>() -> Self {
        let full = std::any::type_name::<C>();
        Self {
            identity: TypeId::of::<C>(),
            name: full.rsplit("::").next().unwrap_or(full),
            construct: construct::<C>,
        }
    }

    pub(crate) fn identity(&self) -> TypeId {
        self.identity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn construct(&self, props: &Props) -> Rc<dyn ClassComponent> {
        (self.construct)(props)
    }
}

/// Queue state changes for one class component instance.
///
/// Outside an event handler or batch the build runs in the configured
/// default mode; inside one, all queued work is flushed synchronously when
/// the batch ends.
#[derive(Clone)]
pub struct Updater {
    root: RootId,
    node: VNodeId,
}

impl Updater {
    pub(crate) fn new(root: RootId, node: VNodeId) -> Self {
        Self { root, node }
    }

    fn enqueue(&self, update: Update) {
        scheduler::enqueue_update(self.root, self.node, update);
    }

    /// Shallow-merge `partial` into the state.
    pub fn set_state(&self, partial: impl Into<Value>) {
        self.enqueue(Update::merge(partial.into()));
    }

    /// Shallow-merge the result of `f(state, props)`.
    pub fn set_state_with(&self, f: impl Fn(&Value, &Props) -> Value + 'static) {
        self.enqueue(Update::merge_with(f));
    }

    /// [`set_state`](Self::set_state), then run `callback` after the commit
    /// that applies it.
    pub fn set_state_then(&self, partial: impl Into<Value>, callback: impl Fn() + 'static) {
        self.enqueue(Update::merge(partial.into()).then(callback));
    }

    /// Override: an object overlays its keys, anything else replaces.
    pub fn replace_state(&self, state: impl Into<Value>) {
        self.enqueue(Update::replace(state.into()));
    }

    /// Replace the state with `f(state, props)`.
    pub fn replace_state_with(&self, f: impl Fn(&Value, &Props) -> Value + 'static) {
        self.enqueue(Update::replace_with(f));
    }

    /// Re-render even if `should_component_update` says no.
    pub fn force_update(&self) {
        self.enqueue(Update::force());
    }

    pub fn is_mounted(&self) -> bool {
        arena::with(self.node, |n| !n.is_created).unwrap_or(false)
    }

    pub fn node(&self) -> VNodeId {
        self.node
    }
}

impl fmt::Debug for Updater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Updater({:?} in {:?})", self.node, self.root)
    }
}

// =============================================================================
// Lazy components
// =============================================================================

thread_local! {
    static NEXT_LAZY_ID: Cell<u64> = const { Cell::new(1) };
}

enum LazyState {
    Idle,
    Loading(PendingHandle),
    Loaded(Component),
    Failed(String),
}

type Loader = Box<dyn FnOnce(LazyResolver)>;

struct LazyInner {
    id: u64,
    state: RefCell<LazyState>,
    loader: RefCell<Option<Loader>>,
}

/// A component loaded on first render.
#[derive(Clone)]
pub struct Lazy(Rc<LazyInner>);

/// Completes a [`Lazy`] load. May be called synchronously from the loader.
pub struct LazyResolver(Rc<LazyInner>);

impl LazyResolver {
    pub fn resolve(self, component: Component) {
        self.finish(LazyState::Loaded(component));
    }

    pub fn reject(self, message: impl Into<String>) {
        self.finish(LazyState::Failed(message.into()));
    }

    fn finish(self, next: LazyState) {
        let previous = std::mem::replace(&mut *self.0.state.borrow_mut(), next);
        if let LazyState::Loading(handle) = previous {
            handle.resolve();
        }
    }
}

/// Create a lazy component. `loader` runs once, on first render.
pub fn lazy(loader: impl FnOnce(LazyResolver) + 'static) -> Lazy {
    let id = NEXT_LAZY_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    });
    Lazy(Rc::new(LazyInner {
        id,
        state: RefCell::new(LazyState::Idle),
        loader: RefCell::new(Some(Box::new(loader))),
    }))
}

impl Lazy {
    pub(crate) fn id(&self) -> u64 {
        self.0.id
    }

    pub fn is_loaded(&self) -> bool {
        matches!(&*self.0.state.borrow(), LazyState::Loaded(_))
    }

    pub fn element(&self, props: Props) -> Element {
        lazy_element(self, props)
    }

    /// The loaded component, starting the load if needed.
    pub(crate) fn load(&self) -> Result<Component, Interrupt> {
        let loader = match &*self.0.state.borrow() {
            LazyState::Loaded(component) => return Ok(component.clone()),
            LazyState::Loading(handle) => return Err(handle.interrupt()),
            LazyState::Failed(message) => {
                return Err(ComponentError::LazyFailed(message.clone()).into());
            }
            LazyState::Idle => self.0.loader.borrow_mut().take(),
        };
        let Some(loader) = loader else {
            return Err(ComponentError::LazyFailed("loader missing".into()).into());
        };
        *self.0.state.borrow_mut() = LazyState::Loading(PendingHandle::new("lazy"));
        let resolver = LazyResolver(self.0.clone());
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| loader(resolver))) {
            LazyResolver(self.0.clone()).reject(panic_message(payload.as_ref()));
        }
        match &*self.0.state.borrow() {
            LazyState::Loaded(component) => Ok(component.clone()),
            LazyState::Loading(handle) => Err(handle.interrupt()),
            LazyState::Failed(message) => Err(ComponentError::LazyFailed(message.clone()).into()),
            LazyState::Idle => Err(ComponentError::LazyFailed("loader missing".into()).into()),
        }
    }
}

impl fmt::Debug for Lazy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lazy(#{}, loaded: {})", self.0.id, self.is_loaded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::text;

    fn hello() -> Component {
        component("Hello", |_, _| Ok(text("hello")))
    }

    #[test]
    fn test_component_identity_follows_closure_type() {
        let a = hello();
        let b = hello();
        let c = component("Hello", |_, _| Ok(text("other")));
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn test_lazy_sync_resolution() {
        let l = lazy(|resolver| resolver.resolve(hello()));
        assert!(l.load().is_ok());
        assert!(l.is_loaded());
    }

    #[test]
    fn test_lazy_pending_then_loaded() {
        let slot: Rc<RefCell<Option<LazyResolver>>> = Rc::new(RefCell::new(None));
        let l = lazy({
            let slot = slot.clone();
            move |resolver| *slot.borrow_mut() = Some(resolver)
        });
        let handle = match l.load() {
            Err(Interrupt::Pending(handle)) => handle,
            other => panic!("expected pending, got {other:?}"),
        };
        assert!(matches!(l.load(), Err(Interrupt::Pending(_))));
        slot.borrow_mut().take().unwrap().resolve(hello());
        assert!(handle.is_resolved());
        assert!(l.load().is_ok());
    }

    #[test]
    fn test_lazy_loader_panic_fails() {
        let l = lazy(|_| panic!("network down"));
        match l.load() {
            Err(Interrupt::Failed(ComponentError::LazyFailed(message))) => {
                assert!(message.contains("network down"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

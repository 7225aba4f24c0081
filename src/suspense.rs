//! Suspense primitives.
//!
//! A render that is not ready returns `Err(Interrupt::Pending(handle))`.
//! The nearest Suspense boundary records the handle, shows its fallback and
//! subscribes to [`PendingHandle::on_resolve`]; once every recorded handle
//! has resolved, the boundary rebuilds its primary content.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::{ComponentError, Interrupt};
use crate::reactive::observer::isolate;

thread_local! {
    static NEXT_HANDLE_ID: Cell<u64> = const { Cell::new(1) };
}

struct PendingInner {
    id: u64,
    label: Rc<str>,
    resolved: Cell<bool>,
    callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// Something a render is waiting for.
///
/// Cloning shares the handle. Resolving it runs every `on_resolve`
/// callback exactly once, in registration order.
#[derive(Clone)]
pub struct PendingHandle(Rc<PendingInner>);

impl PendingHandle {
    pub fn new(label: impl Into<Rc<str>>) -> Self {
        let id = NEXT_HANDLE_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        PendingHandle(Rc::new(PendingInner {
            id,
            label: label.into(),
            resolved: Cell::new(false),
            callbacks: RefCell::new(Vec::new()),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn is_resolved(&self) -> bool {
        self.0.resolved.get()
    }

    /// Mark resolved and run the registered callbacks. Idempotent.
    pub fn resolve(&self) {
        if self.0.resolved.replace(true) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.0.callbacks.borrow_mut());
        for callback in callbacks {
            isolate("on_resolve", callback);
        }
    }

    /// Run `f` once resolved; immediately if already resolved.
    pub fn on_resolve(&self, f: impl FnOnce() + 'static) {
        if self.is_resolved() {
            isolate("on_resolve", f);
        } else {
            self.0.callbacks.borrow_mut().push(Box::new(f));
        }
    }

    /// The interrupt a render returns while waiting on this handle.
    pub fn interrupt(&self) -> Interrupt {
        Interrupt::Pending(self.clone())
    }
}

impl fmt::Debug for PendingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PendingHandle(#{} {:?}", self.0.id, self.0.label)?;
        if self.is_resolved() {
            write!(f, ", resolved")?;
        }
        write!(f, ")")
    }
}

impl PartialEq for PendingHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

enum ResourceState<T> {
    Pending(PendingHandle),
    Ready(T),
    Failed(String),
}

/// A value that arrives later, readable from render.
///
/// `read` returns the value once ready, or the interrupt that suspends the
/// calling component.
pub struct Resource<T> {
    state: Rc<RefCell<ResourceState<T>>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + 'static> Resource<T> {
    pub fn pending(label: impl Into<Rc<str>>) -> Self {
        Self {
            state: Rc::new(RefCell::new(ResourceState::Pending(PendingHandle::new(label)))),
        }
    }

    pub fn ready(value: T) -> Self {
        Self {
            state: Rc::new(RefCell::new(ResourceState::Ready(value))),
        }
    }

    pub fn read(&self) -> Result<T, Interrupt> {
        match &*self.state.borrow() {
            ResourceState::Ready(value) => Ok(value.clone()),
            ResourceState::Pending(handle) => Err(handle.interrupt()),
            ResourceState::Failed(message) => Err(ComponentError::msg(message.clone()).into()),
        }
    }

    /// Store the value and wake everything suspended on it.
    pub fn resolve(&self, value: T) {
        let previous = std::mem::replace(&mut *self.state.borrow_mut(), ResourceState::Ready(value));
        if let ResourceState::Pending(handle) = previous {
            handle.resolve();
        }
    }

    /// Fail the resource; suspended readers re-render into an error.
    pub fn fail(&self, message: impl Into<String>) {
        let previous = std::mem::replace(
            &mut *self.state.borrow_mut(),
            ResourceState::Failed(message.into()),
        );
        if let ResourceState::Pending(handle) = previous {
            handle.resolve();
        }
    }

    pub fn handle(&self) -> Option<PendingHandle> {
        match &*self.state.borrow() {
            ResourceState::Pending(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.state.borrow(), ResourceState::Ready(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_runs_callbacks_once_in_order() {
        let handle = PendingHandle::new("data");
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            handle.on_resolve(move || log.borrow_mut().push(i));
        }
        handle.resolve();
        handle.resolve();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_on_resolve_after_resolution_runs_immediately() {
        let handle = PendingHandle::new("data");
        handle.resolve();
        let ran = Rc::new(Cell::new(false));
        handle.on_resolve({
            let ran = ran.clone();
            move || ran.set(true)
        });
        assert!(ran.get());
    }

    #[test]
    fn test_resource_read_states() {
        let resource: Resource<i32> = Resource::pending("n");
        assert!(matches!(resource.read(), Err(Interrupt::Pending(_))));
        resource.resolve(4);
        assert_eq!(resource.read().unwrap(), 4);

        let failing: Resource<i32> = Resource::pending("n");
        failing.fail("offline");
        assert!(matches!(failing.read(), Err(Interrupt::Failed(_))));
    }
}

//! Devtools bridge.
//!
//! A panel attaches with [`attach_devtools`]; the runtime then reports proxy
//! creation, builds and commits through [`emit`]. While detached, `emit` is
//! one `Cell<bool>` read and the payload closure never runs.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::reactive::observer::isolate;

/// One devtools event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevtoolsEvent {
    pub kind: &'static str,
    pub detail: String,
}

pub type DevtoolsHook = Rc<dyn Fn(&DevtoolsEvent)>;

thread_local! {
    /// Hook attached and allowed by config.
    static ENABLED: Cell<bool> = const { Cell::new(false) };
    static ALLOWED: Cell<bool> = const { Cell::new(true) };
    static HOOK: RefCell<Option<DevtoolsHook>> = const { RefCell::new(None) };
}

fn refresh() {
    let attached = HOOK.with(|h| h.borrow().is_some());
    ENABLED.with(|e| e.set(attached && ALLOWED.with(Cell::get)));
}

/// Install the devtools hook. Replaces any previous one.
pub fn attach_devtools(hook: impl Fn(&DevtoolsEvent) + 'static) {
    HOOK.with(|h| *h.borrow_mut() = Some(Rc::new(hook)));
    refresh();
}

pub fn detach_devtools() {
    HOOK.with(|h| h.borrow_mut().take());
    refresh();
}

pub fn devtools_attached() -> bool {
    ENABLED.with(Cell::get)
}

/// Mirror [`RuntimeConfig::devtools`](crate::config::RuntimeConfig::devtools).
pub(crate) fn set_allowed(allowed: bool) {
    ALLOWED.with(|a| a.set(allowed));
    refresh();
}

/// Report an event. `detail` is only evaluated while a hook is attached.
#[inline]
pub fn emit(kind: &'static str, detail: impl FnOnce() -> String) {
    if !ENABLED.with(Cell::get) {
        return;
    }
    let Some(hook) = HOOK.with(|h| h.borrow().clone()) else {
        return;
    };
    let event = DevtoolsEvent {
        kind,
        detail: detail(),
    };
    isolate("devtools", || hook(&event));
}

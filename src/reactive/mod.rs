//! Reactive state layer.
//!
//! Raw containers are plain data. Wrapping one with [`create_proxy`] yields
//! a [`Proxy`] whose reads register the current consumer with the
//! container's [`Observer`] and whose writes notify those consumers.
//!
//! # Example
//!
//! ```ignore
//! use spark_dom::reactive::{RawObject, reactive, watch_effect};
//!
//! let state = reactive(&RawObject::from_pairs([("count", 0)]));
//! let _stop = watch_effect({
//!     let state = state.clone();
//!     move || println!("count = {}", state.get("count"))
//! });
//! state.set("count", 1)?; // prints "count = 1"
//! ```

pub mod handlers;
pub mod observer;
pub mod proxy;
pub mod same;
pub mod value;

pub use handlers::{Entries, Keys, Values};
pub use observer::{
    Cleanup, HooklessObserver, Listener, Mutation, MutationMeta, Observe, Observer, Tracker,
    WatchCallback, current_consumer, untrack, watch_effect,
};
pub use proxy::{
    Proxy, ProxyMode, Tracking, create_proxy, create_proxy_with, is_proxy, observer_of, reactive,
    readonly, reset_proxies, shallow, to_raw, tracked_container_count, untracked,
};
pub use same::{is_same, same_deps, same_value_zero};
pub use value::{ContainerKind, PropKey, RawObject, Value, ValueKey, WeakRaw};

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;

    #[test]
    fn test_watch_effect_reruns_on_change() {
        let state = reactive(&RawObject::from_pairs([("count", 0)]));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let stop = watch_effect({
            let state = state.clone();
            let seen = seen.clone();
            move || seen.borrow_mut().push(state.get("count"))
        });
        state.set("count", 1).unwrap();
        state.set("count", 1).unwrap();
        stop();
        state.set("count", 2).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from(0), Value::from(1)]);
    }

    #[test]
    fn test_watch_effect_self_write_terminates() {
        let state = reactive(&RawObject::from_pairs([("n", 0)]));
        let runs = Rc::new(Cell::new(0));
        let _stop = watch_effect({
            let state = state.clone();
            let runs = runs.clone();
            move || {
                runs.set(runs.get() + 1);
                let n = state.get("n").as_number().unwrap_or(0.0);
                if n < 3.0 {
                    state.set("n", n + 1.0).unwrap();
                }
            }
        });
        assert_eq!(state.get("n"), Value::from(3));
        assert_eq!(runs.get(), 4);
    }

    #[test]
    fn test_untracked_value_never_invalidates() {
        let Value::Proxy(quiet) = untracked(&Value::object([("a", 1)])) else {
            panic!("expected proxy");
        };
        let runs = Rc::new(Cell::new(0));
        let _stop = watch_effect({
            let quiet = quiet.clone();
            let runs = runs.clone();
            move || {
                runs.set(runs.get() + 1);
                quiet.get("a");
            }
        });
        quiet.set("a", 2).unwrap();
        assert_eq!(runs.get(), 1);
    }
}

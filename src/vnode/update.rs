//! Class component update queue.
//!
//! Updates are appended by an [`Updater`](crate::component::Updater) and
//! folded in FIFO order during capture. The fold works on a copy: the
//! committed state and the queue itself are only replaced by commit, so an
//! aborted build can re-fold the same updates later.

use std::fmt;
use std::rc::Rc;

use crate::element::Props;
use crate::error::ComponentError;
use crate::reactive::{RawObject, Value, to_raw};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Shallow merge into the state.
    Update,
    /// Replace the state (objects overlay their keys).
    Override,
    /// Re-render regardless of `should_component_update`.
    ForceUpdate,
    /// An error caught below; folded through `derive_state_from_error`.
    Error,
}

pub type StateFn = Rc<dyn Fn(&Value, &Props) -> Value>;

#[derive(Clone)]
pub enum Payload {
    None,
    State(Value),
    Compute(StateFn),
    Error(ComponentError),
}

/// One queued state change.
#[derive(Clone)]
pub struct Update {
    pub kind: UpdateKind,
    pub payload: Payload,
    pub callback: Option<Rc<dyn Fn()>>,
}

impl Update {
    pub fn merge(partial: Value) -> Self {
        Self::new(UpdateKind::Update, Payload::State(partial))
    }

    pub fn merge_with(f: impl Fn(&Value, &Props) -> Value + 'static) -> Self {
        Self::new(UpdateKind::Update, Payload::Compute(Rc::new(f)))
    }

    pub fn replace(state: Value) -> Self {
        Self::new(UpdateKind::Override, Payload::State(state))
    }

    pub fn replace_with(f: impl Fn(&Value, &Props) -> Value + 'static) -> Self {
        Self::new(UpdateKind::Override, Payload::Compute(Rc::new(f)))
    }

    pub fn force() -> Self {
        Self::new(UpdateKind::ForceUpdate, Payload::None)
    }

    pub fn error(error: ComponentError) -> Self {
        Self::new(UpdateKind::Error, Payload::Error(error))
    }

    fn new(kind: UpdateKind, payload: Payload) -> Self {
        Self {
            kind,
            payload,
            callback: None,
        }
    }

    /// Run `callback` after the commit that applies this update.
    pub fn then(mut self, callback: impl Fn() + 'static) -> Self {
        self.callback = Some(Rc::new(callback));
        self
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = match &self.payload {
            Payload::None => "none".to_string(),
            Payload::State(v) => format!("{v:?}"),
            Payload::Compute(_) => "<fn>".to_string(),
            Payload::Error(e) => format!("error: {e}"),
        };
        f.debug_struct("Update")
            .field("kind", &self.kind)
            .field("payload", &payload)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Result of folding a queue.
#[derive(Default)]
pub struct Folded {
    pub state: Value,
    pub force: bool,
    /// Errors queued through `Error` updates, oldest first.
    pub captured: Vec<ComponentError>,
    pub callbacks: Vec<Rc<dyn Fn()>>,
}

impl fmt::Debug for Folded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Folded")
            .field("state", &self.state)
            .field("force", &self.force)
            .field("captured", &self.captured)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Shallow merge: a new object with `base`'s keys overlaid by `partial`'s.
///
/// `partial` null/undefined leaves `base`; a non-object `partial` replaces.
pub fn merge_state(base: &Value, partial: &Value) -> Value {
    if partial.is_nullish() {
        return base.clone();
    }
    let Some(overlay) = object_of(partial) else {
        return partial.clone();
    };
    let base_pairs = object_of(base).map(|raw| raw.object_entries()).unwrap_or_default();
    Value::Object(RawObject::from_pairs(
        base_pairs.into_iter().chain(overlay.object_entries()),
    ))
}

fn object_of(value: &Value) -> Option<RawObject> {
    match to_raw(value) {
        Value::Object(raw) if raw.kind() == crate::reactive::ContainerKind::Object => Some(raw),
        _ => None,
    }
}

/// Fold `updates` over `base` in order.
///
/// `Override` with a computed payload replaces the accumulated state; with
/// an object literal it overlays its keys. `Update` shallow-merges and
/// ignores null/undefined. `Error` updates are collected for the caller to
/// route through `derive_state_from_error`.
pub fn process_updates(base: &Value, props: &Props, updates: &[Update]) -> Folded {
    let mut folded = Folded {
        state: base.clone(),
        ..Folded::default()
    };
    for update in updates {
        match (update.kind, &update.payload) {
            (UpdateKind::Update, Payload::State(partial)) => {
                folded.state = merge_state(&folded.state, partial);
            }
            (UpdateKind::Update, Payload::Compute(f)) => {
                let partial = f(&folded.state, props);
                folded.state = merge_state(&folded.state, &partial);
            }
            (UpdateKind::Override, Payload::State(next)) => {
                folded.state = merge_state(&folded.state, next);
            }
            (UpdateKind::Override, Payload::Compute(f)) => {
                folded.state = f(&folded.state, props);
            }
            (UpdateKind::ForceUpdate, _) => folded.force = true,
            (UpdateKind::Error, Payload::Error(error)) => folded.captured.push(error.clone()),
            _ => {}
        }
        if let Some(callback) = &update.callback {
            folded.callbacks.push(callback.clone());
        }
    }
    folded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(state: &Value, key: &str) -> Value {
        state.as_raw().map(|raw| raw.field(key)).unwrap_or_default()
    }

    #[test]
    fn test_fifo_fold_last_write_wins() {
        let updates = [
            Update::merge(Value::object([("a", 1)])),
            Update::merge(Value::object([("a", 2)])),
            Update::replace(Value::object([("a", 3)])),
        ];
        let folded = process_updates(&Value::object([("b", 0)]), &Props::new(), &updates);
        assert_eq!(field(&folded.state, "a"), Value::from(3));
        assert_eq!(field(&folded.state, "b"), Value::from(0));
    }

    #[test]
    fn test_computed_override_replaces() {
        let updates = [Update::replace_with(|_, _| Value::object([("only", true)]))];
        let folded = process_updates(&Value::object([("b", 0)]), &Props::new(), &updates);
        assert_eq!(field(&folded.state, "b"), Value::Undefined);
        assert_eq!(field(&folded.state, "only"), Value::from(true));
    }

    #[test]
    fn test_merge_with_sees_accumulated_state() {
        let updates = [
            Update::merge(Value::object([("n", 1)])),
            Update::merge_with(|state, _| {
                let n = state.as_raw().and_then(|r| r.field("n").as_number()).unwrap_or(0.0);
                Value::object([("n", n + 10.0)])
            }),
        ];
        let folded = process_updates(&Value::object::<&str, i32>([]), &Props::new(), &updates);
        assert_eq!(field(&folded.state, "n"), Value::from(11));
    }

    #[test]
    fn test_null_partial_is_ignored_and_force_collected() {
        let base = Value::object([("x", 1)]);
        let updates = [Update::merge(Value::Null), Update::force().then(|| {})];
        let folded = process_updates(&base, &Props::new(), &updates);
        assert_eq!(folded.state, base);
        assert!(folded.force);
        assert_eq!(folded.callbacks.len(), 1);
    }

    #[test]
    fn test_base_is_not_mutated() {
        let base = Value::object([("x", 1)]);
        process_updates(&base, &Props::new(), &[Update::merge(Value::object([("x", 2)]))]);
        assert_eq!(field(&base, "x"), Value::from(1));
    }

    #[test]
    fn test_error_updates_are_collected() {
        let updates = [Update::error(ComponentError::msg("boom"))];
        let folded = process_updates(&Value::Undefined, &Props::new(), &updates);
        assert_eq!(folded.captured.len(), 1);
    }
}

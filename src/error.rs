//! Error types.
//!
//! Three layers:
//! - [`ReactiveError`]: a proxy operation that cannot be performed.
//! - [`ComponentError`] / [`Interrupt`]: what a render can return instead of
//!   an element. `Interrupt::Pending` is the suspension signal, not a failure.
//! - [`BuildError`]: a build pass that could not recover. The last committed
//!   tree stays on screen.

use thiserror::Error;

use crate::reactive::ContainerKind;
use crate::suspense::PendingHandle;
use crate::vnode::VNodeId;

/// Failure of a mutating proxy operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactiveError {
    /// Write or delete through a readonly proxy.
    #[error("cannot {op} `{key}`: readonly variable")]
    Readonly { op: &'static str, key: String },

    /// Operation that does not exist on this container kind.
    #[error("`{op}` is not supported on {kind}")]
    Unsupported {
        op: &'static str,
        kind: ContainerKind,
    },

    /// Primitive used as a WeakMap/WeakSet key.
    #[error("invalid value used as {kind} key: {found}")]
    InvalidWeakKey {
        kind: ContainerKind,
        found: &'static str,
    },

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Failure raised by component code during render.
#[derive(Debug, Clone, Error)]
pub enum ComponentError {
    #[error("{0}")]
    Message(String),

    /// A render function panicked; the payload message is kept.
    #[error("component panicked: {0}")]
    Panicked(String),

    /// Hooks were called in a different order than on the previous render.
    #[error("hook order changed at slot {slot}: expected {expected}, found {found}")]
    HookOrder {
        slot: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Reactive(#[from] ReactiveError),

    #[error("lazy component failed to load: {0}")]
    LazyFailed(String),
}

impl ComponentError {
    pub fn msg(message: impl Into<String>) -> Self {
        ComponentError::Message(message.into())
    }
}

/// Why a render did not produce an element.
#[derive(Debug, Clone, Error)]
pub enum Interrupt {
    /// Not ready yet; the nearest Suspense boundary shows its fallback.
    #[error("render suspended: waiting for {0:?}")]
    Pending(PendingHandle),

    /// Real failure; routed to the nearest error boundary.
    #[error(transparent)]
    Failed(#[from] ComponentError),
}

impl From<ReactiveError> for Interrupt {
    fn from(err: ReactiveError) -> Self {
        Interrupt::Failed(ComponentError::Reactive(err))
    }
}

/// Unrecoverable outcome of a build pass.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// A component failed and no error boundary caught it.
    #[error("uncaught error in <{component}>: {source}")]
    Uncaught {
        component: String,
        #[source]
        source: ComponentError,
    },

    /// A component suspended with no Suspense ancestor.
    #[error("<{component}> suspended outside of any Suspense boundary")]
    UncaughtSuspense { component: String },

    #[error("vnode {0:?} no longer exists")]
    MissingNode(VNodeId),

    #[error("unknown root {0}")]
    UnknownRoot(usize),

    /// Commits kept scheduling builds.
    #[error("update loop: more than {passes} nested builds")]
    UpdateLoop { passes: usize },
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readonly_message() {
        let err = ReactiveError::Readonly {
            op: "set",
            key: "count".into(),
        };
        assert!(err.to_string().contains("readonly variable"));
    }

    #[test]
    fn test_reactive_error_converts_to_interrupt() {
        fn render() -> std::result::Result<(), Interrupt> {
            Err(ReactiveError::Unsupported {
                op: "push",
                kind: ContainerKind::Map,
            })?;
            Ok(())
        }
        match render() {
            Err(Interrupt::Failed(ComponentError::Reactive(ReactiveError::Unsupported { op, .. }))) => {
                assert_eq!(op, "push")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_uncaught_display() {
        let err = BuildError::Uncaught {
            component: "Counter".into(),
            source: ComponentError::msg("boom"),
        };
        assert_eq!(err.to_string(), "uncaught error in <Counter>: boom");
    }
}

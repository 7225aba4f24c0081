//! VNode tags.

use crate::element::ElementKind;

/// What kind of element a VNode was built from.
///
/// The builder's capture and bubble tables dispatch on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VNodeTag {
    /// Top of a root's tree; its host node is the container.
    TreeRoot,
    Host,
    Text,
    Fragment,
    Function,
    Class,
    Portal,
    Provider,
    Consumer,
    Memo,
    Lazy,
    Suspense,
}

impl VNodeTag {
    pub(crate) fn of(kind: &ElementKind) -> Option<VNodeTag> {
        Some(match kind {
            ElementKind::Empty => return None,
            ElementKind::Text(_) => VNodeTag::Text,
            ElementKind::Host { .. } => VNodeTag::Host,
            ElementKind::Fragment(_) => VNodeTag::Fragment,
            ElementKind::Component { .. } => VNodeTag::Function,
            ElementKind::Class { .. } => VNodeTag::Class,
            ElementKind::Portal { .. } => VNodeTag::Portal,
            ElementKind::Provider { .. } => VNodeTag::Provider,
            ElementKind::Consumer { .. } => VNodeTag::Consumer,
            ElementKind::Memo { .. } => VNodeTag::Memo,
            ElementKind::Lazy { .. } => VNodeTag::Lazy,
            ElementKind::Suspense { .. } => VNodeTag::Suspense,
        })
    }

    /// Owns a host node (element or text).
    pub fn is_host(self) -> bool {
        matches!(self, VNodeTag::Host | VNodeTag::Text)
    }

    /// Runs user render code under a tracker.
    pub fn renders(self) -> bool {
        matches!(
            self,
            VNodeTag::Function | VNodeTag::Class | VNodeTag::Memo | VNodeTag::Lazy | VNodeTag::Consumer
        )
    }
}

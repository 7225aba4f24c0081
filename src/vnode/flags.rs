//! Side-effect flags recorded during capture/bubble and consumed by commit.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VNodeFlags: u16 {
        /// Insert (or move) the node's host nodes.
        const ADDITION       = 1 << 0;
        /// Apply pending props or text.
        const UPDATE         = 1 << 1;
        /// Node has children to delete.
        const DELETION       = 1 << 2;
        /// Clear direct text content before children are placed.
        const RESET_TEXT     = 1 << 3;
        /// Attach or swap a `NodeRef`.
        const REF            = 1 << 4;
        /// Run class lifecycles and update callbacks.
        const CALLBACK       = 1 << 5;
        /// An error below was caught this pass.
        const DID_CAPTURE    = 1 << 6;
        /// An error is waiting to be folded into state.
        const SHOULD_CAPTURE = 1 << 7;
        /// Skip `should_component_update`.
        const FORCE_UPDATE   = 1 << 8;
        /// A Suspense boundary is showing its fallback.
        const DID_SUSPEND    = 1 << 9;
        /// `use_effect` hooks to run after commit.
        const EFFECT         = 1 << 10;
    }
}

impl VNodeFlags {
    /// Flags that put a node on the commit effect list.
    pub const COMMIT_WORK: VNodeFlags = VNodeFlags::ADDITION
        .union(VNodeFlags::UPDATE)
        .union(VNodeFlags::DELETION)
        .union(VNodeFlags::RESET_TEXT)
        .union(VNodeFlags::REF)
        .union(VNodeFlags::CALLBACK)
        .union(VNodeFlags::EFFECT);

    /// Flags cleared once commit has applied them.
    pub const TRANSIENT: VNodeFlags = VNodeFlags::COMMIT_WORK
        .union(VNodeFlags::DID_CAPTURE)
        .union(VNodeFlags::FORCE_UPDATE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_work_excludes_state_flags() {
        assert!(VNodeFlags::COMMIT_WORK.contains(VNodeFlags::ADDITION | VNodeFlags::EFFECT));
        assert!(!VNodeFlags::COMMIT_WORK.intersects(VNodeFlags::DID_SUSPEND | VNodeFlags::SHOULD_CAPTURE));
        assert!(!VNodeFlags::TRANSIENT.contains(VNodeFlags::DID_SUSPEND));
    }
}

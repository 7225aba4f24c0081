//! Context stack for a build pass.
//!
//! Capture pushes a frame when it enters a provider, an `svg` /
//! `foreignObject` host or a portal; bubble pops the frames its node
//! pushed. Frames are owned by the pass, so a pass that yields keeps its
//! frames and an aborted pass unwinds them LIFO.

use crate::dom::{DomNode, Namespace};
use crate::reactive::Value;
use crate::vnode::VNodeId;

#[derive(Debug, Clone)]
pub(crate) enum Frame {
    Provider { context: u64, value: Value },
    Namespace(Namespace),
    Portal(DomNode),
}

#[derive(Debug, Default)]
pub struct ContextStack {
    frames: Vec<(VNodeId, Frame)>,
}

impl ContextStack {
    pub(crate) fn push(&mut self, owner: VNodeId, frame: Frame) {
        self.frames.push((owner, frame));
    }

    /// Pop every frame `owner` pushed (they are on top).
    pub(crate) fn pop_owned(&mut self, owner: VNodeId) {
        while matches!(self.frames.last(), Some((o, _)) if *o == owner) {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Pop frames until `depth` remain.
    pub(crate) fn unwind_to(&mut self, depth: usize) {
        while self.frames.len() > depth {
            self.frames.pop();
        }
    }

    /// Innermost provider value for `context`.
    pub fn lookup(&self, context: u64) -> Option<Value> {
        self.frames.iter().rev().find_map(|(_, frame)| match frame {
            Frame::Provider { context: c, value } if *c == context => Some(value.clone()),
            _ => None,
        })
    }

    /// Namespace new host elements are created in.
    pub fn namespace(&self) -> Namespace {
        self.frames
            .iter()
            .rev()
            .find_map(|(_, frame)| match frame {
                Frame::Namespace(ns) => Some(*ns),
                Frame::Portal(_) => Some(Namespace::Html),
                Frame::Provider { .. } => None,
            })
            .unwrap_or_default()
    }

    /// Host container of the innermost portal, if inside one.
    pub fn portal(&self) -> Option<DomNode> {
        self.frames.iter().rev().find_map(|(_, frame)| match frame {
            Frame::Portal(container) => Some(*container),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> VNodeId {
        VNodeId { index, generation: 0 }
    }

    #[test]
    fn test_lookup_innermost_provider() {
        let mut stack = ContextStack::default();
        stack.push(id(1), Frame::Provider { context: 7, value: Value::from("outer") });
        stack.push(id(2), Frame::Provider { context: 7, value: Value::from("inner") });
        assert_eq!(stack.lookup(7), Some(Value::from("inner")));
        stack.pop_owned(id(2));
        assert_eq!(stack.lookup(7), Some(Value::from("outer")));
        assert_eq!(stack.lookup(8), None);
    }

    #[test]
    fn test_namespace_and_unwind() {
        let mut stack = ContextStack::default();
        assert_eq!(stack.namespace(), Namespace::Html);
        stack.push(id(1), Frame::Namespace(Namespace::Svg));
        stack.push(id(2), Frame::Provider { context: 1, value: Value::Null });
        assert_eq!(stack.namespace(), Namespace::Svg);
        stack.unwind_to(0);
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.namespace(), Namespace::Html);
    }

    #[test]
    fn test_pop_owned_leaves_other_frames() {
        let mut stack = ContextStack::default();
        stack.push(id(1), Frame::Portal(DomNode(9)));
        stack.pop_owned(id(2));
        assert_eq!(stack.portal(), Some(DomNode(9)));
    }
}

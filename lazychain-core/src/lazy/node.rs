//! Computation node interface.
//!
//! A node is the machinery behind an unresolved [`Lazy`](super::Lazy) handle:
//! it owns the producer or transform closure, the queue of completion
//! callbacks, and a weak back-edge to the handle it resolves. There are two
//! node kinds, [`RootNode`](super::root::RootNode) wrapping a zero-argument
//! producer and [`MappedNode`](super::mapped::MappedNode) wrapping a
//! transform over another handle's value. Handles drive both through this
//! trait.

use std::rc::Weak;

use super::handle::LazyInner;
use super::queue::CompletionFn;

/// Operations a `Lazy` handle drives on its backing node.
///
/// All three operations assume single-threaded, cooperative use: nothing here
/// is re-entrant except callback registration, which is explicitly allowed
/// while a node is mid-computation.
pub(crate) trait ComputeNode<T: Clone + 'static> {
    /// Attach the owning handle.
    ///
    /// The node keeps only a weak back-edge: the handle owns the node, never
    /// the other way around. Must be called while the node is still pending.
    fn bind(&self, handle: Weak<LazyInner<T>>);

    /// Run this node's computation.
    ///
    /// Must be called at most once, while the node is pending, and only by
    /// the owning handle. Before returning, the node resolves its bound
    /// handle and fires every queued callback with the value. Forcing a node
    /// that is already computing or computed is a contract violation.
    fn force(&self);

    /// Queue a callback to fire when this node resolves.
    ///
    /// Valid while pending or mid-computation. The owning handle
    /// short-circuits registration once it is resolved, so reaching a
    /// terminal node here is a contract violation.
    fn on_completed(&self, callback: CompletionFn<T>);
}

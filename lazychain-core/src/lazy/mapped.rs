//! Mapped node: a deferred transform over another handle's value.
//!
//! A mapped node is created by [`Lazy::map`](super::Lazy::map). It holds the
//! transform closure and weak back-edges to both its owning handle and the
//! source handle it derives from. Neither back-edge is an ownership edge:
//! the derived handle's keep-alive slot is what keeps the source reachable,
//! and the callback `map` installs in the source's queue is what keeps this
//! node alive until the source resolves or fails.
//!
//! # States
//!
//! `Pending → Loading → Loaded`, exactly once, plus a terminal `Unreachable`
//! entered when the source chain is discarded before computing. A mapped
//! node is never forced directly by a consumer: forcing it means forcing the
//! *source handle*, whose completion callback feeds the source value into
//! [`MappedNode::accept`].
//!
//! # Failure propagation
//!
//! Unreachability originates at the root and travels down the chain only
//! through already-registered callbacks: when the source reports failure,
//! `map`'s installed callback calls [`MappedNode::mark_unreachable`], which
//! replays this node's own queue with the failure and cascades to any nodes
//! derived from *this* one. By the time a mapped node is dropped its queue
//! is therefore always empty.

use std::cell::RefCell;
use std::mem;
use std::rc::Weak;

use tracing::trace;

use super::error::Unreachable;
use super::handle::LazyInner;
use super::node::ComputeNode;
use super::queue::{CompletionFn, CompletionQueue};

/// Lifecycle state of a mapped node.
enum MappedState<S: Clone + 'static, T: Clone + 'static> {
    /// Waiting for the source value.
    Pending {
        transform: Box<dyn FnOnce(S) -> T>,
        callbacks: CompletionQueue<T>,
        handle: Weak<LazyInner<T>>,
        source: Weak<LazyInner<S>>,
    },

    /// Transform is running. Must not be re-entered.
    Loading { callbacks: CompletionQueue<T> },

    /// Terminal. The queue has been replayed with the value and discarded.
    Loaded,

    /// Terminal. The source chain was discarded before computing; the queue
    /// has been replayed with a failure and discarded.
    Unreachable,
}

/// A node wrapping a transform function over a source handle's value.
pub(crate) struct MappedNode<S: Clone + 'static, T: Clone + 'static> {
    state: RefCell<MappedState<S, T>>,
}

impl<S: Clone + 'static, T: Clone + 'static> MappedNode<S, T> {
    /// Create a pending mapped node over `source`. The transform does not
    /// run until the source produces a value.
    pub(crate) fn new(
        source: Weak<LazyInner<S>>,
        transform: impl FnOnce(S) -> T + 'static,
    ) -> Self {
        Self {
            state: RefCell::new(MappedState::Pending {
                transform: Box::new(transform),
                callbacks: CompletionQueue::new(),
                handle: Weak::new(),
                source,
            }),
        }
    }

    /// Feed the source's computed value into this node.
    ///
    /// Runs the transform exactly once, resolves the bound handle, and
    /// replays the queue. Called by the completion callback `map` registered
    /// on the source; feeding a node twice is a contract violation.
    pub(crate) fn accept(&self, input: S) {
        let (transform, handle) = {
            let mut state = self.state.borrow_mut();
            match mem::replace(&mut *state, MappedState::Loaded) {
                MappedState::Pending {
                    transform,
                    callbacks,
                    handle,
                    ..
                } => {
                    *state = MappedState::Loading { callbacks };
                    (transform, handle)
                }
                _ => panic!("mapped node fed a source value twice"),
            }
        };

        trace!("applying transform to source value");
        let value = transform(input);

        let callbacks = {
            let mut state = self.state.borrow_mut();
            match mem::replace(&mut *state, MappedState::Loaded) {
                MappedState::Loading { callbacks } => callbacks,
                _ => panic!("mapped node state changed out from under its transform"),
            }
        };

        // Resolve the handle before firing so late registrations from inside
        // a firing callback short-circuit on the handle.
        if let Some(handle) = handle.upgrade() {
            handle.set_resolved(value.clone());
        }
        callbacks.complete(&value);
    }

    /// Report that the source chain was discarded before computing.
    ///
    /// Replays this node's queue with [`Unreachable`], cascading the failure
    /// to any callbacks registered downstream (including the ones installed
    /// by further `map` calls on this node's handle).
    pub(crate) fn mark_unreachable(&self) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            match mem::replace(&mut *state, MappedState::Unreachable) {
                MappedState::Pending { callbacks, .. } => callbacks,
                _ => panic!("mapped node marked unreachable after it started computing"),
            }
        };

        if !callbacks.is_empty() {
            trace!(
                callbacks = callbacks.len(),
                "source chain discarded; reporting unreachable"
            );
        }
        callbacks.fail();
    }
}

impl<S: Clone + 'static, T: Clone + 'static> ComputeNode<T> for MappedNode<S, T> {
    fn bind(&self, handle: Weak<LazyInner<T>>) {
        match &mut *self.state.borrow_mut() {
            MappedState::Pending { handle: slot, .. } => *slot = handle,
            _ => {
                debug_assert!(false, "mapped node bound after it started computing");
            }
        }
    }

    fn force(&self) {
        let source = match &*self.state.borrow() {
            MappedState::Pending { source, .. } => source.upgrade(),
            _ => panic!("mapped node forced more than once"),
        };

        // The owning handle's keep-alive slot holds the source handle
        // strongly for as long as that handle is unresolved, so the weak
        // edge must still be live here.
        let Some(source) = source else {
            panic!("mapped node forced after its source handle was dropped");
        };

        // Driving the source to resolution fires the callback `map` put in
        // its queue, which calls `accept` on this node.
        source.resolve();

        if !matches!(&*self.state.borrow(), MappedState::Loaded) {
            panic!("source resolved without feeding this mapped node");
        }
    }

    fn on_completed(&self, callback: CompletionFn<T>) {
        {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                MappedState::Pending { callbacks, .. } | MappedState::Loading { callbacks } => {
                    callbacks.push(callback);
                    return;
                }
                MappedState::Loaded => {
                    panic!("callback registered on a mapped node that already computed");
                }
                MappedState::Unreachable => {}
            }
        }
        // Unreachable is terminal: fire immediately, mirroring the handle's
        // already-resolved short-circuit on the failure side.
        callback(Err(Unreachable));
    }
}

impl<S: Clone + 'static, T: Clone + 'static> Drop for MappedNode<S, T> {
    fn drop(&mut self) {
        // An unwind from a contract violation tears down nodes in whatever
        // state the panic left them; don't turn that into a double panic.
        if std::thread::panicking() {
            return;
        }
        match self.state.replace(MappedState::Loaded) {
            MappedState::Loaded | MappedState::Unreachable => {}
            MappedState::Loading { .. } => {
                panic!("mapped node dropped while its transform was running");
            }
            MappedState::Pending { callbacks, .. } => {
                // A queued callback implies a live registration against the
                // source, which holds this node strongly; reaching drop with
                // a non-empty queue means that ownership edge was broken.
                debug_assert!(
                    callbacks.is_empty(),
                    "mapped node dropped with callbacks still queued"
                );
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

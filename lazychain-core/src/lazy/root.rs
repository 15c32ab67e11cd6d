//! Root node: a deferred zero-argument producer.
//!
//! A root node sits at the top of every chain. Forcing it runs the producer
//! exactly once, resolves the bound handle, and replays the completion queue.
//!
//! # States
//!
//! `Pending → Loading → Loaded`, forward-only, exactly once:
//!
//! 1. `Pending` holds the producer, the queue, and a weak back-edge to the
//!    owning handle.
//!
//! 2. `Loading` holds only the queue. The producer is running and may itself
//!    register callbacks on this node (no `RefCell` borrow is held across
//!    the call), but re-forcing is fatal.
//!
//! 3. `Loaded` is terminal. The producer, queue, and back-edge are gone.
//!
//! # Unreachability
//!
//! If a root node is dropped while still `Pending` with callbacks queued,
//! nothing can ever produce the value: every queued callback is fired with
//! [`Unreachable`](super::error::Unreachable) before the node is freed.

use std::cell::RefCell;
use std::mem;
use std::rc::Weak;

use tracing::trace;

use super::handle::LazyInner;
use super::node::ComputeNode;
use super::queue::{CompletionFn, CompletionQueue};

/// Lifecycle state of a root node.
enum RootState<T: Clone + 'static> {
    /// Producer not yet asked to run.
    Pending {
        producer: Box<dyn FnOnce() -> T>,
        callbacks: CompletionQueue<T>,
        handle: Weak<LazyInner<T>>,
    },

    /// Producer is running. Must not be re-entered.
    Loading { callbacks: CompletionQueue<T> },

    /// Terminal. The queue has been replayed and discarded.
    Loaded,
}

/// A node wrapping a zero-argument producer function.
pub(crate) struct RootNode<T: Clone + 'static> {
    state: RefCell<RootState<T>>,
}

impl<T: Clone + 'static> RootNode<T> {
    /// Create a pending root node. The producer does not run until the node
    /// is forced.
    pub(crate) fn new(producer: impl FnOnce() -> T + 'static) -> Self {
        Self {
            state: RefCell::new(RootState::Pending {
                producer: Box::new(producer),
                callbacks: CompletionQueue::new(),
                handle: Weak::new(),
            }),
        }
    }
}

impl<T: Clone + 'static> ComputeNode<T> for RootNode<T> {
    fn bind(&self, handle: Weak<LazyInner<T>>) {
        match &mut *self.state.borrow_mut() {
            RootState::Pending { handle: slot, .. } => *slot = handle,
            RootState::Loading { .. } | RootState::Loaded => {
                debug_assert!(false, "root node bound after it started computing");
            }
        }
    }

    fn force(&self) {
        // Take the producer out and release the borrow before running it:
        // the producer may register callbacks on this very node.
        let (producer, handle) = {
            let mut state = self.state.borrow_mut();
            match mem::replace(&mut *state, RootState::Loaded) {
                RootState::Pending {
                    producer,
                    callbacks,
                    handle,
                } => {
                    *state = RootState::Loading { callbacks };
                    (producer, handle)
                }
                RootState::Loading { .. } | RootState::Loaded => {
                    panic!("root node forced more than once");
                }
            }
        };

        trace!("computing root value");
        let value = producer();

        // Re-take the queue: it may have grown while the producer ran.
        let callbacks = {
            let mut state = self.state.borrow_mut();
            match mem::replace(&mut *state, RootState::Loaded) {
                RootState::Loading { callbacks } => callbacks,
                RootState::Pending { .. } | RootState::Loaded => {
                    panic!("root node state changed out from under its producer");
                }
            }
        };

        // Resolve the handle first so callbacks registered from inside a
        // firing callback short-circuit and fire immediately.
        if let Some(handle) = handle.upgrade() {
            handle.set_resolved(value.clone());
        }
        callbacks.complete(&value);
    }

    fn on_completed(&self, callback: CompletionFn<T>) {
        match &mut *self.state.borrow_mut() {
            RootState::Pending { callbacks, .. } | RootState::Loading { callbacks } => {
                callbacks.push(callback);
            }
            RootState::Loaded => {
                panic!("callback registered on a root node that already computed");
            }
        }
    }
}

impl<T: Clone + 'static> Drop for RootNode<T> {
    fn drop(&mut self) {
        // An unwind from a contract violation tears down nodes in whatever
        // state the panic left them; don't turn that into a double panic.
        if std::thread::panicking() {
            return;
        }
        match self.state.replace(RootState::Loaded) {
            RootState::Loaded => {}
            RootState::Loading { .. } => {
                panic!("root node dropped while its producer was running");
            }
            RootState::Pending { callbacks, .. } => {
                if !callbacks.is_empty() {
                    trace!(
                        callbacks = callbacks.len(),
                        "root discarded before computing; reporting unreachable"
                    );
                }
                callbacks.fail();
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy::error::Unreachable;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn force_runs_producer_and_fires_queue() {
        let fired = Rc::new(Cell::new(None));
        let node = RootNode::new(|| 41 + 1);

        let fired_clone = fired.clone();
        node.on_completed(Box::new(move |result| {
            fired_clone.set(Some(result));
        }));

        node.force();
        assert_eq!(fired.get(), Some(Ok(42)));
    }

    #[test]
    fn drop_while_pending_reports_unreachable() {
        let fired = Rc::new(Cell::new(None));
        let node = RootNode::new(|| 1);

        let fired_clone = fired.clone();
        node.on_completed(Box::new(move |result| {
            fired_clone.set(Some(result));
        }));

        drop(node);
        assert_eq!(fired.get(), Some(Err(Unreachable)));
    }

    #[test]
    fn drop_while_loaded_is_silent() {
        let node = RootNode::new(|| 1);
        node.force();
        drop(node);
    }

    #[test]
    fn producer_may_register_callbacks_on_its_own_node() {
        let fired = Rc::new(Cell::new(None));
        let node = Rc::new(RefCell::new(None::<Rc<RootNode<i32>>>));

        let node_slot = node.clone();
        let fired_clone = fired.clone();
        let root = Rc::new(RootNode::new(move || {
            let fired = fired_clone.clone();
            node_slot
                .borrow()
                .as_ref()
                .expect("node installed before forcing")
                .on_completed(Box::new(move |result| {
                    fired.set(Some(result));
                }));
            5
        }));
        *node.borrow_mut() = Some(root.clone());

        root.force();
        assert_eq!(fired.get(), Some(Ok(5)));
    }

    #[test]
    #[should_panic(expected = "forced more than once")]
    fn forcing_twice_is_fatal() {
        let node = RootNode::new(|| 1);
        node.force();
        node.force();
    }

    #[test]
    #[should_panic(expected = "already computed")]
    fn registering_on_loaded_node_is_fatal() {
        let node = RootNode::new(|| 1);
        node.force();
        node.on_completed(Box::new(|_| {}));
    }
}

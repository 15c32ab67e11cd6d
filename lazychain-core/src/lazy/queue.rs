//! Completion queue for callbacks awaiting a node's result.
//!
//! Each node keeps one queue per non-terminal state. Callbacks are replayed
//! in registration order, exactly once, at the moment the node resolves
//! (successfully or as unreachable). The queue is consumed by the replay:
//! a fired callback cannot fire again.

use smallvec::SmallVec;

use super::error::{LazyResult, Unreachable};

/// A single-shot completion callback.
///
/// Callbacks receive either the computed value or [`Unreachable`]. They are
/// boxed `FnOnce` so a callback can move captured state out when it fires.
pub(crate) type CompletionFn<T> = Box<dyn FnOnce(LazyResult<T>)>;

/// Ordered list of pending callbacks awaiting a result.
///
/// Most nodes accumulate zero or one callback before resolving (the one
/// installed by `map`), so the storage is inline up to two entries.
pub(crate) struct CompletionQueue<T> {
    callbacks: SmallVec<[CompletionFn<T>; 2]>,
}

impl<T: Clone> CompletionQueue<T> {
    /// Create an empty queue.
    pub(crate) fn new() -> Self {
        Self {
            callbacks: SmallVec::new(),
        }
    }

    /// Append a callback. It will fire when the owning node resolves.
    pub(crate) fn push(&mut self, callback: CompletionFn<T>) {
        self.callbacks.push(callback);
    }

    /// Whether any callbacks are queued.
    pub(crate) fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Number of queued callbacks.
    pub(crate) fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Fire every queued callback with a clone of `value`, in registration
    /// order, consuming the queue.
    pub(crate) fn complete(self, value: &T) {
        for callback in self.callbacks {
            callback(Ok(value.clone()));
        }
    }

    /// Fire every queued callback with [`Unreachable`], in registration
    /// order, consuming the queue.
    pub(crate) fn fail(self) {
        for callback in self.callbacks {
            callback(Err(Unreachable));
        }
    }
}

impl<T> std::fmt::Debug for CompletionQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionQueue")
            .field("len", &self.callbacks.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

//! Lazy handle: the public face of a deferred value.
//!
//! A [`Lazy`] owns its backing node strongly until the value is computed,
//! then drops it and keeps only the value. For a derived handle the
//! non-terminal states also carry a keep-alive edge to the source handle,
//! which is what guarantees the source stays reachable for as long as this
//! handle might still need to force it. Both edges are released on the
//! transition to `Resolved`, so a long `map` chain collapses to O(1)
//! storage per resolved handle.
//!
//! # States
//!
//! `Unresolved → Resolving → Resolved`, forward-only:
//!
//! 1. `Unresolved`: the node has not been asked to compute.
//!
//! 2. `Resolving`: the node is computing. Reading `value` again from here is
//!    a re-entrant read (a cycle or a bug) and is fatal.
//!
//! 3. `Resolved`: terminal. Only the value remains.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

use super::error::LazyResult;
use super::mapped::MappedNode;
use super::node::ComputeNode;
use super::queue::CompletionFn;
use super::root::RootNode;

/// Lifecycle state of a handle.
enum HandleState<T: Clone + 'static> {
    /// Node not yet asked to compute. `keep_alive` pins the source handle of
    /// a derived chain for as long as it might still be needed.
    Unresolved {
        node: Rc<dyn ComputeNode<T>>,
        keep_alive: Option<Rc<dyn Any>>,
    },

    /// Compute in progress on the node.
    Resolving {
        node: Rc<dyn ComputeNode<T>>,
        /// Ownership pin only: carried so the source handle stays alive
        /// across the compute, never read.
        #[allow(dead_code)]
        keep_alive: Option<Rc<dyn Any>>,
    },

    /// Terminal. The node, its closure, and the upstream chain are released.
    Resolved(T),
}

impl<T: Clone + 'static> HandleState<T> {
    fn name(&self) -> &'static str {
        match self {
            HandleState::Unresolved { .. } => "unresolved",
            HandleState::Resolving { .. } => "resolving",
            HandleState::Resolved(_) => "resolved",
        }
    }
}

/// Shared interior of a [`Lazy`] handle.
///
/// Nodes hold this behind `Weak` back-edges; the public handle (and a
/// derived handle's keep-alive slot) are the only strong holders.
pub(crate) struct LazyInner<T: Clone + 'static> {
    state: RefCell<HandleState<T>>,
}

impl<T: Clone + 'static> LazyInner<T> {
    /// Wrap a fresh node in an unresolved inner and bind the node to it.
    fn from_node(node: Rc<dyn ComputeNode<T>>, keep_alive: Option<Rc<dyn Any>>) -> Rc<Self> {
        let inner = Rc::new(Self {
            state: RefCell::new(HandleState::Unresolved {
                node: Rc::clone(&node),
                keep_alive,
            }),
        });
        node.bind(Rc::downgrade(&inner));
        inner
    }

    /// Drive this handle to `Resolved`, forcing the node if needed.
    ///
    /// Idempotent once resolved. Panics on a re-entrant read, and if the
    /// node returns from `force` without having resolved this handle.
    pub(crate) fn resolve(self: &Rc<Self>) {
        let node = {
            let mut state = self.state.borrow_mut();
            match &*state {
                HandleState::Resolved(_) => return,
                HandleState::Resolving { .. } => {
                    panic!("re-entrant read of a lazy value that is already computing");
                }
                HandleState::Unresolved { node, keep_alive } => {
                    let node = Rc::clone(node);
                    let keep_alive = keep_alive.clone();
                    *state = HandleState::Resolving {
                        node: Rc::clone(&node),
                        keep_alive,
                    };
                    node
                }
            }
        };

        node.force();

        // Nodes resolve their bound handle synchronously, before returning.
        if !matches!(&*self.state.borrow(), HandleState::Resolved(_)) {
            panic!("lazy node finished computing without resolving its handle");
        }
    }

    /// Read the value, computing it on first access.
    pub(crate) fn value(self: &Rc<Self>) -> T {
        self.resolve();
        match &*self.state.borrow() {
            HandleState::Resolved(value) => value.clone(),
            _ => unreachable!("resolve() leaves the handle resolved"),
        }
    }

    /// The value if already computed; never triggers computation.
    pub(crate) fn current_value(&self) -> Option<T> {
        match &*self.state.borrow() {
            HandleState::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Push the computed value into this handle. Called by the bound node,
    /// exactly once, before it fires its completion queue.
    pub(crate) fn set_resolved(&self, value: T) {
        let previous = {
            let mut state = self.state.borrow_mut();
            if matches!(&*state, HandleState::Resolved(_)) {
                debug_assert!(false, "lazy handle resolved twice");
                return;
            }
            mem::replace(&mut *state, HandleState::Resolved(value))
        };
        // Dropped outside the borrow: releasing the node and the keep-alive
        // edge can tear down an upstream chain whose destructors fire
        // callbacks.
        drop(previous);
    }

    /// Register a completion callback: fire immediately if resolved,
    /// otherwise queue it on the node. Never forces computation.
    pub(crate) fn on_completed(&self, callback: CompletionFn<T>) {
        enum Target<T: Clone + 'static> {
            Immediate(T),
            Node(Rc<dyn ComputeNode<T>>),
        }

        let target = match &*self.state.borrow() {
            HandleState::Resolved(value) => Target::Immediate(value.clone()),
            HandleState::Unresolved { node, .. } | HandleState::Resolving { node, .. } => {
                Target::Node(Rc::clone(node))
            }
        };

        match target {
            Target::Immediate(value) => callback(Ok(value)),
            Target::Node(node) => node.on_completed(callback),
        }
    }

    fn state_name(&self) -> &'static str {
        self.state.borrow().name()
    }
}

/// A single-assignment lazy value.
///
/// The value is computed on first read of [`value`](Lazy::value) and
/// memoized forever after; the producer or transform behind it runs exactly
/// once. Cloning a handle shares the underlying value, and derived handles
/// created with [`map`](Lazy::map) force their whole source chain on first
/// read.
///
/// # Example
///
/// ```
/// use lazychain_core::Lazy;
///
/// let root = Lazy::new(|| 7);
/// let derived = root.map(|x| x + 1);
///
/// assert_eq!(derived.value(), 8);
/// assert_eq!(root.value(), 7);
/// ```
pub struct Lazy<T: Clone + 'static> {
    inner: Rc<LazyInner<T>>,
}

impl<T: Clone + 'static> Lazy<T> {
    /// Create a lazy value from a producer function.
    ///
    /// The producer does not run until the first read of `value` anywhere in
    /// the chain hanging off this handle.
    pub fn new(producer: impl FnOnce() -> T + 'static) -> Self {
        let node: Rc<dyn ComputeNode<T>> = Rc::new(RootNode::new(producer));
        Self {
            inner: LazyInner::from_node(node, None),
        }
    }

    /// Read the value, computing it on first access.
    ///
    /// Forcing a derived handle drives its whole source chain to completion:
    /// recursion up to the nearest root, then results converted back down
    /// the chain, firing each node's queued callbacks as it resolves.
    ///
    /// # Panics
    ///
    /// Panics on a re-entrant read, i.e. when the computation behind this
    /// handle reads this handle's own value.
    pub fn value(&self) -> T {
        self.inner.value()
    }

    /// The value if already computed, `None` otherwise. Never computes.
    pub fn current_value(&self) -> Option<T> {
        self.inner.current_value()
    }

    /// Derive a new lazy value by transforming this one.
    ///
    /// Nothing is computed by the call itself. The transform runs exactly
    /// once, when this handle resolves — whether that resolution is forced
    /// through the derived handle or through this one. The derived handle
    /// keeps this one alive until it resolves.
    pub fn map<U, F>(&self, transform: F) -> Lazy<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        let node = Rc::new(MappedNode::new(Rc::downgrade(&self.inner), transform));

        // Bind the derived handle before registering on the source, so that
        // mapping an already-resolved source resolves the new handle right
        // here, inside the immediate callback.
        let derived = Lazy {
            inner: LazyInner::from_node(
                Rc::clone(&node) as Rc<dyn ComputeNode<U>>,
                Some(Rc::clone(&self.inner) as Rc<dyn Any>),
            ),
        };

        // This registration is the only strong holder of the mapped node
        // besides the derived handle itself: the source's queue keeps the
        // node alive until the source resolves or fails.
        self.inner.on_completed(Box::new(move |result| match result {
            Ok(value) => node.accept(value),
            Err(_) => node.mark_unreachable(),
        }));

        derived
    }

    /// Register a callback fired with the computed value, or with
    /// [`Unreachable`](super::Unreachable) if the chain is discarded before
    /// ever computing.
    ///
    /// If the value is already computed the callback fires immediately and
    /// synchronously, before this call returns. Otherwise it fires later,
    /// synchronously, from within whichever call causes resolution.
    /// Registering never forces computation.
    pub fn on_completed(&self, callback: impl FnOnce(LazyResult<T>) + 'static) {
        self.inner.on_completed(Box::new(callback));
    }

    /// Success-only convenience over [`on_completed`](Lazy::on_completed):
    /// fires with the computed value and silently drops unreachability.
    pub fn on_loaded(&self, callback: impl FnOnce(T) + 'static) {
        self.on_completed(move |result| {
            if let Ok(value) = result {
                callback(value);
            }
        });
    }
}

impl<T: Clone + 'static> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + fmt::Debug + 'static> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("state", &self.inner.state_name())
            .field("current_value", &self.current_value())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy::error::Unreachable;
    use std::cell::{Cell, RefCell};

    #[test]
    fn creating_a_handle_does_not_run_the_producer() {
        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();
        let lazy = Lazy::new(move || {
            ran_clone.set(true);
            1
        });

        assert!(!ran.get());
        assert_eq!(lazy.current_value(), None);
        assert!(!ran.get());
    }

    #[test]
    fn value_is_memoized_and_producer_runs_once() {
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let lazy = Lazy::new(move || {
            runs_clone.set(runs_clone.get() + 1);
            42
        });

        let first = lazy.value();
        for _ in 0..1000 {
            assert_eq!(lazy.value(), first);
        }
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn current_value_reflects_resolution() {
        let lazy = Lazy::new(|| 9);
        assert_eq!(lazy.current_value(), None);
        assert_eq!(lazy.value(), 9);
        assert_eq!(lazy.current_value(), Some(9));
    }

    #[test]
    fn clone_shares_the_resolved_value() {
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let first = Lazy::new(move || {
            runs_clone.set(runs_clone.get() + 1);
            3
        });
        let second = first.clone();

        assert_eq!(first.value(), 3);
        assert_eq!(second.value(), 3);
        assert_eq!(second.current_value(), Some(3));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn map_does_not_run_producer_or_transform() {
        let ran = Rc::new(Cell::new(false));
        let ran_producer = ran.clone();
        let ran_transform = ran.clone();

        let root = Lazy::new(move || {
            ran_producer.set(true);
            1
        });
        let derived = root.map(move |x| {
            ran_transform.set(true);
            x + 1
        });

        assert!(!ran.get());
        assert_eq!(derived.current_value(), None);
    }

    #[test]
    fn transform_runs_once_even_when_source_is_read_first() {
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();

        let root = Lazy::new(|| false);
        let derived = root.map(move |x| {
            runs_clone.set(runs_clone.get() + 1);
            !x
        });

        // Reading the source resolves the derived node through the callback
        // installed by `map`.
        let _ = root.value();
        assert_eq!(runs.get(), 1);
        let _ = root.value();
        assert_eq!(runs.get(), 1);
        assert_eq!(derived.value(), true);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn mapping_an_already_resolved_source_resolves_eagerly() {
        let root = Lazy::new(|| 10);
        assert_eq!(root.value(), 10);

        let derived = root.map(|x| x * 10);
        assert_eq!(derived.current_value(), Some(100));
        assert_eq!(derived.value(), 100);
    }

    #[test]
    fn deep_chain_forces_up_to_the_root_and_back() {
        let root = Lazy::new(|| 1);
        let chained = root.map(|x| x + 1).map(|x| x * 10).map(|x| x - 2);
        assert_eq!(chained.value(), 18);
        assert_eq!(root.current_value(), Some(1));
    }

    #[test]
    fn resolving_releases_the_node() {
        let lazy = Lazy::new(|| 1);
        let node = match &*lazy.inner.state.borrow() {
            HandleState::Unresolved { node, .. } => Rc::downgrade(node),
            _ => unreachable!(),
        };

        assert!(node.upgrade().is_some());
        assert_eq!(lazy.value(), 1);
        assert!(node.upgrade().is_none());
    }

    #[test]
    fn resolving_a_derived_handle_releases_the_upstream_chain() {
        let root = Lazy::new(|| 1);
        let root_inner = Rc::downgrade(&root.inner);
        let derived = root.map(|x| x + 1);

        // The derived handle's keep-alive slot is now the only strong holder.
        drop(root);
        assert!(root_inner.upgrade().is_some());

        assert_eq!(derived.value(), 2);
        assert!(root_inner.upgrade().is_none());
    }

    #[test]
    fn dropping_the_source_handle_is_fine_while_derived_lives() {
        let root = Lazy::new(|| 1);
        let fired_root = Rc::new(Cell::new(None));
        let fired_root_clone = fired_root.clone();
        root.on_loaded(move |v| fired_root_clone.set(Some(v)));

        let derived = root.map(|x| format!("{}", x + 1));
        let fired_derived = Rc::new(RefCell::new(None));
        let fired_derived_clone = fired_derived.clone();
        derived.on_loaded(move |v| *fired_derived_clone.borrow_mut() = Some(v));

        drop(root);
        assert_eq!(derived.value(), "2");
        assert_eq!(fired_root.get(), Some(1));
        assert_eq!(*fired_derived.borrow(), Some("2".to_string()));
    }

    #[test]
    fn dropping_the_derived_handle_is_fine_while_source_lives() {
        let root = Lazy::new(|| 1);
        let fired = Rc::new(RefCell::new(None));
        let fired_clone = fired.clone();

        // The derived handle is dropped immediately; the callback `map`
        // registered on the source keeps the mapped node reachable.
        root.map(|x| format!("{}", x + 1))
            .on_loaded(move |v| *fired_clone.borrow_mut() = Some(v));

        let _ = root.value();
        assert_eq!(*fired.borrow(), Some("2".to_string()));
    }

    #[test]
    fn dropping_the_whole_chain_reports_unreachable_everywhere() {
        let fired_root = Rc::new(Cell::new(None));
        let fired_derived = Rc::new(Cell::new(None));

        let root = Lazy::new(|| 1);
        let fired_root_clone = fired_root.clone();
        root.on_completed(move |result| fired_root_clone.set(Some(result)));

        let derived = root.map(|x| x + 1);
        let fired_derived_clone = fired_derived.clone();
        derived.on_completed(move |result| fired_derived_clone.set(Some(result)));

        drop(root);
        assert_eq!(fired_root.get(), None);
        drop(derived);

        assert_eq!(fired_root.get(), Some(Err(Unreachable)));
        assert_eq!(fired_derived.get(), Some(Err(Unreachable)));
    }

    #[test]
    fn on_loaded_silently_drops_unreachable() {
        let fired = Rc::new(Cell::new(false));
        let fired_clone = fired.clone();

        let root: Lazy<i32> = Lazy::new(|| 1);
        root.on_loaded(move |_| fired_clone.set(true));
        drop(root);

        assert!(!fired.get());
    }

    #[test]
    #[should_panic(expected = "re-entrant read")]
    fn reentrant_value_read_is_fatal() {
        let slot: Rc<RefCell<Option<Lazy<i32>>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();

        let lazy = Lazy::new(move || {
            slot_clone
                .borrow()
                .as_ref()
                .expect("handle installed before forcing")
                .value()
        });
        *slot.borrow_mut() = Some(lazy.clone());

        let _ = lazy.value();
    }
}

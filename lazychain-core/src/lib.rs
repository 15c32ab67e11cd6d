//! Lazychain Core
//!
//! This crate provides a single-assignment lazy value primitive:
//!
//! - Deferred computation: nothing runs until the first read of `value`
//! - Memoization: the producer or transform behind a handle runs exactly once
//! - Derivation: `map` builds chains of lazy values forced transitively
//! - Completion callbacks, replayed in registration order exactly once
//! - Eager reclamation: a resolved handle holds only its value; closures,
//!   intermediate nodes, and the upstream chain are released as soon as
//!   they are no longer needed, with no reference cycles
//!
//! The crate is single-threaded and cooperative: all operations are
//! synchronous calls, and forcing a chain is plain call-stack recursion.
//!
//! # Example
//!
//! ```
//! use lazychain_core::Lazy;
//!
//! let root = Lazy::new(|| 7);
//! let derived = root.map(|x| x + 1);
//!
//! // Nothing has computed yet.
//! assert_eq!(root.current_value(), None);
//!
//! // Reading the derived value forces the chain up to the root and back.
//! assert_eq!(derived.value(), 8);
//! assert_eq!(root.value(), 7);
//! ```

pub mod lazy;

pub use lazy::{Lazy, LazyResult, Unreachable};

//! Lazy Value Primitives
//!
//! This module implements the single-assignment lazy value: a handle that
//! defers computing a value until first access, memoizes the result forever
//! after, and supports deriving new lazy values by transformation.
//!
//! # Concepts
//!
//! ## Handles
//!
//! A [`Lazy`] is the public-facing object. It owns its backing node strongly
//! until the value is computed, then drops the node and keeps only the
//! value. Reading `value` on any handle in a chain forces exactly the chain
//! needed: recursion up to the nearest root, then results converted back
//! down through each transform.
//!
//! ## Nodes
//!
//! Behind every unresolved handle sits a computation node: a root node
//! wrapping a zero-argument producer, or a mapped node wrapping a transform
//! and a weak back-reference to its source handle. A node computes exactly
//! once, resolves its handle, and replays its completion queue in
//! registration order.
//!
//! ## Ownership
//!
//! The edges are arranged so that nothing cycles and everything is released
//! as soon as it can be:
//!
//! - handle → node: strong, dropped on resolution
//! - derived handle → source handle: strong, via the keep-alive slot, only
//!   while the derived handle is unresolved
//! - node → handles (owning and source): weak back-edges, functional only
//! - source's completion queue → derived node: strong, until the source
//!   resolves or fails
//!
//! If a root is discarded before anything forced it, every callback queued
//! anywhere in the chain receives [`Unreachable`] through those same queue
//! edges, exactly once.

mod error;
mod handle;
mod mapped;
mod node;
mod queue;
mod root;

pub use error::{LazyResult, Unreachable};
pub use handle::Lazy;

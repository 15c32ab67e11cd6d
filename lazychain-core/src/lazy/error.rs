//! Error types for the lazy value system.
//!
//! There is exactly one recoverable error: [`Unreachable`]. Everything else
//! that can go wrong (forcing a node twice, re-entrant reads, a node dropped
//! mid-computation) is a broken contract in the calling code or in this
//! implementation, and is reported with a panic rather than a typed error.

use thiserror::Error;

/// The value a callback was waiting on can provably never be produced.
///
/// Delivered when the root computation of a chain is discarded before it
/// ever ran: the owning handle and every derived handle were dropped without
/// any read of `value`, so nothing will ever compute the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("lazy value became unreachable before it was computed")]
pub struct Unreachable;

/// Result delivered to completion callbacks.
pub type LazyResult<T> = Result<T, Unreachable>;

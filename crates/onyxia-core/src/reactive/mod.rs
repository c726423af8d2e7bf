//! # Reactive Primitives for Selectors
//!
//! - [`Memo<I, O>`]: a memoized pure derivation. Structurally equal inputs
//!   yield the same `Arc<O>`, which lets view-model consumers skip work.
//!
//! Selectors compose by feeding the output of cheap input selectors (plain
//! reads of slice state) into a `Memo`, so unrelated state changes leave the
//! cached view model untouched.

mod memo;

pub use memo::Memo;

//! Memo<I, O> - a memoized derivation for selectors
//!
//! A `Memo` wraps a pure derivation `Fn(&I) -> O` and remembers the last
//! input and output. Calling it with an input structurally equal to the
//! cached one returns the *same* `Arc<O>`, so consumers can compare view
//! models with `Arc::ptr_eq` and skip re-rendering.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct MemoCache<I, O> {
    input: I,
    output: Arc<O>,
}

/// A single-entry memoization cache around a pure derivation.
///
/// # Example
///
/// ```rust
/// use onyxia_core::reactive::Memo;
/// use std::sync::Arc;
///
/// let total = Memo::new(|xs: &Vec<u32>| xs.iter().sum::<u32>());
/// let a = total.get(vec![1, 2, 3]);
/// let b = total.get(vec![1, 2, 3]);
/// assert_eq!(*a, 6);
/// assert!(Arc::ptr_eq(&a, &b));
/// ```
pub struct Memo<I, O> {
    derive: Box<dyn Fn(&I) -> O + Send + Sync>,
    cache: Mutex<Option<MemoCache<I, O>>>,
    recomputations: AtomicU64,
}

impl<I, O> Memo<I, O>
where
    I: PartialEq + Send,
    O: Send + Sync,
{
    /// Wrap a pure derivation.
    pub fn new<F>(derive: F) -> Self
    where
        F: Fn(&I) -> O + Send + Sync + 'static,
    {
        Self {
            derive: Box::new(derive),
            cache: Mutex::new(None),
            recomputations: AtomicU64::new(0),
        }
    }

    /// Return the derived value for `input`, recomputing only when `input`
    /// differs from the cached input.
    pub fn get(&self, input: I) -> Arc<O> {
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.as_ref() {
            if cached.input == input {
                return cached.output.clone();
            }
        }
        let output = Arc::new((self.derive)(&input));
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        *cache = Some(MemoCache {
            input,
            output: output.clone(),
        });
        output
    }

    /// Number of times the derivation actually ran.
    pub fn recomputations(&self) -> u64 {
        self.recomputations.load(Ordering::Relaxed)
    }

    /// Drop the cached entry.
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }
}

impl<I, O> fmt::Debug for Memo<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("recomputations", &self.recomputations.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_share_output() {
        let memo = Memo::new(|s: &String| s.len());
        let a = memo.get("abc".to_string());
        let b = memo.get("abc".to_string());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(memo.recomputations(), 1);
    }

    #[test]
    fn changed_input_recomputes() {
        let memo = Memo::new(|n: &u32| n * 2);
        assert_eq!(*memo.get(2), 4);
        assert_eq!(*memo.get(3), 6);
        assert_eq!(memo.recomputations(), 2);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let memo = Memo::new(|n: &u32| n + 1);
        let a = memo.get(1);
        memo.invalidate();
        let b = memo.get(1);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
    }
}

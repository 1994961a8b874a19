//! Cooperative cancellation (spec.md §4.3, §5): a cheap, cloneable flag
//! checked between GLL descriptors, at scanner positions, at
//! rule-compilation steps, and before each fallback regex call, so a
//! caller running CDTk on a worker thread can ask a long parse/compile/
//! scan to stop early without tearing down the thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A flag shared between the thread driving `parse`/`tokenize`/`compile`
/// and whichever caller decides to cancel it. Cloning shares the same
/// underlying flag; a fresh [`CancellationToken::new`] (or its
/// [`Default`]) starts out not cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
  cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
  pub fn new() -> Self {
    Self { cancelled: Arc::new(AtomicBool::new(false)) }
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn starts_uncancelled_and_latches_once_cancelled() {
    let token = CancellationToken::new();
    assert!(!token.is_cancelled());
    token.cancel();
    assert!(token.is_cancelled());
  }

  #[test]
  fn clones_share_the_same_flag() {
    let token = CancellationToken::new();
    let clone = token.clone();
    clone.cancel();
    assert!(token.is_cancelled(), "cancelling a clone must be visible through the original");
  }
}

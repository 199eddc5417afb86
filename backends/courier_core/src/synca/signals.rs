use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Indicates the underlying signal to be set.
const SET: usize = 1;

/// Indicates the underlying signal was not set.
const UNSET: usize = 0;

/// `OnSignal` is a flag that can be flipped from UNSET to SET exactly once
/// observably, every later `turn_on` returns false.
#[derive(Debug)]
pub struct OnSignal {
    state: AtomicUsize,
}

impl Default for OnSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl OnSignal {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicUsize::new(UNSET),
        }
    }

    /// turn_on flip the state from UNSET to SET, returning true only for the
    /// call that did the flip.
    #[inline]
    pub fn turn_on(&self) -> bool {
        self.state
            .compare_exchange(UNSET, SET, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    /// probe returns true when the state is SET else false.
    #[inline]
    pub fn probe(&self) -> bool {
        self.state.load(Ordering::Acquire) == SET
    }
}

/// `CancelSignal` is a shareable cancellation token. Clones observe the same
/// flag, while [`CancelSignal::derive`] creates a child that is cancelled
/// whenever its parent is, without cancelling the parent itself.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    own: Arc<OnSignal>,
    parents: Vec<CancelSignal>,
}

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `derive` returns a child signal bound to this one's lifecycle.
    #[must_use]
    pub fn derive(&self) -> Self {
        Self {
            own: Arc::new(OnSignal::new()),
            parents: vec![self.clone()],
        }
    }

    /// `joined` returns a child cancelled as soon as either this signal or
    /// `other` is.
    #[must_use]
    pub fn joined(&self, other: &CancelSignal) -> Self {
        Self {
            own: Arc::new(OnSignal::new()),
            parents: vec![self.clone(), other.clone()],
        }
    }

    /// Fires the signal, returns false if it had already fired.
    pub fn cancel(&self) -> bool {
        self.own.turn_on()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.own.probe() {
            return true;
        }
        self.parents.iter().any(CancelSignal::is_cancelled)
    }
}

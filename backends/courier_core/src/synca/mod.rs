use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod mpp;
mod signals;

pub use signals::*;

/// `recover_lock` takes the guard even if a previous holder panicked.
pub(crate) fn recover_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use serde::{Deserialize, Serialize};

/// How a second sender is treated while the transmit path is busy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimMode {
    /// Fail immediately.
    #[default]
    Flag,
    /// Block until the current sender finishes.
    ///
    /// Must not be used when a transport write can re-enter the same engine
    /// and send from that thread.
    Lock,
}

/// Single-writer guard around the transmit state.
#[derive(Debug)]
pub struct ExclusiveClaim<T> {
    mode: ClaimMode,
    inner: Mutex<T>,
}

impl<T> ExclusiveClaim<T> {
    pub fn new(mode: ClaimMode, value: T) -> Self {
        Self {
            mode,
            inner: Mutex::new(value),
        }
    }

    pub fn mode(&self) -> ClaimMode {
        self.mode
    }

    /// Take the claim. Returns `None` in `Flag` mode if it is already held.
    ///
    /// A claim abandoned by a panicking holder is recovered.
    pub fn acquire(&self) -> Option<ClaimGuard<'_, T>> {
        let guard = match self.mode {
            ClaimMode::Flag => match self.inner.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return None,
            },
            ClaimMode::Lock => self.inner.lock().unwrap_or_else(PoisonError::into_inner),
        };
        Some(ClaimGuard(guard))
    }
}

/// Held transmit claim. Released on drop.
pub struct ClaimGuard<'a, T>(MutexGuard<'a, T>);

impl<T> Deref for ClaimGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for ClaimGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

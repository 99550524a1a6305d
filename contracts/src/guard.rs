//! # Reentrancy Latch
//!
//! Two pieces, held together for the whole of one externally-triggered
//! operation:
//!
//! - an admission lock. Callers on other threads queue on it and run one
//!   after another. It is re-entrant, so a call made from inside an
//!   operation (on the same thread, typically from the settlement callback)
//!   passes straight through to the flag below;
//! - the flag itself. Entering while it is set fails immediately with
//!   [`BankError::ReentrancyRejected`]. Only nested calls can ever see it
//!   set, since every other caller is still waiting for admission.
//!
//! Both are released by [`LatchGuard`]'s `Drop`, so every exit path
//! (success, early `?` return, panic unwinding) clears them.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

use crate::error::{BankError, BankResult};

/// The latch itself.
#[derive(Debug)]
pub struct ReentrancyGuard {
    admission: ReentrantMutex<()>,
    entered: AtomicBool,
}

impl Default for ReentrancyGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ReentrancyGuard {
    /// Creates an open latch.
    pub fn new() -> Self {
        Self {
            admission: ReentrantMutex::new(()),
            entered: AtomicBool::new(false),
        }
    }

    /// Waits for admission, then acquires the flag.
    ///
    /// Blocks while another thread holds the latch. Fails without blocking
    /// if the calling thread already holds it.
    pub fn enter(&self) -> BankResult<LatchGuard<'_>> {
        let admitted = self.admission.lock();
        self.entered
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| {
                tracing::warn!("reentrant call rejected");
                BankError::ReentrancyRejected
            })?;
        Ok(LatchGuard {
            latch: self,
            _admitted: admitted,
        })
    }

    /// Returns `true` while an operation is in flight.
    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }
}

/// Scoped hold on a [`ReentrancyGuard`]. Releases on drop.
///
/// The flag is cleared first; the admission lock is released afterwards,
/// when the field drops.
#[must_use = "the latch is released as soon as the guard is dropped"]
pub struct LatchGuard<'a> {
    latch: &'a ReentrancyGuard,
    _admitted: ReentrantMutexGuard<'a, ()>,
}

impl std::fmt::Debug for LatchGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatchGuard")
            .field("entered", &self.latch.is_entered())
            .finish()
    }
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.latch.entered.store(false, Ordering::Release);
    }
}

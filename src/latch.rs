//! This module provides the small set of blocking primitives the runner is
//! built on, called latches.
//!
//! In the abstract, a latch is a way to block some logic from progressing on a
//! given thread. All latches begin "closed", blocking some logic. When the
//! latch is "opened", the logic progresses.
//!
//! [`Latch`] represents the "write-side" of the api. It defines a single
//! function, [`Latch::set`], which opens the latch.
//!
//! [`Probe`] represents the "read-side" of the api, which allows consumers to
//! test if a latch is open without blocking. The runner uses a probe as its
//! cancellation signal: see [`Runner::run_cancellable`].
//!
//! Unlike latches used inside a work-stealing pool, these are always owned
//! (usually behind an `Arc`) for at least as long as anyone can set them, so
//! `set` takes `&self`.
//!
//! [`Runner::run_cancellable`]: crate::runner::Runner::run_cancellable

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

// -----------------------------------------------------------------------------
// Latches and probes

/// This trait represents the "write-side" of the latch api.
pub trait Latch {
    /// Opens the latch. Opening an already open latch does nothing.
    fn set(&self);
}

/// This trait represents the "read-side" of the latch api.
pub trait Probe {
    /// Returns `true` if the latch is open, and `false` if it is closed.
    fn probe(&self) -> bool;
}

impl<L: Probe + ?Sized> Probe for std::sync::Arc<L> {
    #[inline]
    fn probe(&self) -> bool {
        (**self).probe()
    }
}

// -----------------------------------------------------------------------------
// Atomic latch

/// A simple latch implemented using an atomic bool. This is the natural
/// cancellation flag: set it from a signal handler or a supervising thread and
/// pass it to [`Runner::run_cancellable`].
///
/// [`Runner::run_cancellable`]: crate::runner::Runner::run_cancellable
#[derive(Debug)]
pub struct AtomicLatch {
    /// The state of the latch, `true` for open and `false` for closed.
    state: AtomicBool,
}

impl AtomicLatch {
    /// Creates a new closed latch.
    #[inline]
    pub const fn new() -> Self {
        Self {
            state: AtomicBool::new(false),
        }
    }

    /// Resets the latch back to closed.
    #[inline]
    pub fn reset(&self) {
        self.state.store(false, Ordering::Release);
    }
}

impl Default for AtomicLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch for AtomicLatch {
    #[inline]
    fn set(&self) {
        self.state.store(true, Ordering::Release);
    }
}

impl Probe for AtomicLatch {
    #[inline]
    fn probe(&self) -> bool {
        self.state.load(Ordering::Acquire)
    }
}

// -----------------------------------------------------------------------------
// Mutex-lock latch

/// A latch that can be used to block a thread, implemented using a mutex.
/// Thread units open one of these when their body returns or unwinds.
#[derive(Debug)]
pub struct LockLatch {
    mutex: Mutex<bool>,
    cond: Condvar,
}

impl LockLatch {
    /// Creates a new closed latch.
    #[inline]
    pub const fn new() -> LockLatch {
        LockLatch {
            mutex: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Waits for the latch to open by blocking the thread.
    pub fn wait(&self) {
        let mut guard = self.mutex.lock();
        while !*guard {
            self.cond.wait(&mut guard);
        }
    }

    /// Waits at most `timeout` for the latch to open. Returns `true` if the
    /// latch is open on return.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.mutex.lock();
        while !*guard {
            if self.cond.wait_until(&mut guard, deadline).timed_out() {
                return *guard;
            }
        }
        true
    }
}

impl Default for LockLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch for LockLatch {
    fn set(&self) {
        let mut guard = self.mutex.lock();
        *guard = true;
        self.cond.notify_all();
    }
}

impl Probe for LockLatch {
    fn probe(&self) -> bool {
        *self.mutex.lock()
    }
}

//! Recursive sleep lock.
//!
//! A binary semaphore plus owner tracking. The same task may acquire the
//! lock any number of times and must release it as many; a different task
//! sleeps on the semaphore until the owner lets go. Unlike the semaphore
//! primitives, `acquire` and `release` do not run with interrupts
//! globally disabled — only the semaphore operations inside them do.

use core::{cell::Cell, ptr};

use crate::{sched, sched::task::Task, sync::semaphore::Semaphore};

/// A recursive mutual-exclusion lock for code that may block.
///
/// Address-sensitive like its embedded semaphore: call
/// [`SleepLock::init`] once placed, and never move it afterwards.
pub struct SleepLock {
    owner: Cell<*mut Task>,
    recursion: Cell<u32>,
    semaphore: Semaphore,
}

// SAFETY: owner/recursion are only written by the task that holds (or is
// taking) the lock, and the semaphore serializes those writers.
unsafe impl Sync for SleepLock {}

impl SleepLock {
    /// A dormant lock; [`SleepLock::init`] must run before first use.
    pub const fn new() -> Self {
        Self {
            owner: Cell::new(ptr::null_mut()),
            recursion: Cell::new(0),
            semaphore: Semaphore::new(1),
        }
    }

    /// Links the embedded semaphore's wait queue. Must run exactly once,
    /// after the lock has reached its final address.
    pub fn init(&self) {
        self.semaphore.init();
    }

    /// Acquires the lock, sleeping until it is free. Re-acquisition by
    /// the owner just bumps the recursion count.
    pub fn acquire(&self) {
        if self.owner.get() != sched::current() {
            self.semaphore.down();
            self.owner.set(sched::current());
            kassert!(self.recursion.get() == 0);
            self.recursion.set(1);
        } else {
            self.recursion.set(self.recursion.get() + 1);
        }
    }

    /// Releases one level of the lock; the outermost release wakes the
    /// next sleeper.
    pub fn release(&self) {
        kassert!(self.owner.get() == sched::current());

        if self.recursion.get() > 1 {
            self.recursion.set(self.recursion.get() - 1);
            return;
        }
        kassert!(self.recursion.get() == 1);

        // The owner must be cleared before the up(): release runs with
        // interrupts enabled, and a preemption between an early up() and
        // a late owner-clear could hand the next acquirer a lock whose
        // owner field still names us.
        self.owner.set(ptr::null_mut());
        self.recursion.set(0);
        self.semaphore.up();
    }

    /// Current owner, null when free. Diagnostic/test surface.
    pub fn holder(&self) -> *mut Task {
        self.owner.get()
    }

    /// Current recursion depth. Diagnostic/test surface.
    pub fn recursion_depth(&self) -> u32 {
        self.recursion.get()
    }

    /// Value of the embedded semaphore. Diagnostic/test surface.
    pub fn semaphore_value(&self) -> u8 {
        self.semaphore.value()
    }
}

impl Default for SleepLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariants_of_a_free_lock() {
        let lock = SleepLock::new();
        lock.init();

        assert!(lock.holder().is_null());
        assert_eq!(lock.recursion_depth(), 0);
        assert_eq!(lock.semaphore_value(), 1);
    }
}

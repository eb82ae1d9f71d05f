//! Counting semaphore with a blocking wait queue.

use core::{cell::Cell, ptr};

use crate::{
    arch::x86::interrupts,
    list::List,
    sched::{self, task::Task, TaskState},
};

/// A counting semaphore.
///
/// The value and the wait queue are only ever touched with interrupts
/// disabled, which is the whole synchronization story on a uniprocessor.
/// The embedded queue sentinels make the type address-sensitive: call
/// [`Semaphore::init`] once the semaphore sits at its final address (a
/// static, or a field of a structure on a kernel page), and never move it
/// afterwards.
pub struct Semaphore {
    value: Cell<u8>,
    waiters: List,
}

// SAFETY: All access happens with interrupts disabled on a single CPU.
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// A dormant semaphore; [`Semaphore::init`] must run before first
    /// use.
    pub const fn new(value: u8) -> Self {
        Self {
            value: Cell::new(value),
            waiters: List::new(),
        }
    }

    /// Links the wait-queue sentinels. Must run exactly once, after the
    /// semaphore has reached its final address.
    pub fn init(&self) {
        self.waiters.init();
    }

    /// Current value. Diagnostic/test surface.
    pub fn value(&self) -> u8 {
        self.value.get()
    }

    /// Tasks currently parked on this semaphore.
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    /// The down operation: claim one unit, blocking while none is
    /// available.
    ///
    /// The re-check is a loop, not a branch — being woken only means the
    /// queue popped us, not that the unit is still there by the time we
    /// run.
    pub fn down(&self) {
        let prior = interrupts::disable();

        while self.value.get() == 0 {
            let cur = sched::current();
            // SAFETY: `cur` is the live running task; parking its
            // general_link on this queue is exactly what block() expects.
            unsafe {
                kassert!(!self.waiters.contains(ptr::addr_of!((*cur).general_link)));
                self.waiters.append(ptr::addr_of_mut!((*cur).general_link));
            }
            sched::block(TaskState::Blocked);
        }

        self.value.set(self.value.get() - 1);
        kassert!(self.value.get() == 0);

        interrupts::restore(prior);
    }

    /// The up operation: release one unit and wake the head waiter, if
    /// any.
    ///
    /// The woken task does not run immediately — it is pushed to the
    /// ready-queue head and competes from there once interrupts come back.
    pub fn up(&self) {
        let prior = interrupts::disable();

        kassert!(self.value.get() == 0);
        if !self.waiters.is_empty() {
            // SAFETY: Whatever is parked here is the general_link of a
            // blocked task, placed by down().
            let blocked = unsafe { Task::from_general_link(self.waiters.pop_front()) };
            sched::unblock(blocked);
        }

        self.value.set(self.value.get() + 1);
        kassert!(self.value.get() == 1);

        interrupts::restore(prior);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_on_a_positive_value_never_blocks() {
        let sema = Semaphore::new(1);
        sema.init();

        // No scheduler on the host: reaching the other side of down()
        // proves the fast path took no blocking detour.
        sema.down();
        assert_eq!(sema.value(), 0);
        assert_eq!(sema.waiter_count(), 0);
    }

    #[test]
    fn up_then_down_round_trips_the_value() {
        let sema = Semaphore::new(0);
        sema.init();

        sema.up();
        assert_eq!(sema.value(), 1);
        sema.down();
        assert_eq!(sema.value(), 0);
    }

    #[test]
    #[should_panic]
    fn up_on_a_free_semaphore_is_a_contract_violation() {
        let sema = Semaphore::new(1);
        sema.init();
        sema.up();
    }
}

//! Blocking ring-buffer byte channel.
//!
//! A 64-byte circular buffer with one write index (`head`) and one read
//! index (`tail`); full at 63 bytes because a completely full buffer
//! would be indistinguishable from an empty one. A consumer that finds
//! the buffer empty parks itself in the single consumer-waiter slot and
//! blocks; a producer that finds it full does the same on its side. Each
//! side wakes the other after moving a byte.
//!
//! The single waiter slots are a contract, not an oversight: this is a
//! single-producer/single-consumer pipe (keyboard ISR in, one reader
//! task out). A second simultaneous waiter on either side is asserted
//! against.

use core::{cell::Cell, cell::UnsafeCell, ptr};

use crate::{
    arch::x86::interrupts,
    sched::{self, task::Task, TaskState},
    sync::SleepLock,
};

/// Ring storage size; usable capacity is one less.
pub const BUFFER_SIZE: usize = 64;

/// A blocking SPSC byte channel.
///
/// All operations require interrupts to be disabled (asserted), which is
/// what makes the index and waiter-slot manipulation atomic on this
/// uniprocessor. Address-sensitive through its embedded lock: call
/// [`IoQueue::init`] once placed, and never move it afterwards.
pub struct IoQueue {
    /// Serializes sleepers around the waiter slots.
    lock: SleepLock,
    /// The one producer allowed to sleep here, null when absent.
    producer: Cell<*mut Task>,
    /// The one consumer allowed to sleep here, null when absent.
    consumer: Cell<*mut Task>,
    buf: UnsafeCell<[u8; BUFFER_SIZE]>,
    /// Write index.
    head: Cell<usize>,
    /// Read index.
    tail: Cell<usize>,
}

// SAFETY: Every access to the cells happens with interrupts disabled on a
// single CPU.
unsafe impl Sync for IoQueue {}

/// Next ring position after `pos`.
fn next_pos(pos: usize) -> usize {
    (pos + 1) % BUFFER_SIZE
}

impl IoQueue {
    /// A dormant queue; [`IoQueue::init`] must run before first use.
    pub const fn new() -> Self {
        Self {
            lock: SleepLock::new(),
            producer: Cell::new(ptr::null_mut()),
            consumer: Cell::new(ptr::null_mut()),
            buf: UnsafeCell::new([0; BUFFER_SIZE]),
            head: Cell::new(0),
            tail: Cell::new(0),
        }
    }

    /// Links the embedded lock. Must run exactly once, after the queue
    /// has reached its final address.
    pub fn init(&self) {
        self.lock.init();
    }

    /// Whether the buffer is full (63 bytes in flight).
    pub fn is_full(&self) -> bool {
        kassert!(!interrupts::are_enabled());
        next_pos(self.head.get()) == self.tail.get()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        kassert!(!interrupts::are_enabled());
        self.head.get() == self.tail.get()
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        kassert!(!interrupts::are_enabled());
        (self.head.get() + BUFFER_SIZE - self.tail.get()) % BUFFER_SIZE
    }

    /// Parks the calling task in `slot` and blocks until woken.
    fn wait_on(&self, slot: &Cell<*mut Task>) {
        kassert!(slot.get().is_null());
        slot.set(sched::current());
        sched::block(TaskState::Blocked);
    }

    /// Wakes whoever sleeps in `slot` and clears it.
    fn wake(&self, slot: &Cell<*mut Task>) {
        kassert!(!slot.get().is_null());
        sched::unblock(slot.get());
        slot.set(ptr::null_mut());
    }

    /// Takes one byte, blocking while the buffer is empty.
    ///
    /// Interrupts must be disabled. Re-checked in a loop: by the time a
    /// woken consumer runs, the byte situation may have changed again.
    pub fn get_byte(&self) -> u8 {
        kassert!(!interrupts::are_enabled());

        while self.is_empty() {
            self.lock.acquire();
            self.wait_on(&self.consumer);
            self.lock.release();
        }

        // SAFETY: Indices stay in range by construction and interrupts
        // are off, so nobody else is touching the storage.
        let byte = unsafe { (*self.buf.get())[self.tail.get()] };
        self.tail.set(next_pos(self.tail.get()));

        if !self.producer.get().is_null() {
            self.wake(&self.producer);
        }

        byte
    }

    /// Puts one byte, blocking while the buffer is full.
    ///
    /// Interrupts must be disabled.
    pub fn put_byte(&self, byte: u8) {
        kassert!(!interrupts::are_enabled());

        while self.is_full() {
            self.lock.acquire();
            self.wait_on(&self.producer);
            self.lock.release();
        }

        // SAFETY: As in `get_byte`.
        unsafe {
            (*self.buf.get())[self.head.get()] = byte;
        }
        self.head.set(next_pos(self.head.get()));

        if !self.consumer.get().is_null() {
            self.wake(&self.consumer);
        }
    }
}

impl Default for IoQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The host reports interrupts as disabled, so the non-blocking paths
    // of the channel are exercisable here; the blocking paths need the
    // scheduler and live in the bare-metal suite.

    #[test]
    fn next_pos_wraps_the_ring() {
        assert_eq!(next_pos(0), 1);
        assert_eq!(next_pos(62), 63);
        assert_eq!(next_pos(63), 0);
    }

    #[test]
    fn fresh_queue_is_empty_and_not_full() {
        let queue = IoQueue::new();
        queue.init();
        assert!(queue.is_empty());
        assert!(!queue.is_full());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn bytes_come_out_in_order() {
        let queue = IoQueue::new();
        queue.init();

        queue.put_byte(0x41);
        queue.put_byte(0x42);
        queue.put_byte(0x43);
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.get_byte(), 0x41);
        assert_eq!(queue.get_byte(), 0x42);
        assert_eq!(queue.get_byte(), 0x43);
        assert!(queue.is_empty());
    }

    #[test]
    fn capacity_is_one_less_than_the_storage() {
        let queue = IoQueue::new();
        queue.init();

        for i in 0..BUFFER_SIZE - 1 {
            assert!(!queue.is_full());
            queue.put_byte(i as u8);
        }
        assert!(queue.is_full());
        assert_eq!(queue.len(), 63);

        // Drain one; the ring opens up again.
        assert_eq!(queue.get_byte(), 0);
        assert!(!queue.is_full());
        queue.put_byte(0xFF);
        assert!(queue.is_full());
    }

    #[test]
    fn indices_wrap_across_the_boundary() {
        let queue = IoQueue::new();
        queue.init();

        // Walk the indices most of the way around, then straddle the
        // wrap point.
        for round in 0..BUFFER_SIZE - 2 {
            queue.put_byte(round as u8);
            let _ = queue.get_byte();
        }
        queue.put_byte(0xAA);
        queue.put_byte(0xBB);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get_byte(), 0xAA);
        assert_eq!(queue.get_byte(), 0xBB);
        assert!(queue.is_empty());
    }
}

//! Synchronization primitives.
//!
//! Two layers. The counting [`Semaphore`] is the IRQ-off layer: its
//! operations disable interrupts internally and may block the calling
//! task against a wait queue. The recursive [`SleepLock`] is the only
//! primitive meant to wrap code that itself blocks; it is built on a
//! binary semaphore and does not hold interrupts off across its body.

pub mod mutex;
pub mod semaphore;

pub use mutex::SleepLock;
pub use semaphore::Semaphore;

//! Inter-task byte transport.
//!
//! One mechanism: the blocking single-producer/single-consumer ring
//! buffer that carries bytes from interrupt context (the keyboard ISR)
//! into a foreground reader task.

pub mod ring_buffer;

pub use ring_buffer::IoQueue;

//! Device drivers.
//!
//! The serialized console layer and the keyboard, which is the kernel's
//! only input device. The keyboard ISR forwards raw scancode bytes into a
//! ring buffer; decoding them is a higher layer's business.

pub mod console;
pub mod keyboard;

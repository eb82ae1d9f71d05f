//! Keyboard input.
//!
//! The ISR on vector 0x21 reads the scancode byte from the controller's
//! output buffer and forwards it into a ring buffer; when the buffer is
//! full the byte is dropped, because interrupt context cannot block.
//! Scancode-to-character decoding belongs to whoever consumes
//! [`read_byte`].

use crate::{
    arch::x86::{idt, interrupts, io},
    ipc::IoQueue,
};

/// Keyboard controller output-buffer port.
const KEYBOARD_DATA_PORT: u16 = 0x60;

/// Raw scancode bytes, ISR producer to reader-task consumer.
static SCANCODE_QUEUE: IoQueue = IoQueue::new();

/// The ISR. Always drains the controller — leaving the byte in place
/// would wedge further keyboard interrupts.
extern "C" fn keyboard_interrupt_handler(_vector: u32) {
    // SAFETY: Reading port 0x60 inside the keyboard ISR is the one
    // documented way to fetch the pending scancode.
    let scancode = unsafe { io::inb(KEYBOARD_DATA_PORT) };

    if !SCANCODE_QUEUE.is_full() {
        SCANCODE_QUEUE.put_byte(scancode);
    }
}

/// Blocking consumer entry: the next raw scancode byte, in arrival
/// order. Suspends the calling task while the queue is empty.
pub fn read_byte() -> u8 {
    interrupts::without_interrupts(|| SCANCODE_QUEUE.get_byte())
}

/// Initializes the queue and claims vector 0x21. The IRQ1 line itself
/// was already unmasked by the PIC setup.
pub fn init() {
    SCANCODE_QUEUE.init();
    idt::register_handler(idt::KEYBOARD_VECTOR, keyboard_interrupt_handler);
    log::info!("[KBD] scancode queue ready");
}

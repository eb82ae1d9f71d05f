//! Serialized console output.
//!
//! The raw VGA sink writes characters; this layer wraps it in the
//! recursive sleep lock so whole messages from concurrent threads come
//! out unbroken instead of interleaved mid-line. Threads print through
//! here; interrupt-context output (the exception banner, panic reports)
//! goes straight to the sink, because an ISR can neither sleep nor rely
//! on the lock holder making progress.

use core::fmt;

use crate::{arch::x86::vga, sync::SleepLock};

static CONSOLE_LOCK: SleepLock = SleepLock::new();

/// Links the console lock. Call once before the first thread prints.
pub fn init() {
    CONSOLE_LOCK.init();
    log::info!("[CONSOLE] serialized console ready");
}

/// Takes the console for a multi-write sequence.
pub fn acquire() {
    CONSOLE_LOCK.acquire();
}

/// Releases the console.
pub fn release() {
    CONSOLE_LOCK.release();
}

/// Writes a string as one unbroken unit.
pub fn write_str(s: &str) {
    acquire();
    vga::write_str(s);
    release();
}

/// Writes a single byte as one unit.
pub fn write_byte(byte: u8) {
    acquire();
    vga::write_str(core::str::from_utf8(core::slice::from_ref(&byte)).unwrap_or("?"));
    release();
}

/// Writes a 32-bit value in hexadecimal as one unit.
pub fn write_hex(value: u32) {
    acquire();
    vga::write_hex(value);
    release();
}

/// Writes formatted output as one unbroken unit.
pub fn write_fmt(args: fmt::Arguments) {
    acquire();
    crate::print!("{}", args);
    release();
}

/// `console_println!`-style convenience: formatted, newline-terminated,
/// serialized against other threads.
#[macro_export]
macro_rules! console_println {
    ($($arg:tt)*) => {
        $crate::drivers::console::write_fmt(format_args!("{}\n", format_args!($($arg)*)))
    };
}

//! Write-only 16550 serial driver for COM1.
//!
//! Carries the structured log stream and the test framework's report
//! channel out of the machine. Receive-side plumbing is deliberately
//! absent; the keyboard is the kernel's only input device.

use core::fmt;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::arch::x86::{interrupts, io};

/// COM1 base port.
const COM1_BASE: u16 = 0x3F8;

// Register offsets from the base port.
const DATA: u16 = 0;
const INTERRUPT_ENABLE: u16 = 1;
const FIFO_CONTROL: u16 = 2;
const LINE_CONTROL: u16 = 3;
const MODEM_CONTROL: u16 = 4;
const LINE_STATUS: u16 = 5;

/// Line status bit: transmit holding register empty.
const LSR_THR_EMPTY: u8 = 1 << 5;

pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    const fn new(base: u16) -> Self {
        Self { base }
    }

    /// 115200 / 3 = 38400 baud, 8n1, FIFOs on, no interrupts.
    fn init(&mut self) {
        // SAFETY: Documented 16550 initialization sequence against the
        // fixed COM1 register block.
        unsafe {
            io::outb(self.base + INTERRUPT_ENABLE, 0x00);
            io::outb(self.base + LINE_CONTROL, 0x80); // DLAB on
            io::outb(self.base + DATA, 0x03); // divisor low
            io::outb(self.base + INTERRUPT_ENABLE, 0x00); // divisor high
            io::outb(self.base + LINE_CONTROL, 0x03); // 8n1, DLAB off
            io::outb(self.base + FIFO_CONTROL, 0xC7);
            io::outb(self.base + MODEM_CONTROL, 0x0B);
        }
    }

    fn send(&mut self, byte: u8) {
        // SAFETY: Polling the line status register and writing the data
        // register are the documented transmit protocol.
        unsafe {
            while io::inb(self.base + LINE_STATUS) & LSR_THR_EMPTY == 0 {
                core::hint::spin_loop();
            }
            io::outb(self.base + DATA, byte);
        }
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.send(b'\r');
            }
            self.send(byte);
        }
        Ok(())
    }
}

lazy_static! {
    static ref COM1: Mutex<SerialPort> = {
        let mut port = SerialPort::new(COM1_BASE);
        port.init();
        Mutex::new(port)
    };
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    interrupts::without_interrupts(|| {
        COM1.lock().write_fmt(args).ok();
    });
}

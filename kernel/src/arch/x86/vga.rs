//! VGA text-mode console sink.
//!
//! An 80×25 character buffer at the higher-half alias of 0xB8000 with a
//! hardware cursor kept in sync through the CRT controller ports. The
//! writer tracks an explicit (row, column) position so the exception path
//! can park the cursor at the top of the screen and stamp its banner
//! there, while ordinary output appends and scrolls.

use core::fmt;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::{
    arch::x86::{interrupts, io},
    config::KERNEL_VIRT_BASE,
};

/// VGA text-mode color palette. Not all variants are used but the full
/// 16-color palette is defined per the VGA specification.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
struct ColorCode(u8);

impl ColorCode {
    const fn new(foreground: Color, background: Color) -> ColorCode {
        ColorCode(((background as u8) << 4) | (foreground as u8))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
struct ScreenChar {
    ascii_character: u8,
    color_code: ColorCode,
}

const BUFFER_HEIGHT: usize = 25;
const BUFFER_WIDTH: usize = 80;

/// CRT controller register ports for the hardware cursor.
const CRTC_ADDRESS: u16 = 0x3D4;
const CRTC_DATA: u16 = 0x3D5;
const CURSOR_HIGH: u8 = 0x0E;
const CURSOR_LOW: u8 = 0x0F;

#[repr(transparent)]
struct Buffer {
    chars: [[ScreenChar; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

pub struct Writer {
    row: usize,
    column: usize,
    color_code: ColorCode,
    buffer: &'static mut Buffer,
}

impl Writer {
    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            b'\x08' => {
                if self.column > 0 {
                    self.column -= 1;
                    self.put_at(self.row, self.column, b' ');
                }
            }
            byte => {
                if self.column >= BUFFER_WIDTH {
                    self.new_line();
                }
                self.put_at(self.row, self.column, byte);
                self.column += 1;
            }
        }
        self.sync_cursor();
    }

    pub fn write_string(&mut self, s: &str) {
        for byte in s.bytes() {
            match byte {
                // Printable ASCII, newline, backspace.
                0x20..=0x7e | b'\n' | b'\x08' => self.write_byte(byte),
                _ => self.write_byte(0xfe),
            }
        }
    }

    /// Prints `value` as `0x`-prefixed hexadecimal.
    pub fn write_hex(&mut self, value: u32) {
        self.write_string("0x");
        for shift in (0..8).rev() {
            let digit = ((value >> (shift * 4)) & 0xF) as u8;
            let ascii = match digit {
                0..=9 => b'0' + digit,
                _ => b'a' + (digit - 10),
            };
            self.write_byte(ascii);
        }
    }

    /// Moves the logical and hardware cursor to a linear screen position.
    pub fn set_cursor(&mut self, position: u16) {
        let position = position as usize % (BUFFER_WIDTH * BUFFER_HEIGHT);
        self.row = position / BUFFER_WIDTH;
        self.column = position % BUFFER_WIDTH;
        self.sync_cursor();
    }

    /// Blanks the first `n` rows; used to clear space for the exception
    /// banner.
    pub fn clear_rows(&mut self, n: usize) {
        for row in 0..n.min(BUFFER_HEIGHT) {
            self.clear_row(row);
        }
    }

    fn put_at(&mut self, row: usize, col: usize, byte: u8) {
        let color_code = self.color_code;
        // SAFETY: The buffer is memory-mapped I/O at the VGA alias;
        // write_volatile keeps the store. Row and column are bounded by
        // the caller logic (new_line / set_cursor wrap them).
        unsafe {
            core::ptr::write_volatile(
                &mut self.buffer.chars[row][col],
                ScreenChar {
                    ascii_character: byte,
                    color_code,
                },
            );
        }
    }

    fn new_line(&mut self) {
        self.column = 0;
        if self.row + 1 < BUFFER_HEIGHT {
            self.row += 1;
        } else {
            self.scroll();
        }
    }

    fn scroll(&mut self) {
        for row in 1..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                // SAFETY: Volatile copy within the fixed-size buffer; both
                // indices are in range by the loop bounds.
                let character = unsafe { core::ptr::read_volatile(&self.buffer.chars[row][col]) };
                // SAFETY: As above; row - 1 >= 0 because row starts at 1.
                unsafe {
                    core::ptr::write_volatile(&mut self.buffer.chars[row - 1][col], character);
                }
            }
        }
        self.clear_row(BUFFER_HEIGHT - 1);
    }

    fn clear_row(&mut self, row: usize) {
        for col in 0..BUFFER_WIDTH {
            self.put_at(row, col, b' ');
        }
    }

    /// Pushes the logical position out to the CRT controller.
    fn sync_cursor(&self) {
        let position = (self.row * BUFFER_WIDTH + self.column) as u16;
        // SAFETY: Standard CRTC cursor-location programming; index
        // register then data register, high byte then low byte.
        unsafe {
            io::outb(CRTC_ADDRESS, CURSOR_HIGH);
            io::outb(CRTC_DATA, (position >> 8) as u8);
            io::outb(CRTC_ADDRESS, CURSOR_LOW);
            io::outb(CRTC_DATA, position as u8);
        }
    }
}

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s);
        Ok(())
    }
}

lazy_static! {
    /// The global console writer. The text buffer lives at the
    /// higher-half alias of physical 0xB8000.
    pub static ref WRITER: Mutex<Writer> = Mutex::new(Writer {
        row: 0,
        column: 0,
        color_code: ColorCode::new(Color::LightGray, Color::Black),
        // SAFETY: The loader maps the VGA text buffer at this fixed
        // virtual address for the life of the kernel; nothing else claims
        // the region.
        buffer: unsafe { &mut *((KERNEL_VIRT_BASE + 0xB8000) as usize as *mut Buffer) },
    });
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    // Interrupts are held off while the lock is held so an exception
    // banner printed from an ISR cannot deadlock against a half-finished
    // line.
    interrupts::without_interrupts(|| {
        WRITER.lock().write_fmt(args).ok();
    });
}

/// Moves the cursor to a linear screen position (0 = top left).
pub fn set_cursor(position: u16) {
    interrupts::without_interrupts(|| WRITER.lock().set_cursor(position));
}

/// Blanks the first `n` rows of the screen.
pub fn clear_rows(n: usize) {
    interrupts::without_interrupts(|| WRITER.lock().clear_rows(n));
}

/// Writes a raw string at the current cursor position.
pub fn write_str(s: &str) {
    interrupts::without_interrupts(|| WRITER.lock().write_string(s));
}

/// Writes a 32-bit value in hexadecimal at the current cursor position.
pub fn write_hex(value: u32) {
    interrupts::without_interrupts(|| WRITER.lock().write_hex(value));
}

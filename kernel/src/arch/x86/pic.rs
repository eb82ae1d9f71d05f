//! Cascaded 8259A programmable interrupt controller.
//!
//! The master/slave pair is programmed once at boot: edge-triggered,
//! slave cascaded on master IRQ2, 8086 mode with normal EOI, master base
//! vector 0x20 and slave base 0x28. After init only the keyboard line is
//! open; the timer line is unmasked by the scheduler once it is safe to be
//! preempted.

use crate::arch::x86::io;

/// The master PIC's command port.
const MASTER_COMMAND: u16 = 0x20;
/// The master PIC's data port.
const MASTER_DATA: u16 = 0x21;
/// The slave PIC's command port.
const SLAVE_COMMAND: u16 = 0xa0;
/// The slave PIC's data port.
const SLAVE_DATA: u16 = 0xa1;

/// ICW1: edge-triggered, cascade mode, ICW4 follows.
const ICW1_INIT_CASCADE: u8 = 0x11;
/// ICW2: base vector for master IRQ lines 0..=7.
pub const MASTER_VECTOR_BASE: u8 = 0x20;
/// ICW2: base vector for slave IRQ lines 8..=15.
pub const SLAVE_VECTOR_BASE: u8 = 0x28;
/// ICW3 (master): a slave hangs off IRQ2.
const ICW3_MASTER_HAS_SLAVE: u8 = 0x04;
/// ICW3 (slave): cascade identity 2.
const ICW3_SLAVE_ID: u8 = 0x02;
/// ICW4: 8086 mode, normal EOI.
const ICW4_8086: u8 = 0x01;

/// OCW1 written to the master after init: all lines masked except the
/// keyboard on IRQ1.
const MASTER_INITIAL_MASK: u8 = 0xFD;
/// OCW1 written to the slave after init: everything masked.
const SLAVE_INITIAL_MASK: u8 = 0xFF;

/// The end-of-interrupt command.
const COMMAND_EOI: u8 = 0x20;

/// Programs both controllers and applies the initial masks.
pub fn init() {
    // SAFETY: The 8259A initialization sequence is fixed by the data
    // sheet; writing it to the documented ports has no other effect.
    unsafe {
        io::outb(MASTER_COMMAND, ICW1_INIT_CASCADE);
        io::outb(MASTER_DATA, MASTER_VECTOR_BASE);
        io::outb(MASTER_DATA, ICW3_MASTER_HAS_SLAVE);
        io::outb(MASTER_DATA, ICW4_8086);

        io::outb(SLAVE_COMMAND, ICW1_INIT_CASCADE);
        io::outb(SLAVE_DATA, SLAVE_VECTOR_BASE);
        io::outb(SLAVE_DATA, ICW3_SLAVE_ID);
        io::outb(SLAVE_DATA, ICW4_8086);

        io::outb(MASTER_DATA, MASTER_INITIAL_MASK);
        io::outb(SLAVE_DATA, SLAVE_INITIAL_MASK);
    }

    log::info!("[PIC] cascaded 8259A programmed, keyboard line open");
}

/// Unmasks the given IRQ line.
pub fn enable_irq(mut n: u8) {
    let port = if n < 8 {
        MASTER_DATA
    } else {
        n -= 8;
        SLAVE_DATA
    };

    // SAFETY: Read-modify-write of the documented mask register.
    unsafe {
        let mask = io::inb(port) & !(1 << n);
        io::outb(port, mask);
    }
}

/// Masks the given IRQ line.
pub fn disable_irq(mut n: u8) {
    let port = if n < 8 {
        MASTER_DATA
    } else {
        n -= 8;
        SLAVE_DATA
    };

    // SAFETY: Read-modify-write of the documented mask register.
    unsafe {
        let mask = io::inb(port) | (1 << n);
        io::outb(port, mask);
    }
}

/// Sends an end-of-interrupt for `irq` (0..=15). Slave lines need the
/// command on both chips.
pub fn end_of_interrupt(irq: u8) {
    // SAFETY: EOI writes to the command ports acknowledge the in-service
    // interrupt and nothing else.
    unsafe {
        if irq >= 8 {
            io::outb(SLAVE_COMMAND, COMMAND_EOI);
        }
        io::outb(MASTER_COMMAND, COMMAND_EOI);
    }
}

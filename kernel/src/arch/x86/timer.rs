//! Programmable interval timer and the preemption tick.
//!
//! Counter 0 runs as a rate generator at [`crate::config::TICK_HZ`]. The
//! tick handler is the heartbeat of preemption: it polices the running
//! task's stack canary, charges the tick, and calls the scheduler when the
//! quantum runs out. The IRQ0 line stays masked until `sched::start`
//! unmasks it.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::{
    arch::x86::{idt, io},
    config::{PIT_INPUT_HZ, STACK_CANARY, TICK_HZ},
    sched,
};

/// Counter 0 data port.
const COUNTER0_PORT: u16 = 0x40;
/// PIT control word port.
const PIT_CONTROL_PORT: u16 = 0x43;

/// Control word fields: counter select in bits 7:6, read/write latch in
/// 5:4, mode in 3:1, BCD in bit 0.
const COUNTER_NO: u8 = 0;
/// Low byte then high byte.
const READ_WRITE_LATCH: u8 = 3;
/// Mode 2, rate generator.
const COUNTER_MODE: u8 = 2;

/// Ticks since the timer was programmed.
static TICKS: AtomicU32 = AtomicU32::new(0);

/// Total ticks observed since boot.
pub fn ticks() -> u32 {
    TICKS.load(Ordering::Relaxed)
}

/// Writes the control word and the 16-bit reload value for counter 0.
fn set_frequency(counter_port: u16, counter_no: u8, rwl: u8, mode: u8, reload: u16) {
    // SAFETY: Documented PIT programming sequence; control word first,
    // then the reload value low byte before high byte.
    unsafe {
        io::outb(
            PIT_CONTROL_PORT,
            counter_no << 6 | rwl << 4 | mode << 1,
        );
        io::outb(counter_port, reload as u8);
        io::outb(counter_port, (reload >> 8) as u8);
    }
}

/// The tick handler, registered on vector 0x20.
extern "C" fn timer_interrupt_handler(_vector: u32) {
    let current = sched::current();

    // SAFETY: `current` is recovered from the active kernel stack, which
    // always sits inside a live control-block page.
    unsafe {
        kassert!((*current).stack_canary == STACK_CANARY);

        (*current).elapsed_ticks += 1;
        TICKS.fetch_add(1, Ordering::Relaxed);

        // Charge this tick first, then rotate on exhaustion; a task of
        // priority N runs exactly N ticks per quantum.
        if (*current).ticks_remaining > 0 {
            (*current).ticks_remaining -= 1;
        }
        if (*current).ticks_remaining == 0 {
            sched::schedule();
        }
    }
}

/// Programs the 100 Hz rate generator and registers the tick handler.
pub fn init() {
    set_frequency(
        COUNTER0_PORT,
        COUNTER_NO,
        READ_WRITE_LATCH,
        COUNTER_MODE,
        reload_value(TICK_HZ),
    );
    idt::register_handler(idt::TIMER_VECTOR, timer_interrupt_handler);

    log::info!("[TIMER] PIT counter 0 at {} Hz", TICK_HZ);
}

/// Reload value for a requested tick rate.
fn reload_value(hz: u32) -> u16 {
    (PIT_INPUT_HZ / hz) as u16
}

//! Interrupt descriptor table and software dispatch.
//!
//! The hardware side is a table of 0x30 gate descriptors, each pointing at
//! one externally-assembled trampoline (see `entry.rs`). The software side
//! is a parallel table of handler pointers, all initially the
//! unknown-vector handler, plus a table of human-readable vector names.
//! `register_handler` swaps a slot with a single atomic store; the
//! trampolines call through the slot on every interrupt.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::arch::x86::vga;

/// Number of vectors the kernel dispatches: CPU exceptions 0..=0x1F plus
/// the sixteen remapped PIC lines 0x20..=0x2F.
pub const IDT_VECTOR_COUNT: usize = 0x30;

/// Registered handlers receive the vector number that fired.
pub type InterruptHandler = extern "C" fn(u32);

/// Kernel code segment selector installed by the loader's GDT.
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;

/// Kernel data segment selector installed by the loader's GDT. The common
/// trampoline loads it into DS/ES/FS/GS before dispatching a handler; the
/// interrupted context's selectors are restored on the way out.
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;

/// Gate attribute byte: present, DPL0, 32-bit interrupt gate.
#[allow(dead_code)] // host builds never load the table
const GATE_INTERRUPT_DPL0: u8 = 0x8E;

/// Spurious vectors raised by the PICs with no real device cause; master
/// IRQ7 and slave IRQ15.
pub const SPURIOUS_MASTER_VECTOR: u32 = 0x27;
pub const SPURIOUS_SLAVE_VECTOR: u32 = 0x2F;

/// Timer and keyboard vectors after the PIC remap.
pub const TIMER_VECTOR: u8 = 0x20;
pub const KEYBOARD_VECTOR: u8 = 0x21;

/// An 8-byte interrupt gate descriptor.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct GateDescriptor {
    /// Bits 0..16 of the handler address.
    offset_low: u16,
    /// Code segment selector used to enter the handler.
    selector: u16,
    /// Reserved; must be zero.
    zero: u8,
    /// Type, DPL, and present bit.
    attributes: u8,
    /// Bits 16..32 of the handler address.
    offset_high: u16,
}

impl GateDescriptor {
    /// A non-present placeholder entry.
    pub const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            attributes: 0,
            offset_high: 0,
        }
    }

    /// Builds a gate pointing at `handler` through `selector`.
    pub fn new(handler: u32, selector: u16, attributes: u8) -> Self {
        Self {
            offset_low: (handler & 0xFFFF) as u16,
            selector,
            zero: 0,
            attributes,
            offset_high: (handler >> 16) as u16,
        }
    }

    /// Reassembles the 32-bit handler address.
    pub fn handler_address(&self) -> u32 {
        let low = self.offset_low;
        let high = self.offset_high;
        (high as u32) << 16 | low as u32
    }

    /// Whether the present bit is set.
    pub fn is_present(&self) -> bool {
        self.attributes & 0x80 != 0
    }
}

/// Operand for `lidt`: table limit and linear base address.
#[cfg(all(target_arch = "x86", target_os = "none"))]
#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

/// The descriptor table itself. Written once during `init`, then only read
/// by the CPU.
#[cfg(all(target_arch = "x86", target_os = "none"))]
static mut IDT: [GateDescriptor; IDT_VECTOR_COUNT] = [GateDescriptor::missing(); IDT_VECTOR_COUNT];

/// The software dispatch table, indexed by vector. Slots hold the handler
/// address as a machine word; the common trampoline does
/// `call [INTERRUPT_HANDLERS + vector * 4]`, so the symbol is exported
/// unmangled and the element size must be one pointer.
#[no_mangle]
pub static INTERRUPT_HANDLERS: [AtomicUsize; IDT_VECTOR_COUNT] = {
    #[allow(clippy::declare_interior_mutable_const)]
    const EMPTY_SLOT: AtomicUsize = AtomicUsize::new(0);
    [EMPTY_SLOT; IDT_VECTOR_COUNT]
};

/// Human-readable vector names; 0..=19 per the architecture manual, the
/// rest stay "unknown" until a driver claims them.
static VECTOR_NAMES: [&str; IDT_VECTOR_COUNT] = [
    "#DE Divide Error",
    "#DB Debug Exception",
    "NMI Interrupt",
    "#BP Breakpoint Exception",
    "#OF Overflow Exception",
    "#BR BOUND Range Exceeded Exception",
    "#UD Invalid Opcode Exception",
    "#NM Device Not Available Exception",
    "#DF Double Fault Exception",
    "Coprocessor Segment Overrun",
    "#TS Invalid TSS Exception",
    "#NP Segment Not Present",
    "#SS Stack Fault Exception",
    "#GP General Protection Exception",
    "#PF Page-Fault Exception",
    "unknown", // 15: reserved
    "#MF x87 FPU Floating-Point Error",
    "#AC Alignment Check Exception",
    "#MC Machine-Check Exception",
    "#XF SIMD Floating-Point Exception",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown", // 0x20: claimed by the timer driver
    "unknown", // 0x21: claimed by the keyboard driver
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
    "unknown",
];

/// Returns the symbolic name of a vector.
pub fn vector_name(vector: u32) -> &'static str {
    VECTOR_NAMES
        .get(vector as usize)
        .copied()
        .unwrap_or("unknown")
}

/// Registers `handler` for `vector`, replacing the slot atomically.
pub fn register_handler(vector: u8, handler: InterruptHandler) {
    kassert!((vector as usize) < IDT_VECTOR_COUNT);
    INTERRUPT_HANDLERS[vector as usize].store(handler as usize, Ordering::SeqCst);
}

/// The default handler: installed in every slot at init time.
///
/// Spurious IRQ7/IRQ15 return silently. Anything else is fatal: a
/// four-row banner is cleared at the top of the console, the vector's
/// symbolic name is reported (plus the faulting linear address for the
/// page-fault vector), and the CPU parks with interrupts off.
extern "C" fn unknown_vector_handler(vector: u32) {
    if vector == SPURIOUS_MASTER_VECTOR || vector == SPURIOUS_SLAVE_VECTOR {
        return;
    }

    vga::set_cursor(0);
    vga::clear_rows(4);
    vga::set_cursor(0);
    vga::write_str("!!!!!!!!     exception message begin     !!!!!!!!\n");

    vga::set_cursor(88);
    vga::write_str(vector_name(vector));

    if vector == 14 {
        let fault_addr = page_fault_address();
        vga::write_str("\npage fault addr is ");
        vga::write_hex(fault_addr);
    }

    vga::write_str("\n!!!!!!!!     exception message end     !!!!!!!!\n");
    serial_println!("unhandled interrupt {:#04x}: {}", vector, vector_name(vector));

    // An interrupt gate already cleared IF; nothing will preempt the park.
    crate::panic::park();
}

/// Reads CR2, which holds the linear address that caused the last page
/// fault.
#[cfg(all(target_arch = "x86", target_os = "none"))]
fn page_fault_address() -> u32 {
    let addr: u32;
    // SAFETY: Reading CR2 is side-effect free in ring 0.
    unsafe {
        core::arch::asm!("mov {}, cr2", out(reg) addr, options(nomem, nostack));
    }
    addr
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
fn page_fault_address() -> u32 {
    0
}

/// Builds the descriptor table from the trampoline stubs, points every
/// dispatch slot at the default handler, programs the PIC, and loads the
/// table. Called once at boot, before interrupts are enabled.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn init() {
    use crate::arch::x86::{entry, pic};

    for slot in INTERRUPT_HANDLERS.iter() {
        slot.store(unknown_vector_handler as usize, Ordering::SeqCst);
    }

    // SAFETY: Boot is single-threaded with interrupts disabled; nothing
    // else touches the table until lidt below publishes it, after which it
    // is immutable.
    unsafe {
        let idt = &mut *core::ptr::addr_of_mut!(IDT);
        for (vector, stub) in entry::ENTRY_TABLE.iter().enumerate() {
            idt[vector] = GateDescriptor::new(
                *stub as usize as u32,
                KERNEL_CODE_SELECTOR,
                GATE_INTERRUPT_DPL0,
            );
        }
    }

    pic::init();

    let pointer = IdtPointer {
        limit: (core::mem::size_of::<GateDescriptor>() * IDT_VECTOR_COUNT - 1) as u16,
        base: core::ptr::addr_of!(IDT) as u32,
    };
    // SAFETY: The pointer references the static table, which lives for the
    // rest of the kernel's life.
    unsafe {
        core::arch::asm!("lidt [{}]", in(reg) &pointer, options(nostack));
    }

    log::info!("[IDT] {} vectors installed", IDT_VECTOR_COUNT);
}

/// Host builds have no descriptor table to load; the dispatch slots are
/// still filled so registry logic stays observable.
#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn init() {
    for slot in INTERRUPT_HANDLERS.iter() {
        slot.store(unknown_vector_handler as usize, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_splits_handler_address() {
        let gate = GateDescriptor::new(0x1234_5678, KERNEL_CODE_SELECTOR, 0x8E);
        assert_eq!(gate.handler_address(), 0x1234_5678);
        assert!(gate.is_present());

        let selector = gate.selector;
        assert_eq!(selector, 0x08);
        let low = gate.offset_low;
        let high = gate.offset_high;
        assert_eq!(low, 0x5678);
        assert_eq!(high, 0x1234);
    }

    #[test]
    fn gate_descriptor_is_eight_bytes() {
        assert_eq!(core::mem::size_of::<GateDescriptor>(), 8);
    }

    #[test]
    fn missing_gate_is_not_present() {
        assert!(!GateDescriptor::missing().is_present());
    }

    #[test]
    fn exception_names_follow_the_manual() {
        assert_eq!(vector_name(0), "#DE Divide Error");
        assert_eq!(vector_name(14), "#PF Page-Fault Exception");
        assert_eq!(vector_name(19), "#XF SIMD Floating-Point Exception");
        assert_eq!(vector_name(15), "unknown");
        assert_eq!(vector_name(0x2E), "unknown");
        assert_eq!(vector_name(0x99), "unknown");
    }

    #[test]
    fn register_handler_replaces_the_slot() {
        extern "C" fn nop_handler(_vector: u32) {}

        init();
        register_handler(0x23, nop_handler);
        assert_eq!(
            INTERRUPT_HANDLERS[0x23].load(Ordering::SeqCst),
            nop_handler as usize
        );
        // Neighbouring slots still hold the default handler.
        assert_eq!(
            INTERRUPT_HANDLERS[0x22].load(Ordering::SeqCst),
            INTERRUPT_HANDLERS[0x24].load(Ordering::SeqCst)
        );
    }
}

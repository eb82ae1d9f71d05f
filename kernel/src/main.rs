//! Kernel binary entry.
//!
//! The boot loader lands in `_start` with paging live, the higher-half
//! window mapped, and the stack top at the page that becomes the "main"
//! task's control block. Init order matters: interrupt plumbing first,
//! then memory, then the scheduler and the tick source, and only then is
//! the interrupt flag set and the timer line unmasked.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod kernel {
    use kestrel_kernel::{
        arch::x86::{idt, interrupts, timer},
        console_println, kassert,
        drivers::{console, keyboard},
        logger, mm, println, sched,
    };
    use log::LevelFilter;

    #[no_mangle]
    pub extern "C" fn _start() -> ! {
        kernel_main()
    }

    fn kernel_main() -> ! {
        println!("kestrel {} booting", env!("CARGO_PKG_VERSION"));
        logger::init(LevelFilter::Info);

        idt::init();
        mm::init();
        mm::heap::init();
        sched::init();
        timer::init();
        console::init();
        keyboard::init();

        kassert!(sched::spawn("worker-a", 31, tag_printer, 'A' as usize).is_some());
        kassert!(sched::spawn("worker-b", 31, tag_printer, 'B' as usize).is_some());
        kassert!(sched::spawn("kbd-reader", 8, scancode_reader, 0).is_some());
        log::info!("[KERNEL] {} tasks up", sched::total_task_count());

        interrupts::enable();
        sched::start();

        loop {
            // SAFETY: hlt with interrupts enabled just waits for the next
            // tick; the main task keeps its quantum semantics.
            unsafe {
                core::arch::asm!("hlt", options(nomem, nostack));
            }
        }
    }

    /// Demo worker: stamps its tag so quantum rotation is visible on
    /// screen (each tag runs for its full quantum before the other takes
    /// over).
    extern "C" fn tag_printer(arg: usize) {
        let tag = (arg as u8) as char;
        loop {
            console_println!("{} running", tag);
        }
    }

    /// Foreground consumer of the keyboard channel; blocks until the ISR
    /// produces bytes.
    extern "C" fn scancode_reader(_arg: usize) {
        loop {
            let byte = keyboard::read_byte();
            console_println!("scancode {:#04x}", byte);
        }
    }

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        kestrel_kernel::panic::report_panic(info)
    }
}

/// The kernel image only exists for the bare-metal target; building the
/// workspace on a host toolchain gets an inert binary so `cargo test`
/// can link.
#[cfg(not(target_os = "none"))]
fn main() {}

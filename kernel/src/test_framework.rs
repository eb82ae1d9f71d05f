//! No-std test framework for the bare-metal suites.
//!
//! Host-runnable logic is tested with the ordinary `#[test]` harness; the
//! pieces that need real interrupts, kernel stacks, and page tables run
//! inside QEMU instead. Those suites are `harness = false` integration
//! targets that call [`run_tests`] over a list of [`Testable`] checks,
//! report over serial, and terminate the emulator through the
//! isa-debug-exit device.

use core::panic::PanicInfo;

use crate::error::KernelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

/// Trait that all bare-metal test functions implement.
pub trait Testable {
    fn run(&self) -> Result<(), KernelError>;
    fn name(&self) -> &'static str;
}

/// A named check: `("drains in order", || { ... })`.
impl<T> Testable for (&'static str, T)
where
    T: Fn() -> Result<(), KernelError>,
{
    fn run(&self) -> Result<(), KernelError> {
        self.1()
    }

    fn name(&self) -> &'static str {
        self.0
    }
}

/// Runs every test, reports over serial, and exits the emulator with a
/// pass/fail code.
pub fn run_tests(tests: &[&dyn Testable]) -> ! {
    serial_println!("running {} tests", tests.len());
    let mut failed = 0;

    for test in tests {
        serial_print!("{}...\t", test.name());
        match test.run() {
            Ok(()) => serial_println!("[ok]"),
            Err(e) => {
                failed += 1;
                serial_println!("[failed]: {}", e);
            }
        }
    }

    if failed == 0 {
        serial_println!("\ntest result: ok. {} passed", tests.len());
        exit_qemu(QemuExitCode::Success)
    } else {
        serial_println!("\ntest result: FAILED. {} failed", failed);
        exit_qemu(QemuExitCode::Failed)
    }
}

/// Panic handler for the bare-metal test targets.
pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {}\n", info);
    exit_qemu(QemuExitCode::Failed)
}

/// Exits QEMU through the isa-debug-exit device when the `qemu-exit`
/// feature is on; otherwise parks, which a test runner can time out on.
pub fn exit_qemu(exit_code: QemuExitCode) -> ! {
    #[cfg(feature = "qemu-exit")]
    // SAFETY: Writing the code to port 0xF4 terminates the emulator; on
    // hardware without the device the write is ignored and we fall
    // through to the park.
    unsafe {
        crate::arch::x86::io::outl(0xF4, exit_code as u32);
    }

    let _ = exit_code;
    crate::arch::x86::interrupts::disable();
    crate::panic::park();
}
